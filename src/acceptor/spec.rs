/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Builders for configuring and starting an acceptor.

use std::{sync::Arc, time::Duration};

use typed_builder::TypedBuilder;

use crate::{
    event_handlers::{EventHandlers, HandlerPtr},
    events::*,
    storage::KVStore,
    types::Address,
};

use super::{implementation::Acceptor, stage::AcceptorStage};

/// Stores the user-defined parameters required to run an acceptor.
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building an [AcceptorConfiguration]. On the builder call the following methods to construct a valid [AcceptorConfiguration].

    Required:
    - `.me(...)`

    Optional:
    - `.message_timeout(...)`
    - `.log_events(...)`
    "))]
pub struct AcceptorConfiguration {
    #[builder(setter(doc = "Set the address the acceptor stamps its replies with. Required."))]
    pub me: Address,
    #[builder(default, setter(strip_option, doc = "Drop PREPARE, ACCEPT, and LEARN messages that were sent longer than this ago. Optional, by default messages never expire."))]
    pub message_timeout: Option<Duration>,
    #[builder(default = false, setter(doc = "Print every event as a CSV line through the `log` crate? Optional, defaults to false."))]
    pub log_events: bool,
}

/// Stores all necessary parameters and trait implementations required to run an acceptor.
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building an [AcceptorSpec]. On the builder call the following methods to construct a valid [AcceptorSpec].

    Required:
    - `.kv_store(...)`
    - `.configuration(...)`

    Optional:
    - `.on_learn(...)`
    - `.on_promise(...)`
    - `.on_accept(...)`
    - `.on_reject(...)`
    "))]
pub struct AcceptorSpec<K: KVStore> {
    #[builder(setter(doc = "Set the implementation of the acceptor's Key-Value store, where cell states are persisted. The argument must implement the [KVStore](crate::storage::KVStore) trait. Required."))]
    kv_store: K,
    #[builder(setter(doc = "Set the [configuration](AcceptorConfiguration) of the acceptor. Required."))]
    configuration: AcceptorConfiguration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&LearnEvent) + Send + Sync + 'static| Some(Box::new(handler) as HandlerPtr<LearnEvent>),
    doc = "Register a handler closure to be invoked after the acceptor durably learns a lease. Optional."))]
    on_learn: Option<HandlerPtr<LearnEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PromiseEvent) + Send + Sync + 'static| Some(Box::new(handler) as HandlerPtr<PromiseEvent>),
    doc = "Register a handler closure to be invoked after the acceptor acknowledges a PREPARE. Optional."))]
    on_promise: Option<HandlerPtr<PromiseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AcceptEvent) + Send + Sync + 'static| Some(Box::new(handler) as HandlerPtr<AcceptEvent>),
    doc = "Register a handler closure to be invoked after the acceptor durably accepts a value. Optional."))]
    on_accept: Option<HandlerPtr<AcceptEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectEvent) + Send + Sync + 'static| Some(Box::new(handler) as HandlerPtr<RejectEvent>),
    doc = "Register a handler closure to be invoked after the acceptor answers a PREPARE or ACCEPT with a NACK. Optional."))]
    on_reject: Option<HandlerPtr<RejectEvent>>,
}

impl<K: KVStore> AcceptorSpec<K> {
    pub(crate) fn me(&self) -> &Address {
        &self.configuration.me
    }

    /// Build the bare acceptor state machine. The caller must not process messages of one cell
    /// concurrently.
    pub fn into_acceptor(self) -> Acceptor<K> {
        let (kv_store, configuration, handlers) = self.into_parts();
        Acceptor::new(
            kv_store,
            configuration.me,
            configuration.message_timeout,
            handlers,
        )
    }

    /// Start an [`AcceptorStage`] that processes each cell on its own worker thread.
    pub fn start(self) -> AcceptorStage<K> {
        let (kv_store, configuration, handlers) = self.into_parts();
        AcceptorStage::new(kv_store, configuration, handlers)
    }

    fn into_parts(self) -> (K, AcceptorConfiguration, Arc<EventHandlers>) {
        let handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_promise,
            self.on_accept,
            self.on_reject,
            self.on_learn,
        );
        (self.kv_store, self.configuration, Arc::new(handlers))
    }
}
