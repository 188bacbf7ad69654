/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Registry of the handlers invoked for each [event](crate::events).
//!
//! Handlers run synchronously on the thread that processed the message. Acceptor stages share one
//! registry between all of their per-cell workers, so handlers must be `Sync`.

use crate::{events::*, logging::Logger};

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send + Sync>;

#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) promise_handlers: Vec<HandlerPtr<PromiseEvent>>,
    pub(crate) accept_handlers: Vec<HandlerPtr<AcceptEvent>>,
    pub(crate) reject_handlers: Vec<HandlerPtr<RejectEvent>>,
    pub(crate) learn_handlers: Vec<HandlerPtr<LearnEvent>>,
}

impl EventHandlers {
    pub(crate) fn new(
        log_events: bool,
        on_promise: Option<HandlerPtr<PromiseEvent>>,
        on_accept: Option<HandlerPtr<AcceptEvent>>,
        on_reject: Option<HandlerPtr<RejectEvent>>,
        on_learn: Option<HandlerPtr<LearnEvent>>,
    ) -> EventHandlers {
        let mut handlers = EventHandlers::default();

        if log_events {
            handlers.promise_handlers.push(PromiseEvent::get_logger());
            handlers.accept_handlers.push(AcceptEvent::get_logger());
            handlers.reject_handlers.push(RejectEvent::get_logger());
            handlers.learn_handlers.push(LearnEvent::get_logger());
        }

        handlers.promise_handlers.extend(on_promise);
        handlers.accept_handlers.extend(on_accept);
        handlers.reject_handlers.extend(on_reject);
        handlers.learn_handlers.extend(on_learn);

        handlers
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.promise_handlers.is_empty()
            && self.accept_handlers.is_empty()
            && self.reject_handlers.is_empty()
            && self.learn_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::Promise(promise_event) => self
                .promise_handlers
                .iter()
                .for_each(|handler| handler(&promise_event)),

            Event::Accept(accept_event) => self
                .accept_handlers
                .iter()
                .for_each(|handler| handler(&accept_event)),

            Event::Reject(reject_event) => self
                .reject_handlers
                .iter()
                .for_each(|handler| handler(&reject_event)),

            Event::Learn(learn_event) => self
                .learn_handlers
                .iter()
                .for_each(|handler| handler(&learn_event)),
        }
    }
}
