/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable, durable persistence for acceptor state and master epochs.
//!
//! Acceptors and master epoch handlers do not touch the disk directly. Instead, they read and write
//! typed [variables](variables) through the [`KVStore`](pluggables::KVStore) trait, which the library
//! user can implement over any key-value store that commits a [`WriteBatch`](pluggables::WriteBatch)
//! durably before returning from `write`.
//!
//! Two implementations are provided:
//! - [`FileDB`](file_db::FileDB): one crash-consistent file per key under a storage root directory.
//! - [`MemDB`](mem_db::MemDB): a volatile in-memory store whose writes can be made to fail on demand,
//!   for testing.

pub mod pluggables;

pub mod variables;

pub mod write_batch;

pub mod file_db;

pub mod mem_db;

pub use file_db::FileDB;
pub use mem_db::MemDB;
pub use pluggables::{KVGet, KVGetError, KVSetError, KVStore, KVStoreError, Key, WriteBatch};
pub use write_batch::StoreWriteBatch;
