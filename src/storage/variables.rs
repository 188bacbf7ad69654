/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each persisted variable is stored in the user-provided key-value
//! store.
//!
//! # List of persisted variables
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Acceptor Cells|[`CellId`](crate::types::CellId) -> [`AcceptorCellState`](crate::acceptor::AcceptorCellState)|The prepared ballot, the accepted value, and the learned value of every cell an acceptor has seen a message for.|
//! |Master Epochs|[`CellId`](crate::types::CellId) -> [`MasterEpoch`](crate::types::MasterEpoch)|The last master epoch durably stored for every cell this process has opened.|
//!
//! Both variables are mappings. Each entry is stored at a key formed by concatenating the variable's
//! one-byte prefix and the UTF-8 bytes of the cell id, and holds the Borsh serialization of the value.
//!
//! The two variables are independent. An acceptor and a master epoch handler may share one store, or
//! use one store each.

pub const ACCEPTOR_CELLS: [u8; 1] = [0];
pub const MASTER_EPOCHS: [u8; 1] = [1];

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
