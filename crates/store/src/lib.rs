// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sluice-store: the coordination-store layer.
//!
//! Workers coordinate through a shared key-value store with optimistic
//! multi-key transactions. This crate provides the [`Kv`] backend trait, an
//! in-process [`MemKv`] implementation, the [`Txn`] view with conflict
//! detection and retry ([`run_in_txn`]), and typed [`Collection`] handles
//! over key namespaces.

pub mod collection;
pub mod error;
pub mod kv;
pub mod txn;

pub use collection::{Collection, ReadWriteView};
pub use error::StoreError;
pub use kv::{Kv, KvOp, MemKv, VersionGuard, Versioned};
pub use txn::{run_in_txn, Txn, TxnFuture, TxnResponse, MAX_TXN_ATTEMPTS};
