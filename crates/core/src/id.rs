// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque id generation for scratch directories and fresh blocks.

use uuid::Uuid;

/// A 32-character lowercase hex id with no dashes.
pub fn opaque_id() -> String {
    Uuid::new_v4().simple().to_string()
}
