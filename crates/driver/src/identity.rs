// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolution of the pipeline's `user[:group]` spec to a uid/gid pair.
//!
//! The string follows the Dockerfile `USER` directive: each side may be a
//! name or a numeric id. Resolution scans the passwd and group files
//! inside the container rather than calling libc, so it works against the
//! files the user code will actually run with.

use crate::error::DriverError;
use std::path::Path;

/// The identity user code is spawned under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeIdentity {
    pub uid: u32,
    pub gid: u32,
}

/// Resolve `spec` against `passwd_path` and `group_path`.
///
/// Returns `Ok(None)` when the passwd file does not exist: the container
/// has no user database and user code runs as the container's default
/// identity. A non-empty spec that matches no passwd entry is a hard
/// error.
pub fn lookup_runtime_user(
    spec: &str,
    passwd_path: &Path,
    group_path: &Path,
) -> Result<Option<RuntimeIdentity>, DriverError> {
    let (user_part, group_part) = match spec.split_once(':') {
        Some((user, group)) => (user, Some(group)),
        None => (spec, None),
    };

    let passwd = match std::fs::read_to_string(passwd_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    for line in passwd.lines() {
        let columns: Vec<&str> = line.split(':').collect();
        if columns.len() < 4 {
            continue;
        }
        // Column 0 is the name, column 2 the uid, column 3 the login gid.
        if columns[0] != user_part && columns[2] != user_part {
            continue;
        }
        let uid = parse_id("passwd", columns[0], columns[2])?;
        let gid = match group_part {
            None => parse_id("passwd", columns[0], columns[3])?,
            Some(group) => match group.parse::<u32>() {
                Ok(gid) => gid,
                Err(_) => lookup_group(group, group_path)?,
            },
        };
        return Ok(Some(RuntimeIdentity { uid, gid }));
    }

    Err(DriverError::UserNotFound {
        user: spec.to_string(),
    })
}

fn lookup_group(group: &str, group_path: &Path) -> Result<u32, DriverError> {
    let contents = match std::fs::read_to_string(group_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DriverError::GroupNotFound {
                group: group.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    for line in contents.lines() {
        let columns: Vec<&str> = line.split(':').collect();
        if columns.len() < 3 {
            continue;
        }
        if columns[0] == group {
            return parse_id("group", columns[0], columns[2]);
        }
    }
    Err(DriverError::GroupNotFound {
        group: group.to_string(),
    })
}

fn parse_id(file: &'static str, name: &str, raw: &str) -> Result<u32, DriverError> {
    raw.parse::<u32>()
        .map_err(|e| DriverError::MalformedIdentityEntry {
            file,
            name: name.to_string(),
            detail: e.to_string(),
        })
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
