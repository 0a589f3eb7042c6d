// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;
use tempfile::TempDir;

const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
worker:x:4000:4100:worker:/home/worker:/bin/sh
";

const GROUP: &str = "\
root:x:0:
daemon:x:1:
crew:x:4200:worker
";

struct Fixture {
    _dir: TempDir,
    passwd: std::path::PathBuf,
    group: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let passwd = dir.path().join("passwd");
    let group = dir.path().join("group");
    std::fs::File::create(&passwd)
        .unwrap()
        .write_all(PASSWD.as_bytes())
        .unwrap();
    std::fs::File::create(&group)
        .unwrap()
        .write_all(GROUP.as_bytes())
        .unwrap();
    Fixture {
        _dir: dir,
        passwd,
        group,
    }
}

#[test]
fn lookup_by_name_uses_login_gid() {
    let fx = fixture();
    let identity = lookup_runtime_user("worker", &fx.passwd, &fx.group)
        .unwrap()
        .unwrap();
    assert_eq!(identity, RuntimeIdentity { uid: 4000, gid: 4100 });
}

#[test]
fn lookup_by_numeric_uid() {
    let fx = fixture();
    let identity = lookup_runtime_user("4000", &fx.passwd, &fx.group)
        .unwrap()
        .unwrap();
    assert_eq!(identity.uid, 4000);
    assert_eq!(identity.gid, 4100);
}

#[test]
fn group_name_is_resolved_against_group_file() {
    let fx = fixture();
    let identity = lookup_runtime_user("worker:crew", &fx.passwd, &fx.group)
        .unwrap()
        .unwrap();
    assert_eq!(identity, RuntimeIdentity { uid: 4000, gid: 4200 });
}

#[test]
fn numeric_group_is_used_directly() {
    let fx = fixture();
    let identity = lookup_runtime_user("4000:4000", &fx.passwd, &fx.group)
        .unwrap()
        .unwrap();
    assert_eq!(identity, RuntimeIdentity { uid: 4000, gid: 4000 });
}

#[test]
fn unknown_user_is_a_hard_error() {
    let fx = fixture();
    let err = lookup_runtime_user("ghost", &fx.passwd, &fx.group).unwrap_err();
    assert!(matches!(err, DriverError::UserNotFound { user } if user == "ghost"));
}

#[test]
fn unknown_group_is_a_hard_error() {
    let fx = fixture();
    let err = lookup_runtime_user("worker:ghosts", &fx.passwd, &fx.group).unwrap_err();
    assert!(matches!(err, DriverError::GroupNotFound { group } if group == "ghosts"));
}

#[test]
fn missing_passwd_file_means_default_identity() {
    let fx = fixture();
    let missing = fx.passwd.with_file_name("nonexistent");
    let identity = lookup_runtime_user("worker", &missing, &fx.group).unwrap();
    assert!(identity.is_none());
}

#[test]
fn malformed_uid_column_errors() {
    let dir = TempDir::new().unwrap();
    let passwd = dir.path().join("passwd");
    std::fs::write(&passwd, "odd:x:not-a-number:0::/:/bin/sh\n").unwrap();
    let err = lookup_runtime_user("odd", &passwd, &dir.path().join("group")).unwrap_err();
    assert!(matches!(
        err,
        DriverError::MalformedIdentityEntry { file: "passwd", .. }
    ));
}
