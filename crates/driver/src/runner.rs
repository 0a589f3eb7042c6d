// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawning user code as a child process.
//!
//! The child runs with exactly the caller-provided environment, under the
//! resolved uid/gid when one is configured, with its stdout and stderr
//! relayed line-by-line through the datum logger. The runner waits on
//! process termination first and drains I/O afterwards, so a deadline can
//! kill the process without racing the pipe readers.

use crate::error::DriverError;
use crate::identity::RuntimeIdentity;
use crate::logger::DatumLogger;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything needed to launch one user-code invocation.
pub(crate) struct RunSpec<'a> {
    pub cmd: &'a [String],
    pub stdin: &'a [String],
    pub working_dir: Option<&'a Path>,
    pub identity: Option<RuntimeIdentity>,
    pub env: &'a [(String, String)],
    pub accept_return_codes: &'a [i32],
    pub timeout: Option<Duration>,
}

/// Run the command to completion.
///
/// Lifecycle per invocation: created → started → terminated → io-drained.
/// There is no retry at this layer. A fired deadline yields
/// [`DriverError::DatumTimedOut`]; cancellation of the driver context
/// kills the child and yields [`DriverError::Cancelled`].
pub(crate) async fn run_command(
    spec: RunSpec<'_>,
    cancel: &CancellationToken,
    logger: &DatumLogger,
) -> Result<(), DriverError> {
    let (program, args) = match spec.cmd.split_first() {
        Some(split) => split,
        None => return Err(DriverError::NoCommand),
    };

    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .env_clear()
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = spec.working_dir {
        command.current_dir(dir);
    }
    if let Some(identity) = spec.identity {
        command.uid(identity.uid).gid(identity.gid);
    }
    command.stdin(if spec.stdin.is_empty() {
        Stdio::null()
    } else {
        Stdio::piped()
    });

    let mut child = command
        .spawn()
        .map_err(|source| DriverError::UserCodeStart { source })?;

    let stdin_writer: Option<JoinHandle<Result<(), std::io::Error>>> =
        child.stdin.take().map(|mut pipe| {
            let data = format!("{}\n", spec.stdin.join("\n"));
            tokio::spawn(async move {
                pipe.write_all(data.as_bytes()).await?;
                pipe.shutdown().await
            })
        });
    let mut relays = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        relays.push(spawn_relay(stdout, logger.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        relays.push(spawn_relay(stderr, logger.clone()));
    }

    let timeout_fired = async {
        match spec.timeout {
            Some(t) => tokio::time::sleep(t).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(timeout_fired);

    let status = tokio::select! {
        status = child.wait() => status?,
        () = cancel.cancelled() => {
            let _ = child.kill().await;
            return Err(DriverError::Cancelled);
        }
        () = &mut timeout_fired => {
            let _ = child.kill().await;
            return Err(DriverError::DatumTimedOut);
        }
    };

    // The process has terminated; now drain I/O.
    for relay in relays {
        let _ = relay.await;
    }
    if let Some(writer) = stdin_writer {
        if let Ok(Err(e)) = writer.await {
            // User code not draining its stdin is common and harmless.
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }
    }

    if status.success() {
        return Ok(());
    }
    let code = status.code().unwrap_or(-1);
    if spec.accept_return_codes.contains(&code) {
        return Ok(());
    }
    Err(DriverError::UserCodeFailed { code })
}

fn spawn_relay<R>(reader: R, logger: DatumLogger) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            logger.user_line(&line);
        }
    })
}
