// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

//! External command execution
//!
//! Every probe and every orchestration step ends up here. Commands report
//! success through their exit status only; stdout is captured for the few
//! probes that parse it.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// A program plus its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Same command, run through `sudo -n` when requested
    pub fn privileged<I, S>(use_sudo: bool, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = Self::new(program, args);
        if !use_sudo {
            return spec;
        }

        let mut sudo_args = vec!["-n".to_string(), spec.program];
        sudo_args.extend(spec.args);
        Self {
            program: "sudo".to_string(),
            args: sudo_args,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What a finished command left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
}

impl CommandOutput {
    /// Turn a non-zero exit into an error
    pub fn ensure_success(self, command: &CommandSpec) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        Err(Error::CommandFailed {
            command: command.to_string(),
            status: match self.code {
                Some(code) => format!("status {}", code),
                None => "a signal".to_string(),
            },
        })
    }
}

/// Runs external commands without blocking the async runtime
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. `Err` means the command could not be run or timed
    /// out; a non-zero exit is reported through [`CommandOutput::success`].
    async fn run(&self, command: &CommandSpec, timeout: Option<Duration>) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, command: &CommandSpec, timeout: Option<Duration>) -> Result<CommandOutput> {
        debug!("Running: {}", command);

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let pending = process.output();
        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| Error::Timeout {
                    program: command.program.clone(),
                    timeout: limit,
                })?,
            None => pending.await,
        }
        .map_err(|source| Error::Spawn {
            program: command.program.clone(),
            source,
        })?;

        debug!("{} finished with {}", command.program, output.status);

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
