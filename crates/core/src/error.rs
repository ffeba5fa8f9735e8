// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

// Error types for the status engine

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{command} exited with {status}")]
    CommandFailed { command: String, status: String },

    #[error("Another operation is already running: {running}")]
    Busy { running: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to download server list: {0}")]
    Catalog(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] pia_status_common::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
