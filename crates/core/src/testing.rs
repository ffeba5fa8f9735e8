// Test doubles shared by the unit tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::{Error, Result};
use crate::notifier::RefreshTrigger;

type Responder = Box<dyn Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync>;

/// Runner answering from a closure and recording every command line
pub struct ScriptedRunner {
    responder: Responder,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(responder: impl Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every command succeeds with empty output
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(ok("")))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec, _timeout: Option<Duration>) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.to_string());
        (self.responder)(command)
    }
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        success: true,
        code: Some(0),
        stdout: stdout.to_string(),
    }
}

pub fn failed(code: i32) -> CommandOutput {
    CommandOutput {
        success: false,
        code: Some(code),
        stdout: String::new(),
    }
}

pub fn not_found(command: &CommandSpec) -> Error {
    Error::Spawn {
        program: command.program.clone(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    }
}

/// Counts refresh requests instead of aggregating
#[derive(Default)]
pub struct CountingRefresh {
    count: AtomicUsize,
}

impl CountingRefresh {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl RefreshTrigger for CountingRefresh {
    fn request_refresh(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
