//! Scripted crypto tool for testing.
//!
//! [`ScriptedTool`] never spawns anything. It records every [`Invocation`]
//! it receives and answers with a pre-programmed [`Reply`], so the
//! encryptor, decryptor and pool can be exercised without `gpg` installed.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use super::{CryptoTool, GpgError, Invocation, ToolOutput};

/// How a [`ScriptedTool`] answers one invocation.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Return this output immediately.
    Output(ToolOutput),
    /// Return this output after a delay.
    Delayed(Duration, ToolOutput),
    /// Never finish (simulates a tool stuck on a passphrase prompt).
    Hang,
    /// Fail as if the executable could not be started.
    SpawnFailure,
}

/// Tool double that records invocations and replays scripted replies.
///
/// Replies queued with [`push_reply`](Self::push_reply) are used first, in
/// order; once the queue is empty every call gets the fallback reply.
#[derive(Debug)]
pub struct ScriptedTool {
    invocations: Mutex<Vec<Invocation>>,
    queued: Mutex<VecDeque<Reply>>,
    fallback: Reply,
}

impl ScriptedTool {
    /// Tool that answers every call with `fallback` unless a reply is queued.
    #[must_use]
    pub fn new(fallback: Reply) -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            queued: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    /// Tool that succeeds with the given streams.
    pub fn replying(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::new(Reply::Output(ToolOutput::ok(stdout, stderr)))
    }

    /// Queue a reply for the next unanswered call.
    pub fn push_reply(&self, reply: Reply) {
        self.queued.lock().push_back(reply);
    }

    /// Every invocation received so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    /// Number of invocations received so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.invocations.lock().len()
    }

    fn next_reply(&self) -> Reply {
        self.queued
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl CryptoTool for ScriptedTool {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput, GpgError> {
        self.invocations.lock().push(invocation.clone());
        match self.next_reply() {
            Reply::Output(output) => Ok(output),
            Reply::Delayed(delay, output) => {
                tokio::time::sleep(delay).await;
                Ok(output)
            }
            Reply::Hang => std::future::pending().await,
            Reply::SpawnFailure => Err(GpgError::Spawn {
                program: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
        }
    }
}
