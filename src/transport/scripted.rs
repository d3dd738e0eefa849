//! Scripted transport for testing
//!
//! Answers commands from a table of canned replies keyed by command prefix
//! and records every line it receives. Useful to drive encoders and the
//! sweep runner through exact reply sequences without the simulator.
//!
//! # Example
//!
//! ```
//! use nev_client::transport::{ProtocolClient, ScriptedTransport};
//!
//! # tokio_test::block_on(async {
//! let transport = ScriptedTransport::new();
//! let script = transport.script();
//! script.reply("GET NSU NUM", "#NSUNUM\n1\n#OK");
//!
//! let client = ProtocolClient::new(transport);
//! let reply = client.send("GET NSU NUM").await.unwrap();
//! assert_eq!(reply.body, "1");
//! assert_eq!(script.calls(), vec!["GET NSU NUM"]);
//! # })
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::Transport;
use crate::error::{NevError, NevResult};

/// Reply used when no rule matches.
pub const DEFAULT_REPLY: &str = "#OK";

#[derive(Debug)]
struct Rule {
    prefix: String,
    replies: VecDeque<String>,
}

#[derive(Debug, Default)]
struct ScriptState {
    rules: Vec<Rule>,
    calls: Vec<String>,
    drop_connection_on: Option<String>,
}

/// Shared handle to a [`ScriptedTransport`]'s replies and call log.
#[derive(Debug, Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a reply for commands starting with `prefix`.
    ///
    /// Replies are consumed in order; the last one keeps answering once the
    /// queue is down to it. The longest matching prefix wins.
    pub fn reply(&self, prefix: &str, reply: &str) -> &Self {
        let mut state = self.lock();
        match state.rules.iter_mut().find(|r| r.prefix == prefix) {
            Some(rule) => rule.replies.push_back(reply.to_string()),
            None => state.rules.push(Rule {
                prefix: prefix.to_string(),
                replies: VecDeque::from([reply.to_string()]),
            }),
        }
        self
    }

    /// Fail with [`NevError::ConnectionLost`] on the next command starting with `prefix`.
    pub fn drop_connection_on(&self, prefix: &str) -> &Self {
        self.lock().drop_connection_on = Some(prefix.to_string());
        self
    }

    /// Every command received so far.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Received commands starting with `prefix`.
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Forget the call log.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn answer(&self, line: &str) -> NevResult<String> {
        let mut state = self.lock();
        state.calls.push(line.to_string());

        let drop_now = state
            .drop_connection_on
            .as_deref()
            .is_some_and(|prefix| line.starts_with(prefix));
        if drop_now {
            state.drop_connection_on = None;
            return Err(NevError::ConnectionLost);
        }

        let rule = state
            .rules
            .iter_mut()
            .filter(|r| line.starts_with(r.prefix.as_str()))
            .max_by_key(|r| r.prefix.len());
        let reply = match rule {
            Some(rule) if rule.replies.len() > 1 => rule.replies.pop_front(),
            Some(rule) => rule.replies.front().cloned(),
            None => None,
        };
        Ok(reply.unwrap_or_else(|| DEFAULT_REPLY.to_string()))
    }
}

/// Transport answering from a [`Script`].
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Script,
}

impl ScriptedTransport {
    /// Transport with an empty script (every command answers `#OK`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for adding replies and reading the call log.
    pub fn script(&self) -> Script {
        self.script.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn exchange(&mut self, line: &str) -> NevResult<String> {
        self.script.answer(line)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
