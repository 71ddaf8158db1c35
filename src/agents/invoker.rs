//! Runs agents under a deadline.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::{Agent, AgentKind, AgentRequest};
use crate::config::AgentTimeouts;

/// Outcome of one agent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentReply {
    Answer(String),
    TimedOut,
    Failed,
}

impl AgentReply {
    /// Text to send: the answer, or the canned copy for `kind`.
    pub fn into_text(self, kind: AgentKind) -> String {
        match self {
            Self::Answer(text) => text,
            Self::TimedOut => kind.timeout_message().to_string(),
            Self::Failed => kind.failure_message().to_string(),
        }
    }
}

/// Registry of agents plus their deadlines.
///
/// The agent future is dropped when its deadline passes, which cancels the
/// in-flight LLM request with it.
pub struct AgentInvoker {
    agents: HashMap<AgentKind, Arc<dyn Agent>>,
    timeouts: AgentTimeouts,
}

impl AgentInvoker {
    pub fn new(timeouts: AgentTimeouts) -> Self {
        Self {
            agents: HashMap::new(),
            timeouts,
        }
    }

    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.kind(), agent);
    }

    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.register(agent);
        self
    }

    pub async fn invoke(&self, kind: AgentKind, request: AgentRequest) -> AgentReply {
        let Some(agent) = self.agents.get(&kind) else {
            error!(agent = %kind, "No agent registered");
            return AgentReply::Failed;
        };

        let telegram_id = request.user.telegram_id;
        let deadline = kind.deadline(&self.timeouts);
        let started = std::time::Instant::now();

        match tokio::time::timeout(deadline, agent.run(request)).await {
            Ok(Ok(text)) if text.trim().is_empty() => {
                warn!(agent = %kind, telegram_id, "Agent returned an empty answer");
                AgentReply::Failed
            }
            Ok(Ok(text)) => {
                info!(
                    agent = %kind,
                    telegram_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Agent answered"
                );
                AgentReply::Answer(text.trim().to_string())
            }
            Ok(Err(e)) => {
                error!(agent = %kind, telegram_id, error = %e, "Agent failed");
                AgentReply::Failed
            }
            Err(_) => {
                warn!(
                    agent = %kind,
                    telegram_id,
                    deadline_secs = deadline.as_secs_f64(),
                    "Agent timed out"
                );
                AgentReply::TimedOut
            }
        }
    }
}
