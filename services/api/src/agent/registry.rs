//! Server-side table of running agents, keyed by channel.
//!
//! A channel is reserved before the vendor is asked to start an agent, so two
//! concurrent starts on the same channel cannot both reach the vendor.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Starting,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSession {
    pub channel: String,
    /// Assigned by the vendor once the join succeeds.
    pub agent_id: Option<String>,
    pub state: AgentState,
}

/// The channel is already held by another session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHeld {
    pub agent_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct AgentRegistry {
    sessions: Mutex<HashMap<String, AgentSession>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, AgentSession>> {
        // Entries are only inserted or removed whole, so a poisoned map is still consistent.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Atomically claims `channel`. The claim is released when the returned
    /// guard is dropped without [`Reservation::commit`].
    pub fn reserve(&self, channel: &str) -> Result<Reservation<'_>, ChannelHeld> {
        let mut sessions = self.sessions();
        if let Some(existing) = sessions.get(channel) {
            return Err(ChannelHeld {
                agent_id: existing.agent_id.clone(),
            });
        }
        sessions.insert(
            channel.to_string(),
            AgentSession {
                channel: channel.to_string(),
                agent_id: None,
                state: AgentState::Starting,
            },
        );
        Ok(Reservation {
            registry: self,
            channel: channel.to_string(),
            committed: false,
        })
    }

    /// Removes the session running `agent_id`, returning its channel.
    pub fn release_agent(&self, agent_id: &str) -> Option<String> {
        let mut sessions = self.sessions();
        let channel = sessions
            .iter()
            .find(|(_, s)| s.agent_id.as_deref() == Some(agent_id))
            .map(|(channel, _)| channel.clone())?;
        sessions.remove(&channel);
        Some(channel)
    }

    pub fn get(&self, channel: &str) -> Option<AgentSession> {
        self.sessions().get(channel).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A channel claimed for an agent that is still starting.
#[must_use]
pub struct Reservation<'a> {
    registry: &'a AgentRegistry,
    channel: String,
    committed: bool,
}

impl Reservation<'_> {
    /// Records the started agent and keeps the channel held.
    pub fn commit(mut self, agent_id: &str) {
        if let Some(session) = self.registry.sessions().get_mut(&self.channel) {
            session.agent_id = Some(agent_id.to_string());
            session.state = AgentState::Running;
        }
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut sessions = self.registry.sessions();
        if sessions
            .get(&self.channel)
            .is_some_and(|s| s.state == AgentState::Starting)
        {
            sessions.remove(&self.channel);
        }
    }
}
