use std::sync::Arc;

use tokio::sync::Mutex;

use crate::session::{ChatSession, Message};
use crate::storage::{ClientStorage, SESSIONS_KEY};
use crate::transport::{ChatTransport, TransportError};

pub const APOLOGY: &str = "Sorry, I encountered an error. Please try again.";
pub const FAILURE_NOTICE: &str = "The assistant could not be reached. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyMessage,
    SendInFlight,
    NoActiveSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Ignored(IgnoreReason),
    Answered(Message),
    /// The apology was appended; `notice` is the transient notification.
    Failed { reply: Message, notice: String },
}

/// Ticket for a send whose user message is already appended.
#[derive(Debug)]
pub struct PendingSend {
    pub session_id: String,
    pub query: String,
}

/// Session collection plus the active pointer and in-flight marker.
///
/// Holds at least one session at all times, and `active_id` always names
/// one of them.
#[derive(Debug, Clone)]
pub struct ChatState {
    sessions: Vec<ChatSession>,
    active_id: String,
    in_flight: Option<String>,
}

impl ChatState {
    pub fn fresh() -> Self {
        let session = ChatSession::new();
        Self { active_id: session.id.clone(), sessions: vec![session], in_flight: None }
    }

    /// Restores a stored collection; the first session becomes active.
    pub fn from_sessions(sessions: Vec<ChatSession>) -> Self {
        match sessions.first().map(|s| s.id.clone()) {
            Some(active_id) => Self { active_id, sessions, in_flight: None },
            None => Self::fresh(),
        }
    }

    pub fn sessions(&self) -> &[ChatSession] { &self.sessions }

    pub fn active_id(&self) -> &str { &self.active_id }

    pub fn active(&self) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == self.active_id)
    }

    #[cfg(test)]
    pub fn is_sending(&self) -> bool { self.in_flight.is_some() }

    pub fn create_session(&mut self) -> &ChatSession {
        let session = ChatSession::new();
        self.active_id = session.id.clone();
        self.sessions.insert(0, session);
        &self.sessions[0]
    }

    pub fn select_session(&mut self, id: &str) -> bool {
        if self.sessions.iter().any(|s| s.id == id) {
            self.active_id = id.to_owned();
            true
        } else {
            false
        }
    }

    pub fn delete_session(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return false;
        }
        if self.active_id == id {
            match self.sessions.first().map(|s| s.id.clone()) {
                Some(first) => self.active_id = first,
                None => {
                    self.create_session();
                }
            }
        }
        true
    }

    /// First phase of a send: optimistic append of the user message.
    pub fn begin_send(&mut self, text: &str) -> Result<PendingSend, IgnoreReason> {
        let text = text.trim();
        if text.is_empty() {
            return Err(IgnoreReason::EmptyMessage);
        }
        if self.in_flight.is_some() {
            return Err(IgnoreReason::SendInFlight);
        }
        let active_id = self.active_id.clone();
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == active_id)
            .ok_or(IgnoreReason::NoActiveSession)?;

        if !session.has_user_messages() {
            session.retitle_from(text);
        }
        session.push(Message::user(text));
        self.in_flight = Some(active_id.clone());
        Ok(PendingSend { session_id: active_id, query: text.to_owned() })
    }

    /// Second phase: records the answer, or an apology on failure.
    pub fn complete_send(&mut self, pending: PendingSend, result: Result<String, TransportError>) -> SendOutcome {
        self.in_flight = None;
        let (reply, outcome) = match result {
            Ok(answer) => {
                let reply = Message::assistant(answer);
                (reply.clone(), SendOutcome::Answered(reply))
            }
            Err(e) => {
                tracing::error!(error = %e, session = %pending.session_id, "chat send failed");
                let reply = Message::assistant(APOLOGY);
                (reply.clone(), SendOutcome::Failed { reply, notice: FAILURE_NOTICE.into() })
            }
        };
        match self.sessions.iter_mut().find(|s| s.id == pending.session_id) {
            Some(session) => session.push(reply),
            None => tracing::debug!(session = %pending.session_id, "session deleted before reply arrived"),
        }
        outcome
    }
}

impl Default for ChatState {
    fn default() -> Self { Self::fresh() }
}

/// Chat client bound to a storage backing and a proxy transport.
///
/// Every mutation is followed by a save. The state lock is not held across
/// the network call, so a second send while one is pending is ignored.
pub struct ChatClient {
    state: Mutex<ChatState>,
    storage: Arc<dyn ClientStorage>,
    transport: Arc<dyn ChatTransport>,
}

impl ChatClient {
    pub async fn load(storage: Arc<dyn ClientStorage>, transport: Arc<dyn ChatTransport>) -> Self {
        let state = match storage.get(SESSIONS_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<ChatSession>>(&raw) {
                Ok(sessions) => ChatState::from_sessions(sessions),
                Err(e) => {
                    tracing::warn!(error = %e, "stored chats could not be parsed; starting fresh");
                    ChatState::fresh()
                }
            },
            Ok(None) => ChatState::fresh(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stored chats; starting fresh");
                ChatState::fresh()
            }
        };
        let client = Self { state: Mutex::new(state), storage, transport };
        let snapshot = client.state.lock().await.clone();
        client.persist(&snapshot).await;
        client
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        let state = self.state.lock().await;
        self.write(&state).await
    }

    async fn write(&self, state: &ChatState) -> anyhow::Result<()> {
        let raw = serde_json::to_string(state.sessions())?;
        self.storage.set(SESSIONS_KEY, &raw).await
    }

    async fn persist(&self, state: &ChatState) {
        if let Err(e) = self.write(state).await {
            tracing::warn!(error = %e, "failed to save chats");
        }
    }

    pub async fn snapshot(&self) -> ChatState {
        self.state.lock().await.clone()
    }

    pub async fn create_session(&self) -> ChatSession {
        let mut state = self.state.lock().await;
        let session = state.create_session().clone();
        self.persist(&state).await;
        session
    }

    pub async fn select_session(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        state.select_session(id)
    }

    pub async fn delete_session(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.delete_session(id);
        if removed {
            self.persist(&state).await;
        }
        removed
    }

    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let pending = {
            let mut state = self.state.lock().await;
            match state.begin_send(text) {
                Ok(p) => {
                    self.persist(&state).await;
                    p
                }
                Err(reason) => return SendOutcome::Ignored(reason),
            }
        };

        let result = self.transport.ask(&pending.query).await;

        let mut state = self.state.lock().await;
        let outcome = state.complete_send(pending, result);
        self.persist(&state).await;
        outcome
    }
}
