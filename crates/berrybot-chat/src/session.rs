//! Conversation state of one chat session.
//!
//! `ChatSession` is a synchronous state machine: `dispatch` applies a user
//! utterance and tells the caller whether a request frame must go out, and
//! `route` applies an inbound frame. Transport concerns live in
//! [`crate::client`].
//!
//! Placeholders are keyed by request id, so responses may arrive in any
//! order without resolving the wrong slot.

use std::collections::HashMap;

use uuid::Uuid;

use berrybot_core::config::ChatConfig;
use berrybot_core::protocol::{ChatRequestFrame, ChatResponseFrame};
use berrybot_core::types::ChatMessage;

use crate::error::ChatError;

/// What the caller has to do after a successful `dispatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The utterance was recorded as the grower location. Nothing to send.
    LocationCaptured,
    /// Send this frame on a new connection.
    Request(ChatRequestFrame),
    /// The utterance was recorded as the user's email address. If a query is
    /// waiting on it, `resend` carries that query with the email attached.
    EmailCaptured { resend: Option<ChatRequestFrame> },
}

/// Result of applying one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A placeholder received its answer.
    Resolved {
        request_id: Uuid,
        text: String,
        /// The session now waits for the user's email address.
        email_requested: bool,
        /// Re-send the query with the known email address.
        resend: Option<ChatRequestFrame>,
    },
    /// The frame was unreadable; the placeholder got the fallback text.
    ParseFailed { request_id: Uuid },
    /// No pending placeholder matches the frame. Nothing changed.
    Unmatched,
}

#[derive(Debug, Clone)]
struct PendingSlot {
    index: usize,
    query: String,
}

#[derive(Debug, Clone, Default)]
struct Escalation {
    awaiting_email: bool,
    email: Option<String>,
    previous_query: Option<String>,
    email_query_sent: bool,
}

/// In-memory state of one conversation.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    config: ChatConfig,
    messages: Vec<ChatMessage>,
    location: Option<String>,
    pending: HashMap<Uuid, PendingSlot>,
    escalation: Escalation,
}

impl ChatSession {
    /// Start a session with a fresh random id and the welcome prompt.
    pub fn new(config: ChatConfig) -> Self {
        let messages = vec![ChatMessage::assistant(config.welcome_prompt.clone())];
        Self {
            id: Uuid::new_v4(),
            config,
            messages,
            location: None,
            pending: HashMap::new(),
            escalation: Escalation::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// True while at least one placeholder waits for its frame.
    pub fn is_awaiting_response(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn is_awaiting_email(&self) -> bool {
        self.escalation.awaiting_email
    }

    /// Apply a user utterance.
    ///
    /// An empty utterance is rejected before any state changes.
    pub fn dispatch(&mut self, utterance: &str) -> Result<Dispatch, ChatError> {
        if utterance.trim().is_empty() {
            tracing::error!(session_id = %self.id, "Message is empty");
            return Err(ChatError::EmptyMessage);
        }

        let Some(location) = self.location.clone() else {
            self.location = Some(utterance.to_string());
            self.messages.push(ChatMessage::user(utterance));
            self.messages
                .push(ChatMessage::assistant(self.config.location_ack.clone()));
            tracing::info!(session_id = %self.id, location = %utterance, "Location captured");
            return Ok(Dispatch::LocationCaptured);
        };

        if self.config.email_escalation && self.escalation.awaiting_email {
            return Ok(self.capture_email(utterance, &location));
        }

        let request_id = Uuid::new_v4();
        self.messages.push(ChatMessage::user(utterance));
        self.messages.push(ChatMessage::placeholder());
        self.pending.insert(
            request_id,
            PendingSlot {
                index: self.messages.len() - 1,
                query: utterance.to_string(),
            },
        );
        self.escalation.previous_query = Some(utterance.to_string());
        self.escalation.email_query_sent = false;

        Ok(Dispatch::Request(ChatRequestFrame::send_message(
            utterance, self.id, location, request_id,
        )))
    }

    /// Record that the user attached a document.
    pub fn record_file_upload(&mut self, name: &str) {
        self.messages.push(ChatMessage::file_upload(name));
    }

    fn capture_email(&mut self, email: &str, location: &str) -> Dispatch {
        self.escalation.awaiting_email = false;
        self.escalation.email = Some(email.to_string());
        self.messages.push(ChatMessage::user(email));

        let resend = match self.escalation.previous_query.clone() {
            Some(query) if !self.escalation.email_query_sent => {
                self.escalation.email_query_sent = true;
                Some(
                    ChatRequestFrame::send_message(query, self.id, location, Uuid::new_v4())
                        .with_email(email),
                )
            }
            _ => None,
        };

        self.messages.push(ChatMessage::assistant(
            self.config.email_confirmation_text.clone(),
        ));
        Dispatch::EmailCaptured { resend }
    }

    /// Apply one inbound frame.
    ///
    /// `connection_request` is the request id of the connection the frame
    /// arrived on; it is used when the frame does not name one itself.
    pub fn route(&mut self, raw: &str, connection_request: Option<Uuid>) -> RouteOutcome {
        let parsed = serde_json::from_str::<ChatResponseFrame>(raw)
            .ok()
            .and_then(|frame| frame.responsetext.clone().map(|text| (frame, text)));

        let Some((frame, text)) = parsed else {
            tracing::error!(session_id = %self.id, raw = %raw, "Error parsing response frame");
            let Some(request_id) = self.match_pending(None, connection_request) else {
                return RouteOutcome::Unmatched;
            };
            let fallback = self.config.parse_error_text.clone();
            self.resolve(request_id, fallback);
            return RouteOutcome::ParseFailed { request_id };
        };

        let Some(request_id) = self.match_pending(frame.request_id, connection_request) else {
            tracing::debug!(
                session_id = %self.id,
                request_id = ?frame.request_id,
                "Response frame has no pending placeholder"
            );
            return RouteOutcome::Unmatched;
        };
        let query = self.resolve(request_id, text.clone());

        let mut email_requested = false;
        let mut resend = None;
        if self.config.email_escalation
            && frame.requires_email
            && frame.email_status.as_deref() != Some("success")
        {
            match self.escalation.email.clone() {
                Some(email) => {
                    if !self.escalation.email_query_sent {
                        self.escalation.email_query_sent = true;
                        let location = self.location.clone().unwrap_or_default();
                        resend = Some(
                            ChatRequestFrame::send_message(
                                query,
                                self.id,
                                location,
                                Uuid::new_v4(),
                            )
                            .with_email(email),
                        );
                    }
                }
                None => {
                    self.escalation.awaiting_email = true;
                    self.escalation.previous_query = Some(query);
                    email_requested = true;
                    let already_asked = self
                        .messages
                        .last()
                        .is_some_and(|m| m.content == self.config.email_request_text);
                    if !already_asked {
                        self.messages.push(ChatMessage::assistant(
                            self.config.email_request_text.clone(),
                        ));
                    }
                }
            }
        }

        RouteOutcome::Resolved {
            request_id,
            text,
            email_requested,
            resend,
        }
    }

    /// Pick the pending request a frame belongs to.
    ///
    /// An explicit id in the frame wins. Without one, the connection's id is
    /// used. A frame with neither resolves the only pending slot, if exactly
    /// one exists.
    fn match_pending(
        &self,
        frame_request: Option<Uuid>,
        connection_request: Option<Uuid>,
    ) -> Option<Uuid> {
        match (frame_request, connection_request) {
            (Some(id), _) | (None, Some(id)) => self.pending.contains_key(&id).then_some(id),
            (None, None) if self.pending.len() == 1 => self.pending.keys().next().copied(),
            (None, None) => None,
        }
    }

    /// Turn a placeholder into a received reply. Returns the query it answered.
    fn resolve(&mut self, request_id: Uuid, text: String) -> String {
        match self.pending.remove(&request_id) {
            Some(slot) => {
                self.messages[slot.index] = ChatMessage::assistant(text);
                slot.query
            }
            None => String::new(),
        }
    }
}
