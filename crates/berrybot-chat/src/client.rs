//! Async chat client: session initiator, dispatcher and response router.
//!
//! Every request frame goes out on its own gateway connection. A reader task
//! per connection routes the response back into the shared session and
//! reports what happened on the event channel. There is no reconnect, retry
//! or timeout: a connection that never answers leaves its placeholder in
//! the processing state.

use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use uuid::Uuid;

use berrybot_core::config::ChatConfig;
use berrybot_core::credentials::CredentialProvider;
use berrybot_core::protocol::ChatRequestFrame;
use berrybot_core::types::ChatMessage;

use crate::error::ChatError;
use crate::session::{ChatSession, Dispatch, RouteOutcome};
use crate::transport::{ConnectionEvent, Gateway, GatewayConnection};

/// Result of a successful `ChatClient::send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    LocationCaptured,
    Dispatched { request_id: Uuid },
    EmailCaptured { resent: bool },
}

/// Asynchronous notifications from connection reader tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Resolved { request_id: Uuid, text: String },
    ParseFailed { request_id: Uuid },
    EmailRequested,
    ConnectionError { request_id: Uuid, message: String },
    ConnectionClosed { request_id: Uuid, code: u16, reason: String },
}

#[derive(Clone)]
struct Shared {
    session: Arc<Mutex<ChatSession>>,
    gateway: Arc<dyn Gateway>,
    credentials: Arc<dyn CredentialProvider>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl Shared {
    fn with_session<R>(&self, f: impl FnOnce(&mut ChatSession) -> R) -> Result<R, ChatError> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| ChatError::State(format!("session lock poisoned: {}", e)))?;
        Ok(f(&mut session))
    }

    fn emit(&self, event: ChatEvent) {
        // The receiver may be gone once the UI shuts down.
        let _ = self.events.send(event);
    }
}

/// Chat client bound to one session.
pub struct ChatClient {
    shared: Shared,
}

impl ChatClient {
    /// Start a new session. Returns the client and its event stream.
    pub fn new(
        config: ChatConfig,
        gateway: Arc<dyn Gateway>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let session = ChatSession::new(config);
        tracing::info!(session_id = %session.id(), "Chat session started");
        let (events, rx) = mpsc::unbounded_channel();
        let client = Self {
            shared: Shared {
                session: Arc::new(Mutex::new(session)),
                gateway,
                credentials,
                events,
            },
        };
        (client, rx)
    }

    pub fn session_id(&self) -> Result<Uuid, ChatError> {
        self.shared.with_session(|s| s.id())
    }

    /// Snapshot of the conversation.
    pub fn messages(&self) -> Result<Vec<ChatMessage>, ChatError> {
        self.shared.with_session(|s| s.messages().to_vec())
    }

    pub fn location(&self) -> Result<Option<String>, ChatError> {
        self.shared.with_session(|s| s.location().map(str::to_string))
    }

    pub fn is_awaiting_response(&self) -> Result<bool, ChatError> {
        self.shared.with_session(|s| s.is_awaiting_response())
    }

    /// Record an uploaded document in the conversation.
    pub fn note_file_upload(&self, name: &str) -> Result<(), ChatError> {
        self.shared.with_session(|s| s.record_file_upload(name))
    }

    /// Apply a user utterance and transmit the resulting frame, if any.
    ///
    /// Returns once the frame is written; the answer arrives later as a
    /// `ChatEvent`. On a transport failure the placeholder stays pending.
    pub async fn send(&self, utterance: &str) -> Result<SendOutcome, ChatError> {
        let dispatch = self.shared.with_session(|s| s.dispatch(utterance))??;
        match dispatch {
            Dispatch::LocationCaptured => Ok(SendOutcome::LocationCaptured),
            Dispatch::Request(frame) => {
                let request_id = frame.request_id.unwrap_or_else(Uuid::new_v4);
                transmit(self.shared.clone(), frame).await?;
                Ok(SendOutcome::Dispatched { request_id })
            }
            Dispatch::EmailCaptured { resend } => {
                let resent = resend.is_some();
                if let Some(frame) = resend {
                    transmit(self.shared.clone(), frame).await?;
                }
                Ok(SendOutcome::EmailCaptured { resent })
            }
        }
    }
}

/// Open a connection, write `frame`, and hand the connection to a reader.
fn transmit(shared: Shared, frame: ChatRequestFrame) -> BoxFuture<'static, Result<(), ChatError>> {
    Box::pin(async move {
        let request_id = frame.request_id.unwrap_or_else(Uuid::new_v4);
        let payload = serde_json::to_string(&frame)?;
        let token = shared.credentials.bearer_token();

        let mut connection = match shared.gateway.connect(token.as_deref()).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "WebSocket error");
                shared.emit(ChatEvent::ConnectionError {
                    request_id,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        if let Err(e) = connection.send_text(payload.clone()).await {
            tracing::error!(request_id = %request_id, error = %e, "WebSocket error");
            shared.emit(ChatEvent::ConnectionError {
                request_id,
                message: e.to_string(),
            });
            return Err(e);
        }
        tracing::debug!(request_id = %request_id, payload = %payload, "Sent request");

        tokio::spawn(read_responses(shared, connection, request_id));
        Ok(())
    })
}

/// Route the answer arriving on one connection, then close it.
async fn read_responses(
    shared: Shared,
    mut connection: Box<dyn GatewayConnection>,
    request_id: Uuid,
) {
    while let Some(event) = connection.next_event().await {
        match event {
            ConnectionEvent::Text(raw) => {
                tracing::debug!(request_id = %request_id, raw = %raw, "Raw gateway frame");
                let outcome = match shared.with_session(|s| s.route(&raw, Some(request_id))) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(error = %e, "Dropping gateway frame");
                        break;
                    }
                };
                apply_outcome(&shared, outcome).await;

                if let Err(e) = connection.close().await {
                    tracing::debug!(request_id = %request_id, error = %e, "Close after response failed");
                }
                return;
            }
            ConnectionEvent::Error(message) => {
                tracing::error!(request_id = %request_id, error = %message, "WebSocket error");
                shared.emit(ChatEvent::ConnectionError {
                    request_id,
                    message,
                });
                return;
            }
            ConnectionEvent::Closed { code, reason } => {
                tracing::warn!(request_id = %request_id, code, reason = %reason, "WebSocket closed");
                shared.emit(ChatEvent::ConnectionClosed {
                    request_id,
                    code,
                    reason,
                });
                return;
            }
        }
    }
}

async fn apply_outcome(shared: &Shared, outcome: RouteOutcome) {
    match outcome {
        RouteOutcome::Resolved {
            request_id,
            text,
            email_requested,
            resend,
        } => {
            shared.emit(ChatEvent::Resolved { request_id, text });
            if email_requested {
                shared.emit(ChatEvent::EmailRequested);
            }
            if let Some(frame) = resend {
                if let Err(e) = transmit(shared.clone(), frame).await {
                    tracing::warn!(error = %e, "Failed to resend query with email");
                }
            }
        }
        RouteOutcome::ParseFailed { request_id } => {
            shared.emit(ChatEvent::ParseFailed { request_id });
        }
        RouteOutcome::Unmatched => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use berrybot_core::credentials::StaticCredentials;
    use berrybot_core::protocol::ChatResponseFrame;
    use berrybot_core::types::MessageState;

    type Reply = fn(&ChatRequestFrame) -> Vec<ConnectionEvent>;

    /// Gateway that answers each frame with a scripted list of events.
    struct ScriptedGateway {
        reply: Reply,
        refuse: bool,
        log: Arc<Mutex<Vec<(Option<String>, ChatRequestFrame)>>>,
        connects: Arc<Mutex<usize>>,
    }

    impl ScriptedGateway {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                refuse: false,
                log: Arc::new(Mutex::new(Vec::new())),
                connects: Arc::new(Mutex::new(0)),
            }
        }

        fn refusing() -> Self {
            Self {
                refuse: true,
                ..Self::new(|_| Vec::new())
            }
        }
    }

    struct ScriptedConnection {
        token: Option<String>,
        reply: Reply,
        queued: VecDeque<ConnectionEvent>,
        log: Arc<Mutex<Vec<(Option<String>, ChatRequestFrame)>>>,
    }

    #[async_trait]
    impl Gateway for ScriptedGateway {
        async fn connect(
            &self,
            token: Option<&str>,
        ) -> Result<Box<dyn GatewayConnection>, ChatError> {
            *self.connects.lock().unwrap() += 1;
            if self.refuse {
                return Err(ChatError::Gateway("connection refused".to_string()));
            }
            Ok(Box::new(ScriptedConnection {
                token: token.map(str::to_string),
                reply: self.reply,
                queued: VecDeque::new(),
                log: Arc::clone(&self.log),
            }))
        }
    }

    #[async_trait]
    impl GatewayConnection for ScriptedConnection {
        async fn send_text(&mut self, text: String) -> Result<(), ChatError> {
            let frame: ChatRequestFrame = serde_json::from_str(&text)?;
            self.queued.extend((self.reply)(&frame));
            self.log.lock().unwrap().push((self.token.clone(), frame));
            Ok(())
        }

        async fn next_event(&mut self) -> Option<ConnectionEvent> {
            self.queued.pop_front()
        }

        async fn close(&mut self) -> Result<(), ChatError> {
            Ok(())
        }
    }

    fn echo(frame: &ChatRequestFrame) -> Vec<ConnectionEvent> {
        let reply = ChatResponseFrame::answer(format!("re: {}", frame.querytext), frame.request_id);
        vec![ConnectionEvent::Text(serde_json::to_string(&reply).unwrap())]
    }

    fn client_with(
        gateway: ScriptedGateway,
        config: ChatConfig,
    ) -> (ChatClient, mpsc::UnboundedReceiver<ChatEvent>) {
        ChatClient::new(
            config,
            Arc::new(gateway),
            Arc::new(StaticCredentials::new("secret-token")),
        )
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> ChatEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for chat event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_location_turn_does_not_connect() {
        let gateway = ScriptedGateway::new(echo);
        let connects = Arc::clone(&gateway.connects);
        let (client, _rx) = client_with(gateway, ChatConfig::default());

        assert_eq!(client.send("Texas").await.unwrap(), SendOutcome::LocationCaptured);
        assert_eq!(*connects.lock().unwrap(), 0);
        assert_eq!(client.messages().unwrap().len(), 3);
        assert_eq!(client.location().unwrap().as_deref(), Some("Texas"));
    }

    #[tokio::test]
    async fn test_empty_send_is_noop() {
        let gateway = ScriptedGateway::new(echo);
        let connects = Arc::clone(&gateway.connects);
        let (client, _rx) = client_with(gateway, ChatConfig::default());
        client.send("Texas").await.unwrap();

        assert!(matches!(client.send("").await, Err(ChatError::EmptyMessage)));
        assert_eq!(client.messages().unwrap().len(), 3);
        assert_eq!(*connects.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_round_trip() {
        let gateway = ScriptedGateway::new(echo);
        let log = Arc::clone(&gateway.log);
        let (client, mut rx) = client_with(gateway, ChatConfig::default());
        client.send("Texas").await.unwrap();

        let SendOutcome::Dispatched { request_id } = client.send("pH?").await.unwrap() else {
            panic!("expected dispatch");
        };
        assert_eq!(
            next_event(&mut rx).await,
            ChatEvent::Resolved {
                request_id,
                text: "re: pH?".to_string()
            }
        );

        let messages = client.messages().unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[4].content, "re: pH?");
        assert_eq!(messages[4].state, MessageState::Received);
        assert!(!client.is_awaiting_response().unwrap());

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0.as_deref(), Some("secret-token"));
        assert_eq!(log[0].1.session_id, client.session_id().unwrap().to_string());
        assert_eq!(log[0].1.location, "Texas");
    }

    #[tokio::test]
    async fn test_anonymous_credentials_still_connect() {
        let gateway = ScriptedGateway::new(echo);
        let log = Arc::clone(&gateway.log);
        let (client, mut rx) = ChatClient::new(
            ChatConfig::default(),
            Arc::new(gateway),
            Arc::new(StaticCredentials::anonymous()),
        );
        client.send("Texas").await.unwrap();
        client.send("q").await.unwrap();
        next_event(&mut rx).await;
        assert_eq!(log.lock().unwrap()[0].0, None);
    }

    #[tokio::test]
    async fn test_malformed_reply_yields_fallback() {
        let gateway = ScriptedGateway::new(|_| vec![ConnectionEvent::Text("<html>".to_string())]);
        let (client, mut rx) = client_with(gateway, ChatConfig::default());
        client.send("Texas").await.unwrap();
        let SendOutcome::Dispatched { request_id } = client.send("q").await.unwrap() else {
            panic!("expected dispatch");
        };

        assert_eq!(next_event(&mut rx).await, ChatEvent::ParseFailed { request_id });
        let messages = client.messages().unwrap();
        assert_eq!(messages[4].content, "Error parsing response. Please try again.");
        assert!(!client.is_awaiting_response().unwrap());
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_placeholder_pending() {
        let (client, mut rx) = client_with(ScriptedGateway::refusing(), ChatConfig::default());
        client.send("Texas").await.unwrap();

        assert!(matches!(client.send("q").await, Err(ChatError::Gateway(_))));
        assert!(matches!(
            next_event(&mut rx).await,
            ChatEvent::ConnectionError { .. }
        ));
        let messages = client.messages().unwrap();
        assert!(messages[4].is_processing());
        assert!(client.is_awaiting_response().unwrap());
    }

    #[tokio::test]
    async fn test_close_before_answer_leaves_placeholder_pending() {
        let gateway = ScriptedGateway::new(|_| {
            vec![ConnectionEvent::Closed {
                code: 1008,
                reason: "Unauthorized".to_string(),
            }]
        });
        let (client, mut rx) = client_with(gateway, ChatConfig::default());
        client.send("Texas").await.unwrap();
        let SendOutcome::Dispatched { request_id } = client.send("q").await.unwrap() else {
            panic!("expected dispatch");
        };

        assert_eq!(
            next_event(&mut rx).await,
            ChatEvent::ConnectionClosed {
                request_id,
                code: 1008,
                reason: "Unauthorized".to_string()
            }
        );
        assert!(client.is_awaiting_response().unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_sends_resolve_their_own_slots() {
        let gateway = ScriptedGateway::new(echo);
        let (client, mut rx) = client_with(gateway, ChatConfig::default());
        client.send("Texas").await.unwrap();
        client.send("first").await.unwrap();
        client.send("second").await.unwrap();

        next_event(&mut rx).await;
        next_event(&mut rx).await;

        let messages = client.messages().unwrap();
        assert_eq!(messages[4].content, "re: first");
        assert_eq!(messages[6].content, "re: second");
    }

    #[tokio::test]
    async fn test_escalation_flow_resends_with_email() {
        fn escalate(frame: &ChatRequestFrame) -> Vec<ConnectionEvent> {
            let reply = if frame.email.is_some() {
                ChatResponseFrame {
                    email_status: Some("success".to_string()),
                    ..ChatResponseFrame::answer("Admin notified", frame.request_id)
                }
            } else {
                ChatResponseFrame {
                    requires_email: true,
                    ..ChatResponseFrame::answer("I am not sure.", frame.request_id)
                }
            };
            vec![ConnectionEvent::Text(serde_json::to_string(&reply).unwrap())]
        }

        let gateway = ScriptedGateway::new(escalate);
        let log = Arc::clone(&gateway.log);
        let config = ChatConfig {
            email_escalation: true,
            ..ChatConfig::default()
        };
        let (client, mut rx) = client_with(gateway, config);
        client.send("Texas").await.unwrap();
        client.send("mummy berry?").await.unwrap();

        assert!(matches!(next_event(&mut rx).await, ChatEvent::Resolved { .. }));
        assert_eq!(next_event(&mut rx).await, ChatEvent::EmailRequested);

        let outcome = client.send("grower@example.com").await.unwrap();
        assert_eq!(outcome, SendOutcome::EmailCaptured { resent: true });

        // Give the resend's reader a moment; its answer has no placeholder.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].1.querytext, "mummy berry?");
        assert_eq!(log[1].1.email.as_deref(), Some("grower@example.com"));
    }

    #[tokio::test]
    async fn test_note_file_upload() {
        let (client, _rx) = client_with(ScriptedGateway::new(echo), ChatConfig::default());
        client.note_file_upload("soil-report.pdf").unwrap();
        let messages = client.messages().unwrap();
        assert_eq!(messages.last().unwrap().content, "File uploaded: soil-report.pdf");
    }
}
