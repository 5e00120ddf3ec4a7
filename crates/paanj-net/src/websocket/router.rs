//! Inbound frame classification and dispatch.
//!
//! Every frame read from the event stream is decoded as an envelope
//! `{"type": <string>, "data": <any>}` and dispatched to the handlers
//! registered under an event name derived from `type`:
//!
//! | `type`        | action                                                         |
//! |---------------|----------------------------------------------------------------|
//! | `message`     | alias chat fields, emit to `message.create` and the conversation key |
//! | `subscribed`  | log a confirmation                                             |
//! | `pong`        | nothing                                                        |
//! | anything else | emit `data` (or `null`) to handlers for exactly `type`         |
//!
//! Frames that are not JSON objects, or whose `type` is missing or not a
//! string, are dropped without dispatch.

use std::fmt;
use std::sync::Arc;

use paanj_core::EventRegistry;
use paanj_core::logging::targets;
use serde::de::{Error as _, Unexpected};
use serde_json::{Map, Value};

/// Event name that chat messages are dispatched under.
pub const MESSAGE_CREATE: &str = "message.create";

/// Build the per-conversation event name for a chat message.
///
/// # Example
///
/// ```
/// use paanj_net::websocket::conversation_event;
///
/// assert_eq!(conversation_event("c1"), "conversation:c1:message.create");
/// ```
pub fn conversation_event(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}:{MESSAGE_CREATE}")
}

/// Observer for frames dropped by the router.
///
/// Receives the raw frame text and the decode error.
pub type DiscardHook = Arc<dyn Fn(&str, &serde_json::Error) + Send + Sync>;

/// Result of routing one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The payload was emitted to these events.
    Dispatched {
        /// Event names emitted to, in order.
        events: Vec<String>,
        /// Total number of handlers dispatched across all events.
        handlers: usize,
    },
    /// A subscription confirmation was received.
    Subscribed,
    /// A heartbeat reply was received.
    Pong,
    /// The frame could not be decoded and was dropped.
    Discarded,
}

/// Classifies inbound frames and dispatches them through an [`EventRegistry`].
#[derive(Clone)]
pub struct MessageRouter {
    registry: EventRegistry<Value>,
    discard_hook: Option<DiscardHook>,
}

impl MessageRouter {
    /// Create a router that dispatches into `registry`.
    pub fn new(registry: EventRegistry<Value>) -> Self {
        Self {
            registry,
            discard_hook: None,
        }
    }

    /// Attach an observer for discarded frames.
    pub fn with_discard_hook(mut self, hook: Option<DiscardHook>) -> Self {
        self.discard_hook = hook;
        self
    }

    /// Get the registry this router dispatches into.
    pub fn registry(&self) -> &EventRegistry<Value> {
        &self.registry
    }

    /// Decode one text frame and dispatch it.
    pub fn route(&self, text: &str) -> RouteOutcome {
        let mut fields = match serde_json::from_str::<Map<String, Value>>(text) {
            Ok(fields) => fields,
            Err(err) => return self.discard(text, &err),
        };
        let kind = match envelope_type(&fields) {
            Ok(kind) => kind,
            Err(err) => return self.discard(text, &err),
        };

        match kind.as_str() {
            "message" => self.route_chat_message(fields),
            "subscribed" => {
                tracing::info!(target: targets::ROUTER, "subscribed to events");
                RouteOutcome::Subscribed
            }
            "pong" => RouteOutcome::Pong,
            _ => {
                let data = fields.remove("data").unwrap_or(Value::Null);
                let handlers = self.registry.emit(&kind, data);
                tracing::trace!(target: targets::ROUTER, event = %kind, handlers, "event dispatched");
                RouteOutcome::Dispatched {
                    events: vec![kind],
                    handlers,
                }
            }
        }
    }

    fn route_chat_message(&self, fields: Map<String, Value>) -> RouteOutcome {
        let message = Value::Object(alias_chat_fields(fields));

        let mut events = vec![MESSAGE_CREATE.to_string()];
        let mut handlers = self.registry.emit(MESSAGE_CREATE, message.clone());

        if let Some(conversation_id) = message.get("conversationId").and_then(Value::as_str) {
            let event = conversation_event(conversation_id);
            handlers += self.registry.emit(&event, message.clone());
            events.push(event);
        }

        tracing::trace!(target: targets::ROUTER, ?events, handlers, "chat message dispatched");
        RouteOutcome::Dispatched { events, handlers }
    }

    fn discard(&self, text: &str, err: &serde_json::Error) -> RouteOutcome {
        tracing::debug!(target: targets::ROUTER, error = %err, len = text.len(), "discarding undecodable frame");
        if let Some(hook) = &self.discard_hook {
            hook(text, err);
        }
        RouteOutcome::Discarded
    }
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("registry", &self.registry)
            .field("discard_hook", &self.discard_hook.is_some())
            .finish()
    }
}

/// Extract the `type` discriminator of an envelope.
fn envelope_type(fields: &Map<String, Value>) -> Result<String, serde_json::Error> {
    match fields.get("type") {
        Some(Value::String(kind)) => Ok(kind.clone()),
        Some(other) => Err(serde_json::Error::invalid_type(
            unexpected(other),
            &"a string event type",
        )),
        None => Err(serde_json::Error::missing_field("type")),
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

/// Add the client-facing aliases to a raw chat message.
///
/// `source` is copied to `senderId`, `conversationID` to `conversationId` and
/// `message` to `content`. Original fields are kept.
pub fn alias_chat_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    const ALIASES: [(&str, &str); 3] = [
        ("source", "senderId"),
        ("conversationID", "conversationId"),
        ("message", "content"),
    ];

    for (from, to) in ALIASES {
        if let Some(value) = fields.get(from).cloned() {
            fields.insert(to.to_string(), value);
        }
    }
    fields
}
