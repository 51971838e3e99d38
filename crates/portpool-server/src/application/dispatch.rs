//! Action registry: maps an action name to the handler that answers it.
//!
//! The registry is filled once at start-up and then shared read-only (behind
//! an `Arc`) by every session task.  Dispatch never mutates it, so no locking
//! is needed on the request path.
//!
//! # Built-in actions
//!
//! | Request | Response         | Payload                          |
//! |---------|------------------|----------------------------------|
//! | `hello` | `hello_response` | `{"message": "Hello, client!"}`  |
//! | `echo`  | `echo_response`  | the request payload, unchanged   |
//!
//! Anything else fails with [`DispatchError::UnknownAction`].  Dispatch errors
//! are per-message: the session handler reports them to the peer as an `error`
//! frame and keeps the connection open.

use std::collections::HashMap;

use portpool_core::protocol::messages::{actions, HELLO_GREETING, MESSAGE_KEY};
use portpool_core::{Message, Payload};
use serde_json::Value;
use thiserror::Error;

/// Failure produced by an individual action handler.
#[derive(Debug, Error, PartialEq)]
pub enum ActionError {
    /// A key the handler expects is missing or has the wrong type.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The handler understood the request but could not fulfil it.
    #[error("{0}")]
    Failed(String),
}

/// Failure to dispatch a message.
#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    /// No handler is registered under this name.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The handler ran and returned an error.
    #[error("{action} failed: {source}")]
    Action {
        action: String,
        #[source]
        source: ActionError,
    },
}

/// Start-up configuration error for the registry.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("action '{0}' is already registered")]
    DuplicateAction(String),

    #[error("action name must not be empty")]
    EmptyActionName,
}

/// Produces the response for one action.
///
/// Handlers are synchronous: the protocol has exactly one message in flight
/// per session, and none of the built-in actions perform I/O.
pub trait ActionHandler: Send + Sync {
    fn handle(&self, payload: &Payload) -> Result<Message, ActionError>;
}

/// Any `Fn(&Payload) -> Result<Message, ActionError>` closure is a handler.
impl<F> ActionHandler for F
where
    F: Fn(&Payload) -> Result<Message, ActionError> + Send + Sync,
{
    fn handle(&self, payload: &Payload) -> Result<Message, ActionError> {
        self(payload)
    }
}

/// `hello` → `hello_response` with a fixed greeting.  The request payload is
/// ignored.
pub struct HelloAction;

impl ActionHandler for HelloAction {
    fn handle(&self, _payload: &Payload) -> Result<Message, ActionError> {
        let mut payload = Payload::new();
        payload.insert(
            MESSAGE_KEY.to_string(),
            Value::String(HELLO_GREETING.to_string()),
        );
        Ok(Message::new(actions::HELLO_RESPONSE, payload))
    }
}

/// `echo` → `echo_response` carrying the request payload verbatim.
pub struct EchoAction;

impl ActionHandler for EchoAction {
    fn handle(&self, payload: &Payload) -> Result<Message, ActionError> {
        Ok(Message::new(actions::ECHO_RESPONSE, payload.clone()))
    }
}

/// The name → handler table.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Box<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// Creates a registry with no actions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry containing the `hello` and `echo` actions.
    pub fn with_builtins() -> Self {
        let mut handlers: HashMap<String, Box<dyn ActionHandler>> = HashMap::new();
        handlers.insert(actions::HELLO.to_string(), Box::new(HelloAction));
        handlers.insert(actions::ECHO.to_string(), Box::new(EchoAction));
        Self { handlers }
    }

    /// Registers `handler` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateAction`] if the name is taken and
    /// [`RegistryError::EmptyActionName`] for an empty name.  Both are
    /// configuration errors and should abort start-up.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl ActionHandler + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyActionName);
        }
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::DuplicateAction(name));
        }
        self.handlers.insert(name, Box::new(handler));
        Ok(())
    }

    /// Routes `msg` to the handler registered for its action.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownAction`] if no handler matches, or
    /// [`DispatchError::Action`] if the handler fails.
    pub fn dispatch(&self, msg: &Message) -> Result<Message, DispatchError> {
        let handler = self
            .handlers
            .get(&msg.action)
            .ok_or_else(|| DispatchError::UnknownAction(msg.action.clone()))?;

        handler
            .handle(&msg.payload)
            .map_err(|source| DispatchError::Action {
                action: msg.action.clone(),
                source,
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered action names, sorted.
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Reads a required string field from a payload.
///
/// # Errors
///
/// Returns [`ActionError::InvalidPayload`] if `key` is absent or not a string.
pub fn require_str<'a>(payload: &'a Payload, key: &str) -> Result<&'a str, ActionError> {
    match payload.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(ActionError::InvalidPayload(format!(
            "'{key}' must be a string, got {other}"
        ))),
        None => Err(ActionError::InvalidPayload(format!("missing '{key}'"))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
