//! GET/SET command handlers over a [`ShardedStore`].
//!
//! The host framework parses requests into an argument list (verb first,
//! as received), routes the verb to a handler and encodes the [`Reply`]
//! it produces. Handlers borrow the store; whoever starts the server owns it.
//!
//! | Command | Arguments | Reply |
//! |---------|-----------|-------|
//! | GET | key | bulk value, or nil if absent |
//! | SET | key value | status `OK` |
//!
//! A missing argument is answered with the error reply
//! `ERR wrong number of arguments for '<verb>' command`; it never fails
//! the request itself.

use thiserror::Error;
use tracing::trace;

use crate::store::ShardedStore;

/// Protocol-level error reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} {message}")]
pub struct CommandError {
    /// Error kind prefix (ERR, WRONGTYPE, ...).
    pub kind: String,
    /// Human readable message.
    pub message: String,
}

impl CommandError {
    fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Wrong number of arguments for `verb` (lowercase, as clients send it).
    pub fn wrong_arity(verb: &str) -> Self {
        Self::new(
            "ERR",
            format!("wrong number of arguments for '{verb}' command"),
        )
    }
}

/// Result of executing a command.
pub type CommandResult = Result<Reply, CommandError>;

/// Reply value produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Reply {
    /// Status line, e.g. `OK`.
    Status(String),
    /// Error line, e.g. `ERR wrong number of arguments for 'get' command`.
    Error(String),
    /// Bulk string payload.
    Bulk(String),
    /// Absent value.
    #[default]
    Nil,
}

impl Reply {
    /// The `OK` status.
    pub fn ok() -> Self {
        Self::Status("OK".to_string())
    }

    /// Check if this reply is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Check if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The bulk payload, if this is a bulk reply.
    pub fn as_bulk(&self) -> Option<&str> {
        match self {
            Self::Bulk(value) => Some(value),
            _ => None,
        }
    }
}

impl From<CommandResult> for Reply {
    fn from(result: CommandResult) -> Self {
        result.unwrap_or_else(|e| Reply::Error(e.to_string()))
    }
}

/// Outcome of [`CommandHandler::run`].
///
/// Argument errors are answered in the output slot, so a handler that ran
/// always reports `Ok`; inspect the [`Reply`] to tell success from failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The command ran; the output holds its reply, possibly an error reply.
    Ok,
}

/// Handler for one command verb.
pub trait CommandHandler: Send + Sync {
    /// Execute the command. `args[0]` is the verb itself.
    fn execute(&self, args: &[&str]) -> CommandResult;

    /// Lowercase verb this handler serves.
    fn name(&self) -> &'static str;

    /// Execute the command and write its reply, or its error reply, to `output`.
    fn run(&self, args: &[&str], output: &mut Reply) -> CommandStatus {
        trace!(command = self.name(), argc = args.len(), "running command");
        *output = Reply::from(self.execute(args));
        CommandStatus::Ok
    }
}

/// GET command handler.
#[derive(Debug, Clone, Copy)]
pub struct GetCommandHandler<'a> {
    store: &'a ShardedStore,
}

impl<'a> GetCommandHandler<'a> {
    /// Serve GET from `store`.
    pub fn new(store: &'a ShardedStore) -> Self {
        Self { store }
    }
}

impl CommandHandler for GetCommandHandler<'_> {
    fn execute(&self, args: &[&str]) -> CommandResult {
        let key = args
            .get(1)
            .ok_or_else(|| CommandError::wrong_arity(self.name()))?;

        Ok(self.store.get(key).map_or(Reply::Nil, Reply::Bulk))
    }

    fn name(&self) -> &'static str {
        "get"
    }
}

/// SET command handler.
#[derive(Debug, Clone, Copy)]
pub struct SetCommandHandler<'a> {
    store: &'a ShardedStore,
}

impl<'a> SetCommandHandler<'a> {
    /// Serve SET into `store`.
    pub fn new(store: &'a ShardedStore) -> Self {
        Self { store }
    }
}

impl CommandHandler for SetCommandHandler<'_> {
    fn execute(&self, args: &[&str]) -> CommandResult {
        let (Some(key), Some(value)) = (args.get(1), args.get(2)) else {
            return Err(CommandError::wrong_arity(self.name()));
        };

        self.store.set(*key, *value);
        Ok(Reply::ok())
    }

    fn name(&self) -> &'static str {
        "set"
    }
}
