//! Sharded in-memory key-value store and its command handlers.
//!
//! - [`store`]: the lock-striped [`ShardedStore`]
//! - [`commands`]: GET/SET handlers producing protocol [`Reply`] values

pub mod commands;
pub mod store;

pub use commands::{
    CommandError, CommandHandler, CommandResult, CommandStatus, GetCommandHandler, Reply,
    SetCommandHandler,
};
pub use store::{shard_for, ShardedStore};
