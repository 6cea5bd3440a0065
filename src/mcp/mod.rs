//! MCP server core
//!
//! - JSON-RPC message types ([`protocol`])
//! - Per-request credential context and spend ceiling ([`context`], [`budget`])
//! - Tool catalog and dispatch ([`tools`], [`guide`])
//! - Transport-agnostic request handling ([`server`]) and the stdio transport

pub mod budget;
pub mod context;
pub mod guide;
pub mod protocol;
pub mod server;
pub mod stdio;
pub mod tools;

#[cfg(test)]
pub mod testing;

pub use budget::{SessionBudget, SpendLimitExceeded};
pub use context::{Credential, CredentialContext, CredentialError};
pub use server::McpServer;
pub use tools::ToolDispatcher;
