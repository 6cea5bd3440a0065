use std::sync::Arc;

use axum::response::Response;

use crate::config::GlobalConfig;
use crate::mcp::{Credential, McpServer};

use super::auth;
use super::sessions::{Session, SessionRegistry, SseTransport, StreamableTransport};

#[derive(Clone)]
pub struct AppState {
    pub server: McpServer,
    /// Legacy `/sse` + `/messages` sessions
    pub sse: SessionRegistry<SseTransport>,
    /// `/mcp` sessions
    pub streamable: SessionRegistry<StreamableTransport>,
    pub config: Arc<GlobalConfig>,
}

impl AppState {
    pub fn new(config: Arc<GlobalConfig>, server: McpServer) -> Self {
        Self {
            server,
            sse: SessionRegistry::new(),
            streamable: SessionRegistry::new(),
            config,
        }
    }

    /// Validate the connecting client's key, or the default key when none is given
    pub fn credential(&self, query_key: Option<&str>, endpoint: &str) -> Result<Credential, Response> {
        auth::extract_credential(query_key.or(self.config.default_key()), endpoint)
    }

    /// A new session with this deployment's spend ceiling
    pub fn new_session<T>(&self, id: impl Into<Arc<str>>, credential: Credential, transport: T) -> Session<T> {
        Session::new(id, credential, self.config.max_spend(), transport)
    }
}
