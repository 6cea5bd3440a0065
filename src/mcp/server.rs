//! MCP request handling shared by every transport
//!
//! [`McpServer`] is transport-agnostic: it turns one parsed JSON-RPC message
//! into at most one response. Callers decide which credential context the
//! handling runs in.

use serde_json::{Value, json};

use super::protocol::{
    InitializeParams, InitializeResult, JsonRpcBody, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ServerCapabilities, ServerInfo, ToolCallParams, ToolCallResult, ToolsCapability, ToolsListResult,
    negotiate_version,
};
use super::tools::{self, ToolDispatcher};

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "asrai";

#[derive(Clone)]
pub struct McpServer {
    dispatcher: ToolDispatcher,
}

impl McpServer {
    pub fn new(dispatcher: ToolDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Handle one message. Notifications get no response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }
        Some(self.handle_request(request).await)
    }

    /// Handle a single message or a batch, in order.
    ///
    /// Returns `None` when nothing needs answering. Batches answer with an
    /// array of the non-notification responses.
    pub async fn handle_body(&self, body: JsonRpcBody) -> Option<Value> {
        let batch = body.is_batch();
        let mut responses = Vec::new();
        for request in body.into_messages() {
            if let Some(response) = self.handle(request).await {
                responses.push(response);
            }
        }
        if responses.is_empty() {
            return None;
        }
        let value = if batch {
            serde_json::to_value(&responses)
        } else {
            serde_json::to_value(&responses[0])
        };
        value.ok()
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => tracing::debug!(target: "mcp", "Client initialized"),
            "notifications/cancelled" => tracing::debug!(target: "mcp", "Client cancelled a request"),
            other => tracing::debug!(target: "mcp", method = other, "Ignoring notification"),
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        tracing::debug!(target: "mcp", method = %request.method, id = ?id, "<-");

        let result = match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "tools/list" => self.tools_list(),
            "tools/call" => self.tools_call(request.params).await,
            "ping" => Ok(json!({})),
            method => Err(JsonRpcError::method_not_found(method)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => {
                tracing::debug!(target: "mcp", %error, "->");
                JsonRpcResponse::error(id, error)
            }
        }
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        if let Some(client) = &params.client_info {
            tracing::info!(target: "mcp", client = %client, "Client connected");
        }

        let result = InitializeResult {
            protocol_version: negotiate_version(params.protocol_version.as_deref()).to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability { list_changed: false },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal(e.to_string()))
    }

    fn tools_list(&self) -> Result<Value, JsonRpcError> {
        let result = ToolsListResult {
            tools: tools::catalog().to_vec(),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal(e.to_string()))
    }

    async fn tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: ToolCallParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("Missing params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
            })?;
        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        tracing::info!(target: "mcp", tool = %params.name, "Tool call");
        let text = self.dispatcher.call(&params.name, &arguments).await;

        serde_json::to_value(ToolCallResult::text(text)).map_err(|e| JsonRpcError::internal(e.to_string()))
    }
}
