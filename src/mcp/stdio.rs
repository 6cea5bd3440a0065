//! Single-tenant MCP over stdin/stdout
//!
//! One JSON-RPC message per line. No credential context is entered, so paid
//! requests use the process-wide default key and no spend ceiling applies.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::protocol::{JsonRpcBody, JsonRpcResponse};
use super::server::McpServer;

/// Serve on the process stdin/stdout until EOF
pub async fn run(server: McpServer, has_default_key: bool) -> Result<()> {
    if !has_default_key {
        tracing::warn!("PRIVATE_KEY is not set: paid tools will fail until a key is configured");
    }
    tracing::info!("MCP stdio server ready");
    serve(&server, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Line loop over any reader/writer pair
pub async fn serve<R, W>(server: &McpServer, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            tracing::debug!("EOF on stdin, shutting down");
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let reply = match JsonRpcBody::parse(trimmed) {
            Ok(body) => server.handle_body(body).await,
            Err(e) => serde_json::to_value(JsonRpcResponse::parse_error(&e.to_string())).ok(),
        };
        if let Some(reply) = reply {
            let mut out = serde_json::to_vec(&reply)?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::testing::MockFetcher;
    use crate::mcp::tools::ToolDispatcher;
    use serde_json::Value;
    use std::sync::Arc;

    async fn run_lines(input: &str) -> (Vec<Value>, Arc<MockFetcher>) {
        let mock = Arc::new(MockFetcher::new());
        let server = McpServer::new(ToolDispatcher::new(mock.clone()));
        let mut out = Vec::new();
        serve(&server, input.as_bytes(), &mut out).await.unwrap();
        let lines = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (lines, mock)
    }

    #[tokio::test]
    async fn test_session_over_lines() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, "\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"sentiment"}}"#, "\n",
        );
        let (replies, mock) = run_lines(input).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["result"]["serverInfo"]["name"], "asrai");
        assert_eq!(replies[1]["id"], 2);
        // No context: every fetch goes through and nothing is charged
        assert_eq!(mock.calls().len(), 3);
        assert!(mock.calls().iter().all(|c| c.payer.is_none()));
    }

    #[tokio::test]
    async fn test_bad_json_gets_parse_error() {
        let (replies, _) = run_lines("{oops\n").await;
        assert_eq!(replies[0]["error"]["code"], -32700);
        assert!(replies[0]["id"].is_null());
    }
}
