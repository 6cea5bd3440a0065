use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use asrai_mcp::config::{ConfigArgs, GlobalConfig};
use asrai_mcp::mcp::{McpServer, ToolDispatcher, stdio};
use asrai_mcp::webapp::{self, ServeArgs};
use asrai_mcp::x402::X402Fetcher;

#[derive(Parser)]
#[command(name = "asrai-mcp")]
#[command(version)]
#[command(about = "Asrai crypto market data for AI agents, paid per call over x402")]
#[command(long_about = "\
Asrai crypto market data for AI agents, paid per call over x402

Every upstream data request is paid in USDC on Base from a wallet key. In
HTTP mode each client connects with its own key and gets its own session and
spend ceiling. In stdio mode the server uses PRIVATE_KEY.

TYPICAL WORKFLOWS:

  Hosted, multi-tenant:
    1. asrai-mcp wallet                  # Create a wallet, fund it with USDC on Base
    2. asrai-mcp serve                   # Start the HTTP gateway on :8402
    3. Point the client at http://host:8402/mcp?key=0x<private_key>

  Local, single-tenant:
    PRIVATE_KEY=0x... asrai-mcp stdio

For more details on each command, use: asrai-mcp <command> --help
")]
struct Cli {
    /// Global configuration arguments
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway (/mcp, /sse, /generate-wallet, /health)
    ///
    /// Example:
    ///
    ///  $ asrai-mcp serve
    ///
    ///  $ asrai-mcp --port 9000 --max-spend 5 serve
    ///
    Serve(ServeArgs),

    /// Serve MCP over stdin/stdout using PRIVATE_KEY
    ///
    /// Example:
    ///
    ///  $ PRIVATE_KEY=0x... asrai-mcp stdio
    ///
    Stdio,

    /// Print a freshly generated wallet as JSON
    Wallet,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = GlobalConfig::from_args(&cli.config)?;
    config.init_tracing();

    tracing::debug!("asrai-mcp starting");

    match cli.command {
        Commands::Serve(args) => {
            let fetcher = X402Fetcher::from_config(&config)?.into_shared();
            webapp::run(args, Arc::new(config), fetcher).await?
        }
        Commands::Stdio => {
            let fetcher = X402Fetcher::from_config(&config)?.into_shared();
            let server = McpServer::new(ToolDispatcher::new(fetcher));
            stdio::run(server, config.default_key().is_some()).await?
        }
        Commands::Wallet => {
            let wallet = webapp::handlers::wallet::generate_wallet();
            println!("{}", serde_json::to_string_pretty(&wallet)?);
        }
    }

    tracing::debug!("asrai-mcp shutting down");

    Ok(())
}
