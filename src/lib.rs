//! Multi-tenant MCP server for Asrai market data, paid per call over x402

pub mod config;
pub mod eth;
pub mod logging;
pub mod mcp;
pub mod webapp;
pub mod x402;
