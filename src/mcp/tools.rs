//! Tool catalog and dispatch
//!
//! Each tool maps its arguments to one or more upstream paths. Tools that
//! need several paths fetch them one after another: concurrent x402 payments
//! signed by the same wallet can collide on the payment side. A failing path
//! is recorded under its own key and the remaining paths still run.
//!
//! Tool-level problems never fail the MCP call. They come back as an
//! `{"error": ...}` payload in the text result.

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::{Map, Value, json};

use super::budget::{self, CALL_COST_USD, SpendLimitExceeded};
use super::guide;
use super::protocol::ToolInfo;
use crate::x402::fetch::{FetchError, FetchRequest, PayAndFetch};

pub const TIMEFRAMES: [&str; 3] = ["1D", "4H", "1W"];
pub const DEFAULT_TIMEFRAME: &str = "1D";

pub const SCREENERS: [&str; 16] = [
    "ichimoku-trend",
    "sar-coins",
    "macd-coins",
    "emacross",
    "techrating",
    "vwap",
    "volume",
    "highvolumelowcap",
    "bounce-dip",
    "galaxyscore",
    "socialdominance",
    "late-unlocked-coins",
    "ath",
    "rsi",
    "rsi-heatmap",
    "ao",
];

pub const CASHFLOW_MODES: [&str; 3] = ["market", "coin", "group"];

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid screener. Choose from: {}", SCREENERS.join(", "))]
    InvalidScreener,
    #[error("Invalid timeframe. Choose from: {}", TIMEFRAMES.join(", "))]
    InvalidTimeframe(String),
    #[error("mode must be 'market', 'coin', or 'group'. coin/group require symbol.")]
    InvalidCashflow,
    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),
    #[error("Invalid {0}: must not contain '/', '?', '#' or whitespace")]
    InvalidArgument(&'static str),
    #[error("Indicator '{0}' not found.")]
    IndicatorNotFound(String),
    #[error(transparent)]
    SpendLimit(#[from] SpendLimitExceeded),
    #[error("Request timed out. The API is slow right now, try again in a moment.")]
    Timeout,
    #[error("{0}")]
    Fetch(FetchError),
}

impl From<FetchError> for ToolError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Timeout(_) => ToolError::Timeout,
            other => ToolError::Fetch(other),
        }
    }
}

impl ToolError {
    /// The `{"error": ...}` object sent back to the client
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({ "error": self.to_string() });
        let valid: Option<Vec<&str>> = match self {
            ToolError::InvalidScreener => Some(SCREENERS.to_vec()),
            ToolError::InvalidTimeframe(_) => Some(TIMEFRAMES.to_vec()),
            ToolError::InvalidCashflow => Some(CASHFLOW_MODES.to_vec()),
            _ => None,
        };
        if let Some(valid) = valid {
            payload["valid"] = json!(valid);
        }
        if let ToolError::IndicatorNotFound(_) = self {
            payload["available"] = json!(guide::names().collect::<Vec<_>>());
        }
        payload
    }

    /// Whether the problem was caught before anything was fetched
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ToolError::UnknownTool(_)
                | ToolError::InvalidScreener
                | ToolError::InvalidTimeframe(_)
                | ToolError::InvalidCashflow
                | ToolError::MissingArgument(_)
                | ToolError::InvalidArgument(_)
                | ToolError::IndicatorNotFound(_)
        )
    }
}

// ============================================================================
// Catalog
// ============================================================================

fn no_args() -> Value {
    json!({"type": "object", "properties": {}, "required": []})
}

fn symbol_schema(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

fn symbol_and_timeframe(timeframe_description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": symbol_schema("Coin symbol e.g. BTC, ETH"),
            "timeframe": {"type": "string", "enum": TIMEFRAMES, "description": timeframe_description},
        },
        "required": ["symbol"],
    })
}

static CATALOG: Lazy<Vec<ToolInfo>> = Lazy::new(|| {
    vec![
        ToolInfo {
            name: "market_overview",
            description: "Get current crypto market pulse: trending coins, gainers/losers, RSI extremes, top/bottom signals. \
                Use for general market questions like 'what's moving today' or 'give me a market brief'.",
            input_schema: no_args(),
        },
        ToolInfo {
            name: "technical_analysis",
            description: "Get full technical analysis for a specific coin: signal, ALSAT, SuperALSAT, PSAR, MACD-DEMA, AlphaTrend. \
                Use when asked about TA, buy/sell signals, or indicators for a coin.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "symbol": symbol_schema("Coin symbol e.g. BTC, ETH, SOL"),
                    "timeframe": {"type": "string", "enum": TIMEFRAMES, "description": "Timeframe. Default: 1D"},
                },
                "required": ["symbol"],
            }),
        },
        ToolInfo {
            name: "sentiment",
            description: "Get market sentiment: CBBI (crypto bull/bear index), CMC sentiment, CMC AI insights. \
                Use for questions about market mood, fear/greed, or cycle position.",
            input_schema: no_args(),
        },
        ToolInfo {
            name: "forecast",
            description: "Get AI-powered 3-7 day price forecast for a coin: direction, confidence, price targets.",
            input_schema: json!({
                "type": "object",
                "properties": {"symbol": symbol_schema("Coin symbol e.g. BTC, ETH")},
                "required": ["symbol"],
            }),
        },
        ToolInfo {
            name: "screener",
            description: "Run a market screener to find coins matching specific criteria. \
                Types: ichimoku-trend, sar-coins, macd-coins, emacross, techrating, vwap, volume, \
                highvolumelowcap, bounce-dip, galaxyscore, socialdominance, late-unlocked-coins, ath, rsi, rsi-heatmap, ao.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "screener_type": {"type": "string", "enum": SCREENERS, "description": "Type of screener to run"},
                },
                "required": ["screener_type"],
            }),
        },
        ToolInfo {
            name: "smart_money",
            description: "Get Smart Money Concepts (SMC): order blocks, fair value gaps, liquidity zones, BOS/CHoCH, \
                plus support/resistance levels.",
            input_schema: symbol_and_timeframe("Default: 1D"),
        },
        ToolInfo {
            name: "elliott_wave",
            description: "Get Elliott Wave analysis: current wave position, impulse/corrective structure, price targets.",
            input_schema: symbol_and_timeframe("Default: 1D"),
        },
        ToolInfo {
            name: "ichimoku",
            description: "Get Ichimoku cloud analysis: cloud position, Tenkan/Kijun cross, kumo twist, trend bias for a coin.",
            input_schema: symbol_and_timeframe("Default: 1D"),
        },
        ToolInfo {
            name: "cashflow",
            description: "Get capital flow data showing where money is moving. \
                Modes: 'market' (overall), 'coin' (single coin), 'group' (comma-separated coins).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "mode": {"type": "string", "enum": CASHFLOW_MODES, "description": "Scope of cashflow data"},
                    "symbol": symbol_schema("Coin symbol (required for coin/group modes)"),
                },
                "required": ["mode"],
            }),
        },
        ToolInfo {
            name: "coin_info",
            description: "Get detailed info for a coin: market cap, volume, supply, social stats, tokenomics.",
            input_schema: json!({
                "type": "object",
                "properties": {"symbol": symbol_schema("Coin symbol e.g. BTC, ETH, SOL")},
                "required": ["symbol"],
            }),
        },
        ToolInfo {
            name: "dexscreener",
            description: "Get DEX trading data for a token: liquidity, volume, buys/sells, price change. \
                Use contract_address alone for symbol search, or provide chain + contract_address for a specific token.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "contract_address": {"type": "string", "description": "Token contract address or symbol"},
                    "chain": {"type": "string", "description": "Optional chain e.g. ethereum, bsc, base, solana"},
                },
                "required": ["contract_address"],
            }),
        },
        ToolInfo {
            name: "chain_tokens",
            description: "Get low-cap tokens on a specific blockchain filtered by max market cap.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "chain": {"type": "string", "description": "Chain e.g. ethereum, bsc, base, solana, avax"},
                    "max_mcap": {"type": "string", "description": "Max market cap e.g. 10000000 (10M)"},
                },
                "required": ["chain", "max_mcap"],
            }),
        },
        ToolInfo {
            name: "portfolio",
            description: "Get portfolio analysis. Optionally filter by a specific coin.",
            input_schema: json!({
                "type": "object",
                "properties": {"symbol": symbol_schema("Optional coin symbol to filter")},
                "required": [],
            }),
        },
        ToolInfo {
            name: "channel_summary",
            description: "Get a summary of latest crypto narratives and discussions from monitored channels.",
            input_schema: no_args(),
        },
        ToolInfo {
            name: "ask_ai",
            description: "Ask the Asrai AI analyst a freeform crypto question. Gets a full analytical response \
                covering market context, signals, and actionable insights.",
            input_schema: json!({
                "type": "object",
                "properties": {"question": {"type": "string", "description": "Your crypto market question"}},
                "required": ["question"],
            }),
        },
        ToolInfo {
            name: "indicator_guide",
            description: "Reference guide for Asrai-specific indicators. FREE, no payment. \
                WHEN TO CALL: only when you encounter an unfamiliar indicator name in tool output \
                (e.g. ALSAT, SuperALSAT, AlphaTrend, PMax, MavilimW). \
                Standard indicators (RSI, MACD, Ichimoku, Elliott Wave, BB) are well-known, skip them. \
                indicator='' or 'list' gives a compact 1-line summary of all. \
                indicator='ALSAT' gives full detail. indicator='all' gives everything (avoid unless needed).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "indicator": {
                        "type": "string",
                        "description": "Indicator name e.g. 'ALSAT', 'SuperALSAT', 'PMax'. Empty = compact list.",
                    },
                },
                "required": [],
            }),
        },
    ]
});

/// Every tool, in the order clients see them
pub fn catalog() -> &'static [ToolInfo] {
    &CATALOG
}

// ============================================================================
// Arguments
// ============================================================================

/// Loosely typed tool arguments
struct Args<'a>(&'a Value);

impl Args<'_> {
    /// A string argument, numbers accepted; blank counts as absent
    fn get(&self, key: &str) -> Option<String> {
        let value = match self.0.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    }

    fn required(&self, key: &'static str) -> Result<String, ToolError> {
        let value = self.get(key).ok_or(ToolError::MissingArgument(key))?;
        segment(key, value)
    }

    fn optional(&self, key: &'static str) -> Result<Option<String>, ToolError> {
        self.get(key).map(|v| segment(key, v)).transpose()
    }

    fn timeframe(&self) -> Result<String, ToolError> {
        let Some(raw) = self.get("timeframe") else {
            return Ok(DEFAULT_TIMEFRAME.to_string());
        };
        let upper = raw.to_uppercase();
        if TIMEFRAMES.contains(&upper.as_str()) {
            Ok(upper)
        } else {
            Err(ToolError::InvalidTimeframe(raw))
        }
    }
}

/// Values end up as URL path segments
fn segment(name: &'static str, value: String) -> Result<String, ToolError> {
    if value.chars().any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace()) {
        return Err(ToolError::InvalidArgument(name));
    }
    Ok(value)
}

/// Lowercase, then drop one trailing `usdt`: `BTCUSDT` and `btc` both give `btc`
pub fn normalize_symbol(symbol: &str) -> String {
    let lower = symbol.to_lowercase();
    match lower.strip_suffix("usdt") {
        Some(base) => base.to_string(),
        None => lower,
    }
}

// ============================================================================
// Dispatch
// ============================================================================

#[derive(Clone)]
pub struct ToolDispatcher {
    fetcher: Arc<dyn PayAndFetch>,
}

impl ToolDispatcher {
    pub fn new(fetcher: Arc<dyn PayAndFetch>) -> Self {
        Self { fetcher }
    }

    /// Run a tool and render its text result
    pub async fn call(&self, name: &str, arguments: &Value) -> String {
        match self.dispatch(name, arguments).await {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
            Err(e) => {
                if e.is_validation() {
                    tracing::debug!(target: "mcp", tool = name, error = %e, "Rejected tool call");
                } else {
                    tracing::warn!(target: "mcp", tool = name, error = %e, "Tool call failed");
                }
                e.to_payload().to_string()
            }
        }
    }

    pub async fn dispatch(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let args = Args(arguments);
        match name {
            "market_overview" => Ok(self
                .gather(["/api/trending/", "/api/gainers-losers/", "/api/rsi/", "/api/top-bottom/"])
                .await),
            "technical_analysis" => {
                let s = normalize_symbol(&args.required("symbol")?);
                let tf = args.timeframe()?;
                Ok(self
                    .gather([
                        format!("/api/signal/{s}usdt/{tf}"),
                        format!("/api/alsat/{s}usdt/{tf}"),
                        format!("/api/superalsat/{s}usdt"),
                        format!("/api/psar/{s}usdt/{tf}"),
                        format!("/api/macd-dema/{s}usdt/{tf}"),
                        format!("/api/alphatrend/{s}usdt/{tf}"),
                        format!("/api/td/{s}usdt/{tf}"),
                    ])
                    .await)
            }
            "sentiment" => Ok(self
                .gather(["/api/cbbi/", "/api/cmc-sentiment/", "/api/cmcai/"])
                .await),
            "forecast" => {
                let s = normalize_symbol(&args.required("symbol")?);
                self.get(format!("/api/forecasting/{s}usdt")).await
            }
            "screener" => {
                let kind = args.get("screener_type").unwrap_or_default();
                if !SCREENERS.contains(&kind.as_str()) {
                    return Err(ToolError::InvalidScreener);
                }
                self.get(format!("/api/{kind}/")).await
            }
            "smart_money" => {
                let s = normalize_symbol(&args.required("symbol")?);
                let tf = args.timeframe()?;
                Ok(self
                    .gather([
                        format!("/api/smartmoney/{s}usdt/{tf}"),
                        format!("/api/support-resistance/{s}usdt/{tf}"),
                    ])
                    .await)
            }
            "elliott_wave" => {
                let s = normalize_symbol(&args.required("symbol")?);
                let tf = args.timeframe()?;
                self.get(format!("/api/ew/{s}usdt/{tf}")).await
            }
            "ichimoku" => {
                let s = normalize_symbol(&args.required("symbol")?);
                let tf = args.timeframe()?;
                self.get(format!("/api/ichimoku/{s}usdt/{tf}")).await
            }
            "cashflow" => {
                let mode = args.get("mode").unwrap_or_else(|| "market".to_string());
                let symbol = args.optional("symbol")?;
                match (mode.as_str(), symbol) {
                    ("market", _) => self.get("/api/cashflow/market").await,
                    ("coin" | "group", Some(symbol)) => {
                        self.get(format!("/api/cashflow/{mode}/{}", symbol.to_lowercase()))
                            .await
                    }
                    _ => Err(ToolError::InvalidCashflow),
                }
            }
            "coin_info" => {
                let s = args.required("symbol")?.to_lowercase();
                Ok(self
                    .gather([
                        format!("/api/coinstats/{s}"),
                        format!("/api/info/{s}"),
                        format!("/api/price/{s}"),
                        format!("/api/tags/{s}"),
                    ])
                    .await)
            }
            "dexscreener" => {
                let address = args.required("contract_address")?;
                match args.optional("chain")? {
                    Some(chain) => self.get(format!("/api/dexscreener/{chain}/{address}")).await,
                    None => self.get(format!("/api/dexscreener/{address}")).await,
                }
            }
            "chain_tokens" => {
                let chain = args.required("chain")?;
                let max_mcap = args.required("max_mcap")?;
                self.get(format!("/api/chain/{chain}/{max_mcap}")).await
            }
            "portfolio" => match args.optional("symbol")? {
                Some(symbol) => self.get(format!("/api/portfolio/{}", symbol.to_lowercase())).await,
                None => self.get("/api/portfolio/").await,
            },
            "channel_summary" => self.get("/api/channel-summary/").await,
            "ask_ai" => {
                let question = args.get("question").ok_or(ToolError::MissingArgument("question"))?;
                self.paid(FetchRequest::post("/ai", json!({ "message": question })))
                    .await
            }
            "indicator_guide" => {
                let indicator = args.get("indicator").unwrap_or_default();
                guide::lookup(&indicator).ok_or(ToolError::IndicatorNotFound(indicator))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Charge the session, then fetch
    async fn paid(&self, request: FetchRequest) -> Result<Value, ToolError> {
        budget::charge(CALL_COST_USD)?;
        Ok(self.fetcher.fetch(request).await?)
    }

    async fn get(&self, path: impl Into<String>) -> Result<Value, ToolError> {
        self.paid(FetchRequest::get(path)).await
    }

    /// Fetch each path in turn, keyed by path. Never concurrent.
    async fn gather<I, P>(&self, paths: I) -> Value
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut results = Map::new();
        for path in paths {
            let path = path.into();
            let value = match self.get(path.clone()).await {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!(target: "mcp", %path, error = %e, "Path failed");
                    Value::String(e.to_string())
                }
            };
            results.insert(path, value);
        }
        Value::Object(results)
    }
}
