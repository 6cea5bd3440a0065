//! Test doubles for the pay-and-fetch seam

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::mcp::context;
use crate::x402::fetch::{FetchError, FetchRequest, PayAndFetch};

#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub path: String,
    pub body: Option<Value>,
    /// Wallet of the active credential context, if any
    pub payer: Option<Address>,
}

/// Answers `{"path": ...}` for every request and records what it saw
#[derive(Default)]
pub struct MockFetcher {
    calls: Mutex<Vec<FetchCall>>,
    delay: Duration,
    failing: Vec<String>,
    slow: Vec<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requests to `path` fail with HTTP 500
    pub fn failing(mut self, path: &str) -> Self {
        self.failing.push(path.to_string());
        self
    }

    /// Requests to `path` time out
    pub fn timing_out(mut self, path: &str) -> Self {
        self.slow.push(path.to_string());
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.path).collect()
    }

    /// Most requests ever running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PayAndFetch for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Value, FetchError> {
        let path = request.path().to_string();
        let body = match &request {
            FetchRequest::Post { body, .. } => Some(body.clone()),
            FetchRequest::Get { .. } => None,
        };
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(FetchCall {
                path: path.clone(),
                body: body.clone(),
                payer: context::current().map(|c| c.credential.address()),
            });
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.slow.contains(&path) {
            return Err(FetchError::Timeout(90));
        }
        if self.failing.contains(&path) {
            return Err(FetchError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(match body {
            Some(body) => json!({"path": path, "body": body}),
            None => json!({"path": path}),
        })
    }
}
