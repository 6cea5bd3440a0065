//! Per-session spend ceiling
//!
//! Amounts are tracked in micro-USD so repeated small charges add up exactly.
//! A refused charge still counts: once a session hits its ceiling every
//! later charge is refused too.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::context;

/// Cost of one paid upstream request, in USD
pub const CALL_COST_USD: f64 = 0.001;

/// Fraction of the ceiling at which a session gets one warning
const WARN_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Session spend limit of ${limit} USDC reached. Set ASRAI_MAX_SPEND env var to increase.")]
pub struct SpendLimitExceeded {
    pub limit: f64,
}

fn usd_to_micro(usd: f64) -> u64 {
    (usd * 1_000_000.0).round() as u64
}

fn micro_to_usd(micro: u64) -> f64 {
    micro as f64 / 1_000_000.0
}

#[derive(Debug)]
pub struct SessionBudget {
    limit_usd: f64,
    limit_micro: u64,
    spent_micro: AtomicU64,
    charges: AtomicU64,
    warned: AtomicBool,
}

impl SessionBudget {
    pub fn new(limit_usd: f64) -> Self {
        Self {
            limit_usd,
            limit_micro: usd_to_micro(limit_usd),
            spent_micro: AtomicU64::new(0),
            charges: AtomicU64::new(0),
            warned: AtomicBool::new(false),
        }
    }

    pub fn limit_usd(&self) -> f64 {
        self.limit_usd
    }

    pub fn spent_usd(&self) -> f64 {
        micro_to_usd(self.spent_micro.load(Ordering::SeqCst))
    }

    /// Number of charges attempted, refused ones included
    pub fn charges(&self) -> u64 {
        self.charges.load(Ordering::SeqCst)
    }

    /// Add `amount_usd` and refuse if the new total reaches the ceiling.
    ///
    /// Returns the new total in USD.
    pub fn charge(&self, amount_usd: f64) -> Result<f64, SpendLimitExceeded> {
        let amount = usd_to_micro(amount_usd);
        let total = self
            .spent_micro
            .fetch_add(amount, Ordering::SeqCst)
            .saturating_add(amount);
        self.charges.fetch_add(1, Ordering::SeqCst);

        if total >= self.limit_micro {
            return Err(SpendLimitExceeded { limit: self.limit_usd });
        }

        let warn_at = (self.limit_micro as f64 * WARN_THRESHOLD) as u64;
        if total >= warn_at && !self.warned.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                spent = micro_to_usd(total),
                limit = self.limit_usd,
                "Session has used {:.0}% of its spend limit",
                WARN_THRESHOLD * 100.0
            );
        }
        Ok(micro_to_usd(total))
    }
}

/// Charge the active session, a no-op when no credential context is active
pub fn charge(amount_usd: f64) -> Result<(), SpendLimitExceeded> {
    let Some(ctx) = context::current() else {
        return Ok(());
    };
    match ctx.budget.charge(amount_usd) {
        Ok(total) => {
            tracing::debug!(session = %ctx.session_id, spent = total, "Charged session");
            Ok(())
        }
        Err(e) => {
            tracing::info!(session = %ctx.session_id, limit = e.limit, "Session spend limit reached");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eth::EvmSigner;
    use crate::mcp::context::{Credential, CredentialContext};
    use std::sync::Arc;

    #[test]
    fn test_second_charge_refused_at_ceiling() {
        let budget = SessionBudget::new(0.002);
        assert!(budget.charge(0.001).is_ok());
        let err = budget.charge(0.001).unwrap_err();
        assert_eq!(err.limit, 0.002);
        assert!(err.to_string().contains("$0.002 USDC"));
        assert!(err.to_string().contains("ASRAI_MAX_SPEND"));
    }

    #[test]
    fn test_refused_charge_still_counts() {
        let budget = SessionBudget::new(0.0025);
        budget.charge(0.001).unwrap();
        budget.charge(0.001).unwrap();
        assert!(budget.charge(0.001).is_err());
        assert!((budget.spent_usd() - 0.003).abs() < 1e-9);
        // Stays refused for the rest of the session
        assert!(budget.charge(0.0).is_err());
        assert_eq!(budget.charges(), 4);
    }

    #[test]
    fn test_spend_is_monotonic_and_refusal_matches_total() {
        let limit = 0.05;
        let budget = SessionBudget::new(limit);
        let mut last = 0.0;
        for _ in 0..200 {
            let amount = (rand::random::<u64>() % 5) as f64 / 1000.0;
            let before = budget.spent_usd();
            let result = budget.charge(amount);
            let after = budget.spent_usd();
            assert!(after >= last);
            assert!((after - before - amount).abs() < 1e-9);
            assert_eq!(result.is_err(), usd_to_micro(after) >= usd_to_micro(limit));
            last = after;
        }
    }

    #[test]
    fn test_many_small_charges_add_exactly() {
        let budget = SessionBudget::new(2.0);
        for _ in 0..1999 {
            budget.charge(CALL_COST_USD).unwrap();
        }
        // The 2000th call brings the total to the ceiling
        assert!(budget.charge(CALL_COST_USD).is_err());
    }

    #[tokio::test]
    async fn test_charge_without_context_is_noop() {
        for _ in 0..10_000 {
            assert!(charge(1.0).is_ok());
        }
    }

    #[tokio::test]
    async fn test_charge_uses_active_session() {
        let budget = Arc::new(SessionBudget::new(0.002));
        let ctx = CredentialContext::new("s1", Credential::from(EvmSigner::random()), budget.clone());

        context::run(ctx.clone(), async {
            assert!(charge(0.001).is_ok());
        })
        .await;
        // A later message in the same session sees the same counter
        let second = context::run(ctx, async { charge(0.001) }).await;
        assert_eq!(second, Err(SpendLimitExceeded { limit: 0.002 }));
        assert_eq!(budget.charges(), 2);
    }
}
