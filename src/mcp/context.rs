//! Per-request credential context
//!
//! Each inbound MCP message is handled inside [`run`], which makes the
//! session's wallet and spend counter visible to everything it awaits through
//! a tokio task-local. Nothing below the transport layer takes the credential
//! as a parameter; the tool dispatcher, the spend guard and the paid fetch
//! all read it with [`current`].
//!
//! Task-locals do not cross `tokio::spawn`. Code that moves work to a new task
//! must enter [`run`] again inside that task.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use alloy_primitives::Address;

use crate::eth::EvmSigner;
use crate::eth::signer::SignerError;

use super::budget::SessionBudget;

/// A validated wallet key
#[derive(Clone)]
pub struct Credential {
    signer: EvmSigner,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Missing wallet key")]
    Missing,
    #[error("Invalid private key format.")]
    Malformed(#[source] SignerError),
}

impl Credential {
    /// Parse a raw key, treating empty or whitespace-only input as missing
    pub fn parse(raw: Option<&str>) -> Result<Self, CredentialError> {
        let raw = raw.map(str::trim).filter(|k| !k.is_empty());
        let Some(raw) = raw else {
            return Err(CredentialError::Missing);
        };
        let signer = EvmSigner::from_hex(raw).map_err(CredentialError::Malformed)?;
        Ok(Self { signer })
    }

    pub fn signer(&self) -> &EvmSigner {
        &self.signer
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

impl From<EvmSigner> for Credential {
    fn from(signer: EvmSigner) -> Self {
        Self { signer }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.signer.address())
    }
}

/// The ambient value seen by one request's handling
#[derive(Clone, Debug)]
pub struct CredentialContext {
    pub session_id: Arc<str>,
    pub credential: Credential,
    /// Shared with the owning session, so spend accumulates across messages
    pub budget: Arc<SessionBudget>,
}

impl CredentialContext {
    pub fn new(session_id: impl Into<Arc<str>>, credential: Credential, budget: Arc<SessionBudget>) -> Self {
        Self {
            session_id: session_id.into(),
            credential,
            budget,
        }
    }
}

tokio::task_local! {
    static CURRENT: CredentialContext;
}

/// Run `body` with `context` active for its whole asynchronous extent
pub async fn run<F: Future>(context: CredentialContext, body: F) -> F::Output {
    CURRENT.scope(context, body).await
}

/// The active context, or `None` outside any [`run`] scope
pub fn current() -> Option<CredentialContext> {
    CURRENT.try_with(Clone::clone).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context(id: &str) -> CredentialContext {
        CredentialContext::new(
            id,
            Credential::from(EvmSigner::random()),
            Arc::new(SessionBudget::new(2.0)),
        )
    }

    #[test]
    fn test_parse_credential() {
        assert!(matches!(Credential::parse(None), Err(CredentialError::Missing)));
        assert!(matches!(Credential::parse(Some("   ")), Err(CredentialError::Missing)));
        assert!(matches!(
            Credential::parse(Some("0xnot-a-key")),
            Err(CredentialError::Malformed(_))
        ));

        let signer = EvmSigner::random();
        let padded = format!("  {}\n", signer.to_hex());
        assert_eq!(Credential::parse(Some(&padded)).unwrap().address(), signer.address());
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = EvmSigner::random();
        let credential = Credential::from(signer.clone());
        let debug = format!("{credential:?}");
        assert!(!debug.contains(&signer.to_hex()[2..]));
    }

    #[tokio::test]
    async fn test_none_outside_scope() {
        assert!(current().is_none());
        let ctx = context("a");
        let seen = run(ctx.clone(), async { current().map(|c| c.credential.address()) }).await;
        assert_eq!(seen, Some(ctx.credential.address()));
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_nested_scope_reverts() {
        let outer = context("outer");
        let inner = context("inner");
        run(outer.clone(), async {
            run(inner.clone(), async {
                assert_eq!(current().unwrap().session_id.as_ref(), "inner");
            })
            .await;
            assert_eq!(current().unwrap().session_id.as_ref(), "outer");
        })
        .await;
    }

    #[tokio::test]
    async fn test_reverts_after_panic() {
        let ctx = context("boom");
        let handle = tokio::spawn(async move {
            run(ctx, async { panic!("handler failed") }).await;
        });
        assert!(handle.await.is_err());
        assert!(current().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_isolation_under_interleaving() {
        let mut handles = Vec::new();
        for i in 0..32 {
            let ctx = context(&format!("session-{i}"));
            let expected = ctx.credential.address();
            handles.push(tokio::spawn(run(ctx, async move {
                for _ in 0..20 {
                    let jitter = rand::random::<u64>() % 3;
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                    tokio::task::yield_now().await;
                    let seen = current().map(|c| c.credential.address());
                    assert_eq!(seen, Some(expected));
                }
            })));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_spawned_task_does_not_inherit() {
        run(context("parent"), async {
            let inherited = tokio::spawn(async { current().is_some() }).await.unwrap();
            assert!(!inherited);
        })
        .await;
    }
}
