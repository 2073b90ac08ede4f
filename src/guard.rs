//! Timeout and retry policy around provider calls.
//!
//! [`Guarded`] wraps any [`Embedder`], [`VectorStore`], or [`Generator`]
//! and applies the same rules to each:
//!
//! | Call | Timeout | Retried on `ProviderUnavailable` |
//! |------|---------|----------------------------------|
//! | `embed` | yes | yes |
//! | `query`, `list`, `count` | yes | yes |
//! | `upsert`, `delete` | yes | no |
//! | `generate` | yes | no |
//!
//! An elapsed timeout drops the inner future and surfaces as
//! `ProviderUnavailable`. Every other error, `RateLimited` included,
//! passes through on the first occurrence.
//!
//! Backoff before retry `n` is `backoff * 2^(n-1)`, capped at `2^5`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use support_harness_core::embedding::Embedder;
use support_harness_core::generation::{Generator, Passage, Prompt};
use support_harness_core::models::{ChunkMetadata, StoredChunk};
use support_harness_core::store::{QueryFilter, VectorHit, VectorStore};
use support_harness_core::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl CallPolicy {
    pub fn new(timeout_secs: u64, max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    /// Delay before retry `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff * (1u32 << (attempt.saturating_sub(1)).min(5))
    }

    /// Run one call under the timeout.
    pub async fn once<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RagError::unavailable(format!(
                "{} timed out after {:?}",
                op, self.timeout
            ))),
        }
    }

    /// Run a call under the timeout, retrying transient failures.
    pub async fn retrying<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match self.once(op, call()).await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay(attempt);
                    warn!(op, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying provider call");
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

/// A provider wrapped with a [`CallPolicy`].
pub struct Guarded<T> {
    inner: T,
    policy: CallPolicy,
}

impl<T> Guarded<T> {
    pub fn new(inner: T, policy: CallPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Guarded<Box<T>> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.policy
            .retrying("embed", || self.inner.embed(text))
            .await
    }
}

#[async_trait]
impl<T: VectorStore + ?Sized> VectorStore for Guarded<Box<T>> {
    fn backend(&self) -> &str {
        self.inner.backend()
    }

    async fn upsert(&self, chunk_id: &str, vector: &[f32], metadata: &ChunkMetadata) -> Result<()> {
        self.policy
            .once("upsert", self.inner.upsert(chunk_id, vector, metadata))
            .await
    }

    async fn query(&self, vector: &[f32], top_k: usize, filter: &QueryFilter) -> Result<Vec<VectorHit>> {
        self.policy
            .retrying("query", || self.inner.query(vector, top_k, filter))
            .await
    }

    async fn delete(&self, chunk_id: &str) -> Result<bool> {
        self.policy.once("delete", self.inner.delete(chunk_id)).await
    }

    async fn list(&self, filter: &QueryFilter) -> Result<Vec<StoredChunk>> {
        self.policy.retrying("list", || self.inner.list(filter)).await
    }

    async fn count(&self) -> Result<usize> {
        self.policy.retrying("count", || self.inner.count()).await
    }
}

#[async_trait]
impl<T: Generator + ?Sized> Generator for Guarded<Box<T>> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn generate(&self, prompt: &Prompt, passages: &[Passage]) -> Result<String> {
        self.policy
            .once("generate", self.inner.generate(prompt, passages))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use support_harness_core::prompt::build_prompt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fails with a scripted error for the first `failures` calls.
    struct Flaky {
        calls: Arc<AtomicU32>,
        failures: u32,
        error: fn() -> RagError,
        hang: bool,
    }

    #[async_trait]
    impl Embedder for Flaky {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if n < self.failures {
                return Err((self.error)());
            }
            Ok(vec![1.0])
        }
    }

    #[async_trait]
    impl Generator for Flaky {
        fn model_name(&self) -> &str {
            "flaky"
        }
        async fn generate(&self, _prompt: &Prompt, _passages: &[Passage]) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err((self.error)());
            }
            Ok("ok".into())
        }
    }

    fn flaky(failures: u32, error: fn() -> RagError) -> (Box<Flaky>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Box::new(Flaky {
                calls: calls.clone(),
                failures,
                error,
                hang: false,
            }),
            calls,
        )
    }

    fn policy(max_retries: u32) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(200),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_caps_at_32x() {
        let p = CallPolicy::new(1, 10, 100);
        assert_eq!(p.delay(1), Duration::from_millis(100));
        assert_eq!(p.delay(2), Duration::from_millis(200));
        assert_eq!(p.delay(6), Duration::from_millis(3200));
        assert_eq!(p.delay(9), Duration::from_millis(3200));
    }

    #[tokio::test]
    async fn test_embed_retries_unavailable() {
        let (inner, calls) = flaky(2, || RagError::unavailable("down"));
        let guarded = Guarded::new(inner, policy(3));
        assert_eq!(Embedder::embed(&guarded, "x").await.unwrap(), vec![1.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_embed_gives_up_after_max_retries() {
        let (inner, calls) = flaky(10, || RagError::unavailable("down"));
        let guarded = Guarded::new(inner, policy(2));
        let err = Embedder::embed(&guarded, "x").await.unwrap_err();
        assert!(matches!(err, RagError::ProviderUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limited_passes_through() {
        let (inner, calls) = flaky(1, || RagError::RateLimited {
            message: "slow".into(),
            retry_after: Some(Duration::from_secs(3)),
        });
        let guarded = Guarded::new(inner, policy(3));
        match Embedder::embed(&guarded, "x").await.unwrap_err() {
            RagError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(3)))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generate_never_retried() {
        let (inner, calls) = flaky(1, || RagError::unavailable("down"));
        let guarded = Guarded::new(inner, policy(3));
        assert!(Generator::generate(&guarded, &build_prompt(vec![], "q", false), &[])
            .await
            .is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let calls = Arc::new(AtomicU32::new(0));
        let inner = Box::new(Flaky {
            calls: calls.clone(),
            failures: 0,
            error: || RagError::unavailable("unused"),
            hang: true,
        });
        let guarded = Guarded::new(inner, policy(0));
        let err = Embedder::embed(&guarded, "x").await.unwrap_err();
        assert!(matches!(err, RagError::ProviderUnavailable(m) if m.contains("timed out")));
    }
}
