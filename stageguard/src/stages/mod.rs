//! The stage execution contract.
//!
//! A stage is opaque business logic: it receives the shared run context and
//! its own name, and either returns a JSON payload or fails with an error.
//! The engine may invoke it several times (retries); idempotency is the
//! implementer's responsibility.

use crate::context::StageContext;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes one attempt of the stage.
    ///
    /// Returning `Err` marks the attempt as failed. Panics are caught by the
    /// retry coordinator and treated the same way.
    async fn execute(&self, ctx: &StageContext) -> anyhow::Result<serde_json::Value>;
}

/// A stage backed by an async closure.
pub struct FnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send,
{
    /// Creates a new closure-backed stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for FnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Stage for FnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> anyhow::Result<serde_json::Value> {
        (self.func)(ctx.clone()).await
    }
}

/// A stage that succeeds immediately with a null payload.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PipelineContext;
    use std::sync::Arc;

    fn test_stage_context(name: &str) -> StageContext {
        StageContext::new(Arc::new(PipelineContext::new()), name, 0)
    }

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("generate", |ctx: StageContext| async move {
            ctx.data().set("generated", serde_json::json!(true));
            Ok(serde_json::json!({"stage": ctx.stage_name()}))
        });

        assert_eq!(stage.name(), "generate");

        let ctx = test_stage_context("generate");
        let payload = stage.execute(&ctx).await.unwrap();
        assert_eq!(payload["stage"], "generate");
        assert_eq!(ctx.data().get("generated"), Some(serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_fn_stage_error() {
        let stage = FnStage::new("broken", |_ctx: StageContext| async move {
            Err::<serde_json::Value, _>(anyhow::anyhow!("compiler crashed"))
        });

        let err = stage.execute(&test_stage_context("broken")).await.unwrap_err();
        assert_eq!(err.to_string(), "compiler crashed");
    }

    #[tokio::test]
    async fn test_noop_stage() {
        let stage = NoOpStage::new("noop");
        assert_eq!(stage.name(), "noop");
        let payload = stage.execute(&test_stage_context("noop")).await.unwrap();
        assert!(payload.is_null());
    }
}
