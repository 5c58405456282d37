//! Panic isolation for user code.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;

/// What listeners and command handlers return.
pub type HandlerResult = anyhow::Result<()>;

/// A boxed handler future.
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// Runs `fut`, turning a panic into an error.
pub(crate) async fn run_guarded<F>(fut: F) -> HandlerResult
where
    F: Future<Output = HandlerResult>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!("handler panicked: {}", panic_message(&*panic))),
    }
}

/// Runs a hook future, swallowing a panic so later hooks still run.
pub(crate) async fn run_hook<F>(fut: F)
where
    F: Future<Output = ()>,
{
    if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
        tracing::error!(panic = %panic_message(&*panic), "Hook panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn explode() -> HandlerResult {
        panic!("boom")
    }

    async fn refuse() -> HandlerResult {
        Err(anyhow::anyhow!("nope"))
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let err = run_guarded(explode()).await.unwrap_err();
        assert_eq!(err.to_string(), "handler panicked: boom");
    }

    #[tokio::test]
    async fn test_error_passes_through() {
        assert_eq!(run_guarded(refuse()).await.unwrap_err().to_string(), "nope");
    }

    #[tokio::test]
    async fn test_hook_panic_is_swallowed() {
        run_hook(async {
            let _ = explode().await;
        })
        .await;
    }
}
