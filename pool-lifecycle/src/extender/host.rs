use std::{future::Future, sync::Arc};

use futures::future::BoxFuture;

use crate::error::{LifecycleError, LifecycleResult};

/// Host primitive that keeps the invoking execution context alive until the
/// given future settles.
pub trait ExtendLifetime: Send + Sync {
    fn wait_until(&self, until: BoxFuture<'static, ()>) -> LifecycleResult<()>;
}

pub type WaitUntil = Arc<dyn Fn(BoxFuture<'static, ()>) -> LifecycleResult<()> + Send + Sync>;

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// Per-request capabilities granted by the host.
#[derive(Clone, Default)]
pub struct RequestContext {
    wait_until: Option<WaitUntil>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wait_until<F>(mut self, wait_until: F) -> Self
    where
        F: Fn(BoxFuture<'static, ()>) -> LifecycleResult<()> + Send + Sync + 'static,
    {
        self.wait_until = Some(Arc::new(wait_until));
        self
    }

    /// Runs `fut` with this context installed for the current task.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        REQUEST_CONTEXT.scope(self, fut).await
    }

    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        REQUEST_CONTEXT.sync_scope(self, f)
    }

    /// Context of the request the calling task is serving, if any.
    pub fn current() -> Option<RequestContext> {
        REQUEST_CONTEXT.try_with(Clone::clone).ok()
    }

    pub fn wait_until(&self, until: BoxFuture<'static, ()>) -> LifecycleResult<()> {
        let wait_until = self
            .wait_until
            .as_ref()
            .ok_or(LifecycleError::MissingWaitUntil)?;
        wait_until(until)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("wait_until", &self.wait_until.is_some())
            .finish()
    }
}

/// Resolves `wait_until` from the request the calling task is serving.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScopedHost;

impl ExtendLifetime for ScopedHost {
    fn wait_until(&self, until: BoxFuture<'static, ()>) -> LifecycleResult<()> {
        RequestContext::current()
            .ok_or(LifecycleError::OutOfScope)?
            .wait_until(until)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;

    use super::*;

    #[test]
    fn outside_any_request_is_out_of_scope() {
        let result = ScopedHost.wait_until(async {}.boxed());
        assert!(matches!(result, Err(LifecycleError::OutOfScope)));
    }

    #[test]
    fn context_without_capability_is_rejected() {
        let result = RequestContext::new().sync_scope(|| ScopedHost.wait_until(async {}.boxed()));
        assert!(matches!(result, Err(LifecycleError::MissingWaitUntil)));
    }

    #[tokio::test]
    async fn scoped_request_receives_the_future() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let ctx = RequestContext::new().with_wait_until(move |until| {
            seen.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(until);
            Ok(())
        });

        ctx.scope(async {
            ScopedHost.wait_until(async {}.boxed()).unwrap();
            assert!(RequestContext::current().is_some());
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(RequestContext::current().is_none());
    }
}
