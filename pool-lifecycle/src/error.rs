use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no request context is active for this task")]
    OutOfScope,

    #[error("request context does not expose a wait_until capability")]
    MissingWaitUntil,

    #[error("host refused to extend the background lifetime: {0}")]
    Rejected(String),

    #[error("no tokio runtime available to schedule the idle window")]
    NoRuntime,
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
