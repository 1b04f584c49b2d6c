//! Error types for the core primitives

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in queue and lock operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Queue was closed; no further jobs are accepted
    #[error("queue closed")]
    QueueClosed,

    /// Queue is full (for try_push)
    #[error("queue full")]
    QueueFull,

    /// Queue is empty (for try_pop)
    #[error("queue empty")]
    QueueEmpty,

    /// Queue capacity must be at least one slot
    #[error("queue capacity must be at least 1")]
    InvalidCapacity,

    /// Reader batch bound must admit at least one reader
    #[error("reader batch must be at least 1")]
    InvalidReaderBatch,
}

/// Error returned when a job cannot be pushed; hands the job back
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct PushError<T> {
    /// Why the push failed
    pub kind: CoreError,
    /// The job that was not enqueued
    pub job: T,
}

impl<T> PushError<T> {
    pub(crate) fn new(kind: CoreError, job: T) -> Self {
        Self { kind, job }
    }

    /// Recover the job that failed to enqueue
    pub fn into_inner(self) -> T {
        self.job
    }
}

impl<T> From<PushError<T>> for CoreError {
    fn from(e: PushError<T>) -> Self {
        e.kind
    }
}
