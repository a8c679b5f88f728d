use crate::bucket::NoSuchBucket;
use crate::config::ConfigError;
use crate::store::StoreError;
use crate::wire::CouldNotInterpret;

/// Top-level dcache error
#[derive(Debug, thiserror::Error)]
pub enum DcacheError {
    /// Snapshot store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Could not encode the snapshot
    #[error(transparent)]
    Encode(#[from] rmp_serde::encode::Error),

    /// Bucket path resolution failure
    #[error(transparent)]
    NoSuchBucket(#[from] NoSuchBucket),

    /// Config failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Tracing setup failure
    #[error(transparent)]
    Tracing(#[from] dcache_trace::errors::TracingError),
}

/// Dcache result
pub type DcacheResult<T> = Result<T, DcacheError>;

/// Why one inbound message could not be handled
#[derive(Debug, thiserror::Error)]
pub enum ProcessFailureCause {
    /// The message did not decode
    #[error(transparent)]
    Interpret(#[from] CouldNotInterpret),

    /// The target bucket does not exist
    #[error(transparent)]
    NoSuchBucket(#[from] NoSuchBucket),
}

/// Handling one inbound message failed. Carries the raw message; callers log
/// it and carry on with the next message.
#[derive(Debug, thiserror::Error)]
#[error("could not process message: {cause} (raw: {raw:?})")]
pub struct ProcessFailure {
    /// The offending message text
    pub raw: String,
    /// What went wrong
    #[source]
    pub cause: ProcessFailureCause,
}

impl ProcessFailure {
    pub(crate) fn new(raw: &str, cause: impl Into<ProcessFailureCause>) -> Self {
        Self {
            raw: raw.to_string(),
            cause: cause.into(),
        }
    }
}
