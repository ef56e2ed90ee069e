//! Dispatch engine errors

use thiserror::Error;

use super::filter::Threshold;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{filter} filter cannot take threshold {threshold:?}")]
    ThresholdMismatch {
        filter: &'static str,
        threshold: Threshold,
    },

    #[error("worker pool is shut down")]
    PoolShutdown,

    #[error("failed to build worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to spawn dispatch thread for queue {queue}: {source}")]
    ThreadSpawn {
        queue: String,
        #[source]
        source: std::io::Error,
    },

    #[error("queue {queue} does not accept {kind:?} orders")]
    WrongQueue {
        queue: String,
        kind: super::OrderKind,
    },
}

pub type DispatchResult<T> = Result<T, DispatchError>;
