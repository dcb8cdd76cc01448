//! Cluster-level error kinds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("missing {missing} of {expected} responses for request {request_id}")]
    MissingResponses {
        request_id: String,
        expected: usize,
        missing: usize,
    },
    #[error("malformed cluster envelope: {0}")]
    MalformedEnvelope(String),
    #[error("pub/sub publish failed: {0}")]
    PublishFailed(String),
    #[error("pub/sub subscribe failed: {0}")]
    SubscribeFailed(String),
}
