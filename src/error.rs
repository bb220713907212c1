use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Invalid resource syntax: {0}")]
    InvalidResourceSyntax(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Shard already reserved: {0}")]
    AlreadyReserved(String),

    #[error("Capacity denied: {0}")]
    CapacityDenied(String),

    #[error("Policy rejected job: {0}")]
    PolicyRejected(String),

    #[error("Probe rejected job: {0}")]
    ProbeFailed(String),

    #[error("Executor failed: {0}")]
    ExecutorFailed(String),

    #[error("Verifier rejected shard: {0}")]
    VerifierRejected(String),

    #[error("Content adding is disabled on the upload gateway")]
    UploadDisabled,

    #[error("No upload endpoints are available")]
    NoEndpointsAvailable,

    #[error("All upload endpoints failed: {0}")]
    AllEndpointsFailed(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Short kind tag used in shard failure reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::InvalidResourceSyntax(_) => "InvalidResourceSyntax",
            NodeError::InvalidConfiguration(_) => "InvalidConfiguration",
            NodeError::AlreadyReserved(_) => "AlreadyReserved",
            NodeError::CapacityDenied(_) => "CapacityDenied",
            NodeError::PolicyRejected(_) => "PolicyRejected",
            NodeError::ProbeFailed(_) => "ProbeFailed",
            NodeError::ExecutorFailed(_) => "ExecutorFailed",
            NodeError::VerifierRejected(_) => "VerifierRejected",
            NodeError::UploadDisabled => "UploadDisabled",
            NodeError::NoEndpointsAvailable => "NoEndpointsAvailable",
            NodeError::AllEndpointsFailed(_) => "AllEndpointsFailed",
            NodeError::Timeout(_) => "Timeout",
            NodeError::Cancelled => "Cancelled",
            NodeError::MalformedResponse(_) => "MalformedResponse",
            NodeError::Http(_) => "Http",
            NodeError::Io(_) => "Io",
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
