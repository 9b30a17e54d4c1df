/// Errors raised by the delivery pipeline.
///
/// Transport failures and non-401 server rejections both classify as a
/// retryable delivery failure; a 401 is kept distinct because resending with
/// the same token is certain to fail again.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Connection, TLS, or timeout failure talking to the collector.
    #[error("Agent: transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The collector answered with a non-success, non-401 status.
    #[error("Agent: collector rejected request: status={status}, body={body}")]
    ServerRejection { status: u16, body: String },

    /// The collector rejected the bearer credential (401).
    #[error("Agent: credential rejected by collector")]
    AuthRejection,

    /// The login exchange failed: network error, non-success status, or a
    /// response carrying no token.
    #[error("Agent: login failed: {0}")]
    Auth(String),

    /// The queue file could not be read or written.
    #[error("Agent: queue storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// The queue contents could not be serialized.
    #[error("Agent: queue serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A required setting is missing or invalid.
    #[error("Agent: invalid configuration: {0}")]
    Config(String),
}
