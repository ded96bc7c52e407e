use thiserror::Error;

pub type Result<T> = std::result::Result<T, SamlError>;

/// Every way a SAML init or callback request can fail. Callback failures are
/// terminal for the request; nothing is retried.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Fatal misconfiguration, surfaced at first use rather than at load time.
    #[error("SAML configuration error: {0}")]
    Configuration(String),

    /// The response is not valid base64, not well-formed XML, or lacks a
    /// required top-level field.
    #[error("malformed SAML response: {0}")]
    MalformedResponse(String),

    /// The decoded response exceeds the configured ceiling.
    #[error("SAML response is too large ({size} bytes, limit is {limit})")]
    OversizedResponse { size: usize, limit: usize },

    /// The configured IdP certificate does not parse as X.509.
    #[error("IdP certificate could not be parsed")]
    InvalidCertificate,

    /// Signature absent or not valid under the configured certificate. The
    /// message deliberately carries no certificate or assertion material.
    #[error("Signature validation failed. SAML Response rejected")]
    InvalidSignature,

    /// The assertion is outside its validity window or names another audience.
    #[error("SAML assertion rejected: {0}")]
    ConditionNotMet(String),

    #[error("The response was received at {received} instead of {expected}")]
    CallbackMismatch { received: String, expected: String },

    #[error("This message has already been processed")]
    Replay,

    /// A mandatory attribute is absent from the assertion.
    #[error("{0} is missing")]
    MissingAttribute(&'static str),

    /// Relay-state verification failed; produced by the external CSRF
    /// collaborator through the callback context.
    #[error("CSRF state verification failed")]
    InvalidCsrfState,

    #[error("replay store failure: {0}")]
    Store(#[from] redb::Error),
}
