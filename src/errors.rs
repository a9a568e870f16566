use thiserror::Error;

use crate::domain::entities::receipt::Receipt;

/// Failure during decoding of a verification response into a [`Receipt`].
///
/// Any parse failure is fatal to the construction of the record it occurred
/// in; there are no partial or best-effort records.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("verification response was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unparseable date {value:?} in field `{field}`")]
    Date { field: &'static str, value: String },

    #[error("expected integer in field `{field}`, got {value:?}")]
    Integer { field: &'static str, value: String },
}

/// Outcome of a failed verification attempt.
///
/// Maps the verifyReceipt service's numeric status codes to typed failures.
/// Everything is surfaced to the immediate caller of `verify`; the single
/// sandbox-fallback retry on [`VerifyError::SandboxReceiptReceived`] is the
/// only internal recovery.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Network/HTTP layer failure. The response (if any) is not decoded and
    /// the call is never retried by this layer.
    #[error("transport error calling the verification service")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response decoding or field coercion failure.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Any non-zero status without dedicated handling. Carries the raw
    /// response body for diagnostics.
    #[error("receipt verification failed with status {status}")]
    VerificationFailed {
        status: i64,
        response: serde_json::Value,
    },

    /// Status 21007: the receipt is a sandbox receipt presented to the
    /// production endpoint. Recoverable by re-verifying against the sandbox
    /// endpoint, which the client does once when the caller opted in.
    #[error("sandbox receipt sent to the production verification service (status 21007)")]
    SandboxReceiptReceived,

    /// Status 21005: the verification server is temporarily unavailable.
    #[error("receipt verification server is offline (status 21005)")]
    ReceiptServerOffline,

    /// Status 21006: the receipt is valid but the subscription has expired.
    /// The decoded receipt is still attached for inspection.
    #[error("receipt has expired (status 21006)")]
    ExpiredReceiptReceived { receipt: Box<Receipt> },
}
