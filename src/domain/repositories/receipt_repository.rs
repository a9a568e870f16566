use async_trait::async_trait;

use crate::{domain::entities::receipt::Receipt, errors::VerifyError};

#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    /// Submits a Base64-encoded receipt blob to the verification service and
    /// decodes the reply into a [`Receipt`].
    ///
    /// With `allow_sandbox_fallback`, a production verification answered
    /// with status 21007 (sandbox receipt) is re-submitted once to the
    /// sandbox endpoint, and a receipt obtained that way is tagged with the
    /// sandbox environment. Without it, the 21007 failure is surfaced
    /// directly.
    async fn verify(
        &self,
        receipt_data: &str,
        allow_sandbox_fallback: bool,
    ) -> Result<Receipt, VerifyError>;
}
