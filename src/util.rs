use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::{
    config::VerifyConfig,
    data::{
        datasources::verify_receipt_datasource::VerifyReceiptDatasourceImpl,
        repositories::receipt_repository_impl::ReceiptRepositoryImpl,
    },
    domain::{entities::receipt::Receipt, repositories::receipt_repository::ReceiptRepository},
    errors::VerifyError,
};

/// Entry point for receipt verification.
///
/// ```no_run
/// use itunes_receipt::{ReceiptVerifier, VerifyConfig};
///
/// # async fn example() -> Result<(), itunes_receipt::VerifyError> {
/// let verifier = ReceiptVerifier::new(VerifyConfig::production().with_shared_secret("hey"));
/// let receipt = verifier.verify("bGVhc3QgcmVjZWlwdA==", true).await?;
/// println!("{:?}", receipt.product_id);
/// # Ok(())
/// # }
/// ```
pub struct ReceiptVerifier<R: ReceiptRepository> {
    receipt_repository: R,
}

impl<R: ReceiptRepository> ReceiptVerifier<R> {
    /// Verifies a Base64-encoded receipt blob. See
    /// [`ReceiptRepository::verify`] for the sandbox-fallback semantics.
    pub async fn verify(
        &self,
        receipt_data: &str,
        allow_sandbox_fallback: bool,
    ) -> Result<Receipt, VerifyError> {
        self.receipt_repository
            .verify(receipt_data, allow_sandbox_fallback)
            .await
    }

    /// Verifies a raw (not yet Base64-encoded) receipt, encoding it first.
    pub async fn verify_raw(
        &self,
        receipt: &[u8],
        allow_sandbox_fallback: bool,
    ) -> Result<Receipt, VerifyError> {
        self.receipt_repository
            .verify(&BASE64.encode(receipt), allow_sandbox_fallback)
            .await
    }
}

impl ReceiptVerifier<ReceiptRepositoryImpl<VerifyReceiptDatasourceImpl>> {
    /// Builds a verifier backed by the real verifyReceipt service. The
    /// configuration is snapshotted here; later calls all use it unchanged.
    pub fn new(config: VerifyConfig) -> Self {
        Self {
            receipt_repository: ReceiptRepositoryImpl::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct RecordingRepository {
        submitted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReceiptRepository for RecordingRepository {
        async fn verify(
            &self,
            receipt_data: &str,
            _allow_sandbox_fallback: bool,
        ) -> Result<Receipt, VerifyError> {
            self.submitted.lock().unwrap().push(receipt_data.to_string());
            Err(VerifyError::ReceiptServerOffline)
        }
    }

    #[tokio::test]
    async fn verify_raw_base64_encodes_before_submission() {
        let verifier = ReceiptVerifier {
            receipt_repository: RecordingRepository {
                submitted: Mutex::new(Vec::new()),
            },
        };
        let _ = verifier.verify_raw(b"raw receipt bytes", false).await;
        let _ = verifier.verify("already-encoded", false).await;

        let submitted = verifier.receipt_repository.submitted.lock().unwrap();
        assert_eq!(submitted[0], "cmF3IHJlY2VpcHQgYnl0ZXM=");
        assert_eq!(submitted[1], "already-encoded");
    }
}
