use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::{data::models::verify_receipt::request_model::VerifyReceiptRequestModel, errors::VerifyError};

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// The injected transport boundary: POST a verification request body to an
/// endpoint and hand back the raw response body.
///
/// Timeouts and cancellation are entirely this layer's concern (reqwest's,
/// in the default implementation); failures surface as
/// [`VerifyError::Transport`] and are never retried here.
#[async_trait]
pub trait VerifyReceiptDatasource: Send + Sync {
    /// Verify Receipt:
    /// https://developer.apple.com/documentation/appstorereceipts/verifyreceipt
    ///
    /// url:
    ///   The production or sandbox verifyReceipt endpoint.
    async fn post_verify(
        &self,
        url: &str,
        request: &VerifyReceiptRequestModel,
    ) -> Result<String, VerifyError>;
}

pub struct VerifyReceiptDatasourceImpl;

#[async_trait]
impl VerifyReceiptDatasource for VerifyReceiptDatasourceImpl {
    async fn post_verify(
        &self,
        url: &str,
        request: &VerifyReceiptRequestModel,
    ) -> Result<String, VerifyError> {
        let response = HTTP_CLIENT
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| VerifyError::Transport(Box::new(e)))?
            .error_for_status()
            .map_err(|e| VerifyError::Transport(Box::new(e)))?;
        response
            .text()
            .await
            .map_err(|e| VerifyError::Transport(Box::new(e)))
    }
}

impl VerifyReceiptDatasourceImpl {
    pub(crate) fn new() -> Self {
        Self
    }
}
