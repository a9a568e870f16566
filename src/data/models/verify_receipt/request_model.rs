use serde::Serialize;

/// Request body for the verifyReceipt service.
///
/// https://developer.apple.com/documentation/appstorereceipts/requestbody
#[derive(Debug, Clone, Serialize)]
pub(crate) struct VerifyReceiptRequestModel {
    /// The Base64-encoded receipt blob, exactly as produced by the device.
    #[serde(rename = "receipt-data")]
    pub(crate) receipt_data: String,
    /// The app's shared secret. The service rejects a null or empty value,
    /// so the key is omitted entirely when no secret is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) password: Option<String>,
}

impl VerifyReceiptRequestModel {
    pub(crate) fn new(receipt_data: impl Into<String>, password: Option<String>) -> Self {
        Self {
            receipt_data: receipt_data.into(),
            password,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_receipt_data_under_hyphenated_key() {
        let body =
            serde_json::to_value(VerifyReceiptRequestModel::new("(receipt)", None)).unwrap();
        assert_eq!(body["receipt-data"], "(receipt)");
    }

    #[test]
    fn password_key_present_only_when_secret_is_set() {
        let with_secret = serde_json::to_value(VerifyReceiptRequestModel::new(
            "(receipt)",
            Some("hey".to_string()),
        ))
        .unwrap();
        assert_eq!(with_secret["password"], "hey");

        let without_secret =
            serde_json::to_value(VerifyReceiptRequestModel::new("(receipt)", None)).unwrap();
        assert!(without_secret.as_object().unwrap().get("password").is_none());
    }
}
