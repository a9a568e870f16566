use async_trait::async_trait;
use log::{debug, warn};

use crate::{
    config::VerifyConfig,
    data::{
        datasources::{
            utils::{parse_receipt_date, parse_receipt_int, parse_receipt_uint},
            verify_receipt_datasource::{VerifyReceiptDatasource, VerifyReceiptDatasourceImpl},
        },
        models::verify_receipt::{
            request_model::VerifyReceiptRequestModel,
            response_model::{
                LatestReceiptInfoModel, ReceiptFragmentModel, VerifyReceiptResponseModel,
            },
        },
    },
    domain::{
        entities::{
            environment::Environment,
            receipt::{Latest, Receipt},
        },
        repositories::receipt_repository::ReceiptRepository,
    },
    errors::{ParseError, VerifyError},
};

pub struct ReceiptRepositoryImpl<D: VerifyReceiptDatasource> {
    datasource: D,
    config: VerifyConfig,
}

#[async_trait]
impl<D: VerifyReceiptDatasource> ReceiptRepository for ReceiptRepositoryImpl<D> {
    async fn verify(
        &self,
        receipt_data: &str,
        allow_sandbox_fallback: bool,
    ) -> Result<Receipt, VerifyError> {
        let request =
            VerifyReceiptRequestModel::new(receipt_data, self.config.shared_secret.clone());
        // The environment is owned immutably by this client, so every
        // round trip of a single call sees the same endpoint choice.
        let environment = self.config.environment;
        debug!("verifying receipt against {}", environment.endpoint());
        let body = self
            .datasource
            .post_verify(environment.endpoint(), &request)
            .await?;
        match classify_response(&body, environment) {
            // Status 21007 means the receipt is real but belongs to the
            // sandbox environment. With the caller's opt-in, re-verify the
            // identical request body against the sandbox endpoint, once. A
            // second rejection is surfaced, not retried.
            Err(VerifyError::SandboxReceiptReceived)
                if allow_sandbox_fallback && environment == Environment::Production =>
            {
                warn!("production endpoint reported a sandbox receipt; retrying against sandbox");
                let body = self
                    .datasource
                    .post_verify(Environment::Sandbox.endpoint(), &request)
                    .await?;
                classify_response(&body, Environment::Sandbox)
            }
            outcome => outcome,
        }
    }
}

impl ReceiptRepositoryImpl<VerifyReceiptDatasourceImpl> {
    pub(crate) fn new(config: VerifyConfig) -> Self {
        Self {
            datasource: VerifyReceiptDatasourceImpl::new(),
            config,
        }
    }
}

impl<D: VerifyReceiptDatasource> ReceiptRepositoryImpl<D> {
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn with_datasource(datasource: D, config: VerifyConfig) -> Self {
        Self { datasource, config }
    }
}

/// Maps a decoded verifyReceipt response to its typed outcome. Pure; all
/// retrying is the verification client's responsibility.
fn classify_response(body: &str, environment: Environment) -> Result<Receipt, VerifyError> {
    let raw: serde_json::Value = serde_json::from_str(body).map_err(ParseError::from)?;
    let model: VerifyReceiptResponseModel =
        serde_json::from_value(raw.clone()).map_err(ParseError::from)?;
    debug!("verification service returned status {}", model.status);
    match model.status {
        0 => receipt_from_response(model, raw, environment),
        21005 => Err(VerifyError::ReceiptServerOffline),
        21006 => {
            // The receipt decoded fine, only the subscription has lapsed;
            // attach the record so callers can still inspect it.
            let receipt = receipt_from_response(model, raw, environment)?;
            Err(VerifyError::ExpiredReceiptReceived {
                receipt: Box::new(receipt),
            })
        }
        21007 => Err(VerifyError::SandboxReceiptReceived),
        status => Err(VerifyError::VerificationFailed {
            status,
            response: raw,
        }),
    }
}

/// Distinguishes ordinary purchase records from `latest_receipt_info`
/// renewal entries; only the latter carry the renewal's full receipt blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiptKind {
    Purchase,
    Latest,
}

/// Top-level entry point of the recursive decode: builds the record for the
/// submitted receipt, attaches the renewal records found alongside it, and
/// keeps the complete response body on the result for diagnostics.
fn receipt_from_response(
    model: VerifyReceiptResponseModel,
    raw: serde_json::Value,
    environment: Environment,
) -> Result<Receipt, VerifyError> {
    let fragment = model.receipt.unwrap_or_default();
    let mut receipt = receipt_from_fragment(fragment, environment, ReceiptKind::Purchase, None)?;
    receipt.latest = latest_from_response(
        model.latest_receipt_info,
        model.latest_receipt.as_deref(),
        environment,
    )?;
    receipt.raw_attributes = Some(raw);
    Ok(receipt)
}

fn receipt_from_fragment(
    m: ReceiptFragmentModel,
    environment: Environment,
    kind: ReceiptKind,
    latest_receipt: Option<&str>,
) -> Result<Receipt, VerifyError> {
    // The original transaction is reconstructed from the handful of
    // original_* keys scoped to it. The synthesized fragment carries no
    // original_* keys of its own, which bounds the recursion at one level.
    let original = if m.original_transaction_id.is_some() || m.original_purchase_date.is_some() {
        let nested = ReceiptFragmentModel {
            transaction_id: m.original_transaction_id.clone(),
            purchase_date: m.original_purchase_date.clone(),
            purchase_date_ms: m.original_purchase_date_ms.clone(),
            application_version: m.original_application_version.clone(),
            ..Default::default()
        };
        Some(Box::new(receipt_from_fragment(
            nested,
            environment,
            ReceiptKind::Purchase,
            None,
        )?))
    } else {
        None
    };

    let in_app = m
        .in_app
        .map(|children| {
            children
                .into_iter()
                .map(|child| {
                    receipt_from_fragment(child, environment, ReceiptKind::Purchase, None)
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    Ok(Receipt {
        quantity: m
            .quantity
            .as_deref()
            .map(|v| parse_receipt_uint("quantity", v))
            .transpose()?,
        product_id: m.product_id,
        transaction_id: m.transaction_id,
        bundle_id: m.bundle_id,
        application_version: m.application_version,
        adam_id: m.adam_id,
        app_item_id: m.app_item_id,
        version_external_identifier: m.version_external_identifier,
        download_id: m.download_id,
        purchase_date: m
            .purchase_date
            .as_deref()
            .map(|v| parse_receipt_date("purchase_date", v))
            .transpose()?,
        purchase_date_ms: m
            .purchase_date_ms
            .as_deref()
            .map(|v| parse_receipt_int("purchase_date_ms", v))
            .transpose()?,
        expires_date: m
            .expires_date
            .as_deref()
            .map(|v| parse_receipt_date("expires_date", v))
            .transpose()?,
        expires_date_ms: m
            .expires_date_ms
            .as_deref()
            .map(|v| parse_receipt_int("expires_date_ms", v))
            .transpose()?,
        cancellation_date: m
            .cancellation_date
            .as_deref()
            .map(|v| parse_receipt_date("cancellation_date", v))
            .transpose()?,
        cancellation_date_ms: m
            .cancellation_date_ms
            .as_deref()
            .map(|v| parse_receipt_int("cancellation_date_ms", v))
            .transpose()?,
        request_date: m
            .request_date
            .as_deref()
            .map(|v| parse_receipt_date("request_date", v))
            .transpose()?,
        request_date_ms: m
            .request_date_ms
            .as_deref()
            .map(|v| parse_receipt_int("request_date_ms", v))
            .transpose()?,
        // The service encodes the flag as the literal string "true"; any
        // other value, including absence, is false.
        is_trial_period: m.is_trial_period.as_deref() == Some("true"),
        itunes_env: environment,
        original,
        in_app,
        latest: None,
        receipt_data: match kind {
            ReceiptKind::Latest => latest_receipt.map(str::to_string),
            ReceiptKind::Purchase => None,
        },
        raw_attributes: None,
    })
}

fn latest_from_response(
    info: Option<LatestReceiptInfoModel>,
    latest_receipt: Option<&str>,
    environment: Environment,
) -> Result<Option<Latest>, VerifyError> {
    Ok(match info {
        None => None,
        Some(LatestReceiptInfoModel::One(fragment)) => Some(Latest::One(Box::new(
            receipt_from_fragment(*fragment, environment, ReceiptKind::Latest, latest_receipt)?,
        ))),
        Some(LatestReceiptInfoModel::Many(fragments)) => Some(Latest::Many(
            fragments
                .into_iter()
                .map(|fragment| {
                    receipt_from_fragment(fragment, environment, ReceiptKind::Latest, latest_receipt)
                })
                .collect::<Result<Vec<_>, _>>()?,
        )),
    })
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::Mutex,
    };

    use chrono::{DateTime, Utc};

    use super::*;

    struct MockDatasource {
        responses: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<(String, VerifyReceiptRequestModel)>>,
    }

    impl MockDatasource {
        fn scripted(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, VerifyReceiptRequestModel)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VerifyReceiptDatasource for MockDatasource {
        async fn post_verify(
            &self,
            url: &str,
            request: &VerifyReceiptRequestModel,
        ) -> Result<String, VerifyError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), request.clone()));
            match self.responses.lock().unwrap().pop_front() {
                Some(body) => Ok(body),
                None => Err(VerifyError::Transport(Box::new(std::io::Error::other(
                    "connection refused",
                )))),
            }
        }
    }

    fn repository(
        config: VerifyConfig,
        responses: &[&str],
    ) -> ReceiptRepositoryImpl<MockDatasource> {
        ReceiptRepositoryImpl::with_datasource(MockDatasource::scripted(responses), config)
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn status_zero_builds_receipt_with_matching_fields() {
        let repo = repository(
            VerifyConfig::production(),
            &[r#"{"status":0,"receipt":{"product_id":"com.example.a","transaction_id":"123","purchase_date":"2011-02-17 06:20:57 Etc/GMT"}}"#],
        );
        let receipt = repo.verify("(receipt)", false).await.unwrap();
        assert_eq!(receipt.product_id.as_deref(), Some("com.example.a"));
        assert_eq!(receipt.transaction_id.as_deref(), Some("123"));
        assert_eq!(receipt.purchase_date, Some(utc("2011-02-17T06:20:57Z")));
        assert!(receipt.original.is_none());
        assert!(!receipt.is_application_receipt());
        assert_eq!(receipt.itunes_env, Environment::Production);
        // Diagnostics are kept only on the top-level record.
        assert_eq!(receipt.raw_attributes.as_ref().unwrap()["status"], 0);
    }

    #[tokio::test]
    async fn application_receipt_maps_in_app_children() {
        let repo = repository(
            VerifyConfig::production(),
            &[r#"{"status":0,"receipt":{"bundle_id":"com.example.app","in_app":[
                {"product_id":"com.example.a","transaction_id":"1","quantity":"1",
                 "original_transaction_id":"1","original_purchase_date_ms":"1297923657000"},
                {"product_id":"com.example.b","transaction_id":"2","quantity":"2"}
            ]}}"#],
        );
        let receipt = repo.verify("(receipt)", false).await.unwrap();
        assert!(receipt.is_application_receipt());
        assert!(receipt.product_id.is_none());
        let in_app = receipt.in_app();
        assert_eq!(in_app.len(), 2);
        assert_eq!(in_app[0].quantity, Some(1));
        assert_eq!(in_app[0].itunes_env, Environment::Production);
        assert!(in_app[0].raw_attributes.is_none());
        // Children may carry their own original transaction.
        let original = in_app[0].original.as_ref().unwrap();
        assert_eq!(original.transaction_id.as_deref(), Some("1"));
        assert_eq!(original.purchase_date_ms, Some(1297923657000));
        assert!(original.original.is_none());
        assert!(in_app[1].original.is_none());
    }

    #[tokio::test]
    async fn original_is_built_from_original_scoped_keys() {
        let repo = repository(
            VerifyConfig::production(),
            &[r#"{"status":0,"receipt":{"transaction_id":"2","product_id":"com.example.a",
                "original_transaction_id":"1","original_purchase_date":"2011-02-17 06:20:57 Etc/GMT",
                "original_application_version":"1.0"}}"#],
        );
        let receipt = repo.verify("(receipt)", false).await.unwrap();
        let original = receipt.original.as_ref().unwrap();
        assert_eq!(original.transaction_id.as_deref(), Some("1"));
        assert_eq!(original.purchase_date, Some(utc("2011-02-17T06:20:57Z")));
        assert_eq!(original.application_version.as_deref(), Some("1.0"));
        // Original-scoped fields only; nothing else leaks in.
        assert!(original.product_id.is_none());
        assert!(original.raw_attributes.is_none());
    }

    #[tokio::test]
    async fn latest_object_becomes_one_with_receipt_data() {
        let repo = repository(
            VerifyConfig::production(),
            &[r#"{"status":0,"receipt":{"product_id":"com.example.sub"},
                "latest_receipt":"bGF0ZXN0",
                "latest_receipt_info":{"product_id":"com.example.sub","transaction_id":"9"}}"#],
        );
        let receipt = repo.verify("(receipt)", false).await.unwrap();
        match receipt.latest.as_ref().unwrap() {
            Latest::One(renewal) => {
                assert_eq!(renewal.transaction_id.as_deref(), Some("9"));
                assert_eq!(renewal.receipt_data.as_deref(), Some("bGF0ZXN0"));
            }
            other => panic!("expected single latest record, got {other:?}"),
        }
        // The blob belongs to renewal records only.
        assert!(receipt.receipt_data.is_none());
    }

    #[tokio::test]
    async fn latest_array_becomes_many_sharing_receipt_data() {
        let repo = repository(
            VerifyConfig::production(),
            &[r#"{"status":0,"receipt":{"product_id":"com.example.sub"},
                "latest_receipt":"bGF0ZXN0",
                "latest_receipt_info":[{"transaction_id":"8"},{"transaction_id":"9"}]}"#],
        );
        let receipt = repo.verify("(receipt)", false).await.unwrap();
        let renewals = receipt.latest();
        assert_eq!(renewals.len(), 2);
        for renewal in renewals {
            assert_eq!(renewal.receipt_data.as_deref(), Some("bGF0ZXN0"));
        }
    }

    #[tokio::test]
    async fn status_21005_is_server_offline() {
        let repo = repository(VerifyConfig::production(), &[r#"{"status":21005}"#]);
        let err = repo.verify("(receipt)", false).await.unwrap_err();
        assert!(matches!(err, VerifyError::ReceiptServerOffline));
    }

    #[tokio::test]
    async fn status_21006_carries_the_parsed_receipt() {
        let repo = repository(
            VerifyConfig::production(),
            &[r#"{"status":21006,"receipt":{"product_id":"com.example.sub","transaction_id":"5"}}"#],
        );
        let err = repo.verify("(receipt)", false).await.unwrap_err();
        match err {
            VerifyError::ExpiredReceiptReceived { receipt } => {
                assert_eq!(receipt.product_id.as_deref(), Some("com.example.sub"));
            }
            other => panic!("expected expired receipt error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_21007_without_fallback_is_surfaced() {
        let repo = repository(VerifyConfig::production(), &[r#"{"status":21007}"#]);
        let err = repo.verify("(receipt)", false).await.unwrap_err();
        assert!(matches!(err, VerifyError::SandboxReceiptReceived));
        assert_eq!(repo.datasource.calls().len(), 1);
    }

    #[tokio::test]
    async fn status_21007_with_fallback_retries_against_sandbox() {
        let repo = repository(
            VerifyConfig::production(),
            &[
                r#"{"status":21007}"#,
                r#"{"status":0,"receipt":{"product_id":"com.example.a"}}"#,
            ],
        );
        let receipt = repo.verify("(receipt)", true).await.unwrap();
        assert_eq!(receipt.itunes_env, Environment::Sandbox);
        assert!(receipt.is_sandbox());

        let calls = repo.datasource.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, Environment::Production.endpoint());
        assert_eq!(calls[1].0, Environment::Sandbox.endpoint());
        // The identical body is re-posted.
        assert_eq!(calls[0].1.receipt_data, calls[1].1.receipt_data);
        assert_eq!(calls[0].1.password, calls[1].1.password);
    }

    #[tokio::test]
    async fn second_sandbox_rejection_is_not_retried_again() {
        let repo = repository(
            VerifyConfig::production(),
            &[r#"{"status":21007}"#, r#"{"status":21007}"#],
        );
        let err = repo.verify("(receipt)", true).await.unwrap_err();
        assert!(matches!(err, VerifyError::SandboxReceiptReceived));
        assert_eq!(repo.datasource.calls().len(), 2);
    }

    #[tokio::test]
    async fn sandbox_configured_client_never_falls_back() {
        let repo = repository(VerifyConfig::sandbox(), &[r#"{"status":21007}"#]);
        let err = repo.verify("(receipt)", true).await.unwrap_err();
        assert!(matches!(err, VerifyError::SandboxReceiptReceived));
        let calls = repo.datasource.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Environment::Sandbox.endpoint());
    }

    #[tokio::test]
    async fn unknown_status_is_generic_verification_failure() {
        let repo = repository(VerifyConfig::production(), &[r#"{"status":21010}"#]);
        let err = repo.verify("(receipt)", false).await.unwrap_err();
        match err {
            VerifyError::VerificationFailed { status, response } => {
                assert_eq!(status, 21010);
                assert_eq!(response["status"], 21010);
            }
            other => panic!("expected verification failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shared_secret_is_sent_only_when_configured() {
        let repo = repository(
            VerifyConfig::production().with_shared_secret("hey"),
            &[r#"{"status":0,"receipt":{}}"#],
        );
        repo.verify("(receipt)", false).await.unwrap();
        assert_eq!(repo.datasource.calls()[0].1.password.as_deref(), Some("hey"));

        let repo = repository(VerifyConfig::production(), &[r#"{"status":0,"receipt":{}}"#]);
        repo.verify("(receipt)", false).await.unwrap();
        assert!(repo.datasource.calls()[0].1.password.is_none());
    }

    #[tokio::test]
    async fn bad_quantity_is_a_parse_error_not_zero() {
        for quantity in ["lots", "-1"] {
            let body = format!(r#"{{"status":0,"receipt":{{"quantity":"{quantity}"}}}}"#);
            let repo = repository(VerifyConfig::production(), &[&body]);
            let err = repo.verify("(receipt)", false).await.unwrap_err();
            assert!(matches!(
                err,
                VerifyError::Parse(ParseError::Integer { field: "quantity", .. })
            ));
        }
    }

    #[tokio::test]
    async fn trial_period_recognizes_only_the_literal_true() {
        let repo = repository(
            VerifyConfig::production(),
            &[r#"{"status":0,"receipt":{"is_trial_period":"true"}}"#],
        );
        assert!(repo.verify("(receipt)", false).await.unwrap().is_trial_period);

        for value in [r#""TRUE""#, r#""1""#, r#""yes""#] {
            let body = format!(r#"{{"status":0,"receipt":{{"is_trial_period":{value}}}}}"#);
            let repo = repository(VerifyConfig::production(), &[&body]);
            assert!(!repo.verify("(receipt)", false).await.unwrap().is_trial_period);
        }
    }

    #[tokio::test]
    async fn non_string_trial_period_is_false_not_an_error() {
        // A bare JSON boolean is not the literal string "true", so it means
        // false; it must not reject an otherwise valid response.
        for value in ["true", "false", "1"] {
            let body = format!(
                r#"{{"status":0,"receipt":{{"product_id":"p","is_trial_period":{value}}}}}"#
            );
            let repo = repository(VerifyConfig::production(), &[&body]);
            let receipt = repo.verify("(receipt)", false).await.unwrap();
            assert!(!receipt.is_trial_period);
            assert_eq!(receipt.product_id.as_deref(), Some("p"));
        }
    }

    #[tokio::test]
    async fn malformed_response_body_is_a_parse_error() {
        let repo = repository(VerifyConfig::production(), &["not json"]);
        let err = repo.verify("(receipt)", false).await.unwrap_err();
        assert!(matches!(err, VerifyError::Parse(ParseError::Json(_))));
    }

    #[tokio::test]
    async fn transport_failures_propagate_untouched() {
        let repo = repository(VerifyConfig::production(), &[]);
        let err = repo.verify("(receipt)", false).await.unwrap_err();
        assert!(matches!(err, VerifyError::Transport(_)));
    }
}
