#![allow(dead_code)]

use serde::{Deserialize, Deserializer};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

/// Response body of the verifyReceipt service.
///
/// https://developer.apple.com/documentation/appstorereceipts/responsebody
///
/// Only `status` is guaranteed; the rest of the body is present on
/// successful (and expired-subscription) verifications.
#[derive(Debug, Deserialize)]
pub(crate) struct VerifyReceiptResponseModel {
    /// Service status code; `0` means the receipt is valid.
    pub(crate) status: i64,
    /// The decoded receipt the caller submitted.
    pub(crate) receipt: Option<ReceiptFragmentModel>,
    /// For auto-renewable subscriptions, the Base64 blob of the most recent
    /// renewal receipt, supplied alongside the submitted one.
    pub(crate) latest_receipt: Option<String>,
    /// Decoded transaction data of the most recent renewal(s). Depending on
    /// the receipt style the service returns either a single object or an
    /// array.
    pub(crate) latest_receipt_info: Option<LatestReceiptInfoModel>,
}

/// The service's polymorphic single-or-array shape for
/// `latest_receipt_info`, decoded once into an explicit variant instead of
/// being shape-probed at every use site.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum LatestReceiptInfoModel {
    Many(Vec<ReceiptFragmentModel>),
    One(Box<ReceiptFragmentModel>),
}

/// One receipt fragment: either the top-level decoded receipt, an element of
/// its `in_app` array, or a `latest_receipt_info` entry. All fields are
/// independently optional; the service serializes most scalars as strings,
/// even numeric ones, and those are coerced downstream so that a bad value
/// fails loudly rather than decoding to zero.
///
/// Numeric identifiers appear as JSON numbers in current payloads but as
/// decimal strings in legacy ones; both are accepted. Legacy receipts also
/// use the short `bid`/`bvrs` keys for the bundle id and app version.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReceiptFragmentModel {
    pub(crate) quantity: Option<String>,
    pub(crate) product_id: Option<String>,
    pub(crate) transaction_id: Option<String>,

    #[serde(alias = "bid")]
    pub(crate) bundle_id: Option<String>,
    #[serde(alias = "bvrs")]
    pub(crate) application_version: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub(crate) adam_id: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub(crate) app_item_id: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub(crate) version_external_identifier: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub(crate) download_id: Option<i64>,

    pub(crate) purchase_date: Option<String>,
    pub(crate) purchase_date_ms: Option<String>,
    pub(crate) expires_date: Option<String>,
    pub(crate) expires_date_ms: Option<String>,
    pub(crate) cancellation_date: Option<String>,
    pub(crate) cancellation_date_ms: Option<String>,
    pub(crate) request_date: Option<String>,
    pub(crate) request_date_ms: Option<String>,

    /// The service encodes this boolean as the literal string `"true"`.
    /// Other JSON types (a bare boolean, a number) all mean false, so they
    /// decode to `None` instead of failing the whole response.
    #[serde(default, deserialize_with = "string_or_none")]
    pub(crate) is_trial_period: Option<String>,

    pub(crate) original_transaction_id: Option<String>,
    pub(crate) original_purchase_date: Option<String>,
    pub(crate) original_purchase_date_ms: Option<String>,
    pub(crate) original_application_version: Option<String>,

    pub(crate) in_app: Option<Vec<ReceiptFragmentModel>>,
}

fn string_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(value) => Some(value),
        _ => None,
    })
}
