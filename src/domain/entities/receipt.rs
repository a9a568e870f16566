use chrono::{DateTime, Utc};

use crate::domain::entities::environment::Environment;

/// One verified purchase transaction, as decoded from a verifyReceipt
/// response.
///
/// The structure is recursive: a whole-application receipt owns the
/// receipts of its in-app purchases (`in_app`), the first transaction of a
/// renewal chain (`original`), and the most recent renewal record(s) of an
/// auto-renewing subscription (`latest`). All children are owned outright;
/// the format bounds the recursion (an `original` never carries a further
/// `original`), so no sharing or cycle handling is needed.
///
/// A receipt is immutable after construction and lives only as long as its
/// owner; nothing is registered or cached process-wide.
#[derive(Debug)]
pub struct Receipt {
    /// Number of items purchased, when the fragment carries a quantity.
    pub quantity: Option<i64>,
    pub product_id: Option<String>,
    pub transaction_id: Option<String>,

    /// Bundle id of the owning application (`bundle_id`, or `bid` in legacy
    /// receipts). Present exactly on whole-application receipts.
    pub bundle_id: Option<String>,
    /// App version at purchase time (`application_version`/`bvrs`).
    pub application_version: Option<String>,
    pub adam_id: Option<i64>,
    pub app_item_id: Option<i64>,
    pub version_external_identifier: Option<i64>,
    pub download_id: Option<i64>,

    pub purchase_date: Option<DateTime<Utc>>,
    pub purchase_date_ms: Option<i64>,
    pub expires_date: Option<DateTime<Utc>>,
    pub expires_date_ms: Option<i64>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub cancellation_date_ms: Option<i64>,
    pub request_date: Option<DateTime<Utc>>,
    pub request_date_ms: Option<i64>,

    /// True iff the service sent the literal string `"true"`. Any other
    /// value, including absence, is false.
    pub is_trial_period: bool,

    /// The environment this record was verified against. Children inherit
    /// the parent's value; a record obtained through the sandbox-fallback
    /// retry is always `Sandbox`.
    pub itunes_env: Environment,

    /// First transaction of the renewal chain, when the fragment carries an
    /// original transaction id or date. Never nests further.
    pub original: Option<Box<Receipt>>,
    /// In-app purchase sub-receipts, in service order. Present only when the
    /// fragment bears an `in_app` array.
    pub in_app: Option<Vec<Receipt>>,
    /// Most recent renewal record(s) for an auto-renewing subscription.
    pub latest: Option<Latest>,

    /// Base64 blob of the full renewal receipt. Populated only on records
    /// that are themselves `latest` renewal entries.
    pub receipt_data: Option<String>,
    /// Complete decoded response body, retained only on the record built
    /// directly from a status-bearing response, for diagnostics.
    pub raw_attributes: Option<serde_json::Value>,
}

impl Receipt {
    /// True for a whole-application receipt, false for a single in-app
    /// purchase receipt.
    pub fn is_application_receipt(&self) -> bool {
        self.bundle_id.is_some()
    }

    pub fn is_sandbox(&self) -> bool {
        self.itunes_env.is_sandbox()
    }

    /// The `in_app` children, or an empty slice when absent.
    pub fn in_app(&self) -> &[Receipt] {
        self.in_app.as_deref().unwrap_or(&[])
    }

    /// The `latest` renewal records normalized to a slice regardless of the
    /// single-or-array shape the service used.
    pub fn latest(&self) -> &[Receipt] {
        self.latest.as_ref().map(Latest::receipts).unwrap_or(&[])
    }
}

/// The most recent renewal info of an auto-renewing subscription. The
/// service returns either a single object or an array depending on receipt
/// style; the shape is decided once at decode time.
#[derive(Debug)]
pub enum Latest {
    One(Box<Receipt>),
    Many(Vec<Receipt>),
}

impl Latest {
    /// Normalizes either shape to a slice.
    pub fn receipts(&self) -> &[Receipt] {
        match self {
            Latest::One(receipt) => std::slice::from_ref(receipt),
            Latest::Many(receipts) => receipts,
        }
    }
}

/// Read-only queries over a collection of receipts, usable on a receipt's
/// `in_app` children or on its normalized `latest` records.
pub trait ReceiptSet {
    /// Among receipts matching `product_id`, the one with the greatest
    /// purchase date.
    fn latest_by_product_id(&self, product_id: &str) -> Option<&Receipt>;

    /// All receipts matching `product_id`, in collection order.
    fn find_by_product_id(&self, product_id: &str) -> Vec<&Receipt>;

    /// The receipt with the greatest purchase date; ties broken arbitrarily.
    fn latest_receipt(&self) -> Option<&Receipt>;

    /// The receipt with the smallest purchase date; ties broken arbitrarily.
    fn oldest_receipt(&self) -> Option<&Receipt>;

    /// `Some(true)` iff every receipt's expiry is strictly before `now`.
    /// Undefined (`None`) when any receipt lacks an `expires_date`.
    fn all_expired(&self, now: DateTime<Utc>) -> Option<bool>;

    /// The receipt that is its own original: the one whose
    /// `original.transaction_id` equals its own `transaction_id`. Receipts
    /// without an `original` are skipped.
    fn original_receipt(&self) -> Option<&Receipt>;
}

impl ReceiptSet for [Receipt] {
    fn latest_by_product_id(&self, product_id: &str) -> Option<&Receipt> {
        self.iter()
            .filter(|receipt| receipt.product_id.as_deref() == Some(product_id))
            .max_by_key(|receipt| receipt.purchase_date)
    }

    fn find_by_product_id(&self, product_id: &str) -> Vec<&Receipt> {
        self.iter()
            .filter(|receipt| receipt.product_id.as_deref() == Some(product_id))
            .collect()
    }

    fn latest_receipt(&self) -> Option<&Receipt> {
        self.iter().max_by_key(|receipt| receipt.purchase_date)
    }

    fn oldest_receipt(&self) -> Option<&Receipt> {
        self.iter().min_by_key(|receipt| receipt.purchase_date)
    }

    fn all_expired(&self, now: DateTime<Utc>) -> Option<bool> {
        let mut expired = true;
        for receipt in self {
            expired &= receipt.expires_date? < now;
        }
        Some(expired)
    }

    fn original_receipt(&self) -> Option<&Receipt> {
        self.iter().find(|receipt| match &receipt.original {
            Some(original) => {
                original.transaction_id.is_some()
                    && original.transaction_id == receipt.transaction_id
            }
            None => false,
        })
    }
}
