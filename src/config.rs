use crate::domain::entities::environment::Environment;

/// Configuration for a verification client.
///
/// Held immutably by the client for its whole lifetime, so an in-flight call
/// can never observe a mid-call environment or secret change. Construct a new
/// client to verify against a different environment.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// The environment whose endpoint receives the initial request.
    pub environment: Environment,
    /// App-specific shared secret, required by Apple for receipts containing
    /// auto-renewable subscriptions. When `None`, the request body carries no
    /// `password` key at all.
    pub shared_secret: Option<String>,
}

impl VerifyConfig {
    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            shared_secret: None,
        }
    }

    pub fn sandbox() -> Self {
        Self {
            environment: Environment::Sandbox,
            shared_secret: None,
        }
    }

    pub fn with_shared_secret(mut self, shared_secret: impl Into<String>) -> Self {
        self.shared_secret = Some(shared_secret.into());
        self
    }
}
