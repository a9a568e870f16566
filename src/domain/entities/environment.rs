/// The verification environment a receipt belongs to.
///
/// Apple runs two verifyReceipt deployments: one for live App Store
/// purchases and one for sandbox (test) purchases. A receipt issued in one
/// environment only verifies against that environment's endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Production,
    Sandbox,
}

const PRODUCTION_ENDPOINT: &str = "https://buy.itunes.apple.com/verifyReceipt";
const SANDBOX_ENDPOINT: &str = "https://sandbox.itunes.apple.com/verifyReceipt";

impl Environment {
    /// The fixed verifyReceipt URL for this environment.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_ENDPOINT,
            Environment::Sandbox => SANDBOX_ENDPOINT,
        }
    }

    pub fn is_sandbox(&self) -> bool {
        matches!(self, Environment::Sandbox)
    }
}
