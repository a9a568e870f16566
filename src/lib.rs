pub(crate) mod data {
    pub(crate) mod datasources {
        pub(crate) mod verify_receipt_datasource;
        pub(crate) mod utils;
    }
    pub(crate) mod models {
        pub(crate) mod verify_receipt {
            pub(crate) mod request_model;
            pub(crate) mod response_model;
        }
    }
    pub(crate) mod repositories {
        pub(crate) mod receipt_repository_impl;
    }
}

pub mod domain {
    pub mod entities {
        pub mod environment;
        pub mod receipt;
    }
    pub mod repositories {
        pub mod receipt_repository;
    }
}

pub mod config;
pub mod errors;
pub mod util;

pub use config::VerifyConfig;
pub use domain::entities::environment::Environment;
pub use domain::entities::receipt::{Latest, Receipt, ReceiptSet};
pub use errors::{ParseError, VerifyError};
pub use util::ReceiptVerifier;
