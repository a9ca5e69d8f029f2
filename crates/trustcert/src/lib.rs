pub mod config;
pub mod error;
pub mod ssl;
mod trusted_cert;

pub use config::TrustCertConfig;
pub use error::{
    Error,
    Result,
};
pub use ssl::{
    HostAction,
    KeyPair,
    MAX_LEAF_VALIDITY,
    SignOutcome,
    SignRequest,
    SignedCert,
    TrustStore,
    ValidityPeriod,
};
pub use trusted_cert::{
    CaStatus,
    InstallResult,
    LeafStatus,
    TrustedCert,
    UninstallReport,
};
