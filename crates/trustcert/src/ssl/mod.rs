pub mod ca_manager;
pub mod cert_codec;
pub mod cert_manager;
pub mod cert_store;
pub mod hosts;
pub mod platform;

pub use ca_manager::CaManager;
pub use cert_codec::{
    KeyPair,
    MAX_LEAF_VALIDITY,
    ValidityPeriod,
};
pub use cert_manager::{
    CertManager,
    SignOutcome,
    SignRequest,
    SignedCert,
};
pub use cert_store::{
    CertRecord,
    CertificateStore,
};
pub use hosts::HostAction;
pub use platform::{
    TrustStore,
    detect_trust_store,
};
