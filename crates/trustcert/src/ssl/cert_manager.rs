use std::fmt;
use std::path::PathBuf;

use log::{
    debug,
    info,
    warn,
};
use serde::Serialize;
use time::Duration;

use super::cert_codec::{
    self,
    KeyPair,
    LeafParams,
    MAX_LEAF_VALIDITY,
};
use super::cert_store::{
    CertRecord,
    CertificateStore,
};
use super::hosts::{
    self,
    HostAction,
};
use crate::config::TrustCertConfig;
use crate::error::{
    Error,
    Result,
};

/// What `sign` did to the stored leaf certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignOutcome {
    /// Existing certificate already covered the request; nothing written.
    Reused,
    /// No certificate existed; a new key and certificate were written.
    Created,
    /// Re-signed with the existing key over the union of old and new hosts.
    Extended,
    /// Re-signed over the requested hosts, forced or because the old
    /// certificate was expired or issued by another CA.
    Regenerated,
}

impl fmt::Display for SignOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SignOutcome::Reused => "reused",
            SignOutcome::Created => "created",
            SignOutcome::Extended => "extended",
            SignOutcome::Regenerated => "regenerated",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignRequest {
    pub hosts: Vec<String>,
    pub overwrite: bool,
    /// Leaf file name; the configured ssl name when unset.
    pub name: Option<String>,
    /// Leaf lifetime; `MAX_LEAF_VALIDITY` when unset.
    pub expires_in: Option<Duration>,
}

impl SignRequest {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignedCert {
    pub key_pem: String,
    pub cert_pem: String,
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
    pub hosts: Vec<String>,
    pub outcome: SignOutcome,
}

/// Issues and maintains leaf certificates signed by the local CA.
pub struct CertManager {
    store: CertificateStore,
    ssl_name: String,
    key_bits: u32,
}

impl CertManager {
    pub fn new(config: &TrustCertConfig) -> Self {
        Self {
            store: CertificateStore::new(&config.dir),
            ssl_name: config.ssl_name.clone(),
            key_bits: config.key_bits,
        }
    }

    pub fn ssl_name(&self) -> &str {
        &self.ssl_name
    }

    pub fn cert_path(&self, name: &str) -> PathBuf {
        self.store.cert_path(name)
    }

    pub fn key_path(&self, name: &str) -> PathBuf {
        self.store.key_path(name)
    }

    pub async fn load_leaf(&self, name: &str) -> Result<Option<CertRecord>> {
        self.store.load(name).await
    }

    pub async fn remove_leaf(&self, name: &str) {
        self.store.remove(name).await
    }

    /// Returns the stored leaf untouched when it is signed by `ca`, still
    /// valid and already covers the requested hosts. Otherwise re-signs,
    /// keeping the stored key when there is one.
    pub async fn sign(&self, ca: &CertRecord, request: &SignRequest) -> Result<SignedCert> {
        let name = request.name.as_deref().unwrap_or(&self.ssl_name);
        let requested = hosts::dedup(&request.hosts);

        self.store.ensure_dir().await?;
        let existing = self.store.load(name).await?;

        let (outcome, hosts) = match &existing {
            None => (SignOutcome::Created, requested),
            Some(leaf) => {
                let current = cert_codec::get_cert_hosts(&leaf.cert)?;
                let reconciliation = hosts::reconcile(&current, &requested, request.overwrite);

                match reconciliation.action {
                    HostAction::Regenerate => (SignOutcome::Regenerated, reconciliation.hosts),
                    HostAction::Extend => (SignOutcome::Extended, reconciliation.hosts),
                    HostAction::Reuse => {
                        let signed_by_ca = cert_codec::is_cert_signed_by_ca(&leaf.cert, &ca.cert)?;
                        let time_valid = cert_codec::is_cert_valid(&leaf.cert)?;

                        if signed_by_ca && time_valid {
                            debug!("Leaf {} already covers {:?}", name, requested);
                            return self.artifact(name, leaf, SignOutcome::Reused);
                        }

                        info!(
                            "Leaf {} is expired or not signed by the current CA, re-signing",
                            name
                        );
                        (SignOutcome::Regenerated, reconciliation.hosts)
                    }
                }
            }
        };

        if hosts.is_empty() {
            return Err(Error::NoHosts);
        }

        let expires_in = request.expires_in.unwrap_or(MAX_LEAF_VALIDITY);
        if expires_in > MAX_LEAF_VALIDITY {
            warn!(
                "Requested lifetime of {} days exceeds the {} day limit browsers accept",
                expires_in.whole_days(),
                MAX_LEAF_VALIDITY.whole_days()
            );
        }

        let key = match existing {
            Some(leaf) => leaf.key,
            None => {
                let key = KeyPair::generate(self.key_bits).await?;
                self.store.write_key(name, &key).await?;
                key
            }
        };

        info!("Signing {} for {:?} ({})", name, hosts, outcome);
        let public_key = key.public_key()?;
        let cert = cert_codec::create_cert(LeafParams {
            ca_key: &ca.key,
            ca_subject: ca.cert.subject_name(),
            public_key: &public_key,
            hosts: &hosts,
            expires_in,
        })?;
        self.store.write_cert(name, &cert).await?;

        self.artifact(name, &CertRecord { cert, key }, outcome)
    }

    fn artifact(&self, name: &str, leaf: &CertRecord, outcome: SignOutcome) -> Result<SignedCert> {
        Ok(SignedCert {
            key_pem: leaf.key.to_pem()?,
            cert_pem: cert_codec::cert_to_pem(&leaf.cert)?,
            key_path: self.store.key_path(name),
            cert_path: self.store.cert_path(name),
            hosts: cert_codec::get_cert_hosts(&leaf.cert)?,
            outcome,
        })
    }
}
