use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use log::{
    info,
    warn,
};
use serde::Serialize;

use crate::config::TrustCertConfig;
use crate::error::Result;
use crate::ssl::cert_codec::{
    self,
    ValidityPeriod,
};
use crate::ssl::platform::{
    self,
    TrustStore,
};
use crate::ssl::{
    CaManager,
    CertManager,
    SignRequest,
    SignedCert,
};

#[derive(Debug, Clone, Serialize)]
pub struct InstallResult {
    #[serde(flatten)]
    pub cert: SignedCert,
    pub trusted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UninstallReport {
    /// `false` when the OS refused to drop the CA; its files are kept.
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LeafStatus {
    NotInstalled,
    Installed {
        key_path: PathBuf,
        cert_path: PathBuf,
        validity: ValidityPeriod,
        hosts: Vec<String>,
    },
}

impl fmt::Display for LeafStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafStatus::NotInstalled => write!(f, "not installed"),
            LeafStatus::Installed {
                key_path,
                cert_path,
                validity,
                hosts,
            } => {
                writeln!(f, "key:    {}", key_path.display())?;
                writeln!(f, "cert:   {}", cert_path.display())?;
                writeln!(f, "valid:  {validity}")?;
                write!(f, "hosts:  {}", hosts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaStatus {
    NotCreated,
    Created {
        common_name: String,
        cert_path: PathBuf,
        fingerprint: String,
        validity: ValidityPeriod,
        trusted: bool,
    },
}

impl fmt::Display for CaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaStatus::NotCreated => write!(f, "not created"),
            CaStatus::Created {
                common_name,
                cert_path,
                fingerprint,
                validity,
                trusted,
            } => {
                writeln!(f, "name:   {common_name}")?;
                writeln!(f, "cert:   {}", cert_path.display())?;
                writeln!(f, "sha1:   {fingerprint}")?;
                writeln!(f, "valid:  {validity}")?;
                write!(
                    f,
                    "trust:  {}",
                    if *trusted { "trusted" } else { "not trusted" }
                )
            }
        }
    }
}

/// Entry point tying the CA, leaf issuance and the OS trust store together.
pub struct TrustedCert {
    config: TrustCertConfig,
    ca: CaManager,
    certs: CertManager,
}

impl TrustedCert {
    /// Uses the trust store adapter of the running OS.
    pub fn new(config: TrustCertConfig) -> Result<Self> {
        let trust_store = platform::detect_trust_store(config.command_timeout)?;
        Ok(Self::with_trust_store(config, trust_store))
    }

    pub fn with_trust_store(config: TrustCertConfig, trust_store: Arc<dyn TrustStore>) -> Self {
        Self {
            ca: CaManager::new(&config, trust_store),
            certs: CertManager::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &TrustCertConfig {
        &self.config
    }

    /// Ensures the CA, tries to trust it, then signs the leaf. A trust
    /// failure is reported in the result and does not stop signing.
    pub async fn install(&self, hosts: &[String], overwrite: bool) -> Result<InstallResult> {
        let ca = self.ca.ensure_ca().await?;
        let trusted = self.ca.sync_trust(&ca.cert).await;
        if !trusted {
            warn!("CA is not trusted by the OS; browsers will reject the leaf certificate");
        }

        let request = SignRequest::new(hosts.iter().cloned()).overwrite(overwrite);
        let cert = self.certs.sign(&ca, &request).await?;

        Ok(InstallResult { cert, trusted })
    }

    /// Drops CA trust and CA files, then deletes the leaf files regardless.
    pub async fn uninstall(&self) -> Result<UninstallReport> {
        let ca_removal = self.ca.remove_ca().await;
        self.certs.remove_leaf(self.certs.ssl_name()).await;

        let removed = ca_removal?;
        info!("Uninstalled from {}", self.config.dir.display());
        Ok(UninstallReport { removed })
    }

    pub async fn sign(&self, request: &SignRequest) -> Result<SignedCert> {
        let ca = self.ca.ensure_ca().await?;
        self.certs.sign(&ca, request).await
    }

    pub async fn trust(&self) -> Result<bool> {
        let ca = self.ca.ensure_ca().await?;
        Ok(self.ca.sync_trust(&ca.cert).await)
    }

    pub async fn info(&self) -> Result<LeafStatus> {
        let name = self.certs.ssl_name();
        let Some(leaf) = self.certs.load_leaf(name).await? else {
            return Ok(LeafStatus::NotInstalled);
        };

        Ok(LeafStatus::Installed {
            key_path: self.certs.key_path(name),
            cert_path: self.certs.cert_path(name),
            validity: cert_codec::get_cert_valid_period(&leaf.cert)?,
            hosts: cert_codec::get_cert_hosts(&leaf.cert)?,
        })
    }

    pub async fn ca_info(&self) -> Result<CaStatus> {
        let Some(ca) = self.ca.load_ca().await? else {
            return Ok(CaStatus::NotCreated);
        };

        Ok(CaStatus::Created {
            common_name: cert_codec::get_cert_common_name(&ca.cert)?,
            cert_path: self.ca.cert_path(),
            fingerprint: cert_codec::fingerprint(&ca.cert)?,
            validity: cert_codec::get_cert_valid_period(&ca.cert)?,
            trusted: self.ca.is_trusted(&ca.cert).await?,
        })
    }
}
