use std::path::PathBuf;
use std::sync::Arc;

use log::{
    debug,
    info,
    warn,
};
use openssl::x509::X509Ref;

use super::cert_codec::{
    self,
    KeyPair,
};
use super::cert_store::{
    CertRecord,
    CertificateStore,
};
use super::platform::TrustStore;
use crate::config::TrustCertConfig;
use crate::error::{
    Error,
    Result,
};

/// Owns the local root CA: lazy creation, trust synchronization and removal.
pub struct CaManager {
    store: CertificateStore,
    trust_store: Arc<dyn TrustStore>,
    ca_name: String,
    common_name: String,
    key_bits: u32,
}

impl CaManager {
    pub fn new(config: &TrustCertConfig, trust_store: Arc<dyn TrustStore>) -> Self {
        Self {
            store: CertificateStore::new(&config.dir),
            trust_store,
            ca_name: config.ca_name.clone(),
            common_name: config.ca_common_name.clone(),
            key_bits: config.key_bits,
        }
    }

    pub fn cert_path(&self) -> PathBuf {
        self.store.cert_path(&self.ca_name)
    }

    pub fn key_path(&self) -> PathBuf {
        self.store.key_path(&self.ca_name)
    }

    pub async fn load_ca(&self) -> Result<Option<CertRecord>> {
        self.store.load(&self.ca_name).await
    }

    /// Loads the CA, creating and persisting it when its files are absent.
    pub async fn ensure_ca(&self) -> Result<CertRecord> {
        if let Some(ca) = self.load_ca().await? {
            debug!("Using existing CA from {}", self.cert_path().display());
            return Ok(ca);
        }

        info!("Creating CA \"{}\"", self.common_name);
        self.create_ca()
            .await
            .map_err(|e| Error::CaCreation(Box::new(e)))
    }

    async fn create_ca(&self) -> Result<CertRecord> {
        let key = KeyPair::generate(self.key_bits).await?;
        let cert = cert_codec::create_ca_cert(&key, &self.common_name)?;

        self.store.ensure_dir().await?;
        self.store.write_key(&self.ca_name, &key).await?;
        let path = self.store.write_cert(&self.ca_name, &cert).await?;
        info!("CA written to {}", path.display());

        Ok(CertRecord { cert, key })
    }

    /// Time-valid and present in the OS trust store right now. The trust
    /// store is queried on every call.
    pub async fn is_trusted(&self, ca: &X509Ref) -> Result<bool> {
        if !cert_codec::is_cert_valid(ca)? {
            debug!("CA is outside its validity window");
            return Ok(false);
        }

        let common_name = cert_codec::get_cert_common_name(ca)?;
        let fingerprint = cert_codec::fingerprint(ca)?;

        match self.trust_store.hash_list(&common_name).await {
            Ok(hashes) => {
                debug!("Trusted fingerprints for {}: {:?}", common_name, hashes);
                Ok(hashes.contains(&fingerprint))
            }
            Err(e) => {
                warn!("Failed to query trust store for {}: {}", common_name, e);
                Ok(false)
            }
        }
    }

    /// Adds the CA to the OS trust store unless it is already trusted.
    /// Failures are logged and reported as `false`; nothing is retried.
    pub async fn sync_trust(&self, ca: &X509Ref) -> bool {
        match self.is_trusted(ca).await {
            Ok(true) => {
                debug!("CA already trusted");
                return true;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Cannot inspect CA trust: {}", e);
                return false;
            }
        }

        let common_name = match cert_codec::get_cert_common_name(ca) {
            Ok(common_name) => common_name,
            Err(e) => {
                warn!("Cannot trust CA: {}", e);
                return false;
            }
        };

        info!(
            "Adding CA \"{}\" to the {} trust store",
            common_name,
            self.trust_store.platform()
        );
        match self.trust_store.add(&common_name, &self.cert_path()).await {
            Ok(()) => {
                info!("CA trusted");
                true
            }
            Err(e) => {
                warn!("Failed to trust CA: {}", e);
                false
            }
        }
    }

    /// Revokes trust when the CA is trusted, then deletes its files. Returns
    /// `false` and keeps the files when the OS refuses the removal.
    pub async fn remove_ca(&self) -> Result<bool> {
        let Some(ca) = self.load_ca().await? else {
            debug!("No CA to remove");
            return Ok(true);
        };

        if self.is_trusted(&ca.cert).await? {
            let common_name = cert_codec::get_cert_common_name(&ca.cert)?;
            info!("Removing CA \"{}\" from the trust store", common_name);

            if !self.trust_store.remove(&common_name).await {
                warn!(
                    "Trust removal failed; keeping {} so it can be retried",
                    self.cert_path().display()
                );
                return Ok(false);
            }
        }

        self.store.remove(&self.ca_name).await;
        Ok(true)
    }
}
