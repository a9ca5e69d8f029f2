use std::io::ErrorKind;
use std::path::{
    Path,
    PathBuf,
};

use log::{
    debug,
    info,
    warn,
};
use openssl::x509::{
    X509,
    X509Ref,
};
use tokio::fs;

use super::cert_codec::{
    self,
    KeyPair,
};
use crate::config;
use crate::error::{
    Error,
    Result,
};

/// A certificate together with the private key it was issued for.
#[derive(Debug)]
pub struct CertRecord {
    pub cert: X509,
    pub key: KeyPair,
}

/// `<name>.crt` / `<name>.key` pairs under one directory. Every load reads
/// from disk; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    dir: PathBuf,
}

impl CertificateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cert_path(&self, name: &str) -> PathBuf {
        config::cert_path(&self.dir, name)
    }

    pub fn key_path(&self, name: &str) -> PathBuf {
        config::key_path(&self.dir, name)
    }

    /// Returns `None` when either file is missing. Any other read or parse
    /// failure is an error so damaged state is never silently replaced.
    pub async fn load(&self, name: &str) -> Result<Option<CertRecord>> {
        let cert_path = self.cert_path(name);
        let key_path = self.key_path(name);

        let Some(cert_pem) = read_optional(&cert_path).await? else {
            debug!("No certificate at {}", cert_path.display());
            return Ok(None);
        };
        let Some(key_pem) = read_optional(&key_path).await? else {
            debug!("No private key at {}", key_path.display());
            return Ok(None);
        };

        let cert = cert_codec::cert_from_pem(&cert_pem)?;
        let key = KeyPair::from_pem(&key_pem)?;

        Ok(Some(CertRecord { cert, key }))
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::io(&self.dir, e))
    }

    pub async fn write_cert(&self, name: &str, cert: &X509Ref) -> Result<PathBuf> {
        let path = self.cert_path(name);
        let pem = cert_codec::cert_to_pem(cert)?;
        write_file(&path, pem.as_bytes()).await?;
        debug!("Wrote certificate to {}", path.display());
        Ok(path)
    }

    pub async fn write_key(&self, name: &str, key: &KeyPair) -> Result<PathBuf> {
        let path = self.key_path(name);
        let pem = key.to_pem()?;
        write_file(&path, pem.as_bytes()).await?;
        debug!("Wrote private key to {}", path.display());
        Ok(path)
    }

    /// Best-effort removal of both files; a missing file is not an error.
    pub async fn remove(&self, name: &str) {
        for path in [self.cert_path(name), self.key_path(name)] {
            match fs::remove_file(&path).await {
                Ok(()) => info!("Removed {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e))?;
    }

    fs::write(path, contents)
        .await
        .map_err(|e| Error::io(path, e))?;

    #[cfg(unix)]
    if path.extension().is_some_and(|ext| ext == "key") {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| Error::io(path, e))?;
    }

    Ok(())
}
