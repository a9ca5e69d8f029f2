use std::fmt;
use std::net::{
    IpAddr,
    Ipv4Addr,
    Ipv6Addr,
};
use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

use openssl::asn1::{
    Asn1Integer,
    Asn1Time,
    Asn1TimeRef,
};
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{
    PKey,
    PKeyRef,
    Private,
    Public,
};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    BasicConstraints,
    ExtendedKeyUsage,
    KeyUsage,
    SubjectAlternativeName,
};
use openssl::x509::{
    X509,
    X509Builder,
    X509Name,
    X509NameBuilder,
    X509NameRef,
    X509Ref,
    X509VerifyResult,
};
use serde::Serialize;
use sha1::{
    Digest,
    Sha1,
};
use time::format_description::well_known::Rfc3339;
use time::{
    Duration,
    OffsetDateTime,
};

use crate::error::{
    Error,
    Result,
};

/// Browsers reject leaf certificates valid for more than 398 days.
pub const MAX_LEAF_VALIDITY: Duration = Duration::days(397);
pub const CA_VALIDITY: Duration = Duration::days(3650);

const FALLBACK_COMMON_NAME: &str = "localhost";

static LAST_SERIAL_MILLIS: AtomicU64 = AtomicU64::new(0);

pub struct KeyPair {
    private_key: PKey<Private>,
}

impl KeyPair {
    /// Generates an RSA key pair on the blocking pool.
    pub async fn generate(bits: u32) -> Result<Self> {
        let private_key =
            tokio::task::spawn_blocking(move || Rsa::generate(bits).and_then(PKey::from_rsa))
                .await
                .map_err(|e| Error::KeyGen(format!("key generation task failed: {e}")))?
                .map_err(|e| Error::KeyGen(e.to_string()))?;

        Ok(Self { private_key })
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let private_key = PKey::private_key_from_pem(pem)?;
        Ok(Self { private_key })
    }

    pub fn to_pem(&self) -> Result<String> {
        let pem = self.private_key.private_key_to_pem_pkcs8()?;
        Ok(String::from_utf8_lossy(&pem).into_owned())
    }

    pub fn private_key(&self) -> &PKeyRef<Private> {
        &self.private_key
    }

    /// Derives the public half from the private key.
    pub fn public_key(&self) -> Result<PKey<Public>> {
        let der = self.private_key.public_key_to_der()?;
        Ok(PKey::public_key_from_der(&der)?)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.private_key.bits())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidityPeriod {
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
}

impl ValidityPeriod {
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    pub fn duration(&self) -> Duration {
        self.not_after - self.not_before
    }
}

impl fmt::Display for ValidityPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not_before = self.not_before.format(&Rfc3339).map_err(|_| fmt::Error)?;
        let not_after = self.not_after.format(&Rfc3339).map_err(|_| fmt::Error)?;
        write!(f, "{not_before} ~ {not_after}")
    }
}

pub struct LeafParams<'a> {
    pub ca_key: &'a KeyPair,
    pub ca_subject: &'a X509NameRef,
    pub public_key: &'a PKeyRef<Public>,
    pub hosts: &'a [String],
    pub expires_in: Duration,
}

pub fn is_ip(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}

/// Hex form of a millisecond timestamp that DER-encodes as a positive
/// integer: even number of digits, leading digit below `8`.
pub fn serial_number_hex(millis: u64) -> String {
    let hex = format!("{millis:x}");
    if hex.len() % 2 == 1 {
        format!("0{hex}")
    } else if hex.as_bytes()[0] >= b'8' {
        format!("00{hex}")
    } else {
        hex
    }
}

fn next_serial_millis(now_millis: u64) -> u64 {
    let previous = LAST_SERIAL_MILLIS
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now_millis.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now_millis.max(previous + 1)
}

fn serial_number(now: OffsetDateTime) -> Result<Asn1Integer> {
    let millis = u64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or_default();
    let hex = serial_number_hex(next_serial_millis(millis));
    Ok(BigNum::from_hex_str(&hex)?.to_asn1_integer()?)
}

fn asn1_time(at: OffsetDateTime) -> Result<Asn1Time> {
    Ok(Asn1Time::from_unix(at.unix_timestamp() as _)?)
}

fn to_datetime(time: &Asn1TimeRef) -> Result<OffsetDateTime> {
    let diff = Asn1Time::from_unix(0)?.diff(time)?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|e| Error::MalformedCertificate(format!("validity out of range: {e}")))
}

fn common_name_entry(common_name: &str) -> Result<X509Name> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    Ok(name.build())
}

fn base_builder(
    public_key: &PKeyRef<Public>, subject: &X509NameRef, issuer: &X509NameRef,
    issued_at: OffsetDateTime, expires_in: Duration,
) -> Result<X509Builder> {
    if expires_in <= Duration::ZERO {
        return Err(Error::InvalidLifetime(format!(
            "{} days is not a positive lifetime",
            expires_in.whole_days()
        )));
    }
    let expires_at = issued_at.checked_add(expires_in).ok_or_else(|| {
        Error::InvalidLifetime(format!(
            "{} days runs past the last representable date",
            expires_in.whole_days()
        ))
    })?;

    let serial = serial_number(issued_at)?;
    let not_before = asn1_time(issued_at)?;
    let not_after = asn1_time(expires_at)?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(&serial)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    builder.set_subject_name(subject)?;
    builder.set_issuer_name(issuer)?;
    builder.set_pubkey(public_key)?;

    Ok(builder)
}

pub fn create_ca_cert(key_pair: &KeyPair, common_name: &str) -> Result<X509> {
    let public_key = key_pair.public_key()?;
    let name = common_name_entry(common_name)?;

    let mut builder = base_builder(
        &public_key,
        &name,
        &name,
        OffsetDateTime::now_utc(),
        CA_VALIDITY,
    )?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.sign(key_pair.private_key(), MessageDigest::sha256())?;

    Ok(builder.build())
}

/// Signs a leaf certificate. The first non-IP host becomes the common name
/// and every host, common name included, is listed in subjectAltName.
pub fn create_cert(params: LeafParams<'_>) -> Result<X509> {
    create_cert_at(params, OffsetDateTime::now_utc())
}

pub(crate) fn create_cert_at(params: LeafParams<'_>, issued_at: OffsetDateTime) -> Result<X509> {
    let cn_index = params.hosts.iter().position(|host| !is_ip(host));
    let common_name = cn_index
        .map(|i| params.hosts[i].as_str())
        .unwrap_or(FALLBACK_COMMON_NAME);
    let subject = common_name_entry(common_name)?;

    let mut builder = base_builder(
        params.public_key,
        &subject,
        params.ca_subject,
        issued_at,
        params.expires_in,
    )?;

    builder.append_extension(
        KeyUsage::new()
            .digital_signature()
            .key_encipherment()
            .non_repudiation()
            .build()?,
    )?;
    builder.append_extension(ExtendedKeyUsage::new().server_auth().client_auth().build()?)?;

    let mut alt_names = SubjectAlternativeName::new();
    let mut alt_name_count = 0;
    if cn_index.is_some() {
        alt_names.dns(common_name);
        alt_name_count += 1;
    }
    for (i, host) in params.hosts.iter().enumerate() {
        if Some(i) == cn_index {
            continue;
        }
        if is_ip(host) {
            alt_names.ip(host);
        } else {
            alt_names.dns(host);
        }
        alt_name_count += 1;
    }
    if alt_name_count > 0 {
        let extension = alt_names.build(&builder.x509v3_context(None, None))?;
        builder.append_extension(extension)?;
    }

    builder.sign(params.ca_key.private_key(), MessageDigest::sha256())?;

    Ok(builder.build())
}

fn ip_to_string(bytes: &[u8]) -> Option<String> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes)
            .ok()
            .map(|octets| Ipv4Addr::from(octets).to_string()),
        16 => <[u8; 16]>::try_from(bytes)
            .ok()
            .map(|octets| Ipv6Addr::from(octets).to_string()),
        _ => None,
    }
}

/// Hosts covered by a certificate: common name first, then the
/// subjectAltName entries in stored order.
pub fn get_cert_hosts(cert: &X509Ref) -> Result<Vec<String>> {
    let common_name = get_cert_common_name(cert)?;
    let mut hosts = vec![common_name.clone()];

    if let Some(alt_names) = cert.subject_alt_names() {
        for name in alt_names.iter() {
            let host = if let Some(dns) = name.dnsname() {
                dns.to_string()
            } else if let Some(ip) = name.ipaddress().and_then(ip_to_string) {
                ip
            } else {
                continue;
            };

            if host != common_name {
                hosts.push(host);
            }
        }
    }

    Ok(hosts)
}

/// SHA-1 over the DER encoding, upper-case hex. This is the identity OS
/// trust stores report, not a security primitive.
pub fn fingerprint(cert: &X509Ref) -> Result<String> {
    let digest = Sha1::digest(cert.to_der()?);
    Ok(digest.iter().map(|byte| format!("{byte:02X}")).collect())
}

pub fn get_cert_valid_period(cert: &X509Ref) -> Result<ValidityPeriod> {
    Ok(ValidityPeriod {
        not_before: to_datetime(cert.not_before())?,
        not_after: to_datetime(cert.not_after())?,
    })
}

pub fn get_cert_common_name(cert: &X509Ref) -> Result<String> {
    let entry = cert
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .ok_or_else(|| {
            Error::MalformedCertificate("certificate subject has no commonName".to_string())
        })?;

    std::str::from_utf8(entry.data().as_slice())
        .map(str::to_string)
        .map_err(|e| Error::MalformedCertificate(format!("commonName is not UTF-8: {e}")))
}

pub fn is_cert_signed_by_ca(cert: &X509Ref, ca: &X509Ref) -> Result<bool> {
    if ca.issued(cert) != X509VerifyResult::OK {
        return Ok(false);
    }

    let ca_public_key = ca.public_key()?;
    Ok(cert.verify(&ca_public_key).unwrap_or(false))
}

pub fn is_cert_valid(cert: &X509Ref) -> Result<bool> {
    is_cert_valid_at(cert, OffsetDateTime::now_utc())
}

pub fn is_cert_valid_at(cert: &X509Ref, at: OffsetDateTime) -> Result<bool> {
    Ok(get_cert_valid_period(cert)?.contains(at))
}

pub fn cert_from_pem(pem: &[u8]) -> Result<X509> {
    Ok(X509::from_pem(pem)?)
}

pub fn cert_to_pem(cert: &X509Ref) -> Result<String> {
    let pem = cert.to_pem()?;
    Ok(String::from_utf8_lossy(&pem).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CA_NAME: &str = "generated by trustcert tests";

    async fn test_ca() -> (KeyPair, X509) {
        let key = KeyPair::generate(2048).await.unwrap();
        let cert = create_ca_cert(&key, TEST_CA_NAME).unwrap();
        (key, cert)
    }

    async fn leaf(ca_key: &KeyPair, ca_cert: &X509, hosts: &[&str]) -> X509 {
        let key = KeyPair::generate(2048).await.unwrap();
        let public_key = key.public_key().unwrap();
        let hosts: Vec<String> = hosts.iter().map(|h| h.to_string()).collect();

        create_cert(LeafParams {
            ca_key,
            ca_subject: ca_cert.subject_name(),
            public_key: &public_key,
            hosts: &hosts,
            expires_in: MAX_LEAF_VALIDITY,
        })
        .unwrap()
    }

    #[test]
    fn test_serial_number_hex_rules() {
        assert_eq!(serial_number_hex(0xabc), "0abc");
        assert_eq!(serial_number_hex(0x7f12), "7f12");
        assert_eq!(serial_number_hex(0x8f12), "008f12");
        assert_eq!(serial_number_hex(0xff), "00ff");
    }

    #[test]
    fn test_serial_numbers_are_legal_der_integers() {
        let base = OffsetDateTime::now_utc();
        for i in 0..1000 {
            let serial = serial_number(base + Duration::milliseconds(i * 7919)).unwrap();
            let bn = serial.to_bn().unwrap();
            assert!(!bn.is_negative());

            let bytes = bn.to_vec();
            assert!(bytes.len() <= 20);

            let hex = serial_number_hex(u64::from_str_radix(&bn.to_hex_str().unwrap(), 16).unwrap());
            assert_eq!(hex.len() % 2, 0);
            assert!(hex.as_bytes()[0] < b'8');
        }
    }

    #[test]
    fn test_serial_numbers_increase_within_millisecond() {
        let now = OffsetDateTime::now_utc();
        let first = serial_number(now).unwrap().to_bn().unwrap();
        let second = serial_number(now).unwrap().to_bn().unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_ca_is_self_signed() {
        let (_, ca) = test_ca().await;

        assert!(is_cert_signed_by_ca(&ca, &ca).unwrap());
        assert_eq!(get_cert_common_name(&ca).unwrap(), TEST_CA_NAME);

        let pem = cert_to_pem(&ca).unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
        let text = String::from_utf8(ca.to_text().unwrap()).unwrap();
        assert!(text.contains("CA:TRUE"));
    }

    #[tokio::test]
    async fn test_ca_validity_is_ten_years() {
        let (_, ca) = test_ca().await;
        let period = get_cert_valid_period(&ca).unwrap();

        assert_eq!(period.duration(), CA_VALIDITY);
        assert_eq!(CA_VALIDITY.whole_milliseconds(), 3650 * 86_400_000);
        assert!(is_cert_valid(&ca).unwrap());
    }

    #[tokio::test]
    async fn test_leaf_is_bound_to_its_ca() {
        let (ca_key, ca) = test_ca().await;
        let (_, other_ca) = test_ca().await;
        let cert = leaf(&ca_key, &ca, &["dev.local"]).await;

        assert!(is_cert_signed_by_ca(&cert, &ca).unwrap());
        assert!(!is_cert_signed_by_ca(&cert, &other_ca).unwrap());
        assert_eq!(
            cert.issuer_name().to_der().unwrap(),
            ca.subject_name().to_der().unwrap()
        );
    }

    #[tokio::test]
    async fn test_leaf_validity_respects_cap() {
        let (ca_key, ca) = test_ca().await;
        let cert = leaf(&ca_key, &ca, &["dev.local"]).await;
        let period = get_cert_valid_period(&cert).unwrap();

        assert!(period.duration() <= MAX_LEAF_VALIDITY);
        assert!(MAX_LEAF_VALIDITY.whole_milliseconds() <= 397 * 86_400_000);
        assert!(is_cert_valid(&cert).unwrap());
        assert!(!is_cert_valid_at(&cert, period.not_after + Duration::days(1)).unwrap());
        assert!(!is_cert_valid_at(&cert, period.not_before - Duration::days(1)).unwrap());
    }

    #[tokio::test]
    async fn test_lifetime_must_be_positive_and_representable() {
        let (ca_key, ca) = test_ca().await;
        let key = KeyPair::generate(2048).await.unwrap();
        let public_key = key.public_key().unwrap();
        let hosts = vec!["dev.local".to_string()];

        for expires_in in [Duration::ZERO, Duration::days(-1), Duration::days(4_000_000)] {
            let result = create_cert(LeafParams {
                ca_key: &ca_key,
                ca_subject: ca.subject_name(),
                public_key: &public_key,
                hosts: &hosts,
                expires_in,
            });
            assert!(
                matches!(result, Err(Error::InvalidLifetime(_))),
                "{expires_in} accepted"
            );
        }
    }

    #[tokio::test]
    async fn test_ip_and_domain_typing() {
        let (ca_key, ca) = test_ca().await;
        let cert = leaf(&ca_key, &ca, &["10.0.0.1", "dev.local"]).await;

        assert_eq!(get_cert_common_name(&cert).unwrap(), "dev.local");

        let alt_names = cert.subject_alt_names().unwrap();
        let ips: Vec<_> = alt_names.iter().filter_map(|n| n.ipaddress()).collect();
        assert_eq!(ips, vec![&[10u8, 0, 0, 1][..]]);

        assert_eq!(get_cert_hosts(&cert).unwrap(), vec!["dev.local", "10.0.0.1"]);
    }

    #[tokio::test]
    async fn test_hosts_keep_stored_order() {
        let (ca_key, ca) = test_ca().await;
        let cert = leaf(&ca_key, &ca, &["a.com", "::1", "b.com", "127.0.0.1"]).await;

        assert_eq!(
            get_cert_hosts(&cert).unwrap(),
            vec!["a.com", "::1", "b.com", "127.0.0.1"]
        );
    }

    #[tokio::test]
    async fn test_ip_only_hosts_fall_back_to_localhost() {
        let (ca_key, ca) = test_ca().await;
        let cert = leaf(&ca_key, &ca, &["127.0.0.1"]).await;

        assert_eq!(get_cert_common_name(&cert).unwrap(), "localhost");
        assert_eq!(get_cert_hosts(&cert).unwrap(), vec!["localhost", "127.0.0.1"]);
    }

    #[tokio::test]
    async fn test_fingerprint_matches_openssl_digest() {
        let (_, ca) = test_ca().await;
        let expected: String = ca
            .digest(MessageDigest::sha1())
            .unwrap()
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();

        let actual = fingerprint(&ca).unwrap();
        assert_eq!(actual, expected);
        assert_eq!(actual.len(), 40);
        assert_eq!(actual, actual.to_uppercase());
    }

    #[tokio::test]
    async fn test_missing_common_name_is_malformed() {
        let key = KeyPair::generate(2048).await.unwrap();
        let public_key = key.public_key().unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "acme").unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&public_key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(1).unwrap())
            .unwrap();
        builder
            .sign(key.private_key(), MessageDigest::sha256())
            .unwrap();
        let cert = builder.build();

        assert!(matches!(
            get_cert_common_name(&cert),
            Err(Error::MalformedCertificate(_))
        ));
        assert!(matches!(
            get_cert_hosts(&cert),
            Err(Error::MalformedCertificate(_))
        ));
    }

    #[tokio::test]
    async fn test_key_pair_pem_roundtrip_keeps_public_key() {
        let key = KeyPair::generate(2048).await.unwrap();
        let restored = KeyPair::from_pem(key.to_pem().unwrap().as_bytes()).unwrap();

        assert_eq!(
            key.public_key().unwrap().public_key_to_der().unwrap(),
            restored.public_key().unwrap().public_key_to_der().unwrap()
        );
        assert_eq!(restored.private_key().bits(), 2048);
    }
}
