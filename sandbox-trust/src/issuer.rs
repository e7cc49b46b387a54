//! Certificate issuance.
//!
//! Host certificates bind a sandbox hostname to a freshly generated host
//! key; the single user certificate binds the login principal to the
//! user identity key. Validity windows start slightly in the past to
//! absorb clock skew and are bounded at thirty days — never infinite.

use chrono::Utc;
use ssh_key::certificate::{Builder as CertBuilder, CertType, Certificate};
use ssh_key::rand_core::{OsRng, RngCore};
use ssh_key::{PrivateKey, PublicKey};

use crate::SANDBOX_LOGIN_USER;
use crate::error::{Result, TrustError};

/// Backdate applied to `valid_after` for clock-skew tolerance.
const VALID_AFTER_BACKDATE_SECS: u64 = 24 * 3600;
/// Lifetime added to issuance time for `valid_before` (30 days).
const VALIDITY_SECS: u64 = 720 * 3600;

const USER_CERT_KEY_ID: &str = "sandbox user key";

/// Extensions granted on every issued certificate.
const PERMISSION_EXTENSIONS: [&str; 3] = [
    "permit-pty",
    "permit-agent-forwarding",
    "permit-port-forwarding",
];

/// Sign a host certificate for a single sandbox hostname.
///
/// Every sandbox gets its own freshly time-stamped certificate; two calls
/// with identical inputs intentionally produce distinct certificates
/// (serial, nonce, and validity window all move).
pub fn issue_host_certificate(
    signer: &PrivateKey,
    hostname: &str,
    subject: &PublicKey,
) -> Result<Certificate> {
    build_certificate(
        signer,
        subject,
        CertType::Host,
        &[hostname],
        &format!("{hostname} host key"),
    )
}

/// Sign the user certificate for the fixed login principal.
pub fn issue_user_certificate(signer: &PrivateKey, subject: &PublicKey) -> Result<Certificate> {
    build_certificate(
        signer,
        subject,
        CertType::User,
        &[SANDBOX_LOGIN_USER],
        USER_CERT_KEY_ID,
    )
}

fn build_certificate(
    signer: &PrivateKey,
    subject: &PublicKey,
    cert_type: CertType,
    principals: &[&str],
    key_id: &str,
) -> Result<Certificate> {
    let now = Utc::now().timestamp() as u64;
    let valid_after = now.saturating_sub(VALID_AFTER_BACKDATE_SECS);
    let valid_before = now + VALIDITY_SECS;

    let cert_err = |e: ssh_key::Error| TrustError::Certificate(format!("{key_id}: {e}"));

    let mut builder =
        CertBuilder::new_with_random_nonce(&mut OsRng, subject, valid_after, valid_before)
            .map_err(cert_err)?;
    builder.serial(OsRng.next_u64()).map_err(cert_err)?;
    builder.key_id(key_id).map_err(cert_err)?;
    builder.cert_type(cert_type).map_err(cert_err)?;
    for principal in principals {
        builder.valid_principal(*principal).map_err(cert_err)?;
    }
    builder.comment(subject.comment()).map_err(cert_err)?;
    for extension in PERMISSION_EXTENSIONS {
        builder.extension(extension, "").map_err(cert_err)?;
    }

    builder.sign(signer).map_err(cert_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::{FixedSeedGenerator, KeyGenerator};
    use ssh_key::HashAlg;

    fn signer_and_subject() -> (PrivateKey, PrivateKey) {
        let generator = FixedSeedGenerator::new(11);
        (generator.generate().unwrap(), generator.generate().unwrap())
    }

    #[test]
    fn validity_window_brackets_issuance_time() {
        let (ca, subject) = signer_and_subject();
        let before = Utc::now().timestamp() as u64;
        let cert = issue_host_certificate(&ca, "abc123.test", subject.public_key()).unwrap();
        let after = Utc::now().timestamp() as u64;

        assert!(cert.valid_after() <= before);
        assert!(cert.valid_before() >= after);
        assert_eq!(
            cert.valid_before() - cert.valid_after(),
            VALID_AFTER_BACKDATE_SECS + VALIDITY_SECS
        );
    }

    #[test]
    fn host_certificate_is_scoped_to_the_hostname() {
        let (ca, subject) = signer_and_subject();
        let cert = issue_host_certificate(&ca, "abc123.test", subject.public_key()).unwrap();

        assert_eq!(cert.cert_type(), CertType::Host);
        assert_eq!(cert.valid_principals(), &["abc123.test".to_string()]);
        assert!(cert.key_id().contains("abc123.test"));
    }

    #[test]
    fn user_certificate_names_the_login_principal() {
        let (ca, subject) = signer_and_subject();
        let cert = issue_user_certificate(&ca, subject.public_key()).unwrap();

        assert_eq!(cert.cert_type(), CertType::User);
        assert_eq!(cert.valid_principals(), &[SANDBOX_LOGIN_USER.to_string()]);
        assert_eq!(cert.key_id(), USER_CERT_KEY_ID);
    }

    #[test]
    fn permission_extensions_are_granted() {
        let (ca, subject) = signer_and_subject();
        let cert = issue_user_certificate(&ca, subject.public_key()).unwrap();
        for extension in PERMISSION_EXTENSIONS {
            assert!(
                cert.extensions().iter().any(|(name, _)| name == extension),
                "missing {extension}"
            );
        }
    }

    #[test]
    fn repeated_issuance_produces_distinct_certificates() {
        let (ca, subject) = signer_and_subject();
        let a = issue_host_certificate(&ca, "abc123.test", subject.public_key()).unwrap();
        let b = issue_host_certificate(&ca, "abc123.test", subject.public_key()).unwrap();
        assert_ne!(a.serial(), b.serial());
    }

    #[test]
    fn issued_certificate_validates_against_the_authority() {
        let (ca, subject) = signer_and_subject();
        let cert = issue_host_certificate(&ca, "abc123.test", subject.public_key()).unwrap();
        let fingerprint = ca.public_key().fingerprint(HashAlg::Sha256);
        cert.validate(&[fingerprint]).unwrap();
    }
}
