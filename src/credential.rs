// 🔏 Credential Signing - tamper-evident token at rest
//
// The raw bearer token never reaches the token store in clear form. It is
// wrapped as `base64url(token):base64url(HMAC-SHA256(salt:payload))`, and any
// change to either half fails verification.

use crate::error::CredentialError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Label stored next to the Cigam credential.
pub const CIGAM_CREDENTIAL_LABEL: &str = "Cigam Auth";

const SIGNING_SALT: &str = "store_sync.credential";
const SEPARATOR: char = ':';

// ============================================================================
// CREDENTIAL
// ============================================================================

/// Bearer token obtained from a successful authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub raw_token: String,
    pub expires_at: DateTime<Utc>,
    pub issued_label: String,
}

impl Credential {
    pub fn new(raw_token: String, expires_at: DateTime<Utc>, issued_label: &str) -> Self {
        Credential {
            raw_token,
            expires_at,
            issued_label: issued_label.to_string(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("raw_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("issued_label", &self.issued_label)
            .finish()
    }
}

/// Stored form of a credential: signed token plus plaintext expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub name: String,
}

impl SealedCredential {
    /// True while `expires_at` is still more than `margin` away.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at > now + margin
    }
}

// ============================================================================
// SIGNER
// ============================================================================

#[derive(Clone)]
pub struct CredentialSigner {
    secret: Vec<u8>,
}

impl CredentialSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        CredentialSigner {
            secret: secret.into(),
        }
    }

    pub fn seal(&self, credential: &Credential) -> SealedCredential {
        SealedCredential {
            token: self.sign(&credential.raw_token),
            expires_at: credential.expires_at,
            name: credential.issued_label.clone(),
        }
    }

    pub fn unseal(&self, sealed: &SealedCredential) -> Result<Credential, CredentialError> {
        let raw_token = self.verify(&sealed.token)?;
        Ok(Credential {
            raw_token,
            expires_at: sealed.expires_at,
            issued_label: sealed.name.clone(),
        })
    }

    pub fn sign(&self, value: &str) -> String {
        let payload = URL_SAFE_NO_PAD.encode(value.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(self.signature(&payload));
        format!("{payload}{SEPARATOR}{signature}")
    }

    pub fn verify(&self, signed: &str) -> Result<String, CredentialError> {
        let (payload, signature) = signed
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| CredentialError::Corrupted("missing signature".into()))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CredentialError::Corrupted("signature is not base64".into()))?;

        let mut mac = self.mac();
        mac.update(SIGNING_SALT.as_bytes());
        mac.update(&[SEPARATOR as u8]);
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CredentialError::Corrupted("signature mismatch".into()))?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CredentialError::Corrupted("payload is not base64".into()))?;
        String::from_utf8(raw).map_err(|_| CredentialError::Corrupted("payload is not UTF-8".into()))
    }

    fn signature(&self, payload: &str) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(SIGNING_SALT.as_bytes());
        mac.update(&[SEPARATOR as u8]);
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }
}

impl fmt::Debug for CredentialSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credential() -> Credential {
        Credential::new(
            "eyJhbGciOiJIUzI1NiJ9.payload.sig".to_string(),
            Utc.with_ymd_and_hms(2025, 7, 4, 12, 0, 0).unwrap(),
            CIGAM_CREDENTIAL_LABEL,
        )
    }

    #[test]
    fn test_seal_and_unseal() {
        let signer = CredentialSigner::new(b"signing-secret".to_vec());
        let sealed = signer.seal(&credential());

        assert_ne!(sealed.token, credential().raw_token);
        assert_eq!(sealed.name, "Cigam Auth");
        assert_eq!(signer.unseal(&sealed).unwrap(), credential());
    }

    #[test]
    fn test_reject_tampered_payload() {
        let signer = CredentialSigner::new(b"signing-secret".to_vec());
        let mut sealed = signer.seal(&credential());

        let forged = URL_SAFE_NO_PAD.encode(b"forged-token");
        let signature = sealed.token.rsplit_once(':').unwrap().1.to_string();
        sealed.token = format!("{forged}:{signature}");

        assert!(matches!(signer.unseal(&sealed), Err(CredentialError::Corrupted(_))));
    }

    #[test]
    fn test_reject_wrong_secret() {
        let sealed = CredentialSigner::new(b"secret-a".to_vec()).seal(&credential());
        let result = CredentialSigner::new(b"secret-b".to_vec()).unseal(&sealed);

        assert_eq!(result, Err(CredentialError::Corrupted("signature mismatch".into())));
    }

    #[test]
    fn test_reject_garbage() {
        let signer = CredentialSigner::new(b"signing-secret".to_vec());

        assert!(signer.verify("no-separator").is_err());
        assert!(signer.verify("abc:!!!not-base64!!!").is_err());
        assert!(signer.verify("").is_err());
    }

    #[test]
    fn test_freshness_margin() {
        let sealed = CredentialSigner::new(b"k".to_vec()).seal(&credential());
        let expires = sealed.expires_at;

        assert!(sealed.is_fresh_at(expires - Duration::minutes(5), Duration::seconds(60)));
        assert!(!sealed.is_fresh_at(expires - Duration::seconds(60), Duration::seconds(60)));
        assert!(!sealed.is_fresh_at(expires + Duration::seconds(1), Duration::seconds(60)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", credential());
        assert!(!rendered.contains("payload.sig"));
        assert!(rendered.contains("<redacted>"));
    }
}
