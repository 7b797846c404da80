//! Challenge verification: 2FA secret, phone OTP and device signature.
//!
//! Every proof is checked against a different stored credential. A failed
//! check never mutates state, so the caller can retry with a corrected proof.

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use jsonwebtoken::{crypto, Algorithm, DecodingKey};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{PasswordIdentity, PhoneAuth, PublicKeyRecord, TransactionChallenge};
use crate::error::AppError;
use crate::ports::{IdentityRepository, PhoneAuthRepository, PublicKeyRepository, RepositoryError};
use crate::validation::validate_phone;

type HmacSha256 = Hmac<Sha256>;

pub const OTP_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    TwoFactor,
    Otp,
    FingerPrint,
}

impl FromStr for ChallengeMethod {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "2fa" => Ok(ChallengeMethod::TwoFactor),
            "otp" => Ok(ChallengeMethod::Otp),
            "finger_print" => Ok(ChallengeMethod::FingerPrint),
            _ => Err(AppError::ChallengeNotPassed),
        }
    }
}

#[derive(Clone)]
pub struct ChallengeVerifier {
    identities: Arc<dyn IdentityRepository>,
    phone_auths: Arc<dyn PhoneAuthRepository>,
    public_keys: Arc<dyn PublicKeyRepository>,
}

impl ChallengeVerifier {
    pub fn new(
        identities: Arc<dyn IdentityRepository>,
        phone_auths: Arc<dyn PhoneAuthRepository>,
        public_keys: Arc<dyn PublicKeyRepository>,
    ) -> Self {
        Self {
            identities,
            phone_auths,
            public_keys,
        }
    }

    /// Gate applied before settlement. Without a required challenge the proofs
    /// are ignored; with one, a known challenge type is mandatory.
    pub async fn enforce(
        &self,
        user_id: Uuid,
        has_challenge: bool,
        challenge_type: Option<&str>,
        proofs: &TransactionChallenge,
    ) -> Result<(), AppError> {
        if !has_challenge {
            return Ok(());
        }

        let method = challenge_type
            .ok_or(AppError::ChallengeNotPassed)?
            .parse::<ChallengeMethod>()?;
        self.verify(user_id, method, proofs).await
    }

    pub async fn verify(
        &self,
        user_id: Uuid,
        method: ChallengeMethod,
        proofs: &TransactionChallenge,
    ) -> Result<(), AppError> {
        let result = match method {
            ChallengeMethod::TwoFactor => self.verify_two_factor(user_id, proofs).await,
            ChallengeMethod::Otp => self.verify_otp(user_id, proofs).await,
            ChallengeMethod::FingerPrint => self.verify_finger_print(user_id, proofs).await,
        };

        match &result {
            Ok(()) => tracing::info!(user_id = %user_id, method = ?method, "Challenge passed"),
            Err(e) => {
                tracing::warn!(user_id = %user_id, method = ?method, error = %e, "Challenge failed")
            }
        }
        result
    }

    async fn verify_two_factor(
        &self,
        user_id: Uuid,
        proofs: &TransactionChallenge,
    ) -> Result<(), AppError> {
        let code = proofs
            .two_fa
            .as_deref()
            .ok_or(AppError::FailedToCheckTwoFactor)?;

        let identity = match self.identities.get_password(user_id).await {
            Ok(identity) => identity,
            Err(RepositoryError::NotFound(_)) => return Err(AppError::FailedToCheckTwoFactor),
            Err(e) => return Err(e.into()),
        };

        if two_factor_hash(code) != identity.hash {
            return Err(AppError::FailedToCheckTwoFactor);
        }
        Ok(())
    }

    async fn verify_otp(
        &self,
        user_id: Uuid,
        proofs: &TransactionChallenge,
    ) -> Result<(), AppError> {
        let code = proofs
            .otp
            .as_deref()
            .ok_or_else(|| AppError::FailedVerification("otp is required".to_string()))?;

        let auth = self
            .phone_auths
            .latest_for_user(user_id)
            .await?
            .ok_or_else(|| {
                AppError::FailedVerification("no pending phone authentication".to_string())
            })?;
        if auth.used {
            return Err(AppError::FailedVerification(
                "phone authentication already used".to_string(),
            ));
        }

        if !open_seal(code, &auth) {
            return Err(AppError::FailedVerification("invalid otp".to_string()));
        }

        match self.phone_auths.mark_used(auth.id).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::Conflict(_)) => Err(AppError::FailedVerification(
                "phone authentication already used".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn verify_finger_print(
        &self,
        user_id: Uuid,
        proofs: &TransactionChallenge,
    ) -> Result<(), AppError> {
        let proof = (proofs.signature.as_deref(), proofs.challenge.as_deref());
        let (signature, challenge) = match proof {
            (Some(signature), Some(challenge)) => (signature, challenge),
            _ => {
                return Err(AppError::FailedVerification(
                    "signature and challenge are required".to_string(),
                ))
            }
        };
        let signature = normalize_signature(signature)
            .ok_or_else(|| AppError::FailedVerification("signature is not base64".to_string()))?;

        let keys = self.public_keys.find_for_challenge(user_id, challenge).await?;
        for key in keys {
            if signature_matches(&key, challenge, &signature) {
                self.public_keys.mark_used(key.id).await?;
                return Ok(());
            }
        }

        Err(AppError::FailedVerification(
            "signature does not match a registered key".to_string(),
        ))
    }

    /// Creates a phone authentication and returns the code for out-of-band
    /// delivery. Only a seal keyed by the code is stored.
    pub async fn issue_phone_auth(&self, user_id: Uuid, phone: &str) -> Result<String, AppError> {
        validate_phone(phone)?;

        let code = generate_otp();
        let mut auth = PhoneAuth {
            id: Uuid::new_v4(),
            user_id,
            phone: phone.to_string(),
            seal: String::new(),
            used: false,
            created_at: Utc::now(),
        };
        auth.seal = seal(&code, &auth)?;
        self.phone_auths.insert(&auth).await?;

        tracing::info!(user_id = %user_id, phone_auth_id = %auth.id, "Issued phone authentication");
        Ok(code)
    }

    pub async fn set_two_factor(&self, user_id: Uuid, code: &str) -> Result<(), AppError> {
        if code.trim().is_empty() {
            return Err(AppError::InvalidRequest("2fa code must not be empty".to_string()));
        }

        self.identities
            .upsert_password(&PasswordIdentity {
                user_id,
                hash: two_factor_hash(code),
                updated_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    pub async fn register_public_key(
        &self,
        user_id: Uuid,
        challenge: &str,
        public_key_pem: &str,
    ) -> Result<PublicKeyRecord, AppError> {
        if challenge.is_empty() {
            return Err(AppError::InvalidRequest("challenge must not be empty".to_string()));
        }
        DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AppError::InvalidRequest(format!("invalid RSA public key: {}", e)))?;

        let record =
            PublicKeyRecord::new(user_id, challenge.to_string(), public_key_pem.to_string());
        self.public_keys.insert(&record).await?;
        Ok(record)
    }
}

/// `base64(sha256(code))`, the stored form of the 2FA secret.
pub fn two_factor_hash(code: &str) -> String {
    STANDARD.encode(Sha256::digest(code.as_bytes()))
}

fn generate_otp() -> String {
    let n = Uuid::new_v4().as_u128() % 10u128.pow(OTP_LENGTH as u32);
    format!("{:0width$}", n, width = OTP_LENGTH)
}

fn seal_mac(code: &str, auth: &PhoneAuth) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(code.as_bytes())
        .map_err(|e| AppError::Internal(format!("otp seal key: {}", e)))?;
    mac.update(auth.id.as_bytes());
    mac.update(auth.phone.as_bytes());
    Ok(mac)
}

fn seal(code: &str, auth: &PhoneAuth) -> Result<String, AppError> {
    Ok(hex::encode(seal_mac(code, auth)?.finalize().into_bytes()))
}

/// The seal opens iff `code` is the code it was created with.
fn open_seal(code: &str, auth: &PhoneAuth) -> bool {
    let expected = match hex::decode(&auth.seal) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    match seal_mac(code, auth) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

/// Accepts standard or URL-safe base64 and returns unpadded URL-safe base64.
fn normalize_signature(signature: &str) -> Option<String> {
    let signature = signature.trim();
    let bytes = STANDARD
        .decode(signature)
        .or_else(|_| URL_SAFE.decode(signature))
        .or_else(|_| URL_SAFE_NO_PAD.decode(signature))
        .ok()?;
    Some(URL_SAFE_NO_PAD.encode(bytes))
}

/// RSA PKCS#1 v1.5 over SHA-256 of the challenge.
fn signature_matches(key: &PublicKeyRecord, challenge: &str, signature: &str) -> bool {
    let decoding_key = match DecodingKey::from_rsa_pem(key.public_key_pem.as_bytes()) {
        Ok(decoding_key) => decoding_key,
        Err(e) => {
            tracing::warn!(key_id = %key.id, error = %e, "Skipping unreadable public key");
            return false;
        }
    };
    crypto::verify(signature, challenge.as_bytes(), &decoding_key, Algorithm::RS256)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use jsonwebtoken::EncodingKey;

    const DEVICE_KEY: &str = include_str!("../../tests/fixtures/device_key.pem");
    const DEVICE_PUB: &str = include_str!("../../tests/fixtures/device_pub.pem");
    const OTHER_DEVICE_KEY: &str = include_str!("../../tests/fixtures/other_device_key.pem");
    const OTHER_DEVICE_PUB: &str = include_str!("../../tests/fixtures/other_device_pub.pem");

    fn verifier() -> ChallengeVerifier {
        let repos = InMemoryStore::new().repositories();
        ChallengeVerifier::new(repos.identities, repos.phone_auths, repos.public_keys)
    }

    fn sign(private_pem: &str, challenge: &str) -> String {
        let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
        let url_safe = crypto::sign(challenge.as_bytes(), &key, Algorithm::RS256).unwrap();
        STANDARD.encode(URL_SAFE_NO_PAD.decode(url_safe).unwrap())
    }

    fn with_two_fa(code: &str) -> TransactionChallenge {
        TransactionChallenge {
            two_fa: Some(code.to_string()),
            ..Default::default()
        }
    }

    fn with_otp(code: &str) -> TransactionChallenge {
        TransactionChallenge {
            otp: Some(code.to_string()),
            ..Default::default()
        }
    }

    fn with_signature(signature: String, challenge: &str) -> TransactionChallenge {
        TransactionChallenge {
            signature: Some(signature),
            challenge: Some(challenge.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_challenge_method_from_str() {
        assert_eq!("2fa".parse::<ChallengeMethod>().unwrap(), ChallengeMethod::TwoFactor);
        assert_eq!("otp".parse::<ChallengeMethod>().unwrap(), ChallengeMethod::Otp);
        assert_eq!(
            "finger_print".parse::<ChallengeMethod>().unwrap(),
            ChallengeMethod::FingerPrint
        );
        assert!(matches!(
            "sms".parse::<ChallengeMethod>(),
            Err(AppError::ChallengeNotPassed)
        ));
    }

    #[test]
    fn test_two_factor_hash_is_base64_sha256() {
        assert_eq!(
            two_factor_hash("1234"),
            "A6xnQhbz4Vx2HuGl4lXwZ5U2I8iziLRFnhP5eNfIRvQ="
        );
    }

    #[test]
    fn test_generated_otp_is_six_digits() {
        let code = generate_otp();
        assert_eq!(code.len(), OTP_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_enforce_skips_when_no_challenge() {
        let verifier = verifier();
        let result = verifier
            .enforce(Uuid::new_v4(), false, None, &TransactionChallenge::default())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_enforce_requires_known_type() {
        let verifier = verifier();
        let user = Uuid::new_v4();
        let proofs = TransactionChallenge::default();

        assert!(matches!(
            verifier.enforce(user, true, None, &proofs).await,
            Err(AppError::ChallengeNotPassed)
        ));
        assert!(matches!(
            verifier.enforce(user, true, Some("password"), &proofs).await,
            Err(AppError::ChallengeNotPassed)
        ));
    }

    #[tokio::test]
    async fn test_two_factor() {
        let verifier = verifier();
        let user = Uuid::new_v4();
        verifier.set_two_factor(user, "4321").await.unwrap();

        assert!(verifier
            .verify(user, ChallengeMethod::TwoFactor, &with_two_fa("4321"))
            .await
            .is_ok());
        assert!(matches!(
            verifier
                .verify(user, ChallengeMethod::TwoFactor, &with_two_fa("0000"))
                .await,
            Err(AppError::FailedToCheckTwoFactor)
        ));
    }

    #[tokio::test]
    async fn test_two_factor_without_identity_fails() {
        let verifier = verifier();
        assert!(matches!(
            verifier
                .verify(Uuid::new_v4(), ChallengeMethod::TwoFactor, &with_two_fa("4321"))
                .await,
            Err(AppError::FailedToCheckTwoFactor)
        ));
    }

    #[tokio::test]
    async fn test_otp_is_single_use() {
        let verifier = verifier();
        let user = Uuid::new_v4();
        let code = verifier.issue_phone_auth(user, "+251911223344").await.unwrap();

        assert!(verifier
            .verify(user, ChallengeMethod::Otp, &with_otp(&code))
            .await
            .is_ok());

        match verifier.verify(user, ChallengeMethod::Otp, &with_otp(&code)).await {
            Err(AppError::FailedVerification(msg)) => assert!(msg.contains("already used")),
            other => panic!("expected already used, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_otp_does_not_consume_record() {
        let verifier = verifier();
        let user = Uuid::new_v4();
        let code = verifier.issue_phone_auth(user, "+251911223344").await.unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        assert!(matches!(
            verifier.verify(user, ChallengeMethod::Otp, &with_otp(wrong)).await,
            Err(AppError::FailedVerification(_))
        ));
        assert!(verifier
            .verify(user, ChallengeMethod::Otp, &with_otp(&code))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_finger_print_accepts_registered_key_once() {
        let verifier = verifier();
        let user = Uuid::new_v4();
        let challenge = "login-7f3a";
        verifier
            .register_public_key(user, challenge, DEVICE_PUB)
            .await
            .unwrap();

        let proofs = with_signature(sign(DEVICE_KEY, challenge), challenge);
        assert!(verifier
            .verify(user, ChallengeMethod::FingerPrint, &proofs)
            .await
            .is_ok());
        assert!(matches!(
            verifier.verify(user, ChallengeMethod::FingerPrint, &proofs).await,
            Err(AppError::FailedVerification(_))
        ));
    }

    #[tokio::test]
    async fn test_finger_print_rejects_other_users_key() {
        let verifier = verifier();
        let user = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let challenge = "login-7f3a";
        verifier
            .register_public_key(user, challenge, DEVICE_PUB)
            .await
            .unwrap();
        verifier
            .register_public_key(intruder, challenge, OTHER_DEVICE_PUB)
            .await
            .unwrap();

        let proofs = with_signature(sign(OTHER_DEVICE_KEY, challenge), challenge);
        assert!(matches!(
            verifier.verify(user, ChallengeMethod::FingerPrint, &proofs).await,
            Err(AppError::FailedVerification(_))
        ));
    }

    #[tokio::test]
    async fn test_finger_print_rejects_different_challenge() {
        let verifier = verifier();
        let user = Uuid::new_v4();
        verifier
            .register_public_key(user, "challenge-a", DEVICE_PUB)
            .await
            .unwrap();

        let proofs = with_signature(sign(DEVICE_KEY, "challenge-b"), "challenge-a");
        assert!(matches!(
            verifier.verify(user, ChallengeMethod::FingerPrint, &proofs).await,
            Err(AppError::FailedVerification(_))
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_garbage_key() {
        let verifier = verifier();
        assert!(matches!(
            verifier
                .register_public_key(Uuid::new_v4(), "c", "not a pem")
                .await,
            Err(AppError::InvalidRequest(_))
        ));
    }
}
