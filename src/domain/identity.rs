//! Credentials the challenge verifier checks proofs against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hash of the user's 2FA secret, `base64(sha256(secret))`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordIdentity {
    pub user_id: Uuid,
    pub hash: String,
    pub updated_at: DateTime<Utc>,
}

/// A one-time code sent to the user's phone. Only the seal is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneAuth {
    pub id: Uuid,
    pub user_id: Uuid,
    pub phone: String,
    pub seal: String,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

/// Device public key registered for a single challenge string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub challenge: String,
    pub public_key_pem: String,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl PublicKeyRecord {
    pub fn new(user_id: Uuid, challenge: String, public_key_pem: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            challenge,
            public_key_pem,
            used: false,
            created_at: Utc::now(),
        }
    }
}
