//! Short-lived signed tokens with `{exp, public}` claims.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::config::SessionConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session token expired")]
    Expired,
    #[error("session token is invalid")]
    Invalid,
    #[error("session token payload is malformed: {0}")]
    Payload(String),
    #[error("failed to sign session token: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    /// Binds a pending transaction id to the confirm step.
    PreSession,
    /// Binds a merchant id for API-key checkout flows.
    Initiate,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    exp: i64,
    public: serde_json::Value,
}

#[derive(Clone)]
pub struct SessionTokens {
    pre_session_secret: String,
    initiate_secret: String,
    pre_session_ttl: Duration,
    initiate_ttl: Duration,
}

impl SessionTokens {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            pre_session_secret: config.pre_session_secret.clone(),
            initiate_secret: config.initiate_secret.clone(),
            pre_session_ttl: config.pre_session_ttl,
            initiate_ttl: config.initiate_ttl,
        }
    }

    pub fn issue<T: Serialize>(
        &self,
        purpose: TokenPurpose,
        public: &T,
    ) -> Result<String, SessionError> {
        let ttl = match purpose {
            TokenPurpose::PreSession => self.pre_session_ttl,
            TokenPurpose::Initiate => self.initiate_ttl,
        };
        self.issue_with_ttl(purpose, public, ttl)
    }

    pub fn issue_with_ttl<T: Serialize>(
        &self,
        purpose: TokenPurpose,
        public: &T,
        ttl: Duration,
    ) -> Result<String, SessionError> {
        let claims = Claims {
            exp: (Utc::now() + ttl).timestamp(),
            public: serde_json::to_value(public)
                .map_err(|e| SessionError::Encode(e.to_string()))?,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret(purpose)),
        )
        .map_err(|e| SessionError::Encode(e.to_string()))
    }

    /// Decodes a token; wrong secret, tampering or expiry all fail.
    pub fn decode<T: DeserializeOwned>(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<T, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret(purpose)),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => SessionError::Expired,
            _ => SessionError::Invalid,
        })?;

        serde_json::from_value(data.claims.public).map_err(|e| SessionError::Payload(e.to_string()))
    }

    fn secret(&self, purpose: TokenPurpose) -> &[u8] {
        match purpose {
            TokenPurpose::PreSession => self.pre_session_secret.as_bytes(),
            TokenPurpose::Initiate => self.initiate_secret.as_bytes(),
        }
    }
}
