use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ApiError;
use crate::models::account::{AccountRole, Admin, User};

pub const TOKEN_AUDIENCE: &str = "coding-club-api";
pub const TOKEN_ISSUER: &str = "coding-club-auth";

/// Access token claims. `token_id` identifies the session the pair belongs to.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(rename = "tokenId")]
    pub token_id: String,
    pub iat: usize,
    pub exp: usize,
    pub aud: String,
    pub iss: String,
}

/// Refresh token claims carry the minimum needed for rotation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    #[serde(rename = "tokenId")]
    pub token_id: String,
    pub iat: usize,
    pub exp: usize,
    pub aud: String,
    pub iss: String,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_id: String,
}

/// The identity a token pair is minted for.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    pub role: AccountRole,
}

impl From<&User> for TokenSubject {
    fn from(user: &User) -> Self {
        TokenSubject {
            id: user.id.unwrap_or_default(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

impl From<&Admin> for TokenSubject {
    fn from(admin: &Admin) -> Self {
        TokenSubject {
            id: admin.id.unwrap_or_default(),
            name: admin.name.clone(),
            email: admin.email.clone(),
            role: admin.role,
        }
    }
}

/// Pure JWT signing/verification, separated from persistence so it can be
/// exercised without a database.
pub struct TokenSigner {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenSigner {
    pub fn new(config: &Config) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_ttl_seconds: config.access_token_ttl_seconds,
            refresh_ttl_seconds: config.refresh_token_ttl_seconds,
        }
    }

    fn generate_token_id() -> String {
        let bytes: [u8; 16] = rand::random();
        hex::encode(bytes)
    }

    /// Sign a fresh access/refresh pair sharing one session identifier.
    pub fn sign_pair(&self, subject: &TokenSubject) -> Result<TokenPair, ApiError> {
        let token_id = Self::generate_token_id();
        let now = Utc::now();

        let access_claims = AccessClaims {
            sub: subject.id.to_hex(),
            name: subject.name.clone(),
            email: subject.email.clone(),
            role: subject.role.as_str().to_string(),
            token_id: token_id.clone(),
            iat: now.timestamp() as usize,
            exp: (now + Duration::seconds(self.access_ttl_seconds)).timestamp() as usize,
            aud: TOKEN_AUDIENCE.to_string(),
            iss: TOKEN_ISSUER.to_string(),
        };

        let refresh_claims = RefreshClaims {
            sub: subject.id.to_hex(),
            token_id: token_id.clone(),
            iat: now.timestamp() as usize,
            exp: (now + Duration::seconds(self.refresh_ttl_seconds)).timestamp() as usize,
            aud: TOKEN_AUDIENCE.to_string(),
            iss: TOKEN_ISSUER.to_string(),
        };

        let access_token = encode(&Header::default(), &access_claims, &self.access_encoding)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to sign access token: {e}")))?;
        let refresh_token = encode(&Header::default(), &refresh_claims, &self.refresh_encoding)
            .map_err(|e| {
                ApiError::Internal(anyhow::anyhow!("Failed to sign refresh token: {e}"))
            })?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_id,
        })
    }

    fn validation() -> Validation {
        let mut validation = Validation::default();
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation
    }

    fn classify(e: jsonwebtoken::errors::Error) -> ApiError {
        if e.to_string().contains("ExpiredSignature") {
            ApiError::Unauthorized("Token has expired".to_string())
        } else {
            ApiError::Unauthorized("Invalid token".to_string())
        }
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, ApiError> {
        decode::<AccessClaims>(token, &self.access_decoding, &Self::validation())
            .map(|data| data.claims)
            .map_err(Self::classify)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, ApiError> {
        decode::<RefreshClaims>(token, &self.refresh_decoding, &Self::validation())
            .map(|data| data.claims)
            .map_err(Self::classify)
    }
}

/// Issues, verifies, rotates, and revokes session credentials. The refresh
/// token is persisted on the account document: one live session per account,
/// replaced on each issuance.
pub struct TokenService {
    mongo: Database,
    signer: TokenSigner,
}

impl TokenService {
    pub fn new(config: &Config, mongo: Database) -> Self {
        Self {
            mongo,
            signer: TokenSigner::new(config),
        }
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, ApiError> {
        self.signer.verify_access(token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, ApiError> {
        self.signer.verify_refresh(token)
    }

    /// Sign a pair and store the refresh token on the account record,
    /// overwriting any prior one. Exactly one persistence write.
    pub async fn issue_token_pair(&self, subject: &TokenSubject) -> Result<TokenPair, ApiError> {
        let pair = self.signer.sign_pair(subject)?;
        self.store_refresh_token(&subject.id, subject.role, &pair.refresh_token)
            .await?;
        Ok(pair)
    }

    /// Full rotation: verify, match against the stored slot (detects reuse of
    /// a revoked or rotated token), then issue a fresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(TokenPair, TokenSubject), ApiError> {
        let claims = self.verify_refresh(refresh_token)?;
        let account_id = ObjectId::parse_str(&claims.sub)
            .map_err(|_| ApiError::Unauthorized("Invalid refresh token".to_string()))?;

        let (subject, stored) = self.load_subject(&account_id).await?;

        if !slot_matches(stored.as_deref(), refresh_token) {
            tracing::warn!(
                account_id = %account_id.to_hex(),
                "Refresh token mismatch: possible reuse of a rotated token"
            );
            return Err(ApiError::Unauthorized(
                "Invalid refresh token".to_string(),
            ));
        }

        let pair = self.issue_token_pair(&subject).await?;
        Ok((pair, subject))
    }

    /// Clears the stored refresh token, making the outstanding one unusable
    /// even though it has not expired (logout).
    pub async fn revoke(&self, account_id: &ObjectId, role: AccountRole) -> Result<(), ApiError> {
        let collection = self.collection_name(role);
        self.mongo
            .collection::<mongodb::bson::Document>(collection)
            .update_one(
                doc! { "_id": account_id },
                doc! { "$unset": { "refreshToken": "" } },
            )
            .await?;
        Ok(())
    }

    fn collection_name(&self, role: AccountRole) -> &'static str {
        match role {
            AccountRole::Admin => "admins",
            AccountRole::User => "users",
        }
    }

    async fn store_refresh_token(
        &self,
        account_id: &ObjectId,
        role: AccountRole,
        refresh_token: &str,
    ) -> Result<(), ApiError> {
        let collection = self.collection_name(role);
        self.mongo
            .collection::<mongodb::bson::Document>(collection)
            .update_one(
                doc! { "_id": account_id },
                doc! { "$set": { "refreshToken": refresh_token } },
            )
            .await?;
        Ok(())
    }

    /// Users first, then admins, matching the identity resolution order of
    /// the auth middleware.
    async fn load_subject(
        &self,
        account_id: &ObjectId,
    ) -> Result<(TokenSubject, Option<String>), ApiError> {
        let users = self.mongo.collection::<User>("users");
        if let Some(user) = users.find_one(doc! { "_id": account_id }).await? {
            let stored = user.refresh_token.clone();
            return Ok((TokenSubject::from(&user), stored));
        }

        let admins = self.mongo.collection::<Admin>("admins");
        if let Some(admin) = admins.find_one(doc! { "_id": account_id }).await? {
            let stored = admin.refresh_token.clone();
            return Ok((TokenSubject::from(&admin), stored));
        }

        Err(ApiError::Unauthorized("Account not found".to_string()))
    }
}

/// A presented refresh token is valid only while it occupies the account's
/// single slot. Rotation replaces the slot, logout clears it; either way the
/// old token stops matching.
pub fn slot_matches(stored: Option<&str>, presented: &str) -> bool {
    stored == Some(presented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CookieConfig;

    fn test_config(access_ttl: i64) -> Config {
        Config {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "codingclub_test".to_string(),
            access_token_secret: "access-test-secret".to_string(),
            refresh_token_secret: "refresh-test-secret".to_string(),
            access_token_ttl_seconds: access_ttl,
            refresh_token_ttl_seconds: 604800,
            admin_secret_key: "admin-test-secret".to_string(),
            cookie: CookieConfig {
                secure: false,
                same_site: "lax".to_string(),
            },
        }
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            id: ObjectId::new(),
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            role: AccountRole::User,
        }
    }

    #[test]
    fn pair_shares_token_id() {
        let signer = TokenSigner::new(&test_config(3600));
        let pair = signer.sign_pair(&subject()).unwrap();

        let access = signer.verify_access(&pair.access_token).unwrap();
        let refresh = signer.verify_refresh(&pair.refresh_token).unwrap();

        assert_eq!(access.token_id, pair.token_id);
        assert_eq!(refresh.token_id, pair.token_id);
        assert_eq!(access.sub, refresh.sub);
        assert_eq!(access.aud, TOKEN_AUDIENCE);
        assert_eq!(access.iss, TOKEN_ISSUER);
    }

    #[test]
    fn expired_access_token_is_rejected() {
        // Negative TTL backdates the expiry past the validation leeway
        let signer = TokenSigner::new(&test_config(-600));
        let pair = signer.sign_pair(&subject()).unwrap();

        let err = signer.verify_access(&pair.access_token).unwrap_err();
        match err {
            ApiError::Unauthorized(msg) => assert!(msg.contains("expired")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn tokens_are_not_interchangeable_across_secrets() {
        let signer = TokenSigner::new(&test_config(3600));
        let pair = signer.sign_pair(&subject()).unwrap();

        // Access token cannot pass refresh verification and vice versa
        assert!(signer.verify_refresh(&pair.access_token).is_err());
        assert!(signer.verify_access(&pair.refresh_token).is_err());
    }

    #[test]
    fn foreign_audience_is_rejected() {
        let config = test_config(3600);
        let signer = TokenSigner::new(&config);

        let claims = AccessClaims {
            sub: ObjectId::new().to_hex(),
            name: "Evil".to_string(),
            email: "evil@example.com".to_string(),
            role: "user".to_string(),
            token_id: "forged".to_string(),
            iat: Utc::now().timestamp() as usize,
            exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
            aud: "some-other-api".to_string(),
            iss: TOKEN_ISSUER.to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.access_token_secret.as_bytes()),
        )
        .unwrap();

        assert!(signer.verify_access(&token).is_err());
    }

    #[test]
    fn token_ids_are_unique_per_issuance() {
        let signer = TokenSigner::new(&test_config(3600));
        let subject = subject();
        let first = signer.sign_pair(&subject).unwrap();
        let second = signer.sign_pair(&subject).unwrap();
        assert_ne!(first.token_id, second.token_id);
    }

    #[test]
    fn rotated_refresh_token_no_longer_matches_slot() {
        let signer = TokenSigner::new(&test_config(3600));
        let subject = subject();
        let first = signer.sign_pair(&subject).unwrap();
        let second = signer.sign_pair(&subject).unwrap();

        // Slot holds the first token: only the first one passes
        assert!(slot_matches(Some(&first.refresh_token), &first.refresh_token));
        assert!(!slot_matches(Some(&first.refresh_token), &second.refresh_token));

        // After rotation the slot holds the second token: replaying the
        // first (still cryptographically valid) token must fail
        assert!(signer.verify_refresh(&first.refresh_token).is_ok());
        assert!(!slot_matches(Some(&second.refresh_token), &first.refresh_token));

        // A cleared slot (logout) matches nothing
        assert!(!slot_matches(None, &second.refresh_token));
    }
}
