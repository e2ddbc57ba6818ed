use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::Database;

use crate::config::Config;
use crate::error::ApiError;
use crate::models::account::{
    AccountRole, Admin, AdminAuthResponse, AdminLoginRequest, AdminProfile, AdminSignupRequest,
    LoginRequest, SignupRequest, UpdateProfileRequest, User, UserAuthResponse, UserProfile,
};
use crate::services::token_service::{TokenService, TokenSubject};

pub struct AuthService {
    mongo: Database,
    tokens: TokenService,
    admin_secret_key: String,
}

impl AuthService {
    pub fn new(config: &Config, mongo: Database) -> Self {
        Self {
            tokens: TokenService::new(config, mongo.clone()),
            mongo,
            admin_secret_key: config.admin_secret_key.clone(),
        }
    }

    fn hash_password(&self, password: &str) -> Result<String, ApiError> {
        hash(password, DEFAULT_COST)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to hash password: {e}")))
    }

    fn verify_password(&self, password: &str, hashed: &str) -> Result<bool, ApiError> {
        verify(password, hashed)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to verify password: {e}")))
    }

    /// Register a new user. Email and registration number must both be free;
    /// the unique indexes back this up against concurrent signups.
    pub async fn signup(&self, req: SignupRequest) -> Result<UserProfile, ApiError> {
        let users = self.mongo.collection::<User>("users");

        let existing = users
            .find_one(doc! {
                "$or": [
                    { "email": &req.email },
                    { "registrationNumber": &req.registration_number },
                ]
            })
            .await?;
        if existing.is_some() {
            return Err(ApiError::Conflict(
                "User already exists with this email or registration number".to_string(),
            ));
        }

        let password_hash = self.hash_password(&req.password)?;
        let now = Utc::now();
        let user = User {
            id: None,
            name: req.name,
            email: req.email,
            password_hash,
            mobile: req.mobile,
            registration_number: req.registration_number,
            branch: req.branch,
            semester: req.semester,
            role: AccountRole::User,
            refresh_token: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        let insert = users.insert_one(&user).await.map_err(|e| {
            if crate::error::is_duplicate_key(&e) {
                ApiError::Conflict(
                    "User already exists with this email or registration number".to_string(),
                )
            } else {
                e.into()
            }
        })?;

        let user_id = insert
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Missing inserted user id")))?;

        tracing::info!(user_id = %user_id.to_hex(), "User registered");

        let mut created = user;
        created.id = Some(user_id);
        Ok(UserProfile::from(created))
    }

    pub async fn login(&self, req: LoginRequest) -> Result<UserAuthResponse, ApiError> {
        let users = self.mongo.collection::<User>("users");

        let user = users
            .find_one(doc! { "email": &req.email })
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

        if !self.verify_password(&req.password, &user.password_hash)? {
            tracing::warn!(email = %req.email, "Failed login attempt");
            return Err(ApiError::Unauthorized(
                "Invalid email or password".to_string(),
            ));
        }

        let user_id = user
            .id
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("User record without id")))?;

        users
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "lastLoginAt": mongodb::bson::DateTime::now() } },
            )
            .await?;

        let pair = self
            .tokens
            .issue_token_pair(&TokenSubject::from(&user))
            .await?;

        tracing::info!(user_id = %user_id.to_hex(), "User logged in");

        Ok(UserAuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: UserProfile::from(user),
        })
    }

    /// Admin self-registration is gated by the shared secret key.
    pub async fn admin_signup(&self, req: AdminSignupRequest) -> Result<AdminProfile, ApiError> {
        if req.secret_key != self.admin_secret_key {
            return Err(ApiError::Unauthorized("Invalid secret key".to_string()));
        }

        let admins = self.mongo.collection::<Admin>("admins");
        if admins
            .find_one(doc! { "email": &req.email })
            .await?
            .is_some()
        {
            return Err(ApiError::Conflict(
                "Admin already exists with this email".to_string(),
            ));
        }

        let now = Utc::now();
        let admin = Admin {
            id: None,
            name: req.name,
            email: req.email,
            password_hash: self.hash_password(&req.password)?,
            role: AccountRole::Admin,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };

        let insert = admins.insert_one(&admin).await.map_err(|e| {
            if crate::error::is_duplicate_key(&e) {
                ApiError::Conflict("Admin already exists with this email".to_string())
            } else {
                e.into()
            }
        })?;

        let admin_id = insert
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Missing inserted admin id")))?;

        tracing::info!(admin_id = %admin_id.to_hex(), "Admin registered");

        let mut created = admin;
        created.id = Some(admin_id);
        Ok(AdminProfile::from(created))
    }

    pub async fn admin_login(&self, req: AdminLoginRequest) -> Result<AdminAuthResponse, ApiError> {
        if req.secret_key != self.admin_secret_key {
            return Err(ApiError::Unauthorized("Invalid secret key".to_string()));
        }

        let admins = self.mongo.collection::<Admin>("admins");
        let admin = admins
            .find_one(doc! { "email": &req.email })
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

        if !self.verify_password(&req.password, &admin.password_hash)? {
            tracing::warn!(email = %req.email, "Failed admin login attempt");
            return Err(ApiError::Unauthorized(
                "Invalid email or password".to_string(),
            ));
        }

        let pair = self
            .tokens
            .issue_token_pair(&TokenSubject::from(&admin))
            .await?;

        Ok(AdminAuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            admin: AdminProfile::from(admin),
        })
    }

    pub async fn logout(&self, account_id: &ObjectId, role: AccountRole) -> Result<(), ApiError> {
        self.tokens.revoke(account_id, role).await?;
        tracing::info!(account_id = %account_id.to_hex(), "Session revoked");
        Ok(())
    }

    pub async fn get_user_profile(&self, user_id: &ObjectId) -> Result<UserProfile, ApiError> {
        let users = self.mongo.collection::<User>("users");
        let user = users
            .find_one(doc! { "_id": user_id })
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        Ok(UserProfile::from(user))
    }

    pub async fn update_profile(
        &self,
        user_id: &ObjectId,
        req: UpdateProfileRequest,
    ) -> Result<UserProfile, ApiError> {
        let mut set_doc = Document::new();
        if let Some(name) = req.name {
            set_doc.insert("name", name);
        }
        if let Some(mobile) = req.mobile {
            set_doc.insert("mobile", mobile);
        }
        if let Some(branch) = req.branch {
            set_doc.insert("branch", branch);
        }
        if let Some(semester) = req.semester {
            set_doc.insert("semester", semester as i32);
        }
        if set_doc.is_empty() {
            return Err(ApiError::Validation("No fields to update".to_string()));
        }
        set_doc.insert("updatedAt", mongodb::bson::DateTime::now());

        let users = self.mongo.collection::<User>("users");
        users
            .update_one(doc! { "_id": user_id }, doc! { "$set": set_doc })
            .await?;

        self.get_user_profile(user_id).await
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>, ApiError> {
        let users = self.mongo.collection::<User>("users");
        let cursor = users.find(doc! {}).sort(doc! { "createdAt": -1 }).await?;
        let all: Vec<User> = cursor.try_collect().await?;
        Ok(all.into_iter().map(UserProfile::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use bcrypt::{hash, verify, DEFAULT_COST};

    #[test]
    fn password_hash_round_trip() {
        let hashed = hash("correct horse battery staple", DEFAULT_COST).unwrap();
        assert_ne!(hashed, "correct horse battery staple");
        assert!(verify("correct horse battery staple", &hashed).unwrap());
        assert!(!verify("wrong password", &hashed).unwrap());
    }
}
