use mongodb::bson::oid::ObjectId;

use codingclub_api::config::{Config, CookieConfig};
use codingclub_api::error::ApiError;
use codingclub_api::models::account::AccountRole;
use codingclub_api::services::token_service::{TokenSigner, TokenSubject};

fn config() -> Config {
    Config {
        mongo_uri: "mongodb://localhost:27017".to_string(),
        mongo_database: "codingclub_test".to_string(),
        access_token_secret: "integration-access-secret".to_string(),
        refresh_token_secret: "integration-refresh-secret".to_string(),
        access_token_ttl_seconds: 3600,
        refresh_token_ttl_seconds: 604800,
        admin_secret_key: "integration-admin-secret".to_string(),
        cookie: CookieConfig {
            secure: false,
            same_site: "lax".to_string(),
        },
    }
}

fn subject(role: AccountRole) -> TokenSubject {
    TokenSubject {
        id: ObjectId::new(),
        name: "Asha Rao".to_string(),
        email: "asha@example.com".to_string(),
        role,
    }
}

#[test]
fn access_token_carries_identity_claims() {
    let signer = TokenSigner::new(&config());
    let subject = subject(AccountRole::User);
    let pair = signer.sign_pair(&subject).unwrap();

    let claims = signer.verify_access(&pair.access_token).unwrap();
    assert_eq!(claims.sub, subject.id.to_hex());
    assert_eq!(claims.name, "Asha Rao");
    assert_eq!(claims.email, "asha@example.com");
    assert_eq!(claims.role, "user");
    assert!(claims.exp > claims.iat);
}

#[test]
fn admin_role_is_reflected_in_claims() {
    let signer = TokenSigner::new(&config());
    let pair = signer.sign_pair(&subject(AccountRole::Admin)).unwrap();

    let claims = signer.verify_access(&pair.access_token).unwrap();
    assert_eq!(claims.role, "admin");
}

#[test]
fn refresh_token_omits_profile_claims_but_keeps_session_id() {
    let signer = TokenSigner::new(&config());
    let pair = signer.sign_pair(&subject(AccountRole::User)).unwrap();

    let claims = signer.verify_refresh(&pair.refresh_token).unwrap();
    assert_eq!(claims.token_id, pair.token_id);
    // Refresh tokens must not double as access tokens
    assert!(signer.verify_access(&pair.refresh_token).is_err());
}

#[test]
fn tampered_token_is_rejected() {
    let signer = TokenSigner::new(&config());
    let pair = signer.sign_pair(&subject(AccountRole::User)).unwrap();

    let mut tampered = pair.access_token.clone();
    tampered.pop();
    tampered.push(if pair.access_token.ends_with('a') {
        'b'
    } else {
        'a'
    });

    match signer.verify_access(&tampered) {
        Err(ApiError::Unauthorized(_)) => {}
        other => panic!("expected unauthorized, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn token_from_another_deployment_is_rejected() {
    let signer = TokenSigner::new(&config());

    let mut foreign = config();
    foreign.access_token_secret = "some-other-deployment-secret".to_string();
    let foreign_signer = TokenSigner::new(&foreign);

    let pair = foreign_signer.sign_pair(&subject(AccountRole::User)).unwrap();
    assert!(signer.verify_access(&pair.access_token).is_err());
}
