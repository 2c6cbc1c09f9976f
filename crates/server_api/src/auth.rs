use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use shared::domain::{Role, Session};

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token_secret: String,
    pub token_ttl_seconds: i64,
}

const PASSWORD_SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

/// Produces `sha256$<salt_b64>$<digest_b64>` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = salted_digest(&salt, password);
    format!(
        "{PASSWORD_SCHEME}${}${}",
        STANDARD.encode(salt),
        STANDARD.encode(digest)
    )
}

/// Recomputes the salted digest and compares it in constant time. Any
/// malformed stored value fails closed.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(scheme), Some(salt_b64), Some(digest_b64)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != PASSWORD_SCHEME {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (STANDARD.decode(salt_b64), STANDARD.decode(digest_b64)) else {
        return false;
    };
    let actual = salted_digest(&salt, password);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

fn salted_digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    branch: String,
    name: String,
    iat: i64,
    exp: i64,
}

pub fn mint_session_token(
    cfg: &AuthConfig,
    session: &Session,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: session.username.clone(),
        role: session.role,
        branch: session.branch_code.clone(),
        name: session.display_name.clone(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(cfg.token_ttl_seconds)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.token_secret.as_bytes()),
    )
}

/// `None` for anything but a well-formed, correctly signed, unexpired token.
pub fn verify_session_token(cfg: &AuthConfig, token: &str) -> Option<Session> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.token_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    Some(Session {
        username: decoded.claims.sub,
        role: decoded.claims.role,
        branch_code: decoded.claims.branch,
        display_name: decoded.claims.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(ttl_seconds: i64) -> AuthConfig {
        AuthConfig {
            token_secret: "devsecret".into(),
            token_ttl_seconds: ttl_seconds,
        }
    }

    fn session() -> Session {
        Session {
            username: "amal".into(),
            role: Role::Branch,
            branch_code: "RY1".into(),
            display_name: "Amal".into(),
        }
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let stored = hash_password("hunter2");
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(hash_password("hunter2"), hash_password("hunter2"));
    }

    #[test]
    fn malformed_stored_hash_is_rejected() {
        assert!(!verify_password("hunter2", "hunter2"));
        assert!(!verify_password("hunter2", "md5$abc$def"));
        assert!(!verify_password("hunter2", "sha256$not-base64$%%%"));
    }

    #[test]
    fn token_round_trips_the_session() {
        let cfg = cfg(60);
        let token = mint_session_token(&cfg, &session()).expect("token");
        let decoded = verify_session_token(&cfg, &token).expect("session");
        assert_eq!(decoded, session());
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = mint_session_token(&cfg(60), &session()).expect("token");
        let other = AuthConfig {
            token_secret: "othersecret".into(),
            token_ttl_seconds: 60,
        };
        assert!(verify_session_token(&other, &token).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let cfg = cfg(-120);
        let token = mint_session_token(&cfg, &session()).expect("token");
        assert!(verify_session_token(&cfg, &token).is_none());
    }
}
