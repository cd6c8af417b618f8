use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::config::Config;
use crate::models::{AuthPayload, Role, User};
use crate::storage::Storage;

pub use bcrypt::DEFAULT_COST;

pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(password, cost)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password, hash)
}

/// Issues and checks HS256 bearer tokens, hashes passwords, and validates emails.
#[derive(Clone)]
pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: usize,
    bcrypt_cost: u32,
    email_domain: Option<String>,
}

impl Authenticator {
    pub fn new(secret: &str, ttl_hours: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: usize::try_from(ttl_hours.saturating_mul(3600)).unwrap_or(usize::MAX),
            bcrypt_cost: DEFAULT_COST,
            email_domain: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.jwt_secret, config.jwt_ttl_hours).with_email_domain(config.email_domain.clone())
    }

    /// Lower the bcrypt cost (tests and seed scripts).
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn with_email_domain(mut self, domain: Option<String>) -> Self {
        self.email_domain = domain;
        self
    }

    pub fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        hash_password(password, self.bcrypt_cost)
    }

    pub fn create_jwt(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp().max(0) as usize;
        let claims = AuthPayload {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn validate_jwt(&self, token: &str) -> Result<AuthPayload, jsonwebtoken::errors::Error> {
        let token_data = decode::<AuthPayload>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
        Ok(token_data.claims)
    }

    /// Check the shape of an email address and, when configured, its domain.
    /// Returns the normalised (trimmed, lower-cased) address.
    pub fn validate_email(&self, email: &str) -> Result<String, String> {
        let email = email.trim().to_ascii_lowercase();
        let (local, domain) = email
            .split_once('@')
            .ok_or_else(|| "Email must contain '@'".to_string())?;
        let well_formed = !local.is_empty()
            && !domain.contains('@')
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !email.chars().any(char::is_whitespace);
        if !well_formed {
            return Err("Invalid email format".to_string());
        }
        if let Some(required) = &self.email_domain {
            if domain != required {
                return Err(format!("Email must be a @{} address", required));
            }
        }
        Ok(email)
    }
}

/// Create the bootstrap admin account unless a user with that email already exists.
/// Returns the new user when one was created.
pub fn ensure_admin(
    storage: &Storage,
    auth: &Authenticator,
    email: &str,
    password: &str,
) -> Result<Option<User>, Box<dyn std::error::Error + Send + Sync>> {
    let email = auth.validate_email(email)?;
    if storage.get_user_by_email(&email)?.is_some() {
        return Ok(None);
    }
    let now = Utc::now();
    let admin = User {
        id: uuid::Uuid::new_v4().to_string(),
        first_name: "System".to_string(),
        last_name: "Administrator".to_string(),
        email,
        password_hash: auth.hash_password(password)?,
        role: Role::Admin,
        unit_id: None,
        phone: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    storage.create_user(&admin)?;
    Ok(Some(admin))
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: "user-1".to_string(),
            first_name: "Baraka".to_string(),
            last_name: "Said".to_string(),
            email: "baraka@udsm.ac.tz".to_string(),
            password_hash: String::new(),
            role: Role::Coordinator,
            unit_id: None,
            phone: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let auth = Authenticator::new("k", 1).with_bcrypt_cost(4);
        let hashed = auth.hash_password("hunter22").unwrap();
        assert_ne!(hashed, "hunter22");
        assert!(verify_password("hunter22", &hashed).unwrap());
        assert!(!verify_password("hunter23", &hashed).unwrap());
    }

    #[test]
    fn test_jwt_carries_user_and_role() {
        let auth = Authenticator::new("secret-a", 24);
        let token = auth.create_jwt(&sample_user()).unwrap();
        let claims = auth.validate_jwt(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, Role::Coordinator);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_huge_ttl_saturates_instead_of_overflowing() {
        let auth = Authenticator::new("secret-a", u64::MAX);
        let token = auth.create_jwt(&sample_user()).unwrap();
        let claims = auth.validate_jwt(&token).unwrap();
        assert_eq!(claims.exp, usize::MAX);
    }

    #[test]
    fn test_jwt_signed_with_other_secret_rejected() {
        let token = Authenticator::new("secret-a", 1).create_jwt(&sample_user()).unwrap();
        assert!(Authenticator::new("secret-b", 1).validate_jwt(&token).is_err());
        assert!(Authenticator::new("secret-a", 1).validate_jwt("not.a.token").is_err());
    }

    #[test]
    fn test_email_validation() {
        let open = Authenticator::new("k", 1);
        assert_eq!(open.validate_email(" Jane@Example.org ").unwrap(), "jane@example.org");
        assert!(open.validate_email("jane").is_err());
        assert!(open.validate_email("jane@localhost").is_err());
        assert!(open.validate_email("@udsm.ac.tz").is_err());

        let scoped = Authenticator::new("k", 1).with_email_domain(Some("udsm.ac.tz".to_string()));
        assert!(scoped.validate_email("jane@udsm.ac.tz").is_ok());
        assert!(scoped.validate_email("jane@gmail.com").is_err());
    }

    #[test]
    fn test_ensure_admin_is_idempotent() {
        let storage = Storage::open_temporary().unwrap();
        let auth = Authenticator::new("k", 1).with_bcrypt_cost(4);
        let created = ensure_admin(&storage, &auth, "Admin@udsm.ac.tz", "changeme").unwrap();
        assert_eq!(created.map(|u| u.role), Some(Role::Admin));
        assert!(ensure_admin(&storage, &auth, "admin@udsm.ac.tz", "other").unwrap().is_none());
        assert_eq!(storage.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }
}
