//! Login/registration and the user directory (§4.3).

pub mod error;
pub mod verifier;

pub use error::AuthError;
pub use verifier::{HttpIdentityVerifier, IdentityVerifier, VerifiedIdentity};

use crate::domain::User;
use crate::store::GameStore;
use rand::RngExt;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Legacy (non-token) registration fields hashed into the uid (§4.3).
pub struct LegacyRegistration<'a> {
    pub name: &'a str,
    pub upload_ts: i64,
    pub wsid: &'a str,
}

/// Looks up or creates `User` records and tracks login/scope bookkeeping.
pub struct UserDirectory {
    store: Arc<dyn GameStore>,
    verifier: Option<Arc<dyn IdentityVerifier>>,
}

impl UserDirectory {
    #[must_use]
    pub fn new(store: Arc<dyn GameStore>, verifier: Option<Arc<dyn IdentityVerifier>>) -> Self {
        Self { store, verifier }
    }

    /// Delegates to the external verifier (§6). Fails with `AuthFailed`-class
    /// errors the caller maps to `{"error":"Login failed"}`.
    pub async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let verifier = self
            .verifier
            .as_ref()
            .ok_or_else(|| AuthError::VerifierUnavailable("no verifier configured".to_string()))?;
        verifier.verify_token(token).await
    }

    /// Finds or creates the `User` for a verified token identity.
    pub async fn get_or_register_by_account(
        &self,
        account_id: &str,
        display_name: &str,
        now: i64,
    ) -> anyhow::Result<User> {
        if let Some(existing) = self.store.find_user_by_account_id(account_id).await? {
            return Ok(existing);
        }

        let uid = deterministic_uid_for_account(account_id);
        let secret = random_secret_hex();
        let mut user = User::new(uid, display_name.to_string(), secret, now);
        user.account_id = Some(account_id.to_string());
        self.store.upsert_user(user.clone()).await?;
        Ok(user)
    }

    /// Finds or creates the `User` for a legacy (non-token) login.
    pub async fn get_or_register_legacy(
        &self,
        registration: LegacyRegistration<'_>,
        now: i64,
    ) -> anyhow::Result<User> {
        let uid = legacy_uid(registration.name, registration.upload_ts, registration.wsid);
        if let Some(existing) = self.store.find_user(&uid).await? {
            return Ok(existing);
        }

        let secret = random_secret_hex();
        let user = User::new(uid, registration.name.to_string(), secret, now);
        self.store.upsert_user(user.clone()).await?;
        Ok(user)
    }

    /// Authenticates an existing user by uid/secret for reconnection.
    pub async fn authenticate(&self, uid: &str, secret: &str) -> Result<User, AuthError> {
        let user = self
            .store
            .find_user(uid)
            .await
            .map_err(|err| AuthError::VerifierUnavailable(err.to_string()))?
            .ok_or(AuthError::UnknownAccount)?;

        if !secrets_match(&user.secret, secret) {
            return Err(AuthError::SecretMismatch);
        }

        Ok(user)
    }

    pub async fn login_touch(&self, user: &mut User, now: i64) -> anyhow::Result<()> {
        user.login_touch(now);
        self.store.touch_user(user).await
    }

    /// Persists the resumption string asynchronously; failures are logged by
    /// the caller, not surfaced to the client (§4.3).
    pub async fn set_last_scope(&self, user: &mut User, scope: String) -> anyhow::Result<()> {
        user.last_scope = Some(scope);
        self.store.touch_user(user).await
    }
}

fn deterministic_uid_for_account(account_id: &str) -> String {
    let digest = Sha256::digest(format!("account|{account_id}").as_bytes());
    hex::encode(digest)[..20].to_string()
}

fn legacy_uid(name: &str, upload_ts: i64, wsid: &str) -> String {
    let joined = [name, &upload_ts.to_string(), wsid].join("|");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)[..20].to_string()
}

/// A random 20-byte secret, hex-encoded (§4.3).
fn random_secret_hex() -> String {
    const HEX_CHARS: &[u8] = b"0123456789abcdef";
    let mut rng = rand::rng();
    (0..40)
        .map(|_| HEX_CHARS[rng.random_range(0..HEX_CHARS.len())] as char)
        .collect()
}

fn secrets_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn directory() -> UserDirectory {
        UserDirectory::new(Arc::new(InMemoryStore::new()), None)
    }

    #[tokio::test]
    async fn get_or_register_by_account_is_idempotent() {
        let directory = directory();
        let first = directory
            .get_or_register_by_account("acct-1", "Racer", 1000)
            .await
            .unwrap();
        let second = directory
            .get_or_register_by_account("acct-1", "Racer", 2000)
            .await
            .unwrap();
        assert_eq!(first.uid, second.uid);
    }

    #[tokio::test]
    async fn legacy_registration_is_idempotent_for_same_fields() {
        let directory = directory();
        let registration = LegacyRegistration {
            name: "Racer",
            upload_ts: 12345,
            wsid: "ws-1",
        };
        let first = directory
            .get_or_register_legacy(
                LegacyRegistration {
                    name: "Racer",
                    upload_ts: 12345,
                    wsid: "ws-1",
                },
                1000,
            )
            .await
            .unwrap();
        let second = directory.get_or_register_legacy(registration, 2000).await.unwrap();
        assert_eq!(first.uid, second.uid);
    }

    #[tokio::test]
    async fn authenticate_rejects_wrong_secret() {
        let directory = directory();
        let user = directory
            .get_or_register_by_account("acct-1", "Racer", 1000)
            .await
            .unwrap();
        let result = directory.authenticate(&user.uid, "wrong-secret").await;
        assert!(matches!(result, Err(AuthError::SecretMismatch)));
    }

    #[tokio::test]
    async fn authenticate_unknown_uid_fails() {
        let directory = directory();
        let result = directory.authenticate("no-such-uid", "whatever").await;
        assert!(matches!(result, Err(AuthError::UnknownAccount)));
    }

    #[tokio::test]
    async fn login_touch_increments_counters() {
        let directory = directory();
        let mut user = directory
            .get_or_register_by_account("acct-1", "Racer", 1000)
            .await
            .unwrap();
        directory.login_touch(&mut user, 2000).await.unwrap();
        assert_eq!(user.n_logins, 1);
        assert_eq!(user.last_seen, 2000);
    }
}
