use thiserror::Error;

/// Failure modes of the login/registration handshake (§4.3).
///
/// All variants collapse to the same `{"error":"Login failed"}` outbound
/// frame; the distinction exists for logging, not for the wire.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown account")]
    UnknownAccount,
    #[error("secret mismatch")]
    SecretMismatch,
    #[error("identity verifier rejected the token: {0}")]
    VerifierRejected(String),
    #[error("identity verifier call failed: {0}")]
    VerifierUnavailable(String),
    #[error("legacy login/register is disabled by configuration")]
    LegacyDisabled,
}
