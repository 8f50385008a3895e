//! Error taxonomy for the session lifecycle and tenant-scoped data access.
//!
//! Low-level failures from the hosted service arrive as [`RemoteError`] and are
//! never shown to users as-is: every public boundary maps them onto one of the
//! typed failures below, each of which reduces to a stable [`Notice`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Failure talking to the hosted identity/data service
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service returned {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("no active session")]
    NoSession,
}

impl RemoteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// The service refused the credential itself (expired, revoked, or absent)
    pub fn is_unauthorized(&self) -> bool {
        match self {
            RemoteError::NoSession => true,
            RemoteError::Api { status, code, .. } => {
                matches!(status, 401 | 403) || code.as_deref() == Some("PGRST301")
            }
            _ => false,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Decode(err.to_string())
    }
}

/// User-facing notification. The set is closed so front ends can localise it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    InvalidCredentials,
    SessionExpired,
    SessionCheckTimedOut,
    ServiceUnavailable,
    CompanyUnavailable,
    CompanyMissing,
    SignUpIncomplete,
    PasswordMismatch,
    WeakPassword,
    DuplicateRecord,
    InvalidInput,
    RecordNotFound,
    SaveFailed,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::InvalidCredentials => "Invalid email or password.",
            Notice::SessionExpired => "Your session has expired. Please sign in again.",
            Notice::SessionCheckTimedOut => "Could not verify your session in time. Please try again.",
            Notice::ServiceUnavailable => "The service is unreachable. Check your connection and try again.",
            Notice::CompanyUnavailable => "Your company could not be loaded. Please sign in again.",
            Notice::CompanyMissing => "Your account is not linked to a company yet.",
            Notice::SignUpIncomplete => "Your account was created but setup did not finish.",
            Notice::PasswordMismatch => "Passwords do not match.",
            Notice::WeakPassword => "Password is too short.",
            Notice::DuplicateRecord => "A record with the same details already exists.",
            Notice::InvalidInput => "Some fields are invalid.",
            Notice::RecordNotFound => "Record not found.",
            Notice::SaveFailed => "The change could not be saved.",
        }
    }

    /// The session check itself failed, as opposed to concluding "no session"
    pub fn is_session_check_failure(&self) -> bool {
        matches!(self, Notice::SessionCheckTimedOut | Notice::ServiceUnavailable)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Error)]
pub enum TenantResolutionFailure {
    #[error("company {company_id} not found")]
    NotFound { company_id: Uuid },

    #[error("company lookup failed: {0}")]
    Lookup(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardFailure {
    /// Session rejected by the service; local state was reset
    #[error("session expired")]
    SessionExpired,

    /// Signed in, but no company is attached to the user yet
    #[error("no company attached to the current user")]
    NoTenant,

    /// Validation could not reach the service; local state was kept
    #[error("session could not be verified: {0}")]
    Unverified(String),
}

impl GuardFailure {
    pub fn notice(&self) -> Notice {
        match self {
            GuardFailure::SessionExpired => Notice::SessionExpired,
            GuardFailure::NoTenant => Notice::CompanyMissing,
            GuardFailure::Unverified(_) => Notice::ServiceUnavailable,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthFailure {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("session expired or revoked")]
    SessionRevoked,

    #[error("identity service unreachable: {0}")]
    Network(String),

    #[error("identity service rejected the request: {0}")]
    Rejected(String),

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error(transparent)]
    Tenant(#[from] TenantResolutionFailure),

    #[error(transparent)]
    Guard(#[from] GuardFailure),
}

impl AuthFailure {
    pub fn notice(&self) -> Notice {
        match self {
            AuthFailure::InvalidCredentials => Notice::InvalidCredentials,
            AuthFailure::SessionRevoked => Notice::SessionExpired,
            AuthFailure::Network(_) => Notice::ServiceUnavailable,
            AuthFailure::Rejected(_) => Notice::SaveFailed,
            AuthFailure::PasswordMismatch => Notice::PasswordMismatch,
            AuthFailure::WeakPassword { .. } => Notice::WeakPassword,
            AuthFailure::Tenant(_) => Notice::CompanyUnavailable,
            AuthFailure::Guard(failure) => failure.notice(),
        }
    }
}

impl From<RemoteError> for AuthFailure {
    fn from(err: RemoteError) -> Self {
        match &err {
            RemoteError::Transport(msg) => AuthFailure::Network(msg.clone()),
            RemoteError::NoSession => AuthFailure::SessionRevoked,
            RemoteError::Api { status: 400, code, .. }
                if matches!(
                    code.as_deref(),
                    Some("invalid_grant") | Some("invalid_credentials")
                ) =>
            {
                AuthFailure::InvalidCredentials
            }
            RemoteError::Api { message, .. } if err.is_unauthorized() => {
                tracing::debug!("identity service refused token: {}", message);
                AuthFailure::SessionRevoked
            }
            RemoteError::Api { message, .. } => AuthFailure::Rejected(message.clone()),
            RemoteError::Decode(msg) => AuthFailure::Rejected(msg.clone()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Guard(#[from] GuardFailure),

    #[error("a record with the same unique fields already exists")]
    Duplicate,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("record not found")]
    NotFound,

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl ResourceError {
    pub fn notice(&self) -> Notice {
        match self {
            ResourceError::Guard(failure) => failure.notice(),
            ResourceError::Duplicate => Notice::DuplicateRecord,
            ResourceError::Validation(_) => Notice::InvalidInput,
            ResourceError::NotFound => Notice::RecordNotFound,
            ResourceError::Network(_) => Notice::ServiceUnavailable,
            ResourceError::Malformed(_) | ResourceError::Rejected { .. } => Notice::SaveFailed,
        }
    }
}

// Postgres error classes surfaced by the REST layer
const UNIQUE_VIOLATION: &str = "23505";
const INSUFFICIENT_PRIVILEGE: &str = "42501";
const VALIDATION_CODES: &[&str] = &["22001", "22007", "22P02", "23502", "23503", "23514"];

impl From<RemoteError> for ResourceError {
    fn from(err: RemoteError) -> Self {
        // A row-level security denial is about the row, not the token
        if err.is_unauthorized() && err.code() != Some(INSUFFICIENT_PRIVILEGE) {
            return ResourceError::Guard(GuardFailure::SessionExpired);
        }
        match err {
            RemoteError::Transport(msg) => ResourceError::Network(msg),
            RemoteError::Decode(msg) => ResourceError::Malformed(msg),
            RemoteError::NoSession => ResourceError::Guard(GuardFailure::SessionExpired),
            RemoteError::Api {
                status,
                code,
                message,
            } => match code.as_deref() {
                Some(UNIQUE_VIOLATION) => ResourceError::Duplicate,
                Some(c) if VALIDATION_CODES.contains(&c) => ResourceError::Validation(message),
                _ if status == 404 => ResourceError::NotFound,
                _ if status == 400 || status == 422 => ResourceError::Validation(message),
                _ => ResourceError::Rejected { status, message },
            },
        }
    }
}

/// The bounded wait for the initial session check expired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session check timed out after {after:?}")]
pub struct BootstrapTimeout {
    pub after: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, code: Option<&str>) -> RemoteError {
        RemoteError::Api {
            status,
            code: code.map(str::to_string),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn rejected_password_grant_is_invalid_credentials() {
        let failure = AuthFailure::from(api(400, Some("invalid_grant")));
        assert!(matches!(failure, AuthFailure::InvalidCredentials));
        assert_eq!(failure.notice(), Notice::InvalidCredentials);

        let failure = AuthFailure::from(api(400, Some("invalid_credentials")));
        assert!(matches!(failure, AuthFailure::InvalidCredentials));
    }

    #[test]
    fn expired_jwt_counts_as_unauthorized() {
        assert!(api(401, None).is_unauthorized());
        assert!(api(400, Some("PGRST301")).is_unauthorized());
        assert!(!api(500, None).is_unauthorized());
        assert!(matches!(
            AuthFailure::from(api(403, None)),
            AuthFailure::SessionRevoked
        ));
    }

    #[test]
    fn postgres_codes_map_to_resource_errors() {
        assert!(matches!(
            ResourceError::from(api(409, Some("23505"))),
            ResourceError::Duplicate
        ));
        assert!(matches!(
            ResourceError::from(api(400, Some("23514"))),
            ResourceError::Validation(_)
        ));
        assert!(matches!(
            ResourceError::from(RemoteError::Transport("reset".into())),
            ResourceError::Network(_)
        ));
        assert!(matches!(
            ResourceError::from(api(500, Some("XX000"))),
            ResourceError::Rejected { status: 500, .. }
        ));
    }

    #[test]
    fn refused_token_on_data_call_is_session_expiry() {
        for err in [api(401, None), api(401, Some("PGRST301")), api(403, None)] {
            assert!(matches!(
                ResourceError::from(err),
                ResourceError::Guard(GuardFailure::SessionExpired)
            ));
        }
        assert!(matches!(
            ResourceError::from(api(403, Some("42501"))),
            ResourceError::Rejected { status: 403, .. }
        ));
    }

    #[test]
    fn raw_messages_never_reach_notices() {
        let err = ResourceError::from(api(500, None));
        assert_eq!(err.notice().to_string(), "The change could not be saved.");
        assert!(!err.notice().to_string().contains("boom"));
    }
}
