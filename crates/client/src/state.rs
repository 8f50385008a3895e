use shared::{AuthUser, Company, Session};
use uuid::Uuid;

use crate::error::Notice;

/// Snapshot of the session store. Readers always see a whole snapshot, never a
/// half-applied `{session, user, company}` tuple.
#[derive(Debug, Clone)]
pub struct AuthState {
    pub session: Option<Session>,
    pub user: Option<AuthUser>,
    pub company: Option<Company>,
    pub is_loading: bool,
    pub error: Option<Notice>,
    /// Bumped by every explicit state change; stale continuations compare against it
    pub epoch: u64,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            user: None,
            company: None,
            // Nothing is known until the bootstrapper has run
            is_loading: true,
            error: None,
            epoch: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Loading,
    Anonymous,
    AuthenticatedNoCompany,
    Authenticated,
    /// The session check itself failed
    Failed,
}

impl AuthState {
    pub fn status(&self) -> AuthStatus {
        if self.is_loading {
            return AuthStatus::Loading;
        }
        match (&self.user, &self.company) {
            (None, _) if self.error.is_some_and(|n| n.is_session_check_failure()) => {
                AuthStatus::Failed
            }
            (None, _) => AuthStatus::Anonymous,
            (Some(_), None) => AuthStatus::AuthenticatedNoCompany,
            (Some(_), Some(_)) => AuthStatus::Authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some() && self.user.is_some()
    }

    pub fn company_id(&self) -> Option<Uuid> {
        self.company.as_ref().map(|c| c.id)
    }

    pub(crate) fn clear_identity(&mut self) {
        self.session = None;
        self.user = None;
        self.company = None;
    }
}
