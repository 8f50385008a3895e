use crate::config::SessionConfig;
use crate::error::Notice;
use crate::state::{AuthState, AuthStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Session check still running; show a loading indicator
    Loading,
    Render,
    /// The check itself failed; not the same as being signed out
    Failed(Notice),
    /// Send the user to `to`, remembering where they were headed
    Redirect { to: String, from: String },
}

/// What a protected view needs to know about the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateView {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<Notice>,
}

/// Admission check in front of protected views
#[derive(Debug, Clone)]
pub struct RouteGate {
    login_path: String,
}

impl RouteGate {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.login_path.clone())
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn decide(&self, state: &AuthState, requested_path: &str) -> GateDecision {
        match state.status() {
            AuthStatus::Loading => GateDecision::Loading,
            AuthStatus::Authenticated | AuthStatus::AuthenticatedNoCompany => GateDecision::Render,
            AuthStatus::Failed => {
                GateDecision::Failed(state.error.unwrap_or(Notice::ServiceUnavailable))
            }
            AuthStatus::Anonymous => GateDecision::Redirect {
                to: self.login_path.clone(),
                from: requested_path.to_string(),
            },
        }
    }

    pub fn view(state: &AuthState) -> GateView {
        GateView {
            is_authenticated: state.is_authenticated(),
            is_loading: state.is_loading,
            error: state.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::{AuthUser, Company, Session, UserMetadata};
    use uuid::Uuid;

    fn signed_in(with_company: bool) -> AuthState {
        let company_id = Uuid::new_v4();
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some("a@b.com".to_string()),
            user_metadata: UserMetadata {
                company_id: with_company.then_some(company_id),
                company_name: None,
            },
        };
        AuthState {
            session: Some(Session {
                access_token: "at".to_string(),
                refresh_token: "rt".to_string(),
                token_type: "bearer".to_string(),
                expires_at: Utc::now(),
                user: user.clone(),
            }),
            user: Some(user),
            company: with_company.then(|| Company {
                id: company_id,
                name: "Clinic".to_string(),
                created_at: Utc::now(),
            }),
            is_loading: false,
            error: None,
            epoch: 1,
        }
    }

    #[test]
    fn waits_while_loading() {
        let gate = RouteGate::new("/login");
        assert_eq!(gate.decide(&AuthState::default(), "/dashboard"), GateDecision::Loading);
    }

    #[test]
    fn redirects_anonymous_users_with_origin() {
        let gate = RouteGate::new("/login");
        let state = AuthState {
            is_loading: false,
            ..AuthState::default()
        };
        assert_eq!(
            gate.decide(&state, "/dashboard/clients"),
            GateDecision::Redirect {
                to: "/login".to_string(),
                from: "/dashboard/clients".to_string(),
            }
        );
    }

    #[test]
    fn renders_for_signed_in_users() {
        let gate = RouteGate::new("/login");
        assert_eq!(gate.decide(&signed_in(true), "/dashboard"), GateDecision::Render);
        assert_eq!(gate.decide(&signed_in(false), "/dashboard"), GateDecision::Render);

        let view = RouteGate::view(&signed_in(true));
        assert!(view.is_authenticated);
        assert!(!view.is_loading);
        assert_eq!(view.error, None);
    }

    #[test]
    fn timeout_is_not_a_redirect() {
        let gate = RouteGate::new("/login");
        let state = AuthState {
            is_loading: false,
            error: Some(Notice::SessionCheckTimedOut),
            ..AuthState::default()
        };
        assert_eq!(
            gate.decide(&state, "/dashboard"),
            GateDecision::Failed(Notice::SessionCheckTimedOut)
        );
    }
}
