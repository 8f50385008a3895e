//! Session store: the single owner of `{session, user, company}`.
//!
//! State is only mutated from three places: the bootstrapper (restore and
//! pushed session changes), the guard's reset path, and the explicit
//! sign-in / sign-up / sign-out calls below. Every explicit change advances the
//! epoch; asynchronous continuations apply their result only if the epoch they
//! started under is still current.

use serde_json::Value;
use shared::{
    AuthChangeEvent, AuthStateChange, AuthUser, Company, CreateCompany, Session, UserMetadata,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::config::SessionConfig;
use crate::error::{AuthFailure, Notice, TenantResolutionFailure};
use crate::guard::SessionGuard;
use crate::remote::{Query, RemoteService, Table, UserUpdate};
use crate::state::AuthState;

const MIN_PASSWORD_LEN: usize = 6;
const SIGNAL_BUFFER: usize = 16;

/// Out-of-band notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// Local session was reset; show `notice` and navigate to `redirect_to`
    Expired { notice: Notice, redirect_to: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUpStep {
    CreateIdentity,
    CreateCompany,
    AttachCompany,
}

#[derive(Debug, Clone, Error)]
#[error("sign-up failed at {step:?}: {cause}")]
pub struct SignUpError {
    pub step: SignUpStep,
    #[source]
    pub cause: AuthFailure,
}

impl SignUpError {
    pub fn notice(&self) -> Notice {
        match self.step {
            SignUpStep::CreateIdentity => self.cause.notice(),
            SignUpStep::CreateCompany | SignUpStep::AttachCompany => Notice::SignUpIncomplete,
        }
    }
}

/// Result of the non-atomic sign-up saga. A failure after the first step
/// leaves an identity behind; `user` and `company` say how far it got.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: Option<AuthUser>,
    pub company: Option<Company>,
    pub error: Option<SignUpError>,
}

impl SignUpOutcome {
    fn failed(step: SignUpStep, cause: AuthFailure) -> Self {
        Self {
            user: None,
            company: None,
            error: Some(SignUpError { step, cause }),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn failed_step(&self) -> Option<SignUpStep> {
        self.error.as_ref().map(|e| e.step)
    }
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    remote: Arc<dyn RemoteService>,
    state: watch::Sender<AuthState>,
    signals: broadcast::Sender<SessionSignal>,
    login_path: String,
}

/// Lowers `is_loading` on every exit path of the call that raised it, unless
/// a later call has taken over the flag
struct LoadingGuard<'a> {
    state: &'a watch::Sender<AuthState>,
    epoch: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        lower_loading(self.state, self.epoch);
    }
}

fn lower_loading(state: &watch::Sender<AuthState>, epoch: u64) {
    state.send_if_modified(|s| {
        if s.epoch != epoch || !s.is_loading {
            return false;
        }
        s.is_loading = false;
        true
    });
}

impl SessionStore {
    pub fn new(remote: Arc<dyn RemoteService>, config: &SessionConfig) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        let (signals, _) = broadcast::channel(SIGNAL_BUFFER);
        Self {
            inner: Arc::new(Inner {
                remote,
                state,
                signals,
                login_path: config.login_path.clone(),
            }),
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteService> {
        &self.inner.remote
    }

    pub fn login_path(&self) -> &str {
        &self.inner.login_path
    }

    pub fn current_state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.inner.signals.subscribe()
    }

    pub fn guard(&self) -> SessionGuard {
        SessionGuard::new(self.clone())
    }

    // ------------------------------------------------------------------
    // Epoch bookkeeping
    // ------------------------------------------------------------------

    pub(crate) fn epoch(&self) -> u64 {
        self.inner.state.borrow().epoch
    }

    pub(crate) fn advance_epoch(&self) -> u64 {
        let mut next = 0;
        self.inner.state.send_modify(|s| {
            s.epoch += 1;
            next = s.epoch;
        });
        next
    }

    /// Apply `change` only if no explicit state change happened since `epoch`
    pub(crate) fn apply_if_current(&self, epoch: u64, change: impl FnOnce(&mut AuthState)) -> bool {
        self.inner.state.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            change(s);
            true
        })
    }

    fn begin_loading(&self, epoch: u64) -> LoadingGuard<'_> {
        self.inner.state.send_modify(|s| s.is_loading = true);
        LoadingGuard {
            state: &self.inner.state,
            epoch,
        }
    }

    /// Lower `is_loading` for work started under `epoch`. A newer explicit
    /// call in flight keeps the flag raised until it finishes itself.
    pub(crate) fn finish_loading(&self, epoch: u64) {
        lower_loading(&self.inner.state, epoch);
    }

    /// Give up on the initial check: error state, not loading, late results
    /// dropped. Skipped if an explicit action already superseded the check.
    pub(crate) fn fail_session_check(&self, epoch: u64, notice: Notice) -> bool {
        self.inner.state.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            s.epoch += 1;
            s.clear_identity();
            s.error = Some(notice);
            s.is_loading = false;
            true
        })
    }

    // ------------------------------------------------------------------
    // Explicit entry points
    // ------------------------------------------------------------------

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthFailure> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthFailure::InvalidCredentials);
        }

        let epoch = self.advance_epoch();
        let _loading = self.begin_loading(epoch);

        let session = self
            .inner
            .remote
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| {
                tracing::warn!("Sign-in failed: {}", e);
                AuthFailure::from(e)
            })?;

        self.establish(epoch, session).await
    }

    /// Register a new identity and its company: create identity, insert the
    /// company row, then attach the company id to the identity.
    pub async fn sign_up(&self, email: &str, password: &str, company_name: &str) -> SignUpOutcome {
        let email = email.trim();
        let company_name = company_name.trim();
        if email.is_empty() || password.is_empty() {
            return SignUpOutcome::failed(SignUpStep::CreateIdentity, AuthFailure::InvalidCredentials);
        }
        if company_name.is_empty() {
            return SignUpOutcome::failed(
                SignUpStep::CreateIdentity,
                AuthFailure::Rejected("company name is required".to_string()),
            );
        }

        let epoch = self.advance_epoch();
        let _loading = self.begin_loading(epoch);

        let metadata = UserMetadata {
            company_id: None,
            company_name: Some(company_name.to_string()),
        };
        let user = match self.inner.remote.sign_up(email, password, metadata).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("Sign-up failed creating identity: {}", e);
                return SignUpOutcome::failed(SignUpStep::CreateIdentity, e.into());
            }
        };
        tracing::info!("Created identity {}", user.id);

        self.finish_sign_up(epoch, user, company_name, None).await
    }

    /// Continue a saga that stopped after the identity was created, without
    /// registering again. Requires the orphaned identity to be signed in.
    pub async fn resume_sign_up(&self, outcome: &SignUpOutcome, company_name: &str) -> SignUpOutcome {
        let Some(user) = outcome.user.clone() else {
            return SignUpOutcome::failed(
                SignUpStep::CreateIdentity,
                AuthFailure::Rejected("no identity to resume".to_string()),
            );
        };

        let epoch = self.advance_epoch();
        let _loading = self.begin_loading(epoch);
        self.finish_sign_up(epoch, user, company_name.trim(), outcome.company.clone())
            .await
    }

    async fn finish_sign_up(
        &self,
        epoch: u64,
        user: AuthUser,
        company_name: &str,
        company: Option<Company>,
    ) -> SignUpOutcome {
        let company = match company {
            Some(company) => company,
            None => match self.create_company(company_name).await {
                Ok(company) => company,
                Err(cause) => {
                    tracing::error!("Sign-up left identity {} without a company: {}", user.id, cause);
                    return SignUpOutcome {
                        user: Some(user),
                        company: None,
                        error: Some(SignUpError {
                            step: SignUpStep::CreateCompany,
                            cause,
                        }),
                    };
                }
            },
        };

        let metadata = UserMetadata {
            company_id: Some(company.id),
            company_name: Some(company.name.clone()),
        };
        let user = match self.inner.remote.update_user(UserUpdate::metadata(metadata)).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!(
                    "Sign-up could not attach company {} to identity {}: {}",
                    company.id,
                    user.id,
                    e
                );
                return SignUpOutcome {
                    user: Some(user),
                    company: Some(company),
                    error: Some(SignUpError {
                        step: SignUpStep::AttachCompany,
                        cause: e.into(),
                    }),
                };
            }
        };

        // Only a signed-in identity enters the store
        match self.inner.remote.get_session().await {
            Ok(Some(session)) => {
                let session = Session {
                    user: user.clone(),
                    ..session
                };
                let stored_user = user.clone();
                let stored_company = company.clone();
                self.apply_if_current(epoch, move |s| {
                    s.session = Some(session);
                    s.user = Some(stored_user);
                    s.company = Some(stored_company);
                    s.error = None;
                });
            }
            Ok(None) => tracing::info!("Identity {} awaits email confirmation", user.id),
            Err(e) => tracing::warn!("Could not load session after sign-up: {}", e),
        }

        SignUpOutcome {
            user: Some(user),
            company: Some(company),
            error: None,
        }
    }

    async fn create_company(&self, name: &str) -> Result<Company, AuthFailure> {
        let row = serde_json::to_value(CreateCompany {
            name: name.to_string(),
        })
        .map_err(|e| AuthFailure::Rejected(e.to_string()))?;

        let rows = self.inner.remote.insert(Table::Companies, row).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AuthFailure::Rejected("company insert returned no row".to_string()))?;
        serde_json::from_value(row)
            .map_err(|e| AuthFailure::Rejected(format!("malformed company row: {}", e)))
    }

    /// Revoke the remote session, then clear local state whatever the outcome.
    /// An `Err` only reports that the remote revoke failed.
    pub async fn sign_out(&self) -> Result<(), AuthFailure> {
        let epoch = self.advance_epoch();
        let _loading = self.begin_loading(epoch);

        let remote = self.inner.remote.sign_out().await;
        self.apply_if_current(epoch, |s| {
            s.clear_identity();
            s.error = None;
        });

        match remote {
            Ok(()) => {
                tracing::info!("Signed out");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Remote sign-out failed, local session cleared anyway: {}", e);
                Err(e.into())
            }
        }
    }

    pub async fn update_password(&self, password: &str, confirmation: &str) -> Result<(), AuthFailure> {
        if password != confirmation {
            return Err(AuthFailure::PasswordMismatch);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthFailure::WeakPassword {
                min: MIN_PASSWORD_LEN,
            });
        }

        let remote = self.inner.remote.clone();
        let password = password.to_string();
        self.guard()
            .run(|_tenant| async move {
                remote
                    .update_user(UserUpdate::password(password))
                    .await
                    .map(|_| ())
                    .map_err(AuthFailure::from)
            })
            .await?;

        tracing::info!("Password updated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tenant resolution and resets
    // ------------------------------------------------------------------

    /// Resolve the session's company and publish the whole tuple at once.
    /// A failed lookup forces a sign-out rather than leaving `company` empty.
    pub(crate) async fn establish(&self, epoch: u64, session: Session) -> Result<(), AuthFailure> {
        let user = session.user.clone();
        match self.resolve_company(&user).await {
            Ok(company) => {
                let applied = self.apply_if_current(epoch, |s| {
                    s.session = Some(session);
                    s.user = Some(user);
                    s.company = company;
                    s.error = None;
                });
                if !applied {
                    tracing::debug!("Discarding session resolved under stale epoch {}", epoch);
                }
                Ok(())
            }
            Err(failure) => {
                tracing::error!("Tenant resolution failed for user {}: {}", user.id, failure);
                self.force_sign_out(epoch, Notice::CompanyUnavailable).await;
                Err(failure.into())
            }
        }
    }

    /// `Ok(None)` means no company is attached to the user yet
    pub(crate) async fn resolve_company(
        &self,
        user: &AuthUser,
    ) -> Result<Option<Company>, TenantResolutionFailure> {
        let Some(company_id) = user.company_id() else {
            tracing::info!("User {} has no company attached", user.id);
            return Ok(None);
        };

        let query = Query::from(Table::Companies).eq("id", company_id).limit(1);
        let rows = self
            .inner
            .remote
            .select(query)
            .await
            .map_err(|e| TenantResolutionFailure::Lookup(e.to_string()))?;

        let row: Value = rows
            .into_iter()
            .next()
            .ok_or(TenantResolutionFailure::NotFound { company_id })?;
        let company: Company = serde_json::from_value(row)
            .map_err(|e| TenantResolutionFailure::Lookup(format!("malformed company row: {}", e)))?;

        if company.id != company_id {
            return Err(TenantResolutionFailure::Lookup(format!(
                "asked for company {} but got {}",
                company_id, company.id
            )));
        }
        Ok(Some(company))
    }

    /// Guard failure path: clear the tuple, tell the front end, and drop the
    /// remote copy of the credential. No-op if `epoch` is no longer current.
    pub(crate) async fn force_sign_out(&self, epoch: u64, notice: Notice) {
        let reset = self.inner.state.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            s.epoch += 1;
            s.clear_identity();
            s.error = Some(notice);
            s.is_loading = false;
            true
        });
        if !reset {
            tracing::debug!("Skipping reset for stale epoch {}", epoch);
            return;
        }

        tracing::warn!("Session reset: {}", notice);
        self.notify_expired(notice);

        if let Err(e) = self.inner.remote.sign_out().await {
            tracing::debug!("Remote sign-out after reset failed: {}", e);
        }
    }

    /// Tell the front end to show `notice` and go to the login page
    pub(crate) fn notify_expired(&self, notice: Notice) {
        // No receivers just means no front end is listening
        let _ = self.inner.signals.send(SessionSignal::Expired {
            notice,
            redirect_to: self.inner.login_path.clone(),
        });
    }

    /// React to a pushed session change
    pub(crate) async fn handle_auth_change(&self, change: AuthStateChange) {
        let epoch = self.epoch();
        match change.event {
            AuthChangeEvent::SignedIn => {
                let Some(pushed) = change.session else {
                    tracing::warn!("SIGNED_IN event without a session");
                    return;
                };
                // A queued event may predate a sign-out; trust only the live session
                match self.inner.remote.get_session().await {
                    Ok(Some(live)) if live.user.id == pushed.user.id => {
                        if let Err(e) = self.establish(epoch, live).await {
                            tracing::warn!("Could not establish pushed session: {}", e);
                        }
                    }
                    Ok(_) => tracing::debug!("Dropping stale SIGNED_IN for user {}", pushed.user.id),
                    Err(e) => tracing::warn!("Could not confirm pushed session: {}", e),
                }
            }
            AuthChangeEvent::SignedOut => {
                self.apply_if_current(epoch, AuthState::clear_identity);
            }
            other => tracing::debug!("Ignoring auth event {:?}", other),
        }
    }
}
