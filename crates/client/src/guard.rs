use std::future::Future;
use uuid::Uuid;

use crate::error::{GuardFailure, Notice, RemoteError};
use crate::store::SessionStore;

/// Identity and tenant an operation is allowed to act for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub user_id: Uuid,
    pub company_id: Uuid,
}

/// Validate-then-execute wrapper applied before every data operation.
///
/// The local snapshot is never trusted on its own: the current token is
/// checked against the identity service, and the user and tenant it reports
/// must match what the store holds.
#[derive(Clone)]
pub struct SessionGuard {
    store: SessionStore,
}

impl SessionGuard {
    pub(crate) fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub async fn validate(&self) -> Result<TenantContext, GuardFailure> {
        let epoch = self.store.epoch();
        let state = self.store.current_state();
        let Some(local_user) = state.user else {
            tracing::debug!("No signed-in user to validate");
            self.store.notify_expired(Notice::SessionExpired);
            return Err(GuardFailure::SessionExpired);
        };

        let remote_user = match self.store.remote().get_user().await {
            Ok(user) => user,
            Err(e) if is_unreachable(&e) => {
                tracing::warn!("Could not verify session: {}", e);
                return Err(GuardFailure::Unverified(e.to_string()));
            }
            Err(e) => {
                tracing::warn!("Session rejected during validation: {}", e);
                self.store.force_sign_out(epoch, Notice::SessionExpired).await;
                return Err(GuardFailure::SessionExpired);
            }
        };

        if remote_user.id != local_user.id {
            tracing::warn!(
                "Token belongs to user {} but store holds {}",
                remote_user.id,
                local_user.id
            );
            self.store.force_sign_out(epoch, Notice::SessionExpired).await;
            return Err(GuardFailure::SessionExpired);
        }

        let Some(company) = state.company else {
            return Err(GuardFailure::NoTenant);
        };

        match remote_user.company_id() {
            Some(company_id) if company_id == company.id => Ok(TenantContext {
                user_id: remote_user.id,
                company_id,
            }),
            other => {
                tracing::warn!(
                    "Company attachment changed from {} to {:?}",
                    company.id,
                    other
                );
                self.store
                    .force_sign_out(epoch, Notice::CompanyUnavailable)
                    .await;
                Err(GuardFailure::SessionExpired)
            }
        }
    }

    /// Run `op` only after the session validates; its result passes through unchanged
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        E: From<GuardFailure>,
        F: FnOnce(TenantContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let tenant = self.validate().await?;
        op(tenant).await
    }
}

// The service could not answer; says nothing about the token itself
fn is_unreachable(err: &RemoteError) -> bool {
    err.is_transport() || err.status().is_some_and(|s| s >= 500)
}
