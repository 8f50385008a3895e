//! Tenant-scoped CRUD over the dashboard collections.
//!
//! Every call goes through the [`SessionGuard`](crate::guard::SessionGuard)
//! first and is filtered by the tenant it reports. Rows coming back are parsed
//! into typed entities and checked against that tenant before they are
//! returned.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use uuid::Uuid;

use crate::error::{GuardFailure, Notice, ResourceError};
use crate::guard::TenantContext;
use crate::remote::{Filter, Query, Table};
use crate::store::SessionStore;

mod clients;
mod prosthetists;
mod stages;

pub use clients::ClientAccess;
pub use prosthetists::ProsthetistAccess;
pub use stages::StageAccess;

/// A tenant-owned collection
pub trait Resource: DeserializeOwned + Send + Sync + 'static {
    /// Tenant-free fields supplied on create
    type Create: Serialize + Send + Sync + 'static;
    /// Partial update; unset fields are left alone
    type Update: Serialize + Send + Sync + 'static;

    const TABLE: Table;
    const ORDER_BY: &'static str;

    fn id(&self) -> Uuid;
    fn company_id(&self) -> Uuid;

    /// Row filter for a free-text search term
    fn search_filter(term: &str) -> Filter;

    fn validate_create(_input: &Self::Create) -> Result<(), String> {
        Ok(())
    }

    fn validate_update(_patch: &Self::Update) -> Result<(), String> {
        Ok(())
    }
}

/// Insert payload: the caller's fields plus the acting tenant
#[derive(Serialize)]
struct TenantRow<'a, T> {
    company_id: Uuid,
    #[serde(flatten)]
    fields: &'a T,
}

pub struct ResourceAccess<R> {
    store: SessionStore,
    _resource: PhantomData<fn() -> R>,
}

impl<R> Clone for ResourceAccess<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> ResourceAccess<R> {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            _resource: PhantomData,
        }
    }

    /// List the tenant's rows, optionally narrowed by `search`.
    ///
    /// Never fails on data errors: those are logged and yield an empty list.
    /// An invalid session still propagates so the caller can redirect.
    pub async fn list(&self, search: Option<&str>) -> Result<Vec<R>, GuardFailure> {
        let term = search
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let remote = self.store.remote().clone();

        let result = self
            .guarded(|tenant| async move {
                let mut query = Query::from(R::TABLE)
                    .eq("company_id", tenant.company_id)
                    .order(R::ORDER_BY, true);
                if let Some(term) = &term {
                    query = query.filter(R::search_filter(term));
                }
                let rows = remote.select(query).await?;
                parse_rows::<R>(rows, tenant.company_id)
            })
            .await;

        match result {
            Ok(rows) => Ok(rows),
            Err(ResourceError::Guard(GuardFailure::Unverified(reason))) => {
                tracing::warn!("Listing {} without a verified session: {}", R::TABLE.as_str(), reason);
                Ok(Vec::new())
            }
            Err(ResourceError::Guard(failure)) => Err(failure),
            Err(e) => {
                tracing::error!("Failed to list {}: {}", R::TABLE.as_str(), e);
                Ok(Vec::new())
            }
        }
    }

    pub async fn create(&self, input: R::Create) -> Result<R, ResourceError> {
        R::validate_create(&input).map_err(ResourceError::Validation)?;
        let remote = self.store.remote().clone();

        let created = self
            .guarded(|tenant| async move {
                let row = serde_json::to_value(TenantRow {
                    company_id: tenant.company_id,
                    fields: &input,
                })
                .map_err(|e| ResourceError::Validation(e.to_string()))?;
                let rows = remote.insert(R::TABLE, row).await?;
                first(parse_rows::<R>(rows, tenant.company_id)?)
            })
            .await
            .inspect_err(|e| tracing::warn!("Failed to create {} row: {}", R::TABLE.as_str(), e))?;

        tracing::info!("Created {} row {}", R::TABLE.as_str(), created.id());
        Ok(created)
    }

    /// Patch one row. Matching on both `id` and the tenant means an id from
    /// another company affects nothing and reports `NotFound`.
    pub async fn update(&self, id: Uuid, patch: R::Update) -> Result<R, ResourceError> {
        R::validate_update(&patch).map_err(ResourceError::Validation)?;
        let body = serde_json::to_value(&patch).map_err(|e| ResourceError::Validation(e.to_string()))?;
        if body.as_object().map_or(true, |fields| fields.is_empty()) {
            return Err(ResourceError::Validation("nothing to update".to_string()));
        }
        let remote = self.store.remote().clone();

        let updated = self
            .guarded(|tenant| async move {
                let query = Query::from(R::TABLE)
                    .eq("id", id)
                    .eq("company_id", tenant.company_id);
                let rows = remote.update(query, body).await?;
                first(parse_rows::<R>(rows, tenant.company_id)?)
            })
            .await
            .inspect_err(|e| tracing::warn!("Failed to update {} row {}: {}", R::TABLE.as_str(), id, e))?;

        tracing::info!("Updated {} row {}", R::TABLE.as_str(), id);
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ResourceError> {
        let remote = self.store.remote().clone();

        self
            .guarded(|tenant| async move {
                let query = Query::from(R::TABLE)
                    .eq("id", id)
                    .eq("company_id", tenant.company_id);
                let rows = remote.delete(query).await?;
                first(parse_rows::<R>(rows, tenant.company_id)?).map(|_| ())
            })
            .await
            .inspect_err(|e| tracing::warn!("Failed to delete {} row {}: {}", R::TABLE.as_str(), id, e))?;

        tracing::info!("Deleted {} row {}", R::TABLE.as_str(), id);
        Ok(())
    }
}

impl<R> ResourceAccess<R> {
    /// Validate the session, then run `op` for its tenant. A token the data
    /// layer refuses after validation passed resets the session like the
    /// guard would.
    async fn guarded<T, F, Fut>(&self, op: F) -> Result<T, ResourceError>
    where
        F: FnOnce(TenantContext) -> Fut,
        Fut: Future<Output = Result<T, ResourceError>>,
    {
        let tenant = self.store.guard().validate().await?;
        let epoch = self.store.epoch();

        let result = op(tenant).await;
        if let Err(ResourceError::Guard(GuardFailure::SessionExpired)) = &result {
            tracing::warn!("Data layer refused the session token");
            self.store.force_sign_out(epoch, Notice::SessionExpired).await;
        }
        result
    }
}

/// Parse untrusted rows, rejecting any that belong to another tenant
fn parse_rows<R: Resource>(rows: Vec<Value>, company_id: Uuid) -> Result<Vec<R>, ResourceError> {
    rows.into_iter()
        .map(|row| {
            let entity: R = serde_json::from_value(row).map_err(|e| {
                ResourceError::Malformed(format!("{} row: {}", R::TABLE.as_str(), e))
            })?;
            if entity.company_id() != company_id {
                return Err(ResourceError::Malformed(format!(
                    "{} row {} belongs to another company",
                    R::TABLE.as_str(),
                    entity.id()
                )));
            }
            Ok(entity)
        })
        .collect()
}

// No affected row means no such id within this tenant
fn first<R>(rows: Vec<R>) -> Result<R, ResourceError> {
    rows.into_iter().next().ok_or(ResourceError::NotFound)
}
