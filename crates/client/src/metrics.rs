use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use shared::{DashboardMetrics, ProcessStatus};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{GuardFailure, Notice, RemoteError};
use crate::remote::{Filter, Query, RemoteService, Table};
use crate::store::SessionStore;

/// Minimal projection used for counting tenant rows
#[derive(Debug, Deserialize)]
struct TenantRef {
    id: Uuid,
    company_id: Uuid,
}

/// Headline counts for the dashboard home page
#[derive(Clone)]
pub struct MetricsAccess {
    store: SessionStore,
}

// Process ids per delayed-stage request; bounds the `in.(...)` filter length
const PROCESS_ID_BATCH: usize = 100;

impl MetricsAccess {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Each count fails soft to zero; only an invalid session is an error
    pub async fn summary(&self) -> Result<DashboardMetrics, GuardFailure> {
        let tenant = match self.store.guard().validate().await {
            Ok(tenant) => tenant,
            Err(GuardFailure::Unverified(reason)) => {
                tracing::warn!("Metrics unavailable without a verified session: {}", reason);
                return Ok(DashboardMetrics::default());
            }
            Err(failure) => return Err(failure),
        };
        let epoch = self.store.epoch();

        match count_all(self.store.remote(), tenant.company_id).await {
            Err(GuardFailure::SessionExpired) => {
                tracing::warn!("Data layer refused the session token while counting");
                self.store.force_sign_out(epoch, Notice::SessionExpired).await;
                Err(GuardFailure::SessionExpired)
            }
            other => other,
        }
    }
}

async fn count_all(
    remote: &Arc<dyn RemoteService>,
    company_id: Uuid,
) -> Result<DashboardMetrics, GuardFailure> {
    let clients = tenant_ids(remote, Table::Clients, company_id).await?;
    let prosthetists = tenant_ids(remote, Table::Prosthetists, company_id).await?;
    let processes = tenant_ids(remote, Table::Processes, company_id).await?;
    let delayed = delayed_stages(remote, &processes).await?;

    Ok(DashboardMetrics {
        total_clients: clients.len() as u64,
        total_prosthetists: prosthetists.len() as u64,
        total_processes: processes.len() as u64,
        delayed_stages: delayed,
    })
}

/// A refused token ends the count; anything else degrades to zero
fn soft<T: Default>(what: &str, result: Result<T, RemoteError>) -> Result<T, GuardFailure> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_unauthorized() => Err(GuardFailure::SessionExpired),
        Err(e) => {
            tracing::error!("Failed to count {}: {}", what, e);
            Ok(T::default())
        }
    }
}

/// Ids of the tenant's rows in `table`; empty on failure
async fn tenant_ids(
    remote: &Arc<dyn RemoteService>,
    table: Table,
    company_id: Uuid,
) -> Result<Vec<Uuid>, GuardFailure> {
    let query = Query::from(table)
        .columns("id,company_id")
        .eq("company_id", company_id);

    let rows = soft(table.as_str(), remote.select(query).await)?;

    let ids = match parse_refs(rows) {
        Ok(refs) => refs
            .into_iter()
            .filter(|r| {
                let mine = r.company_id == company_id;
                if !mine {
                    tracing::warn!("Ignoring {} row {} from another company", table.as_str(), r.id);
                }
                mine
            })
            .map(|r| r.id)
            .collect(),
        Err(e) => {
            tracing::error!("Malformed {} rows: {}", table.as_str(), e);
            Vec::new()
        }
    };
    Ok(ids)
}

fn parse_refs(rows: Vec<Value>) -> Result<Vec<TenantRef>, RemoteError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(RemoteError::from))
        .collect()
}

/// In-progress stages of the given processes whose end date has passed.
/// Ids are sent in batches; a failed batch makes the whole count zero
/// rather than an undercount.
async fn delayed_stages(
    remote: &Arc<dyn RemoteService>,
    process_ids: &[Uuid],
) -> Result<u64, GuardFailure> {
    let today = Utc::now().date_naive();
    let mut total = 0;

    for batch in process_ids.chunks(PROCESS_ID_BATCH) {
        let query = Query::from(Table::ProcessStages)
            .columns("id")
            .eq("status", ProcessStatus::InProgress.as_str())
            .filter(Filter::lte("end_date", today))
            .filter(Filter::any_of("process_id", batch));

        match remote.select(query).await {
            Ok(rows) => total += rows.len() as u64,
            Err(e) => return soft("delayed stages", Err::<u64, _>(e)),
        }
    }
    Ok(total)
}
