use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Free-form attributes the identity service stores on a user.
/// Only the keys this product writes are modelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

/// Identity record issued by the identity service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl AuthUser {
    /// Tenant this user acts for, if one has been attached
    pub fn company_id(&self) -> Option<Uuid> {
        self.user_metadata.company_id
    }
}

/// Time-bounded proof of authentication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

// ============================================================================
// Tenant
// ============================================================================

/// One row per tenant. Every other row belongs to exactly one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCompany {
    pub name: String,
}

// ============================================================================
// Clients
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub company_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub cpf_cnpj: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Tenant-free fields of a new client; `company_id` is attached by the client library
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateClient {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf_cnpj: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateClient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf_cnpj: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

// ============================================================================
// Prosthetists
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProsthetistType {
    External,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProsthetistSubtype {
    Laboratory,
    Freelance,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prosthetist {
    pub id: Uuid,
    pub company_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ProsthetistType,
    pub subtype: ProsthetistSubtype,
    pub name: String,
    #[serde(default)]
    pub cnpj: Option<String>,
    #[serde(default)]
    pub cpf: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProsthetist {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProsthetistType,
    pub subtype: ProsthetistSubtype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnpj: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProsthetist {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProsthetistType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<ProsthetistSubtype>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnpj: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
}

// ============================================================================
// Workflow stages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub min_days: i32,
    pub max_days: i32,
    #[serde(default)]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStage {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub min_days: i32,
    pub max_days: i32,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_days: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_days: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

// ============================================================================
// Processes (read-only, used for dashboard metrics)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Pending => "Pending",
            ProcessStatus::InProgress => "In Progress",
            ProcessStatus::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: Uuid,
    pub company_id: Uuid,
    pub prosthetist_id: Uuid,
    pub client_id: Uuid,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub status: ProcessStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStage {
    pub id: Uuid,
    pub process_id: Uuid,
    pub stage_id: Uuid,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub status: ProcessStatus,
    #[serde(default)]
    pub observations: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Headline counts shown on the dashboard home
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_clients: u64,
    pub total_prosthetists: u64,
    pub total_processes: u64,
    pub delayed_stages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prosthetist_kind_uses_type_key() {
        let input = CreateProsthetist {
            name: "Lab Sorriso".to_string(),
            kind: ProsthetistType::External,
            subtype: ProsthetistSubtype::Laboratory,
            cnpj: None,
            cpf: None,
        };
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["type"], "External");
        assert_eq!(value["subtype"], "Laboratory");
        assert!(value.get("cnpj").is_none());
    }

    #[test]
    fn session_expiry_round_trips_as_unix_seconds() {
        let json = serde_json::json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_at": 1_700_000_000,
            "user": {
                "id": "6f1c9a4e-3d0b-4b7e-9a43-5f1d2c3b4a59",
                "email": "a@b.com",
                "user_metadata": { "company_id": "0b8e3d0e-6a5c-4d8e-8f3e-1a2b3c4d5e6f" }
            }
        });
        let session: Session = serde_json::from_value(json).unwrap();
        assert_eq!(session.token_type, "bearer");
        assert_eq!(session.expires_at.timestamp(), 1_700_000_000);
        assert!(session.is_expired());
        assert!(session.user.company_id().is_some());
    }

    #[test]
    fn in_progress_status_uses_spaced_name() {
        let status: ProcessStatus = serde_json::from_str("\"In Progress\"").unwrap();
        assert_eq!(status, ProcessStatus::InProgress);
        assert_eq!(status.as_str(), "In Progress");
    }
}
