//! In-memory stand-in for the hosted identity and data service.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use prodent_client::remote::{AuthEvents, AuthSubscription, Filter, Query, Table, UserUpdate};
use prodent_client::{RemoteError, RemoteService, SessionConfig, SessionStore};
use serde_json::{json, Value};
use shared::{AuthChangeEvent, AuthStateChange, AuthUser, Session, UserMetadata};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Tenant used by the end-to-end scenario
pub const CO_1: Uuid = Uuid::from_u128(0x0c0_0001);
pub const CO_2: Uuid = Uuid::from_u128(0x0c0_0002);

#[derive(Debug, Clone)]
pub enum Call {
    GetSession,
    GetUser,
    SignIn(String),
    SignUp(String),
    SignOut,
    UpdateUser(Option<UserMetadata>),
    Select(Query),
    Insert(Table, Value),
    Update(Query, Value),
    Delete(Query),
}

impl Call {
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            Call::Select(_) | Call::Insert(..) | Call::Update(..) | Call::Delete(_)
        )
    }

    pub fn table(&self) -> Option<Table> {
        match self {
            Call::Select(q) | Call::Update(q, _) | Call::Delete(q) => Some(q.table),
            Call::Insert(table, _) => Some(*table),
            _ => None,
        }
    }
}

struct Account {
    password: String,
    user: AuthUser,
}

#[derive(Default)]
struct World {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    tables: HashMap<Table, Vec<Value>>,
    calls: Vec<Call>,
    revoked: bool,
    user_unreachable: bool,
    session_delay: Option<Duration>,
    session_unreachable: bool,
    fail_sign_out: bool,
    fail_insert: Option<Table>,
    fail_attach: bool,
    data_token_refused: bool,
    sign_in_delay: Option<Duration>,
}

pub struct FakeRemote {
    events: AuthEvents,
    world: Mutex<World>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: AuthEvents::new(),
            world: Mutex::new(World::default()),
        })
    }

    fn world(&self) -> std::sync::MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    /// Register an account, optionally attached to a company row
    pub fn add_user(&self, email: &str, password: &str, company: Option<Uuid>) -> AuthUser {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            user_metadata: UserMetadata {
                company_id: company,
                company_name: company.map(|_| "Clinic".to_string()),
            },
        };
        let mut world = self.world();
        if let Some(company_id) = company {
            let companies = world.tables.entry(Table::Companies).or_default();
            if !companies.iter().any(|c| c["id"] == json!(company_id)) {
                companies.push(company_row(company_id, "Clinic"));
            }
        }
        world.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        user
    }

    /// Pretend a session was left behind by an earlier run
    pub fn stored_session_for(&self, email: &str) -> Session {
        let mut world = self.world();
        let user = world.accounts[email].user.clone();
        let session = session_for(user);
        world.session = Some(session.clone());
        session
    }

    pub fn add_row(&self, table: Table, row: Value) {
        self.world().tables.entry(table).or_default().push(row);
    }

    pub fn remove_rows(&self, table: Table) {
        self.world().tables.remove(&table);
    }

    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.world().tables.get(&table).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.world().calls.clone()
    }

    pub fn data_calls(&self, table: Table) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.is_data() && c.table() == Some(table))
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.world().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn clear_calls(&self) {
        self.world().calls.clear();
    }

    pub fn has_session(&self) -> bool {
        self.world().session.is_some()
    }

    pub fn revoke_tokens(&self) {
        self.world().revoked = true;
    }

    pub fn set_user_unreachable(&self, unreachable: bool) {
        self.world().user_unreachable = unreachable;
    }

    pub fn delay_session(&self, delay: Duration) {
        self.world().session_delay = Some(delay);
    }

    pub fn set_session_unreachable(&self, unreachable: bool) {
        self.world().session_unreachable = unreachable;
    }

    pub fn fail_sign_out(&self) {
        self.world().fail_sign_out = true;
    }

    pub fn fail_insert(&self, table: Table) {
        self.world().fail_insert = Some(table);
    }

    pub fn fail_attach(&self, fail: bool) {
        self.world().fail_attach = fail;
    }

    /// The auth endpoint keeps accepting the token while the REST layer refuses it
    pub fn refuse_data_token(&self, refused: bool) {
        self.world().data_token_refused = refused;
    }

    pub fn delay_sign_in(&self, delay: Duration) {
        self.world().sign_in_delay = Some(delay);
    }

    /// Change what the service reports for an account without telling the client
    pub fn set_company(&self, email: &str, company: Option<Uuid>) {
        let mut world = self.world();
        if let Some(account) = world.accounts.get_mut(email) {
            account.user.user_metadata.company_id = company;
        }
    }

    fn record(&self, call: Call) {
        self.world().calls.push(call);
    }

    fn current_user(world: &World) -> Option<AuthUser> {
        let session = world.session.as_ref()?;
        world
            .accounts
            .values()
            .find(|a| a.user.id == session.user.id)
            .map(|a| a.user.clone())
    }
}

pub fn session_for(user: AuthUser) -> Session {
    Session {
        access_token: format!("access-{}", user.id),
        refresh_token: format!("refresh-{}", user.id),
        token_type: "bearer".to_string(),
        expires_at: Utc::now() + ChronoDuration::hours(1),
        user,
    }
}

pub fn company_row(id: Uuid, name: &str) -> Value {
    json!({ "id": id, "name": name, "created_at": "2026-01-10T09:00:00Z" })
}

pub fn client_row(company_id: Uuid, first_name: &str, last_name: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "company_id": company_id,
        "first_name": first_name,
        "last_name": last_name,
        "phone": null,
        "cpf_cnpj": null,
        "birth_date": null,
        "address": null,
        "created_at": "2026-02-01T10:00:00Z"
    })
}

pub fn stage_row(company_id: Uuid, name: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "company_id": company_id,
        "name": name,
        "description": null,
        "min_days": 1,
        "max_days": 5,
        "color": "#3366ff",
        "created_at": "2026-02-01T10:00:00Z"
    })
}

pub fn row_id(row: &Value) -> Uuid {
    serde_json::from_value(row["id"].clone()).unwrap()
}

pub fn store(remote: &Arc<FakeRemote>) -> SessionStore {
    let remote: Arc<dyn RemoteService> = remote.clone();
    SessionStore::new(remote, &SessionConfig::default())
}

// ----------------------------------------------------------------------------
// Row filtering
// ----------------------------------------------------------------------------

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn matches(filter: &Filter, row: &Value) -> bool {
    match filter {
        Filter::Eq(col, v) => text(&row[col.as_str()]) == *v,
        Filter::Lte(col, v) => {
            let field = &row[col.as_str()];
            !field.is_null() && text(field) <= *v
        }
        Filter::Contains(col, term) => {
            let term: String = term.chars().filter(|c| *c != '*' && *c != '%').collect();
            text(&row[col.as_str()])
                .to_lowercase()
                .contains(&term.to_lowercase())
        }
        Filter::In(col, values) => values.contains(&text(&row[col.as_str()])),
        Filter::Or(filters) => filters.iter().any(|f| matches(f, row)),
    }
}

fn select_rows(rows: &[Value], query: &Query) -> Vec<Value> {
    let mut selected: Vec<Value> = rows
        .iter()
        .filter(|row| query.filters.iter().all(|f| matches(f, row)))
        .cloned()
        .collect();
    if let Some(order) = &query.order {
        selected.sort_by_key(|row| text(&row[order.column.as_str()]));
        if !order.ascending {
            selected.reverse();
        }
    }
    if let Some(limit) = query.limit {
        selected.truncate(limit);
    }
    selected
}

fn unreachable() -> RemoteError {
    RemoteError::Transport("connection refused".to_string())
}

fn unauthorized() -> RemoteError {
    RemoteError::Api {
        status: 401,
        code: None,
        message: "invalid JWT".to_string(),
    }
}

fn jwt_expired() -> RemoteError {
    RemoteError::Api {
        status: 401,
        code: Some("PGRST301".to_string()),
        message: "JWT expired".to_string(),
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    /// The answer is fixed when the call is made, so a delayed reply can be stale
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        let (delay, answer) = {
            let mut world = self.world();
            world.calls.push(Call::GetSession);
            let answer = if world.session_unreachable {
                Err(unreachable())
            } else {
                Ok(world.session.clone())
            };
            (world.session_delay, answer)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        answer
    }

    async fn get_user(&self) -> Result<AuthUser, RemoteError> {
        let mut world = self.world();
        world.calls.push(Call::GetUser);
        if world.user_unreachable {
            return Err(unreachable());
        }
        if world.revoked {
            return Err(unauthorized());
        }
        Self::current_user(&world).ok_or(RemoteError::NoSession)
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, RemoteError> {
        let delay = self.world().sign_in_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let session = {
            let mut world = self.world();
            world.calls.push(Call::SignIn(email.to_string()));
            let user = match world.accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => {
                    return Err(RemoteError::Api {
                        status: 400,
                        code: Some("invalid_credentials".to_string()),
                        message: "Invalid login credentials".to_string(),
                    })
                }
            };
            world.revoked = false;
            let session = session_for(user);
            world.session = Some(session.clone());
            session
        };
        self.events.emit(AuthStateChange::new(
            AuthChangeEvent::SignedIn,
            Some(session.clone()),
        ));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> Result<AuthUser, RemoteError> {
        let session = {
            let mut world = self.world();
            world.calls.push(Call::SignUp(email.to_string()));
            if world.accounts.contains_key(email) {
                return Err(RemoteError::Api {
                    status: 422,
                    code: Some("user_already_exists".to_string()),
                    message: "User already registered".to_string(),
                });
            }
            let user = AuthUser {
                id: Uuid::new_v4(),
                email: Some(email.to_string()),
                user_metadata: metadata,
            };
            world.accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
            let session = session_for(user);
            world.session = Some(session.clone());
            session
        };
        let user = session.user.clone();
        self.events
            .emit(AuthStateChange::new(AuthChangeEvent::SignedIn, Some(session)));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        let fail = {
            let mut world = self.world();
            world.calls.push(Call::SignOut);
            world.session = None;
            world.fail_sign_out
        };
        self.events
            .emit(AuthStateChange::new(AuthChangeEvent::SignedOut, None));
        if fail {
            return Err(unreachable());
        }
        Ok(())
    }

    async fn update_user(&self, update: UserUpdate) -> Result<AuthUser, RemoteError> {
        let mut world = self.world();
        world.calls.push(Call::UpdateUser(update.data.clone()));
        if world.fail_attach && update.data.is_some() {
            return Err(RemoteError::Api {
                status: 500,
                code: None,
                message: "internal error".to_string(),
            });
        }
        let session_user = world.session.as_ref().ok_or(RemoteError::NoSession)?.user.id;
        let account = world
            .accounts
            .values_mut()
            .find(|a| a.user.id == session_user)
            .ok_or(RemoteError::NoSession)?;
        if let Some(data) = update.data {
            account.user.user_metadata = data;
        }
        if let Some(password) = update.password {
            account.password = password;
        }
        let user = account.user.clone();
        if let Some(session) = world.session.as_mut() {
            session.user = user.clone();
        }
        Ok(user)
    }

    async fn select(&self, query: Query) -> Result<Vec<Value>, RemoteError> {
        let mut world = self.world();
        world.calls.push(Call::Select(query.clone()));
        if world.data_token_refused {
            return Err(jwt_expired());
        }
        let rows = world.tables.get(&query.table).cloned().unwrap_or_default();
        Ok(select_rows(&rows, &query))
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Vec<Value>, RemoteError> {
        let mut world = self.world();
        world.calls.push(Call::Insert(table, row.clone()));
        if world.data_token_refused {
            return Err(jwt_expired());
        }
        if world.fail_insert == Some(table) {
            return Err(RemoteError::Api {
                status: 403,
                code: Some("42501".to_string()),
                message: "new row violates row-level security policy".to_string(),
            });
        }
        let mut stored = row;
        if let Some(fields) = stored.as_object_mut() {
            fields.entry("id").or_insert_with(|| json!(Uuid::new_v4()));
            fields
                .entry("created_at")
                .or_insert_with(|| json!("2026-03-01T08:00:00Z"));
        }
        world.tables.entry(table).or_default().push(stored.clone());
        Ok(vec![stored])
    }

    async fn update(&self, query: Query, patch: Value) -> Result<Vec<Value>, RemoteError> {
        let mut world = self.world();
        world.calls.push(Call::Update(query.clone(), patch.clone()));
        if world.data_token_refused {
            return Err(jwt_expired());
        }
        let rows = world.tables.entry(query.table).or_default();
        let mut updated = Vec::new();
        for row in rows.iter_mut() {
            if query.filters.iter().all(|f| matches(f, row)) {
                if let (Some(fields), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                    for (key, value) in changes {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, query: Query) -> Result<Vec<Value>, RemoteError> {
        let mut world = self.world();
        world.calls.push(Call::Delete(query.clone()));
        if world.data_token_refused {
            return Err(jwt_expired());
        }
        let rows = world.tables.entry(query.table).or_default();
        let (removed, kept): (Vec<Value>, Vec<Value>) = rows
            .drain(..)
            .partition(|row| query.filters.iter().all(|f| matches(f, row)));
        *rows = kept;
        Ok(removed)
    }
}
