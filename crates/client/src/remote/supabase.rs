//! HTTP implementation of [`RemoteService`] for a Supabase project
//! (GoTrue under `/auth/v1`, PostgREST under `/rest/v1`).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{AuthChangeEvent, AuthStateChange, AuthUser, Session, UserMetadata};
use tokio::sync::{Mutex, RwLock};

use super::{AuthEvents, AuthSubscription, Query, RemoteService, SessionFile, Table, UserUpdate};
use crate::config::ServiceConfig;
use crate::error::RemoteError;

/// Sessions this close to expiry are refreshed before use
const EXPIRY_MARGIN_SECS: i64 = 10;

pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    refresh_lock: Mutex<()>,
    storage: Option<SessionFile>,
    events: AuthEvents,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    refresh_token: String,
    user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

fn default_expires_in() -> i64 {
    3600
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.expires_in));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up returns a full session when email confirmation is off, a bare user otherwise
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: UserMetadata,
}

/// Union of the error shapes GoTrue and PostgREST return
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<Value>,
    error_code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            storage: None,
            events: AuthEvents::new(),
        })
    }

    /// Persist sessions to `storage` and restore from it on first use
    pub fn with_storage(mut self, storage: SessionFile) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn request(&self, method: Method, url: String, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let code = body
            .error_code
            .clone()
            .or_else(|| match &body.code {
                Some(Value::String(code)) => Some(code.clone()),
                _ => None,
            })
            .or_else(|| body.error.clone());
        let message = body
            .msg
            .or(body.message)
            .or(body.error_description)
            .or(body.error)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        Err(RemoteError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    /// In-memory session, falling back to the stored one
    async fn current(&self) -> Option<Session> {
        if let Some(session) = self.session.read().await.clone() {
            return Some(session);
        }

        let restored = self.storage.as_ref().and_then(SessionFile::load)?;
        tracing::debug!("Restored stored session for user {}", restored.user.id);
        *self.session.write().await = Some(restored.clone());
        Some(restored)
    }

    async fn store_session(&self, session: Option<Session>) {
        if let Some(storage) = &self.storage {
            let result = match &session {
                Some(session) => storage.save(session),
                None => storage.clear(),
            };
            if let Err(e) = result {
                tracing::warn!("Failed to persist session to {}: {}", storage.path().display(), e);
            }
        }
        *self.session.write().await = session;
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, RemoteError> {
        let response = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.anon_key)
            .json(&RefreshGrant { refresh_token })
            .send()
            .await?;

        let token: TokenResponse = Self::check(response).await?.json().await?;
        Ok(token.into_session())
    }

    /// Token for REST calls: the user's when signed in, the anon key otherwise
    async fn data_bearer(&self) -> Result<String, RemoteError> {
        Ok(match self.get_session().await? {
            Some(session) => session.access_token,
            None => self.anon_key.clone(),
        })
    }

    async fn rows(response: Response) -> Result<Vec<Value>, RemoteError> {
        Ok(Self::check(response).await?.json::<Vec<Value>>().await?)
    }
}

#[async_trait]
impl RemoteService for SupabaseClient {
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        let Some(session) = self.current().await else {
            return Ok(None);
        };
        let horizon = Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS);
        if !session.is_expired_at(horizon) {
            return Ok(Some(session));
        }

        let _refreshing = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(current) = self.session.read().await.clone() {
            if !current.is_expired_at(horizon) {
                return Ok(Some(current));
            }
        }

        tracing::debug!("Session expired, refreshing");
        match self.refresh(&session.refresh_token).await {
            Ok(fresh) => {
                self.store_session(Some(fresh.clone())).await;
                self.events.emit(AuthStateChange::new(
                    AuthChangeEvent::TokenRefreshed,
                    Some(fresh.clone()),
                ));
                Ok(Some(fresh))
            }
            Err(e) if e.is_transport() => Err(e),
            Err(e) => {
                tracing::info!("Refresh rejected, discarding stored session: {}", e);
                self.store_session(None).await;
                self.events
                    .emit(AuthStateChange::new(AuthChangeEvent::SignedOut, None));
                Ok(None)
            }
        }
    }

    async fn get_user(&self) -> Result<AuthUser, RemoteError> {
        let session = self.get_session().await?.ok_or(RemoteError::NoSession)?;
        let response = self
            .request(Method::GET, self.auth_url("user"), &session.access_token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, RemoteError> {
        let response = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        let token: TokenResponse = Self::check(response).await?.json().await?;
        let session = token.into_session();
        tracing::info!("Signed in as user {}", session.user.id);

        self.store_session(Some(session.clone())).await;
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
        let response = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&SignUpRequest {
                email,
                password,
                data: metadata,
            })
            .send()
            .await?;

        match Self::check(response).await?.json::<SignUpResponse>().await? {
            SignUpResponse::Session(token) => {
                let session = token.into_session();
                let user = session.user.clone();
                self.store_session(Some(session.clone())).await;
                self.events.emit(AuthStateChange::new(
                    AuthChangeEvent::SignedIn,
                    Some(session),
                ));
                Ok(user)
            }
            SignUpResponse::User(user) => {
                tracing::info!("User {} created, awaiting email confirmation", user.id);
                Ok(user)
            }
        }
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        let result = match self.current().await {
            Some(session) => {
                match self
                    .request(Method::POST, self.auth_url("logout"), &session.access_token)
                    .send()
                    .await
                {
                    Ok(response) => Self::check(response).await.map(|_| ()),
                    Err(e) => Err(e.into()),
                }
            }
            None => Ok(()),
        };

        // The local copy goes regardless of what the service said
        self.store_session(None).await;
        self.events
            .emit(AuthStateChange::new(AuthChangeEvent::SignedOut, None));
        result
    }

    async fn update_user(&self, update: UserUpdate) -> Result<AuthUser, RemoteError> {
        let session = self.get_session().await?.ok_or(RemoteError::NoSession)?;
        let response = self
            .request(Method::PUT, self.auth_url("user"), &session.access_token)
            .json(&update)
            .send()
            .await?;
        let user: AuthUser = Self::check(response).await?.json().await?;

        let updated = Session {
            user: user.clone(),
            ..session
        };
        self.store_session(Some(updated.clone())).await;
        self.events.emit(AuthStateChange::new(
            AuthChangeEvent::UserUpdated,
            Some(updated),
        ));
        Ok(user)
    }

    async fn select(&self, query: Query) -> Result<Vec<Value>, RemoteError> {
        let bearer = self.data_bearer().await?;
        let response = self
            .request(Method::GET, self.rest_url(query.table), &bearer)
            .query(&query.to_params())
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Vec<Value>, RemoteError> {
        let bearer = self.data_bearer().await?;
        let response = self
            .request(Method::POST, self.rest_url(table), &bearer)
            .header("Prefer", "return=representation")
            .json(&Value::Array(vec![row]))
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn update(&self, query: Query, patch: Value) -> Result<Vec<Value>, RemoteError> {
        let bearer = self.data_bearer().await?;
        let response = self
            .request(Method::PATCH, self.rest_url(query.table), &bearer)
            .query(&query.to_params())
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn delete(&self, query: Query) -> Result<Vec<Value>, RemoteError> {
        let bearer = self.data_bearer().await?;
        let response = self
            .request(Method::DELETE, self.rest_url(query.table), &bearer)
            .query(&query.to_params())
            .header("Prefer", "return=representation")
            .send()
            .await?;
        Self::rows(response).await
    }
}
