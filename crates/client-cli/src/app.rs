use anyhow::{bail, Result};
use prodent_client::{
    BootstrapHandle, Bootstrapper, GateDecision, RemoteService, RouteGate, SessionConfig,
    SessionFile, SessionStore, SupabaseClient,
};
use std::sync::Arc;

use crate::config::Config;

/// A running client: restored session plus its change listener
pub struct App {
    pub store: SessionStore,
    pub session: SessionConfig,
    gate: RouteGate,
    bootstrap: BootstrapHandle,
}

impl App {
    pub async fn start(config: &Config, url_override: Option<String>) -> Result<Self> {
        let service = config.service(url_override)?;
        let storage = SessionFile::new(Config::session_path()?);
        tracing::debug!("Using session file {}", storage.path().display());

        let remote: Arc<dyn RemoteService> =
            Arc::new(SupabaseClient::new(&service)?.with_storage(storage));
        let store = SessionStore::new(remote, &config.session);

        let bootstrap = Bootstrapper::new(store.clone(), &config.session).start();
        let phase = bootstrap.ready().await;
        tracing::debug!("Session check settled: {:?}", phase);

        Ok(Self {
            store,
            session: config.session.clone(),
            gate: RouteGate::from_config(&config.session),
            bootstrap,
        })
    }

    /// Admit a dashboard command the way the protected routes do
    pub fn require_session(&self, path: &str) -> Result<()> {
        match self.gate.decide(&self.store.current_state(), path) {
            GateDecision::Render => Ok(()),
            GateDecision::Loading => bail!("Session check still running, try again"),
            GateDecision::Failed(notice) => bail!("{}", notice),
            GateDecision::Redirect { to, from } => {
                tracing::debug!("Redirecting {} to {}", from, to);
                bail!("Not logged in. Run 'prodent login' to authenticate.")
            }
        }
    }

    pub async fn shutdown(self) {
        self.bootstrap.shutdown().await;
    }
}
