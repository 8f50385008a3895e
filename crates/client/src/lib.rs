//! Session lifecycle and tenant-scoped data access for the prodent dashboard.
//!
//! A [`SessionStore`] owns the signed-in identity and its company. The
//! [`Bootstrapper`] restores it on startup and keeps it in sync with pushed
//! session changes; every data call in [`resources`] and [`metrics`] runs
//! through the [`SessionGuard`] so it only ever touches the caller's tenant.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod gate;
pub mod guard;
pub mod metrics;
pub mod remote;
pub mod resources;
pub mod search;
pub mod state;
pub mod store;

pub use bootstrap::{BootstrapHandle, BootstrapPhase, Bootstrapper, Readiness};
pub use config::{ServiceConfig, SessionConfig};
pub use error::{
    AuthFailure, BootstrapTimeout, GuardFailure, Notice, RemoteError, ResourceError,
    TenantResolutionFailure,
};
pub use gate::{GateDecision, GateView, RouteGate};
pub use guard::{SessionGuard, TenantContext};
pub use metrics::MetricsAccess;
pub use remote::{RemoteService, SessionFile, SupabaseClient};
pub use resources::{ClientAccess, ProsthetistAccess, Resource, ResourceAccess, StageAccess};
pub use search::{DebouncedSearch, SearchResults, SearchTask};
pub use state::{AuthState, AuthStatus};
pub use store::{SessionSignal, SessionStore, SignUpError, SignUpOutcome, SignUpStep};
