//! Dashboard commands over the tenant's clients, prosthetists and stages

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use clap::{Subcommand, ValueEnum};
use prodent_client::{
    DebouncedSearch, GuardFailure, MetricsAccess, Resource, ResourceAccess, ResourceError,
};
use shared::{
    Client, CreateClient, CreateProsthetist, CreateStage, Prosthetist, ProsthetistSubtype,
    ProsthetistType, Stage, UpdateClient, UpdateProsthetist, UpdateStage,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::app::App;

// ============================================================================
// Arguments
// ============================================================================

#[derive(Subcommand)]
pub enum ClientAction {
    /// List clients, optionally filtered by name or document
    List {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Search interactively as you type
    Find,
    /// Register a client
    Add {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        cpf_cnpj: Option<String>,
        /// Birth date as YYYY-MM-DD
        #[arg(long)]
        birth_date: Option<NaiveDate>,
        #[arg(long)]
        address: Option<String>,
    },
    /// Change fields of a client
    Edit {
        id: Uuid,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        cpf_cnpj: Option<String>,
        #[arg(long)]
        birth_date: Option<NaiveDate>,
        #[arg(long)]
        address: Option<String>,
    },
    /// Delete a client
    Rm { id: Uuid },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    External,
    Internal,
}

impl From<KindArg> for ProsthetistType {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::External => ProsthetistType::External,
            KindArg::Internal => ProsthetistType::Internal,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SubtypeArg {
    Laboratory,
    Freelance,
    Internal,
}

impl From<SubtypeArg> for ProsthetistSubtype {
    fn from(arg: SubtypeArg) -> Self {
        match arg {
            SubtypeArg::Laboratory => ProsthetistSubtype::Laboratory,
            SubtypeArg::Freelance => ProsthetistSubtype::Freelance,
            SubtypeArg::Internal => ProsthetistSubtype::Internal,
        }
    }
}

#[derive(Subcommand)]
pub enum ProsthetistAction {
    /// List prosthetists, optionally filtered by name or document
    List {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Search interactively as you type
    Find,
    /// Register a prosthetist or laboratory
    Add {
        #[arg(long)]
        name: String,
        #[arg(long = "type", value_enum)]
        kind: KindArg,
        #[arg(long, value_enum)]
        subtype: SubtypeArg,
        #[arg(long)]
        cnpj: Option<String>,
        #[arg(long)]
        cpf: Option<String>,
    },
    /// Change fields of a prosthetist
    Edit {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type", value_enum)]
        kind: Option<KindArg>,
        #[arg(long, value_enum)]
        subtype: Option<SubtypeArg>,
        #[arg(long)]
        cnpj: Option<String>,
        #[arg(long)]
        cpf: Option<String>,
    },
    /// Delete a prosthetist
    Rm { id: Uuid },
}

#[derive(Subcommand)]
pub enum StageAction {
    /// List workflow stages, optionally filtered by name
    List {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Search interactively as you type
    Find,
    /// Create a workflow stage
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        min_days: i32,
        #[arg(long)]
        max_days: i32,
        /// Display color, e.g. #3366ff
        #[arg(long)]
        color: Option<String>,
    },
    /// Change fields of a stage
    Edit {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        min_days: Option<i32>,
        #[arg(long)]
        max_days: Option<i32>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a stage
    Rm { id: Uuid },
}

// ============================================================================
// Output
// ============================================================================

/// One-line rendering for listings
trait Row {
    const LABEL: &'static str;

    fn line(&self) -> String;
}

impl Row for Client {
    const LABEL: &'static str = "client";

    fn line(&self) -> String {
        format!(
            "{}  {:<32} {:<18} {}",
            self.id,
            self.full_name(),
            self.cpf_cnpj.as_deref().unwrap_or("-"),
            self.phone.as_deref().unwrap_or("-")
        )
    }
}

impl Row for Prosthetist {
    const LABEL: &'static str = "prosthetist";

    fn line(&self) -> String {
        format!(
            "{}  {:<32} {:?}/{:?}  {}",
            self.id,
            self.name,
            self.kind,
            self.subtype,
            self.cnpj.as_deref().or(self.cpf.as_deref()).unwrap_or("-")
        )
    }
}

impl Row for Stage {
    const LABEL: &'static str = "stage";

    fn line(&self) -> String {
        format!(
            "{}  {:<24} {}-{} days  {}",
            self.id,
            self.name,
            self.min_days,
            self.max_days,
            self.color.as_deref().unwrap_or("")
        )
    }
}

fn guard_error(failure: GuardFailure) -> anyhow::Error {
    tracing::debug!("Guard failure: {:?}", failure);
    anyhow!("{}", failure.notice())
}

fn resource_error(err: ResourceError) -> anyhow::Error {
    tracing::debug!("Resource failure: {:?}", err);
    anyhow!("{}", err.notice())
}

// ============================================================================
// Generic operations
// ============================================================================

async fn list<R: Resource + Row>(app: &App, search: Option<String>) -> Result<()> {
    let rows = ResourceAccess::<R>::new(app.store.clone())
        .list(search.as_deref())
        .await
        .map_err(guard_error)?;

    if rows.is_empty() {
        println!("No {}s found", R::LABEL);
    }
    for row in &rows {
        println!("{}", row.line());
    }
    Ok(())
}

/// Read search terms line by line; only the last one typed within the
/// debounce window is sent
async fn find<R: Resource + Row + Clone>(app: &App) -> Result<()> {
    let search = DebouncedSearch::new(ResourceAccess::<R>::new(app.store.clone()), &app.session);
    let mut results = search.subscribe();
    let printer = tokio::spawn(async move {
        while results.changed().await.is_ok() {
            let latest = results.borrow_and_update().clone();
            println!("\x1b[90m-- {} match(es) for {:?}\x1b[0m", latest.items.len(), latest.term);
            for item in &latest.items {
                println!("{}", item.line());
            }
        }
    });

    println!("Type a search term per line; an empty line quits");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last = None;
    while let Some(line) = lines.next_line().await? {
        let term = line.trim();
        if term.is_empty() {
            break;
        }
        last = Some(search.search(term));
    }

    let outcome = match last {
        Some(task) => task.join().await,
        None => Ok(None),
    };
    search.cancel();
    // Let the printer see the final publish before stopping it
    tokio::task::yield_now().await;
    printer.abort();

    outcome.map(|_| ()).map_err(guard_error)
}

async fn remove<R: Resource + Row>(app: &App, id: Uuid) -> Result<()> {
    ResourceAccess::<R>::new(app.store.clone())
        .delete(id)
        .await
        .map_err(resource_error)?;
    println!("\x1b[32m✅ Deleted {} {}\x1b[0m", R::LABEL, id);
    Ok(())
}

async fn create<R: Resource + Row>(app: &App, input: R::Create) -> Result<()> {
    let created = ResourceAccess::<R>::new(app.store.clone())
        .create(input)
        .await
        .map_err(resource_error)?;
    println!("\x1b[32m✅ Created {}\x1b[0m", R::LABEL);
    println!("{}", created.line());
    Ok(())
}

async fn edit<R: Resource + Row>(app: &App, id: Uuid, patch: R::Update) -> Result<()> {
    let updated = ResourceAccess::<R>::new(app.store.clone())
        .update(id, patch)
        .await
        .map_err(resource_error)?;
    println!("\x1b[32m✅ Updated {}\x1b[0m", R::LABEL);
    println!("{}", updated.line());
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

pub async fn clients(app: &App, action: ClientAction) -> Result<()> {
    app.require_session("/dashboard/clients")?;
    match action {
        ClientAction::List { search } => list::<Client>(app, search).await,
        ClientAction::Find => find::<Client>(app).await,
        ClientAction::Add {
            first_name,
            last_name,
            phone,
            cpf_cnpj,
            birth_date,
            address,
        } => {
            let input = CreateClient {
                first_name,
                last_name,
                phone,
                cpf_cnpj,
                birth_date,
                address,
            };
            create::<Client>(app, input).await
        }
        ClientAction::Edit {
            id,
            first_name,
            last_name,
            phone,
            cpf_cnpj,
            birth_date,
            address,
        } => {
            let patch = UpdateClient {
                first_name,
                last_name,
                phone,
                cpf_cnpj,
                birth_date,
                address,
            };
            edit::<Client>(app, id, patch).await
        }
        ClientAction::Rm { id } => remove::<Client>(app, id).await,
    }
}

pub async fn prosthetists(app: &App, action: ProsthetistAction) -> Result<()> {
    app.require_session("/dashboard/prosthetists")?;
    match action {
        ProsthetistAction::List { search } => list::<Prosthetist>(app, search).await,
        ProsthetistAction::Find => find::<Prosthetist>(app).await,
        ProsthetistAction::Add {
            name,
            kind,
            subtype,
            cnpj,
            cpf,
        } => {
            let input = CreateProsthetist {
                name,
                kind: kind.into(),
                subtype: subtype.into(),
                cnpj,
                cpf,
            };
            create::<Prosthetist>(app, input).await
        }
        ProsthetistAction::Edit {
            id,
            name,
            kind,
            subtype,
            cnpj,
            cpf,
        } => {
            let patch = UpdateProsthetist {
                name,
                kind: kind.map(Into::into),
                subtype: subtype.map(Into::into),
                cnpj,
                cpf,
            };
            edit::<Prosthetist>(app, id, patch).await
        }
        ProsthetistAction::Rm { id } => remove::<Prosthetist>(app, id).await,
    }
}

pub async fn stages(app: &App, action: StageAction) -> Result<()> {
    app.require_session("/dashboard/stages")?;
    match action {
        StageAction::List { search } => list::<Stage>(app, search).await,
        StageAction::Find => find::<Stage>(app).await,
        StageAction::Add {
            name,
            description,
            min_days,
            max_days,
            color,
        } => {
            if min_days > max_days {
                bail!("--min-days must not exceed --max-days");
            }
            let input = CreateStage {
                name,
                description,
                min_days,
                max_days,
                color,
            };
            create::<Stage>(app, input).await
        }
        StageAction::Edit {
            id,
            name,
            description,
            min_days,
            max_days,
            color,
        } => {
            let patch = UpdateStage {
                name,
                description,
                min_days,
                max_days,
                color,
            };
            edit::<Stage>(app, id, patch).await
        }
        StageAction::Rm { id } => remove::<Stage>(app, id).await,
    }
}

pub async fn metrics(app: &App) -> Result<()> {
    app.require_session("/dashboard")?;
    let metrics = MetricsAccess::new(app.store.clone())
        .summary()
        .await
        .map_err(guard_error)?;

    println!("Clients:        {}", metrics.total_clients);
    println!("Prosthetists:   {}", metrics.total_prosthetists);
    println!("Processes:      {}", metrics.total_processes);
    println!("Delayed stages: {}", metrics.delayed_stages);
    Ok(())
}
