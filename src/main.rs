use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};

use noteboard::backend::{BackendError, HttpBackend, ItemBackend, StaticToken};
use noteboard::cache::{ContextKeys, ItemCache, MemoryCache};
use noteboard::choreographer::badge_text;
use noteboard::config::{ApiConfig, BulkConfig, ConfigError, DEFAULT_BASE_URL};
use noteboard::error::{BulkError, ErrorCode};
use noteboard::events::BulkEvent;
use noteboard::item::{Collection, HostContext, ItemId, ItemKind, Operation, Scope};
use noteboard::orchestrator::{BulkOrchestrator, BulkOutcome};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing session token; pass --session-token or set NOTEBOARD_SESSION_TOKEN")]
    MissingSessionToken,
    #[error("pass --ids or --all")]
    NoTargets,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bulk(#[from] BulkError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl ErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingSessionToken => "E_MISSING_TOKEN",
            Self::NoTargets => "E_NO_TARGETS",
            Self::Config(e) => e.error_code(),
            Self::Bulk(e) => e.error_code(),
            Self::Backend(e) => e.error_code(),
            Self::InvalidJson(_) => "E_JSON",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Bulk(e) => e.retryable(),
            Self::Backend(e) => e.retryable(),
            _ => false,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "noteboard", about = "Bulk delete and restore for noteboard memos and tasks")]
struct Cli {
    #[arg(long, env = "NOTEBOARD_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "NOTEBOARD_SESSION_TOKEN")]
    session_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delete or restore a selection as one confirmed batch.
    Bulk(BulkArgs),
    /// Print a collection as JSON.
    List(ListArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Memo,
    Task,
}

impl From<KindArg> for ItemKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Memo => Self::Memo,
            KindArg::Task => Self::Task,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OperationArg {
    Delete,
    Restore,
}

impl From<OperationArg> for Operation {
    fn from(value: OperationArg) -> Self {
        match value {
            OperationArg::Delete => Self::Delete,
            OperationArg::Restore => Self::Restore,
        }
    }
}

#[derive(Args, Debug)]
struct TargetArgs {
    #[arg(long, value_enum)]
    kind: KindArg,

    #[arg(long)]
    team: Option<String>,

    #[arg(long)]
    board_id: Option<i64>,
}

impl TargetArgs {
    fn context(&self) -> HostContext {
        match (self.board_id, &self.team) {
            (Some(board_id), team) => HostContext::Board { board_id, team: team.clone() },
            (None, Some(team)) => HostContext::Team { team: team.clone() },
            (None, None) => HostContext::Personal,
        }
    }
}

#[derive(Args, Debug)]
struct BulkArgs {
    #[arg(value_enum)]
    operation: OperationArg,

    #[command(flatten)]
    target: TargetArgs,

    #[arg(long, default_value = "normal")]
    scope: String,

    #[arg(long, value_delimiter = ',', conflicts_with = "all")]
    ids: Vec<String>,

    #[arg(long, default_value_t = false)]
    all: bool,

    #[arg(long, default_value_t = false, help = "Skip the confirmation prompt")]
    yes: bool,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(long, default_value_t = false)]
    deleted: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(e) = &result {
        tracing::error!(code = e.error_code(), retryable = e.retryable(), error = %e, "command failed");
    }
    result
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let api = ApiConfig::new(cli.base_url, cli.session_token)?;
    match cli.command {
        Command::Bulk(args) => run_bulk(&api, args).await,
        Command::List(args) => run_list(&api, args).await,
    }
}

async fn run_list(api: &ApiConfig, args: ListArgs) -> Result<(), CliError> {
    let token = api.session_token.as_deref().ok_or(CliError::MissingSessionToken)?;
    let backend = HttpBackend::new(&api.base_url, args.target.context(), args.target.kind.into())?;
    let collection = if args.deleted { Collection::Deleted } else { Collection::Active };
    let items = backend.fetch_collection(collection, token).await?;
    print_json(&serde_json::to_value(items)?)
}

async fn run_bulk(api: &ApiConfig, args: BulkArgs) -> Result<(), CliError> {
    if api.session_token.is_none() {
        return Err(CliError::MissingSessionToken);
    }
    if !args.all && args.ids.is_empty() {
        return Err(CliError::NoTargets);
    }

    let config = BulkConfig::from_env()?;
    let context = args.target.context();
    let kind = ItemKind::from(args.target.kind);
    let operation = Operation::from(args.operation);
    let keys = ContextKeys::new(context.clone(), kind);

    let backend = Arc::new(HttpBackend::new(&api.base_url, context, kind)?);
    let cache = Arc::new(MemoryCache::new());
    let orchestrator = BulkOrchestrator::new(
        keys.clone(),
        backend,
        cache.clone(),
        Arc::new(StaticToken(api.session_token.clone())),
        config,
    );

    let loaded = orchestrator.refresh(operation.source()).await?;
    tracing::info!(%operation, loaded, "source collection loaded");

    let display_order: Vec<ItemId> = cache
        .items(&keys.collection(operation.source()))
        .into_iter()
        .map(|item| item.id)
        .collect();
    let scope = Scope::new(args.scope);
    if args.all {
        orchestrator.select_all(&scope, &display_order);
    } else {
        let requested: Vec<ItemId> = args.ids.iter().map(|raw| ItemId::parse(raw.trim())).collect();
        orchestrator.select_all(&scope, &requested);
    }

    let watcher = tokio::spawn(watch_events(orchestrator.clone(), orchestrator.subscribe(), args.yes));
    let outcome = orchestrator.begin_bulk_operation(&scope, operation, &display_order).await;
    watcher.abort();

    let json = match outcome? {
        BulkOutcome::Completed(report) => {
            if report.is_capped() {
                eprintln!(
                    "{} {} deferred past the batch cap; run the command again for the next batch",
                    report.deferred.len(),
                    kind.noun(report.deferred.len())
                );
            }
            serde_json::to_value(report)?
        }
        BulkOutcome::Cancelled => serde_json::json!({ "outcome": "cancelled" }),
        BulkOutcome::Rejected(reason) => serde_json::json!({ "outcome": "rejected", "reason": reason }),
    };
    print_json(&json)
}

/// Logs visual signals and answers confirmation prompts from stdin.
async fn watch_events(orchestrator: BulkOrchestrator, mut events: broadcast::Receiver<BulkEvent>, assume_yes: bool) {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let cap = orchestrator.config().display_cap;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event watcher lagged");
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        match event {
            BulkEvent::ConfirmRequested { scope, prompt } => {
                let confirmed = if assume_yes {
                    true
                } else {
                    eprint!("{} [y/N] ", prompt.message);
                    let answer = stdin.next_line().await.ok().flatten().unwrap_or_default();
                    matches!(answer.trim(), "y" | "Y" | "yes")
                };
                if confirmed {
                    orchestrator.confirm(&scope);
                } else {
                    orchestrator.cancel_confirmation(&scope);
                }
            }
            BulkEvent::LidChanged { scope, open } => {
                let badge = badge_text(orchestrator.state(&scope).display_count, cap);
                tracing::info!(%scope, open, %badge, "trash lid");
            }
            BulkEvent::FadeOut { scope, index, dom_key } => {
                tracing::debug!(%scope, index, %dom_key, "fade out");
            }
            BulkEvent::Cancelled { .. } | BulkEvent::Completed { .. } => {}
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
