//! gloome-client - GLOOME gain/loss mapping client
//!
//! `serve` hosts the interactive page on a local port; `run` submits a single
//! job from the command line and writes the rendered panels to a directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use gloome_common::config::{resolve_service_url, FormDependencyConfig, LoggingConfig, TomlConfig};
use gloome_common::protocol::JobKind;
use gloome_common::FieldValue;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gloome_client::form::{ControlKind, ALIGNMENT_FIELD, DISTANCE_TOGGLE, RADIAL_TOGGLE, TREE_FIELD};
use gloome_client::remote::{HttpRemote, RemoteService};
use gloome_client::runner::JobRunner;
use gloome_client::session::{JobProgress, Session};
use gloome_client::surface::{PageSurface, RenderTarget};
use gloome_client::{build_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "gloome-client")]
#[command(about = "Client for the GLOOME gain/loss mapping service")]
#[command(version)]
struct Cli {
    /// Config file (default: GLOOME_CONFIG, then the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the analysis service
    #[arg(long, global = true)]
    service_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the interactive page
    Serve {
        /// Listen address (overrides `bind_address` in the config file)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Submit one job and write its rendered panels
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Newick tree file
    #[arg(long)]
    tree: PathBuf,

    /// FASTA presence/absence alignment file
    #[arg(long)]
    alignment: Option<PathBuf>,

    /// combined, tree-only, likelihood-only or file-list-only
    #[arg(long, default_value = "combined")]
    kind: JobKind,

    /// Radial layout
    #[arg(long)]
    radial: bool,

    /// Label branches with their distance
    #[arg(long)]
    show_distance: bool,

    /// Output directory for the panels
    #[arg(short, long, default_value = "gloome-output")]
    out: PathBuf,

    /// Extra form fields as `id=value`
    #[arg(long = "set", value_name = "ID=VALUE")]
    fields: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = TomlConfig::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!(
        "Starting GLOOME client (gloome-client) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let service_url = resolve_service_url(cli.service_url.as_deref(), &config);
    info!("Analysis service: {}", service_url);

    let form_config = config.form.clone().unwrap_or_else(FormDependencyConfig::gloome_default);
    let session = Session::new(PageSurface::new(), &form_config, config.polling.max_attempts)
        .context("Invalid form dependency table")?;
    let remote: Arc<dyn RemoteService> = Arc::new(HttpRemote::new(&service_url, config.polling.request_timeout())?);
    let runner = JobRunner::new(Arc::new(Mutex::new(session)), remote, config.polling.interval());

    match cli.command {
        Command::Serve { bind } => serve(runner, &service_url, bind.as_deref().unwrap_or(&config.bind_address)).await,
        Command::Run(args) => run(runner, args).await,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("gloome_client={0},gloome_common={0},tower_http=info", logging.level)))
    };

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn serve(runner: JobRunner<PageSurface>, service_url: &str, bind: &str) -> Result<()> {
    let app = build_router(AppState::new(runner, service_url));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("gloome-client listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}

/// Parse `id=value`, typed by the control it targets
fn parse_field(raw: &str, kind: Option<ControlKind>) -> Result<(String, FieldValue)> {
    let Some((id, value)) = raw.split_once('=') else {
        bail!("`{}` is not of the form ID=VALUE", raw);
    };
    let value = match kind {
        Some(ControlKind::Toggle) => FieldValue::Bool(
            value
                .parse()
                .with_context(|| format!("`{}` expects true or false", id))?,
        ),
        Some(ControlKind::Number) => FieldValue::Number(
            value
                .parse()
                .with_context(|| format!("`{}` expects a number", id))?,
        ),
        _ => FieldValue::Text(value.to_string()),
    };
    Ok((id.to_string(), value))
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

async fn run(runner: JobRunner<PageSurface>, args: RunArgs) -> Result<()> {
    {
        let mut session = runner.session().lock().await;
        session.on_value_changed(TREE_FIELD, read_input(&args.tree)?.into())?;
        if let Some(path) = &args.alignment {
            session.on_value_changed(ALIGNMENT_FIELD, read_input(path)?.into())?;
        }
        session.on_toggle_changed(RADIAL_TOGGLE, args.radial)?;
        session.on_toggle_changed(DISTANCE_TOGGLE, args.show_distance)?;

        for raw in &args.fields {
            let id = raw.split('=').next().unwrap_or_default();
            let kind = session
                .form()
                .control_states()
                .into_iter()
                .find(|c| c.id == id)
                .map(|c| c.kind);
            let (id, value) = parse_field(raw, kind)?;
            match value {
                FieldValue::Bool(on) => session.on_toggle_changed(&id, on)?,
                value => session.on_value_changed(&id, value)?,
            }
        }
        session.validate()?;
    }

    let handle = runner.submit(args.kind).await?;
    info!(ticket = %handle.ticket, kind = %args.kind, "Job submitted, waiting for result");
    let progress = handle.wait().await.context("Job task panicked")?;

    let snapshot = runner.session().lock().await.snapshot();
    std::fs::create_dir_all(&args.out).with_context(|| format!("Failed to create {}", args.out.display()))?;
    for target in RenderTarget::ALL {
        let Some(content) = snapshot.panels.get(&target) else {
            continue;
        };
        let extension = if target == RenderTarget::TreeCanvas { "svg" } else { "html" };
        let path = args.out.join(format!("{}.{}", target.as_str(), extension));
        std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {}", path.display());
    }

    if progress != JobProgress::Succeeded {
        let banner = snapshot
            .panels
            .get(&RenderTarget::Banner)
            .cloned()
            .unwrap_or_else(|| "job did not finish".to_string());
        bail!("Job failed: {}", banner);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_uses_control_kind() {
        assert_eq!(
            parse_field("alpha=0.5", Some(ControlKind::Number)).unwrap(),
            ("alpha".to_string(), FieldValue::Number(0.5))
        );
        assert_eq!(
            parse_field("is_optimize_bl=false", Some(ControlKind::Toggle)).unwrap(),
            ("is_optimize_bl".to_string(), FieldValue::Bool(false))
        );
        assert_eq!(
            parse_field("e_mail=a@b.org", None).unwrap(),
            ("e_mail".to_string(), FieldValue::Text("a@b.org".into()))
        );
    }

    #[test]
    fn test_parse_field_rejects_malformed() {
        assert!(parse_field("alpha", None).is_err());
        assert!(parse_field("alpha=high", Some(ControlKind::Number)).is_err());
    }
}
