use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{EngineConfig, QualityGate};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facegate", about = "FaceGate access control CLI")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide an access attempt for a capture; exits 1 when denied
    Authenticate {
        /// Capture image file
        image: PathBuf,
        /// Access context: login or physical_access
        #[arg(short, long, default_value = "login")]
        context: String,
    },
    /// Enroll a capture for an identity
    Enroll {
        /// Capture image file
        image: PathBuf,
        /// Identity owning the enrollment (defaults to $USER)
        #[arg(short, long)]
        owner: Option<String>,
        /// Label for this capture session (e.g., "desk", "glasses")
        #[arg(short, long, default_value = "")]
        label: String,
    },
    /// Revoke an enrollment
    Revoke {
        /// Enrollment ID
        id: String,
    },
    /// List enrollments for an identity
    List {
        /// Identity (defaults to $USER)
        #[arg(short, long)]
        owner: Option<String>,
    },
    /// Show daemon status
    Status,
    /// Run the quality gate on an image locally, without the daemon
    Inspect {
        image: PathBuf,
    },
}

#[zbus::proxy(
    interface = "org.facegate.Gate1",
    default_service = "org.facegate.Gate1",
    default_path = "/org/facegate/Gate1"
)]
trait Gate {
    fn authenticate(&self, image_path: &str, context: &str) -> zbus::Result<String>;
    fn enroll(&self, owner: &str, label: &str, image_path: &str) -> zbus::Result<String>;
    fn revoke(&self, id: &str) -> zbus::Result<bool>;
    fn list_enrollments(&self, owner: &str) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Inspect { image } = &cli.command {
        return inspect(image);
    }

    let connection = if cli.session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("connecting to D-Bus")?;
    let proxy = GateProxy::new(&connection)
        .await
        .context("facegated is not reachable")?;

    match cli.command {
        Commands::Authenticate { image, context } => {
            let reply = proxy.authenticate(&absolute(&image)?, &context).await?;
            let decision: serde_json::Value = serde_json::from_str(&reply)?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            if decision["outcome"] != "permitted" {
                std::process::exit(1);
            }
        }
        Commands::Enroll { image, owner, label } => {
            let owner = owner_or_user(owner)?;
            let id = proxy.enroll(&owner, &label, &absolute(&image)?).await?;
            println!("Enrolled {owner}: {id}");
        }
        Commands::Revoke { id } => {
            if proxy.revoke(&id).await? {
                println!("Revoked {id}");
            } else {
                bail!("no active enrollment with id {id}");
            }
        }
        Commands::List { owner } => {
            let owner = owner_or_user(owner)?;
            let records: Vec<serde_json::Value> = serde_json::from_str(&proxy.list_enrollments(&owner).await?)?;
            if records.is_empty() {
                println!("No enrollments for {owner}");
            }
            for r in records {
                println!(
                    "{}  {:<8}  {:<18}  {}  {}",
                    r["id"].as_str().unwrap_or("?"),
                    if r["active"] == true { "active" } else { "revoked" },
                    r["method"].as_str().unwrap_or("-"),
                    r["created_at"].as_str().unwrap_or(""),
                    r["label"].as_str().unwrap_or(""),
                );
            }
        }
        Commands::Status => {
            let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Inspect { .. } => unreachable!("handled before connecting"),
    }

    Ok(())
}

fn inspect(image: &Path) -> Result<()> {
    let raw = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    tracing::debug!(bytes = raw.len(), "inspect: capture read");
    let gate = QualityGate::new(EngineConfig::default().quality);
    let normalized = gate.validate_and_normalize(&raw)?;
    println!(
        "{}: accepted, {}x{} -> {}x{}",
        image.display(),
        normalized.original_width,
        normalized.original_height,
        normalized.width(),
        normalized.height()
    );
    Ok(())
}

/// The daemon resolves paths itself, so hand it an absolute one.
fn absolute(path: &Path) -> Result<String> {
    let path = std::fs::canonicalize(path).with_context(|| format!("resolving {}", path.display()))?;
    Ok(path.to_string_lossy().into_owned())
}

fn owner_or_user(owner: Option<String>) -> Result<String> {
    match owner.or_else(|| std::env::var("USER").ok()) {
        Some(o) if !o.is_empty() => Ok(o),
        _ => bail!("no --owner given and $USER is unset"),
    }
}
