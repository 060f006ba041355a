// src/bin/cli.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! `pollination` command-line client.
//!
//! Examples:
//! ```bash
//! pollination login
//! pollination project folder upload ./model -p my-project --create-project -j 8
//! pollination project folder list     -p my-project --path model --output yaml
//! pollination project folder download -p my-project --path model -f ./restore
//! pollination project folder delete   -p my-project --path model
//! pollination project simulation submit ladybug-tools/annual-daylight:0.8.2 -p my-project -i inputs.yaml
//! pollination project simulation list     -p my-project --output json
//! pollination project simulation download -p my-project -i <id> -a logs -f ./runs
//! pollination push recipe ./annual-daylight -t 0.9.0 --create-repo
//! pollination pull operator honeybee-radiance -t 1.2.0 -p ./operators --force
//! ```

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use pollination::archive::{fetch_categories, write_simulation_status};
use pollination::auth;
use pollination::download::download_tree;
use pollination::registry::{read_package, write_package};
use pollination::progress::{ProgressCallback, TransferProgressTracker};
use pollination::types::{ArtifactEntry, RecipeSelection, Simulation, SubmitSimulation};
use pollination::upload::upload_items;
use pollination::{
    ArtifactCategory, ArtifactStore, CategoryStatus, Config, Ensured, Namespace, PathEnumerator,
    PollinationClient, RepositoryKind, SyncError, UploadOptions,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(name = "pollination", author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// API endpoint, overriding QB_POLLINATION_ENDPOINT.
    #[arg(long, global = true, value_name = "URL")]
    endpoint: Option<String>,

    /// Per-request timeout in seconds. Unset means no timeout.
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Exchange the configured API key for an access token and print it.
    Login,

    /// Work with the artifacts and simulations of a project.
    Project {
        #[command(subcommand)]
        cmd: ProjectCommand,
    },

    /// Push a recipe or operator package folder to the registry.
    Push(PushArgs),

    /// Pull a recipe or operator package into PATH/NAME.
    Pull(PullArgs),
}

#[derive(Args)]
struct PushArgs {
    #[arg(value_enum)]
    kind: RepositoryKind,

    /// Package folder holding the manifest, README and LICENSE.
    path: PathBuf,

    /// Registry owner. Defaults to the authenticated account.
    #[arg(short = 'o', long)]
    owner: Option<String>,

    /// Tag to apply, replacing the manifest's metadata.tag.
    #[arg(short = 't', long)]
    tag: Option<String>,

    /// Create the repository if it does not exist.
    #[arg(long)]
    create_repo: bool,

    /// Make a newly created repository private.
    #[arg(long, requires = "create_repo")]
    private: bool,
}

#[derive(Args)]
struct PullArgs {
    #[arg(value_enum)]
    kind: RepositoryKind,

    name: String,

    #[arg(short = 'o', long)]
    owner: Option<String>,

    /// Tag to pull. Defaults to the latest tag.
    #[arg(short = 't', long)]
    tag: Option<String>,

    /// Parent folder for the package.
    #[arg(short = 'p', long, default_value = ".")]
    path: PathBuf,

    /// Replace an existing package folder.
    #[arg(short = 'f', long)]
    force: bool,
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Upload, download, list and delete project folders.
    Folder {
        #[command(subcommand)]
        cmd: FolderCommand,
    },
    /// Submit, list and download simulations.
    Simulation {
        #[command(subcommand)]
        cmd: SimulationCommand,
    },
}

#[derive(Args, Clone)]
struct Target {
    /// Project name.
    #[arg(short = 'p', long)]
    project: String,

    /// Project owner. Defaults to the authenticated account.
    #[arg(short = 'o', long)]
    owner: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum FolderCommand {
    /// Upload every file under PATH.
    Upload {
        /// Local file or folder.
        path: PathBuf,

        #[command(flatten)]
        target: Target,

        /// Key prefix prepended to every uploaded file.
        #[arg(long)]
        prefix: Option<String>,

        /// Concurrent uploads. Defaults to one less than the CPU count.
        #[arg(short = 'j', long = "jobs")]
        jobs: Option<usize>,

        /// Create the project if it does not exist.
        #[arg(long)]
        create_project: bool,

        /// Make a newly created project public.
        #[arg(long, requires = "create_project")]
        public: bool,
    },
    /// Mirror a remote folder into a local directory.
    Download {
        #[command(flatten)]
        target: Target,

        /// Remote folder. Defaults to the project root.
        #[arg(long)]
        path: Option<String>,

        /// Local destination folder.
        #[arg(short = 'f', long, default_value = ".")]
        folder: PathBuf,
    },
    /// List one level of a remote folder.
    List {
        #[command(flatten)]
        target: Target,

        #[arg(long)]
        path: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Delete a remote file or folder.
    Delete {
        #[command(flatten)]
        target: Target,

        /// Remote path. Omit to delete every artifact in the project.
        #[arg(long)]
        path: Option<String>,
    },
}

#[derive(Subcommand)]
enum SimulationCommand {
    /// Submit a simulation of a recipe.
    Submit {
        /// Recipe reference as owner/name:tag.
        recipe: RecipeSelection,

        #[command(flatten)]
        target: Target,

        /// YAML or JSON file with the recipe inputs.
        #[arg(short = 'i', long)]
        inputs: Option<PathBuf>,
    },
    /// List simulations, newest first.
    List {
        #[command(flatten)]
        target: Target,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Download simulation artifacts into FOLDER/<id>.
    Download {
        #[command(flatten)]
        target: Target,

        /// Simulation id.
        #[arg(short = 'i', long = "id")]
        id: String,

        /// Parent folder for the simulation directory.
        #[arg(short = 'f', long, default_value = ".")]
        folder: PathBuf,

        /// Only fetch this category. Defaults to all of them.
        #[arg(short = 'a', long = "artifact", value_enum)]
        artifact: Option<ArtifactCategory>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    // Initialize tracing-log bridge to capture log crate messages from dependencies
    tracing_log::LogTracer::init().ok();

    let mut config = Config::from_env();
    if let Some(endpoint) = cli.endpoint {
        config = config.with_endpoint(endpoint);
    }
    if let Some(secs) = cli.timeout {
        config = config.with_request_timeout(Some(Duration::from_secs(secs)));
    }
    debug!("configuration: {:?}", config);

    match cli.cmd {
        Command::Login => login_cmd(config).await,
        Command::Project { cmd } => {
            let client = PollinationClient::connect(config).await.context("failed to authenticate")?;
            match cmd {
                ProjectCommand::Folder { cmd } => folder_cmd(&client, cmd).await,
                ProjectCommand::Simulation { cmd } => simulation_cmd(&client, cmd).await,
            }
        }
        Command::Push(args) => {
            let client = PollinationClient::connect(config).await.context("failed to authenticate")?;
            push_cmd(&client, args).await
        }
        Command::Pull(args) => {
            let client = PollinationClient::connect(config).await.context("failed to authenticate")?;
            pull_cmd(&client, args).await
        }
    }
}

async fn login_cmd(config: Config) -> Result<()> {
    if config.api_key.is_none() {
        bail!("set QB_POLLINATION_API_KEY_ID and QB_POLLINATION_API_KEY_SECRET to log in");
    }
    let http = config.http.build()?;
    let config = auth::login(&http, &config).await?;
    let token = config.access_token.context("login returned no access token")?;
    safe_println!("{}", token);
    Ok(())
}

async fn resolve_owner(client: &PollinationClient, owner: Option<&str>) -> Result<String> {
    match owner {
        Some(owner) => Ok(owner.to_string()),
        None => {
            let account = client.get_account().await.context("failed to look up the current account")?;
            debug!("owner defaults to account {}", account.username);
            Ok(account.username)
        }
    }
}

async fn resolve_namespace(client: &PollinationClient, target: &Target) -> Result<Namespace> {
    let owner = resolve_owner(client, target.owner.as_deref()).await?;
    Ok(Namespace::new(owner, target.project.clone()))
}

fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<Option<String>> {
    Ok(match format {
        OutputFormat::Table => None,
        OutputFormat::Yaml => Some(serde_yaml::to_string(value)?),
        OutputFormat::Json => Some(serde_json::to_string_pretty(value)?),
    })
}

// ---------------------------------------------------------------------------
// project folder
// ---------------------------------------------------------------------------

async fn folder_cmd(client: &PollinationClient, cmd: FolderCommand) -> Result<()> {
    match cmd {
        FolderCommand::Upload { path, target, prefix, jobs, create_project, public } => {
            let ns = resolve_namespace(client, &target).await?;
            match client.ensure_project(&ns, public, create_project).await {
                Ok(Ensured::Created) => {
                    safe_println!("Created project {}", ns);
                }
                Ok(Ensured::Existing) => {}
                Err(e @ SyncError::NotFound(_)) => {
                    return Err(e).with_context(|| {
                        format!("project {ns} not found; pass --create-project to create it")
                    });
                }
                Err(e) => return Err(e.into()),
            }

            let enumerator = PathEnumerator::new(&path, prefix.as_deref())?;
            let items = enumerator
                .collect_items()
                .with_context(|| format!("failed to enumerate {}", path.display()))?;
            if items.is_empty() {
                bail!("No files found to upload under {}", path.display());
            }

            let file_count = items.len() as u64;
            let total_bytes: u64 = items
                .iter()
                .filter_map(|i| std::fs::metadata(&i.local_path).ok())
                .map(|m| m.len())
                .sum();
            let workers = jobs.unwrap_or_else(|| UploadOptions::default().workers);
            info!("uploading {} file(s), {} bytes, with {} worker(s)", file_count, total_bytes, workers);

            let progress_tracker = Arc::new(TransferProgressTracker::new("UPLOAD", file_count, total_bytes));
            let progress_callback = Arc::new(ProgressCallback::new(progress_tracker.clone(), file_count));

            let store = Arc::new(client.clone());
            let t0 = Instant::now();
            let report =
                upload_items(store, client.transfer(), &ns, items, workers, Some(progress_callback)).await;
            progress_tracker.finish("Upload", report.total_bytes(), t0.elapsed());

            for outcome in report.sorted() {
                safe_println!("{}", outcome);
            }
            let confirmed = report.uploaded().count();
            safe_println!("{} of {} file(s) uploaded to {}", confirmed, report.len(), ns);
            if !report.all_confirmed() {
                bail!("{} file(s) were not uploaded", report.len() - confirmed);
            }
        }

        FolderCommand::Download { target, path, folder } => {
            let ns = resolve_namespace(client, &target).await?;
            let progress_tracker = Arc::new(TransferProgressTracker::new("DOWNLOAD", 0, 0));
            let progress_callback = ProgressCallback::new(progress_tracker.clone(), 0);

            let t0 = Instant::now();
            let result = download_tree(
                client,
                client.transfer(),
                &ns,
                path.as_deref(),
                &folder,
                Some(&progress_callback),
            )
            .await;
            let total_bytes = progress_callback.bytes();
            progress_callback.update_total_bytes(total_bytes);
            progress_tracker.finish("Download", total_bytes, t0.elapsed());

            let stats = result.with_context(|| format!("failed to download from {ns}"))?;
            safe_println!("Downloaded {} file(s) to {}", stats.files, folder.display());
        }

        FolderCommand::List { target, path, output } => {
            let ns = resolve_namespace(client, &target).await?;
            let entries = client.list_entries(&ns, path.as_deref()).await?;
            match render(&entries, output)? {
                Some(text) => {
                    safe_println!("{}", text.trim_end());
                }
                None => print_entries(&entries)?,
            }
        }

        FolderCommand::Delete { target, path } => {
            let ns = resolve_namespace(client, &target).await?;
            client.delete(&ns, path.as_deref()).await?;
            safe_println!("Deleted {}:{}", ns, path.as_deref().unwrap_or("/"));
        }
    }
    Ok(())
}

fn print_entries(entries: &[ArtifactEntry]) -> Result<()> {
    safe_println!("{:<8} {:>12}  {:<25}  {}", "TYPE", "SIZE", "LAST MODIFIED", "KEY");
    for e in entries {
        let kind = if e.is_folder() { "folder" } else { "file" };
        let size = e.size.map(|s| s.to_string()).unwrap_or_default();
        let modified = e.last_modified.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_default();
        safe_println!("{:<8} {:>12}  {:<25}  {}", kind, size, modified, e.key);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// project simulation
// ---------------------------------------------------------------------------

async fn simulation_cmd(client: &PollinationClient, cmd: SimulationCommand) -> Result<()> {
    match cmd {
        SimulationCommand::Submit { recipe, target, inputs } => {
            let ns = resolve_namespace(client, &target).await?;
            let inputs = match inputs {
                Some(file) => {
                    let text = tokio::fs::read_to_string(&file)
                        .await
                        .with_context(|| format!("failed to read {}", file.display()))?;
                    serde_yaml::from_str::<serde_json::Value>(&text)
                        .with_context(|| format!("failed to parse {}", file.display()))?
                }
                None => serde_json::Value::Object(Default::default()),
            };
            let created = match client.submit_simulation(&ns, &SubmitSimulation { recipe, inputs }).await {
                Ok(created) => created,
                Err(e @ SyncError::NotFound(_)) => {
                    return Err(e).with_context(|| format!("project {ns} not found"));
                }
                Err(e) => return Err(e.into()),
            };
            safe_println!("Submitted simulation {}", created.id);
        }

        SimulationCommand::List { target, page, output } => {
            let ns = resolve_namespace(client, &target).await?;
            let mut simulations = client.list_simulations(&ns, page).await?.resources;
            simulations.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            match render(&simulations, output)? {
                Some(text) => {
                    safe_println!("{}", text.trim_end());
                }
                None => print_simulations(&simulations)?,
            }
        }

        SimulationCommand::Download { target, id, folder, artifact } => {
            let ns = resolve_namespace(client, &target).await?;
            let simulation = client.get_simulation(&ns, &id).await?;
            let sim_folder = folder.join(&id);
            let categories: Vec<ArtifactCategory> = match artifact {
                Some(c) => vec![c],
                None => ArtifactCategory::ALL.to_vec(),
            };

            let spinner = TransferProgressTracker::spinner("DOWNLOAD");
            spinner.set_message(format!("simulation {id}"));
            let outcomes = fetch_categories(client, &ns, &id, &categories, &sim_folder).await;
            spinner.finish_and_clear();

            for outcome in &outcomes {
                safe_println!("{}", outcome);
            }
            let status_file = write_simulation_status(&sim_folder, &simulation).await?;
            safe_println!("Saved simulation status to {}", status_file.display());

            let failed = outcomes
                .iter()
                .filter(|o| matches!(o.status, CategoryStatus::Failed { .. }))
                .count();
            if failed > 0 {
                bail!("{} artifact categor{} could not be read", failed, if failed == 1 { "y" } else { "ies" });
            }
        }
    }
    Ok(())
}

fn print_simulations(simulations: &[Simulation]) -> Result<()> {
    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_else(|| "-".into())
    };
    safe_println!("{:<38} {:<12} {:<20} {:<20}", "ID", "STATUS", "STARTED", "FINISHED");
    for s in simulations {
        safe_println!(
            "{:<38} {:<12} {:<20} {:<20}",
            s.id,
            s.status.as_deref().unwrap_or("-"),
            fmt_time(s.started_at),
            fmt_time(s.finished_at)
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// push / pull
// ---------------------------------------------------------------------------

async fn push_cmd(client: &PollinationClient, args: PushArgs) -> Result<()> {
    let PushArgs { kind, path, owner, tag, create_repo, private } = args;
    let owner = resolve_owner(client, owner.as_deref()).await?;
    let local = read_package(kind, &path, tag.as_deref())
        .with_context(|| format!("failed to read {} package at {}", kind, path.display()))?;

    match client.ensure_repository(kind, &owner, &local.name, !private, create_repo).await {
        Ok(Ensured::Created) => {
            safe_println!("Created {} repository {}/{}", kind, owner, local.name);
        }
        Ok(Ensured::Existing) => {}
        Err(e @ SyncError::NotFound(_)) => {
            return Err(e).with_context(|| {
                format!("{kind} repository {owner}/{} not found; pass --create-repo to create it", local.name)
            });
        }
        Err(e) => return Err(e.into()),
    }

    client.push_package(kind, &owner, &local).await?;
    safe_println!("Successfully created new {} package {}/{}:{}", kind, owner, local.name, local.tag);
    Ok(())
}

async fn pull_cmd(client: &PollinationClient, args: PullArgs) -> Result<()> {
    let PullArgs { kind, name, owner, tag, path, force } = args;
    let owner = resolve_owner(client, owner.as_deref()).await?;
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }

    let (tag, package) = client.pull_package(kind, &owner, &name, tag.as_deref()).await?;
    let folder = std::path::absolute(&path)?.join(&name);
    match write_package(kind, &package, &folder, force) {
        Ok(_) => {}
        Err(SyncError::AlreadyExists(p)) => {
            bail!("Folder already exists at path {}. Use \"--force\" to overwrite it.", p.display());
        }
        Err(e) => return Err(e.into()),
    }
    safe_println!("{} {}/{}:{} saved to {}", kind, owner, name, tag, folder.display());
    Ok(())
}
