use clap::{Parser, Subcommand};
use jacques_types::{ErrorKind, JacquesPaths};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

mod serve;

/// Exit codes fixed by the external interface contract.
const EXIT_STARTUP_ERROR: i32 = 1;
const EXIT_PORT_IN_USE: i32 = 2;
const EXIT_SOCKET_UNCLEANABLE: i32 = 3;

#[derive(Parser)]
#[command(
    name = "jacques",
    version,
    about = "Observe live AI coding sessions and search their archive"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the core: hook socket, watchers, registry, and HTTP surfaces
    Serve {
        /// REST port
        #[arg(long, default_value_t = jacques_server::DEFAULT_REST_PORT)]
        port: u16,

        /// WebSocket port
        #[arg(long, default_value_t = jacques_server::DEFAULT_WS_PORT)]
        ws_port: u16,
    },

    /// Extract session catalogs from transcript logs
    Extract {
        /// Project directory to extract (defaults to all known projects)
        #[arg(long)]
        project: Option<PathBuf>,

        /// Re-extract sessions whose manifests are already current
        #[arg(long)]
        force: bool,
    },

    /// Keyword search over the archived conversations
    Search {
        query: String,

        /// Filter by project path
        #[arg(long)]
        project: Option<String>,

        /// Filter by technology (comma separated)
        #[arg(long)]
        tech: Option<String>,

        /// Maximum number of results
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List archived session manifests
    Sessions {
        /// Filter by project path
        #[arg(long)]
        project: Option<String>,
    },

    /// Archive maintenance
    Archive {
        #[command(subcommand)]
        command: ArchiveCommands,
    },
}

#[derive(Subcommand)]
enum ArchiveCommands {
    /// Extract every project and build the global archive and index
    Init,
    /// Rebuild the keyword index from the archived manifests
    Rebuild,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let paths = match JacquesPaths::resolve() {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("cannot resolve data directories: {e}");
            std::process::exit(EXIT_STARTUP_ERROR);
        }
    };

    let outcome = match cli.command {
        Commands::Serve { port, ws_port } => {
            return serve::run_serve(paths, port, ws_port);
        }
        Commands::Extract { project, force } => run_extract(&paths, project, force),
        Commands::Search {
            query,
            project,
            tech,
            limit,
            json,
        } => run_search(&paths, &query, project, tech, limit, json),
        Commands::Sessions { project } => run_sessions(&paths, project),
        Commands::Archive { command } => match command {
            ArchiveCommands::Init => run_archive_init(&paths),
            ArchiveCommands::Rebuild => run_archive_rebuild(&paths),
        },
    };

    if let Err(e) = outcome {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_STARTUP_ERROR);
    }
}

fn run_extract(
    paths: &JacquesPaths,
    project: Option<PathBuf>,
    force: bool,
) -> anyhow::Result<()> {
    let extractor = jacques_archive::Extractor::new(paths);
    let options = jacques_archive::ExtractOptions { force };
    let cancel = AtomicBool::new(false);

    let report = match project {
        Some(project) => extractor.extract_project(&project, &options, &cancel)?,
        None => extractor.extract_all(&options, &cancel)?,
    };

    println!(
        "extracted {} session(s), skipped {}, {} error(s)",
        report.extracted.len(),
        report.skipped.len(),
        report.errors.len()
    );
    for error in &report.errors {
        eprintln!("  {}: {}", error.session_id, error.message);
    }
    Ok(())
}

fn run_search(
    paths: &JacquesPaths,
    query: &str,
    project: Option<String>,
    tech: Option<String>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let index = jacques_index::SearchIndex::load(&paths.search_index_file())?;
    let hits = index.search(query);

    let filters = jacques_index::SearchFilters {
        project_id: project,
        technologies: tech
            .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default(),
        limit: Some(limit),
        ..Default::default()
    };
    let page = jacques_index::filter_hits(hits, &filters, |id| {
        jacques_server::queries::load_archived_manifest(paths, id).ok()
    });

    if json {
        let rows: Vec<serde_json::Value> = page
            .iter()
            .map(|hit| serde_json::json!({"manifestId": hit.manifest_id, "score": hit.score}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if page.is_empty() {
        println!("no results for '{query}'");
        return Ok(());
    }
    for hit in page {
        let title = jacques_server::queries::load_archived_manifest(paths, &hit.manifest_id)
            .ok()
            .and_then(|m| m.title)
            .unwrap_or_else(|| "(untitled)".to_string());
        println!("{:>6.2}  {}  {}", hit.score, hit.manifest_id, title);
    }
    Ok(())
}

fn run_sessions(paths: &JacquesPaths, project: Option<String>) -> anyhow::Result<()> {
    let manifests =
        jacques_server::queries::list_archived_manifests(paths, project.as_deref())?;
    if manifests.is_empty() {
        println!("no archived sessions");
        return Ok(());
    }
    for manifest in manifests {
        println!(
            "{}  {}  {} message(s)  {}",
            manifest.session_id,
            manifest
                .ended_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "        ".to_string()),
            manifest.message_count,
            manifest.title.as_deref().unwrap_or("(untitled)")
        );
    }
    Ok(())
}

fn run_archive_init(paths: &JacquesPaths) -> anyhow::Result<()> {
    let cancel = AtomicBool::new(false);
    let summary = jacques_runtime::initialize_archive(
        paths,
        &mut |p| {
            if p.total > 0 {
                println!("[{}] {}/{}", p.phase, p.completed, p.total);
            }
        },
        &cancel,
    )?;
    println!(
        "archived {} manifest(s) across {} project(s), {} keyword(s)",
        summary.manifests, summary.projects, summary.keywords
    );
    Ok(())
}

fn run_archive_rebuild(paths: &JacquesPaths) -> anyhow::Result<()> {
    let summary = jacques_runtime::rebuild_index(paths, &mut |_| {})?;
    println!(
        "rebuilt index over {} manifest(s), {} keyword(s)",
        summary.manifests, summary.keywords
    );
    Ok(())
}

/// Map a startup error to the documented exit code.
pub(crate) fn exit_code_for(kind: ErrorKind, socket_phase: bool) -> i32 {
    match kind {
        ErrorKind::Conflict if socket_phase => EXIT_SOCKET_UNCLEANABLE,
        ErrorKind::Conflict => EXIT_PORT_IN_USE,
        _ => EXIT_STARTUP_ERROR,
    }
}
