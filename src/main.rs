//! sqmpatch - command-line front end for the mission patcher.
//!
//! # Execution Flow
//!
//! 1. Parse arguments and initialize logging → `logs/sqmpatch.<date>`
//! 2. Load `Patcher.yaml` from the config directory (`Patcher Data/` by
//!    default) with `SQMPATCH_*` environment overrides, then apply CLI
//!    overrides
//! 3. Create the tokio runtime
//! 4. Load the roster once, then patch every requested mission concurrently
//! 5. Print one summary per mission; exit with failure if any run failed

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use sqmpatch::logging::{LoggingOptions, setup_logging};
use sqmpatch::models::MissionPatchingResult;
use sqmpatch::services::YamlHierarchyLoader;
use sqmpatch::{APP_NAME, ConfigManager, MissionPatchingService, PatchError, VERSION};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Fill Arma mission slots from the unit roster",
    long_about = None
)]
struct Cli {
    /// Directory holding Patcher.yaml.
    #[arg(long, default_value = "Patcher Data")]
    config_dir: Utf8PathBuf,

    /// Overrides `missions_dir` from the config file.
    #[arg(long)]
    missions_dir: Option<Utf8PathBuf>,

    /// Roster YAML file; overrides `roster_file` from the config file.
    #[arg(long)]
    roster: Option<Utf8PathBuf>,

    /// Directory for log files.
    #[arg(long, default_value = "logs")]
    log_dir: Utf8PathBuf,

    /// Write the log file as JSON lines.
    #[arg(long)]
    json_log: bool,

    /// Log at debug level and echo the log to the console.
    #[arg(long)]
    debug: bool,

    /// Mission names, with or without the `.world` suffix.
    #[arg(required = true)]
    missions: Vec<String>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut logging = LoggingOptions::new(&cli.log_dir);
    logging.debug_mode = cli.debug;
    logging.console_output = cli.debug;
    logging.json = cli.json_log;
    let _guard = setup_logging(&logging)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut settings = config_manager.load_config()?.patcher;
    if let Some(missions_dir) = cli.missions_dir {
        settings.missions_dir = missions_dir;
    }
    if let Some(roster) = cli.roster {
        settings.roster_file = roster;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("sqmpatch-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    // Read the roster once up front; patch tasks share the snapshot.
    let loader = YamlHierarchyLoader::new(&settings.roster_file)
        .preload()
        .with_context(|| format!("Failed to load roster: {}", settings.roster_file))?;
    let loader = Arc::new(loader);
    let service = Arc::new(MissionPatchingService::new(settings, loader));

    let outcomes = runtime.block_on(patch_all(service, cli.missions));

    let mut failed = false;
    for (mission, outcome) in &outcomes {
        match outcome {
            Ok(result) => {
                print_result(mission, result);
                failed |= !result.success;
            }
            Err(error) => {
                println!("{mission}: failed - {error}");
                failed = true;
            }
        }
    }

    tracing::info!("Finished {} missions", outcomes.len());
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Patch all missions concurrently, returning outcomes in argument order.
async fn patch_all(
    service: Arc<MissionPatchingService>,
    missions: Vec<String>,
) -> Vec<(String, Result<MissionPatchingResult, PatchError>)> {
    let mut tasks = JoinSet::new();
    for (index, mission) in missions.iter().cloned().enumerate() {
        let service = Arc::clone(&service);
        tasks.spawn(async move {
            let outcome = service.patch_mission_file(&mission).await;
            (index, outcome)
        });
    }

    let mut outcomes: Vec<Option<Result<MissionPatchingResult, PatchError>>> =
        missions.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(error) => tracing::error!("Patch task panicked: {}", error),
        }
    }

    missions
        .into_iter()
        .zip(outcomes)
        .map(|(mission, outcome)| {
            let outcome = outcome.unwrap_or_else(|| {
                Err(PatchError::Io {
                    path: mission.clone(),
                    source: std::io::Error::other("patch task did not complete"),
                })
            });
            (mission, outcome)
        })
        .collect()
}

fn print_result(mission: &str, result: &MissionPatchingResult) {
    println!("{mission}: {}", result.summary());
    for report in &result.reports {
        println!("  {report}");
    }
}
