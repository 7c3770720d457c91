use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};

use crate::{
    dashboard,
    db::Database,
    dwell::{AccrualPolicy, DwellAccumulator, LoopConfig, SessionController},
    metrics::MetricsCollector,
    settings::{MonitorSettings, SettingsStore, DEFAULT_SETTINGS_FILE},
    vision::{
        annotate::FrameAnnotator, BlankSource, FrameSource, ImageSequenceSource, IouTracker,
        Perception, ReplayDetector,
    },
    zones::ZoneDefinition,
};

#[derive(Parser, Debug)]
#[command(name = "zonewatch", about = "Track per-person dwell time inside camera zones")]
pub struct Cli {
    /// Settings file (created by `init-config`; defaults apply when absent)
    #[arg(long, short, default_value = DEFAULT_SETTINGS_FILE)]
    pub config: PathBuf,

    /// Override the database path from the settings file
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a session; stops on Ctrl-C, a limit, or end of input, then saves
    Run(RunArgs),
    /// Regenerate the HTML dashboard and print the same data
    Dashboard(DashboardArgs),
    /// Print stored totals
    Report,
    /// Write the default settings file
    InitConfig {
        #[arg(long)]
        force: bool,
    },
    /// Inspect or edit zones in the settings file
    #[command(subcommand)]
    Zone(ZoneCommand),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory of frames to play back; blank frames are used when omitted
    #[arg(long, value_name = "DIR")]
    pub frames: Option<PathBuf>,

    /// Recorded detections, one JSON object per frame
    #[arg(long, value_name = "PATH")]
    pub detections: PathBuf,

    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    pub quantum_ms: Option<u64>,

    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    #[arg(long)]
    pub max_samples: Option<u64>,

    #[arg(long)]
    pub duration_secs: Option<u64>,

    /// Write frames with zones and tracks drawn on them
    #[arg(long, value_name = "DIR")]
    pub annotate_dir: Option<PathBuf>,

    /// Print the session report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DashboardArgs {
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Skip the terminal table
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum ZoneCommand {
    List,
    AddRect {
        name: String,
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
    },
    /// Vertices as `x,y` pairs, e.g. `0,0 50,0 25,40`
    AddPolygon {
        name: String,
        #[arg(required = true, num_args = 3.., value_parser = parse_point)]
        points: Vec<(i64, i64)>,
    },
    Remove {
        name: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    Quantized,
    Elapsed,
}

impl From<PolicyArg> for AccrualPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Quantized => AccrualPolicy::Quantized,
            PolicyArg::Elapsed => AccrualPolicy::Elapsed,
        }
    }
}

fn parse_point(raw: &str) -> Result<(i64, i64), String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{raw}'"))?;
    let x = x.trim().parse().map_err(|_| format!("bad x in '{raw}'"))?;
    let y = y.trim().parse().map_err(|_| format!("bad y in '{raw}'"))?;
    Ok((x, y))
}

/// Tally cadence: every sample in debug mode, every 10th otherwise.
fn tally_every() -> u64 {
    let debug_mode = std::env::var("ZONEWATCH_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if debug_mode {
        1
    } else {
        10
    }
}

fn effective_settings(store: &SettingsStore, database: &Option<PathBuf>) -> MonitorSettings {
    let mut settings = store.current();
    if let Some(path) = database {
        settings.database_path = path.clone();
    }
    settings
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let store = SettingsStore::new(cli.config.clone())?;

    match cli.command {
        Command::Run(args) => {
            let settings = effective_settings(&store, &cli.database);
            run_session(settings, args).await
        }
        Command::Dashboard(args) => {
            let settings = effective_settings(&store, &cli.database);
            show_dashboard(&settings, args).await
        }
        Command::Report => {
            let settings = effective_settings(&store, &cli.database);
            let db = Database::new(settings.database_path.clone())?;
            let records = db.get_productivity_records().await?;
            print!("{}", dashboard::render_text(&records));
            Ok(())
        }
        Command::InitConfig { force } => {
            if store.path().exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    store.path().display()
                );
            }
            store.save()?;
            println!("Wrote settings to {}", store.path().display());
            Ok(())
        }
        Command::Zone(command) => edit_zones(&store, command),
    }
}

async fn run_session(mut settings: MonitorSettings, args: RunArgs) -> Result<()> {
    if let Some(ms) = args.interval_ms {
        settings.sample_interval_ms = ms;
    }
    if let Some(ms) = args.quantum_ms {
        settings.accrual_quantum_ms = ms;
    }
    if let Some(policy) = args.policy {
        settings.accrual_policy = policy.into();
    }
    settings.validate()?;

    let zones = settings.zone_set()?;
    let db = Database::new(settings.database_path.clone())?;

    let source: Box<dyn FrameSource + Send> = match &args.frames {
        Some(dir) => {
            let source = ImageSequenceSource::open(dir)?;
            info!("Playing back {} frames from {}", source.len(), dir.display());
            Box::new(source)
        }
        None => Box::new(BlankSource::new(
            settings.blank_frame_size.width,
            settings.blank_frame_size.height,
        )),
    };
    let detector = ReplayDetector::load(&args.detections)?;
    info!(
        "Loaded detections for {} frames from {}",
        detector.frame_count(),
        args.detections.display()
    );

    let perception = Perception::new(
        source,
        Box::new(detector),
        Box::new(IouTracker::new(settings.tracker)),
    )
    .with_classes(settings.target_classes.clone())
    .with_min_confidence(settings.min_confidence);

    let annotator = args
        .annotate_dir
        .as_deref()
        .map(FrameAnnotator::new)
        .transpose()?;

    let accumulator = DwellAccumulator::new(settings.accrual_policy, settings.accrual_quantum());
    let config = LoopConfig {
        sample_interval: settings.sample_interval(),
        tally_every: tally_every(),
        max_samples: args.max_samples,
    };

    let mut controller = SessionController::new(db.clone(), MetricsCollector::new());
    let session_id = controller
        .start(perception, zones, accumulator, annotator, config)
        .await?;
    println!("Session {session_id} running; press Ctrl-C to stop");

    let duration = args.duration_secs.map(Duration::from_secs);
    let report = controller
        .run_until(async move {
            match duration {
                Some(limit) => {
                    tokio::select! {
                        _ = wait_for_ctrl_c() => {}
                        _ = tokio::time::sleep(limit) => info!("Session duration reached"),
                    }
                }
                None => wait_for_ctrl_c().await,
            }
        })
        .await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        );
    } else {
        for (id, seconds) in &report.totals {
            println!("Person {id}: {}", dashboard::format_hms(*seconds));
        }
        println!(
            "Data saved to {} ({} identities, {} samples)",
            db.path().display(),
            report.rows_written,
            report.samples
        );
    }
    Ok(())
}

async fn wait_for_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Ctrl-C handler unavailable ({err}); session ends with its input");
        std::future::pending::<()>().await;
    }
}

async fn show_dashboard(settings: &MonitorSettings, args: DashboardArgs) -> Result<()> {
    let db = Database::new(settings.database_path.clone())?;
    let records = db.get_productivity_records().await?;

    let html = dashboard::render_html(&records, &Local::now().naive_local())?;
    let path = args.output.unwrap_or_else(|| settings.dashboard_path.clone());
    dashboard::write_dashboard(&path, &html)?;
    println!("Dashboard saved as {}", path.display());

    if !args.quiet {
        print!("{}", dashboard::render_text(&records));
    }
    Ok(())
}

fn edit_zones(store: &SettingsStore, command: ZoneCommand) -> Result<()> {
    let mut settings = store.current();
    match command {
        ZoneCommand::List => {
            if settings.zones.is_empty() {
                println!("No zones configured");
            }
            for zone in &settings.zones {
                println!("{}", serde_json::to_string(zone)?);
            }
            return Ok(());
        }
        ZoneCommand::AddRect { name, x1, y1, x2, y2 } => {
            settings.zones.retain(|zone| zone.name != name);
            settings.zones.push(ZoneDefinition::rect(name, x1, y1, x2, y2));
        }
        ZoneCommand::AddPolygon { name, points } => {
            settings.zones.retain(|zone| zone.name != name);
            settings.zones.push(ZoneDefinition::polygon(name, points));
        }
        ZoneCommand::Remove { name } => {
            let before = settings.zones.len();
            settings.zones.retain(|zone| zone.name != name);
            if settings.zones.len() == before {
                bail!("no zone named '{name}'");
            }
        }
    }
    store.update(settings)?;
    println!("Updated zones in {}", store.path().display());
    Ok(())
}
