use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use typetrace::capture::{discover_devices, FfmpegPipeline, NokhwaBackend, DEFAULT_PROBE_LIMIT};
use typetrace::capture::Region;
use typetrace::error::CaptureError;
use typetrace::session::{
    list_records, JsonQuestionBank, Question, QuestionSource, RegionProvider, SessionConfig,
    SessionOrchestrator, SessionRecord, WebcamMode,
};
use typetrace::Config;

#[derive(Parser)]
#[command(name = "typetrace", about = "Multi-stream typing session recorder")]
struct Cli {
    /// Path to a config file (without extension), e.g. config/typetrace
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe for usable webcam devices
    Devices,
    /// Record a fixed-duration session over a screen region
    Record {
        /// Capture rectangle as "left,top,width,height"
        #[arg(long)]
        region: String,
        /// How long to record, in seconds
        #[arg(long, default_value_t = 10)]
        duration_secs: u64,
        /// Prompt text stored with the session; a random one is drawn from
        /// the configured question bank when omitted
        #[arg(long)]
        question: Option<String>,
        /// Also record the webcam if one is connected
        #[arg(long)]
        webcam: bool,
        /// Log keystrokes system-wide instead of per-widget
        #[arg(long)]
        global_hook: bool,
    },
    /// Print a summary of a saved session record, or list a directory
    Inspect { path: PathBuf },
}

/// CLI sessions record one fixed rectangle; there is no preview surface to
/// mirror.
struct FixedRegion(Region);

impl RegionProvider for FixedRegion {
    fn input_box_region(&self) -> Result<Region, CaptureError> {
        Ok(self.0)
    }

    fn webcam_display_region(&self) -> Result<Region, CaptureError> {
        Err(CaptureError::RegionUnavailable(
            "no preview surface in CLI mode".into(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::defaults(),
    };

    match cli.command {
        Command::Devices => devices(),
        Command::Record {
            region,
            duration_secs,
            question,
            webcam,
            global_hook,
        } => record(&cfg, &region, duration_secs, question, webcam, global_hook).await,
        Command::Inspect { path } => inspect(&path),
    }
}

fn devices() -> Result<()> {
    let found = discover_devices(&NokhwaBackend, DEFAULT_PROBE_LIMIT)
        .context("probing webcam devices")?;
    if found.is_empty() {
        println!("No usable webcam devices found");
    }
    for d in found {
        println!("device {}: {}x{} @ {}fps", d.index, d.width, d.height, d.fps);
    }
    Ok(())
}

async fn record(
    cfg: &Config,
    region: &str,
    duration_secs: u64,
    question: Option<String>,
    webcam: bool,
    global_hook: bool,
) -> Result<()> {
    let region: Region = region.parse().context("parsing --region")?;

    let session_config = SessionConfig {
        output_dir: PathBuf::from(&cfg.storage.data_path),
        screen_fps: cfg.recording.screen_fps,
        webcam_fps: cfg.recording.webcam_fps,
        webcam_mode: WebcamMode::Direct,
        preroll: Duration::from_millis(cfg.recording.preroll_ms),
        max_consecutive_failures: cfg.recording.max_consecutive_failures,
    };

    let mut orchestrator = SessionOrchestrator::new(
        session_config,
        Box::new(FfmpegPipeline),
        Box::new(FixedRegion(region)),
    );

    if webcam {
        let mut manager = typetrace::WebcamManager::new(Box::new(NokhwaBackend));
        match manager.connect(0).await {
            Ok(info) => {
                info!("Webcam connected: {}x{} @ {}fps", info.width, info.height, info.fps);
                orchestrator.attach_webcam(manager);
            }
            Err(e) => warn!("Webcam unavailable, recording screen only: {e}"),
        }
    }

    if global_hook {
        // The CLI has no input widget, so the hook's content probe has
        // nothing to report.
        let hook = typetrace::GlobalHookSource::new(
            orchestrator.log(),
            std::sync::Arc::new(String::new),
        );
        orchestrator.switch_keystroke_source(Box::new(hook)).await?;
    }

    let question = match question {
        Some(content) => Question {
            content,
            answer: None,
            qtype: None,
            language: None,
            difficulty: None,
        },
        None => {
            let bank = JsonQuestionBank::load(&cfg.questions.bank_path)
                .with_context(|| format!("loading question bank {}", cfg.questions.bank_path))?;
            bank.get_random_question(None)
                .context("question bank is empty")?
        }
    };

    orchestrator.arm(question)?;

    let _events = orchestrator.start_collecting().await?;
    info!("Recording for {duration_secs}s...");
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;

    let outcome = orchestrator.submit("").await?;
    println!("Saved {}", outcome.record_path.display());
    println!(
        "  screen: {} frames over {:.1}s",
        outcome.screen_report.frame_count, outcome.screen_report.duration_secs
    );
    if let Some(report) = &outcome.webcam_report {
        println!("  webcam: {} frames", report.frame_count);
    }
    for note in &outcome.diagnostics {
        println!("  note: {note}");
    }
    Ok(())
}

fn inspect(path: &PathBuf) -> Result<()> {
    if path.is_dir() {
        for record_path in list_records(path)? {
            println!("{}", record_path.display());
        }
        return Ok(());
    }

    let record = SessionRecord::load(path)?;
    println!("question: {}", record.question.content);
    println!("user_input: {:?}", record.user_input);
    println!(
        "events: {} input, {} raw",
        record.keystrokes.len(),
        record.raw_keystrokes.len()
    );
    println!("recording_start_time: {:.3}", record.recording_start_time);
    if let Some(started) = chrono::DateTime::from_timestamp(record.recording_start_time as i64, 0) {
        println!("recorded_at: {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("screen_video: {}", record.screen_video_path);
    match &record.webcam_video_path {
        Some(p) => println!("webcam_video: {p}"),
        None => println!("webcam_video: (none)"),
    }
    Ok(())
}
