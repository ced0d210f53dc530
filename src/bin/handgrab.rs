//! handgrab CLI - replay and tune the gesture interaction core offline
//!
//! Commands:
//! - replay: Run recorded detector frames against a scene, emitting per-frame snapshots
//! - calibrate: Derive a click calibration from recorded frames
//! - settings: Show, change or reset the persisted settings
//! - validate: Validate detector frame records

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use glam::DVec3;
use handgrab::pipeline::{InteractionProcessor, ReplayStep};
use handgrab::scene::{BoxScene, ObjectSpec, SceneDescription};
use handgrab::schema::{FrameAdapter, RawFrame, FRAME_SCHEMA_VERSION};
use handgrab::settings::{keys, reset_click_calibration, set_setting, JsonFileStore, Settings};
use handgrab::{HandFrame, InteractionError, VERSION};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// handgrab - gesture interpretation core for hand-tracked 3D manipulation
#[derive(Parser)]
#[command(name = "handgrab")]
#[command(version = VERSION)]
#[command(about = "Replay and calibrate hand-gesture interaction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay detector frames against a scene
    Replay {
        /// Frame records (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Scene description JSON (defaults to one unit box at the origin)
        #[arg(long)]
        scene: Option<PathBuf>,

        /// Settings file to read
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Render ticks between consecutive frames
        #[arg(long, default_value = "2")]
        ticks_per_frame: u32,

        /// Emit gaze rays
        #[arg(long)]
        gaze: bool,
    },

    /// Derive a click calibration from frames of the user holding the gesture
    Calibrate {
        /// Frame records (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Settings file to read and update
        #[arg(long)]
        settings: PathBuf,

        /// Print the result without saving it
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect or change persisted settings
    Settings {
        /// Settings file
        #[arg(long)]
        file: PathBuf,

        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Validate detector frame records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the effective settings
    Show,
    /// Set one key (maxHands, clickMode, fingerSettings, primaryHandPreference, clickCalibration)
    Set { key: String, value: String },
    /// Reset the click calibration, or everything with --all
    Reset {
        #[arg(long)]
        all: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one frame per line)
    Ndjson,
    /// JSON array of frames
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one replay step per line)
    Ndjson,
    /// JSON array of replay steps
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), HandgrabCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            scene,
            settings,
            ticks_per_frame,
            gaze,
        } => cmd_replay(
            &input,
            &output,
            input_format,
            output_format,
            scene.as_deref(),
            settings.as_deref(),
            ticks_per_frame,
            gaze,
        ),

        Commands::Calibrate {
            input,
            input_format,
            settings,
            dry_run,
        } => cmd_calibrate(&input, input_format, &settings, dry_run),

        Commands::Settings { file, action } => cmd_settings(&file, action),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),
    }
}

fn read_input(input: &Path) -> Result<String, HandgrabCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            warn!("reading frames from an interactive terminal, end input with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_records(data: &str, format: &InputFormat) -> Result<Vec<RawFrame>, HandgrabCliError> {
    let records = match format {
        InputFormat::Ndjson => FrameAdapter::parse_ndjson(data)?,
        InputFormat::Json => FrameAdapter::parse_array(data)?,
    };
    Ok(records)
}

fn load_frames(input: &Path, format: &InputFormat) -> Result<Vec<HandFrame>, HandgrabCliError> {
    let records = parse_records(&read_input(input)?, format)?;
    if records.is_empty() {
        return Err(HandgrabCliError::NoFrames);
    }
    Ok(FrameAdapter::new().to_hand_frames(&records)?)
}

fn default_scene() -> SceneDescription {
    SceneDescription {
        camera: Default::default(),
        objects: vec![ObjectSpec {
            position: DVec3::ZERO,
            size: DVec3::ONE,
            physics: true,
        }],
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    scene: Option<&Path>,
    settings: Option<&Path>,
    ticks_per_frame: u32,
    gaze: bool,
) -> Result<(), HandgrabCliError> {
    let frames = load_frames(input, &input_format)?;

    let description = match scene {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => default_scene(),
    };
    let mut scene = BoxScene::from_description(&description);

    let settings = settings
        .map(|path| Settings::load(&JsonFileStore::open(path)))
        .unwrap_or_default();

    let mut processor = InteractionProcessor::new(settings);
    processor.set_gaze_enabled(gaze);
    let steps = processor.replay(&frames, &mut scene, ticks_per_frame);
    info!(frames = frames.len(), objects = scene.len(), "replay finished");

    let formatted = format_output(&steps, &output_format)?;
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(formatted.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, formatted)?;
    }
    Ok(())
}

fn format_output(steps: &[ReplayStep], format: &OutputFormat) -> Result<String, HandgrabCliError> {
    let formatted = match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for step in steps {
                out.push_str(&serde_json::to_string(step)?);
                out.push('\n');
            }
            out
        }
        OutputFormat::Json => serde_json::to_string(steps)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(steps)?,
    };
    Ok(formatted)
}

fn cmd_calibrate(
    input: &Path,
    input_format: InputFormat,
    settings_path: &Path,
    dry_run: bool,
) -> Result<(), HandgrabCliError> {
    let frames = load_frames(input, &input_format)?;
    let mut store = JsonFileStore::open(settings_path);
    let mut processor = InteractionProcessor::from_store(&store);

    processor.start_calibration();
    for frame in &frames {
        processor.process_frame(frame);
        if processor.calibration().is_some_and(|s| s.is_ready()) {
            break;
        }
    }

    let samples = processor.calibration().map(|s| s.sample_count()).unwrap_or(0);
    if samples == 0 {
        processor.cancel_calibration();
        return Err(HandgrabCliError::NoSamples);
    }

    let now = frames.last().map(|f| f.timestamp).unwrap_or_else(Utc::now);
    let Some(calibration) = processor.finish_calibration(now) else {
        return Err(HandgrabCliError::NoSamples);
    };

    if !dry_run {
        handgrab::settings::save_click_calibration(&mut store, &calibration)?;
        info!(path = %settings_path.display(), samples, "calibration saved");
    }
    println!("{}", serde_json::to_string_pretty(&calibration)?);
    Ok(())
}

fn cmd_settings(path: &Path, action: SettingsAction) -> Result<(), HandgrabCliError> {
    let mut store = JsonFileStore::open(path);

    match action {
        SettingsAction::Show => {}
        SettingsAction::Set { key, value } => set_setting(&mut store, &key, &value)?,
        SettingsAction::Reset { all } => {
            if all {
                Settings::default().save(&mut store)?;
            } else {
                reset_click_calibration(&mut store, Utc::now())?;
            }
        }
    }

    let report = SettingsReport {
        path: path.display().to_string(),
        keys: keys::ALL.to_vec(),
        settings: Settings::load(&store),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), HandgrabCliError> {
    let records = parse_records(&read_input(input)?, &input_format)?;
    let results = FrameAdapter::validate_frames(&records);

    let report = ValidationReport {
        schema_version: FRAME_SCHEMA_VERSION,
        total_frames: records.len(),
        valid_frames: records.len() - results.len(),
        invalid_frames: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                timestamp: r.timestamp.to_rfc3339(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report ({})", report.schema_version);
        println!("=================");
        println!("Total frames:   {}", report.total_frames);
        println!("Valid frames:   {}", report.valid_frames);
        println!("Invalid frames: {}", report.invalid_frames);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Frame {} at {}: {}", err.index, err.timestamp, err.error);
            }
        }
    }

    if report.invalid_frames > 0 {
        Err(HandgrabCliError::ValidationFailed(report.invalid_frames))
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum HandgrabCliError {
    Io(io::Error),
    Core(InteractionError),
    Json(serde_json::Error),
    NoFrames,
    NoSamples,
    ValidationFailed(usize),
}

impl From<io::Error> for HandgrabCliError {
    fn from(e: io::Error) -> Self {
        HandgrabCliError::Io(e)
    }
}

impl From<InteractionError> for HandgrabCliError {
    fn from(e: InteractionError) -> Self {
        HandgrabCliError::Core(e)
    }
}

impl From<serde_json::Error> for HandgrabCliError {
    fn from(e: serde_json::Error) -> Self {
        HandgrabCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HandgrabCliError> for CliError {
    fn from(e: HandgrabCliError) -> Self {
        match e {
            HandgrabCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HandgrabCliError::Core(InteractionError::UnknownSetting(key)) => CliError {
                code: "UNKNOWN_SETTING".to_string(),
                message: format!("Unknown settings key: {key}"),
                hint: Some(format!("Known keys: {}", keys::ALL.join(", "))),
            },
            HandgrabCliError::Core(e @ InteractionError::InvalidRecord(_)) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'handgrab validate' for details".to_string()),
            },
            HandgrabCliError::Core(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches the {FRAME_SCHEMA_VERSION} schema")),
            },
            HandgrabCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HandgrabCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            HandgrabCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No calibration samples were collected".to_string(),
                hint: Some("Hold the click gesture steadily for at least a second".to_string()),
            },
            HandgrabCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} frames failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    schema_version: &'static str,
    total_frames: usize,
    valid_frames: usize,
    invalid_frames: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    timestamp: String,
    error: String,
}

#[derive(serde::Serialize)]
struct SettingsReport {
    path: String,
    keys: Vec<&'static str>,
    settings: Settings,
}
