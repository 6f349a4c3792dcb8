//! fnlearn CLI - Command-line interface for the function-learning trial engine
//!
//! Commands:
//! - plan: Build a test plan from a training set
//! - replay: Drive a session from a recorded event script
//! - simulate: Run a session with a scripted learner, locally or against a server
//! - schema: Describe the input and output formats

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use function_learning::bootstrap::{Bootstrapped, HttpServer};
use function_learning::render::RecordingRenderer;
use function_learning::session::{MemorySink, Session, SessionEvent};
use function_learning::simulate::{run_to_completion, LearnerKind, ScriptedLearner};
use function_learning::{
    Bootstrap, ExperimentConfig, ServerSink, SessionError, SessionReport, StimulusGenerator,
    TrainingSet, ENGINE_VERSION, PRODUCER_NAME,
};

/// fnlearn - Run and inspect function-learning sessions
#[derive(Parser)]
#[command(name = "fnlearn")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Function-learning trial engine", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a test plan from a training set
    Plan {
        /// Training set JSON file ({"x": [..], "y": [..]}, use - for stdin)
        #[arg(short, long)]
        training: PathBuf,

        /// Configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Largest value in base units
        #[arg(long)]
        x_max: Option<u32>,

        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Drive a session from an NDJSON event script
    Replay {
        /// Training set JSON file
        #[arg(short, long)]
        training: PathBuf,

        /// Event script, one {"kind": ...} object per line (use - for stdin)
        #[arg(short, long)]
        events: PathBuf,

        /// Configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Include the render command log in the output
        #[arg(long)]
        commands: bool,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Run a full session with a scripted learner
    Simulate {
        /// Training set JSON file
        #[arg(short, long, required_unless_present = "server")]
        training: Option<PathBuf>,

        /// Experiment server base URL; bootstraps from it and posts the result back
        #[arg(long, conflicts_with = "training")]
        server: Option<String>,

        /// Learner behaviour
        #[arg(long, default_value = "perfect")]
        learner: LearnerArg,

        /// Noise amplitude in base units for the noisy learner
        #[arg(long, default_value = "3.0")]
        noise: f64,

        /// Configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed for sampling and learner noise
        #[arg(long)]
        seed: Option<u64>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Describe a data format
    Schema {
        #[arg(value_enum)]
        schema_type: SchemaType,
    },
}

#[derive(Clone, ValueEnum)]
enum LearnerArg {
    /// Exact on training, nearest-neighbour on testing
    Perfect,
    /// Misses each first training response, then corrects
    FirstTryMiss,
    /// Uniform noise on every response
    Noisy,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Training set input
    Training,
    /// Session event script
    Events,
    /// Result report output
    Result,
    /// Configuration file
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

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

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CliFailure> {
    match cli.command {
        Commands::Plan {
            training,
            config,
            x_max,
            seed,
            pretty,
        } => cmd_plan(&training, config.as_deref(), x_max, seed, pretty),

        Commands::Replay {
            training,
            events,
            config,
            seed,
            commands,
            output,
        } => cmd_replay(&training, &events, config.as_deref(), seed, commands, &output),

        Commands::Simulate {
            training,
            server,
            learner,
            noise,
            config,
            seed,
            output,
        } => {
            let config = load_config(config.as_deref(), seed)?;
            let kind = learner_kind(learner, noise);
            match (server, training) {
                (Some(url), _) => cmd_simulate_remote(&url, kind, config, &output),
                (None, Some(training)) => cmd_simulate(&training, kind, config, &output),
                (None, None) => Err(CliFailure::NoTraining),
            }
        }

        Commands::Schema { schema_type } => {
            println!("{}", schema_for(schema_type));
            Ok(())
        }
    }
}

fn cmd_plan(
    training: &Path,
    config: Option<&Path>,
    x_max: Option<u32>,
    seed: Option<u64>,
    pretty: bool,
) -> Result<(), CliFailure> {
    let mut config = load_config(config, seed)?;
    if let Some(x_max) = x_max {
        config = config.with_x_max(x_max);
        config.validate()?;
    }
    let training = load_training(training)?;
    let stimuli = StimulusGenerator::generate(training, &config)?;

    let out = serde_json::json!({ "x": stimuli.test_plan });
    if pretty {
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", serde_json::to_string(&out)?);
    }
    Ok(())
}

fn cmd_replay(
    training: &Path,
    events: &Path,
    config: Option<&Path>,
    seed: Option<u64>,
    include_commands: bool,
    output: &Path,
) -> Result<(), CliFailure> {
    let config = load_config(config, seed)?;
    let training = load_training(training)?;
    let stimuli = StimulusGenerator::generate(training, &config)?;
    let mut session =
        Session::with_stimuli(config, stimuli, RecordingRenderer::new(), MemorySink::new())?;

    let reader: Box<dyn BufRead> = if is_stdin(events) {
        if atty::is(atty::Stream::Stdin) {
            return Err(CliFailure::NoInput);
        }
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(fs::File::open(events)?))
    };

    let mut dispatched = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event: SessionEvent = serde_json::from_str(trimmed).map_err(|e| {
            CliFailure::BadEvent(format!("line {}: {}", line_no + 1, e))
        })?;
        session.dispatch(event);
        dispatched += 1;
    }

    let out = serde_json::json!({
        "producer": { "name": PRODUCER_NAME, "version": ENGINE_VERSION },
        "events": dispatched,
        "snapshot": session.snapshot(),
        "report": session.report(),
        "commands": include_commands.then(|| session.renderer().log().to_vec()),
    });
    write_output(output, &serde_json::to_string_pretty(&out)?)
}

fn learner_kind(learner: LearnerArg, noise: f64) -> LearnerKind {
    match learner {
        LearnerArg::Perfect => LearnerKind::Perfect,
        LearnerArg::FirstTryMiss => LearnerKind::FirstTryMiss,
        LearnerArg::Noisy => LearnerKind::Noisy { amplitude: noise },
    }
}

fn cmd_simulate(
    training: &Path,
    kind: LearnerKind,
    config: ExperimentConfig,
    output: &Path,
) -> Result<(), CliFailure> {
    let training = load_training(training)?;
    let stimuli = StimulusGenerator::generate(training, &config)?;

    let mut learner = ScriptedLearner::new(
        kind,
        &stimuli.training,
        config.tolerance,
        config.seed.unwrap_or_default(),
    );

    let mut session =
        Session::with_stimuli(config, stimuli, RecordingRenderer::new(), MemorySink::new())?;
    run_to_completion(&mut session, &mut learner)?;

    let report: &SessionReport = session.report().ok_or(CliFailure::Incomplete)?;
    write_output(output, &serde_json::to_string_pretty(report)?)
}

fn cmd_simulate_remote(
    url: &str,
    kind: LearnerKind,
    config: ExperimentConfig,
    output: &Path,
) -> Result<(), CliFailure> {
    let mut server = HttpServer::new(url)?;
    let Bootstrapped { agent, stimuli } = Bootstrap::new(config.clone()).run(&mut server)?;

    let mut learner = ScriptedLearner::new(
        kind,
        &stimuli.training,
        config.tolerance,
        config.seed.unwrap_or_default(),
    );
    let mut session = Session::with_stimuli(
        config,
        stimuli,
        RecordingRenderer::new(),
        ServerSink::new(&mut server, agent),
    )?;
    run_to_completion(&mut session, &mut learner)?;

    if let Some(e) = session.report_error() {
        return Err(CliFailure::Rejected(e.to_string()));
    }
    let report: &SessionReport = session.report().ok_or(CliFailure::Incomplete)?;
    write_output(output, &serde_json::to_string_pretty(report)?)
}

// Helper functions

fn is_stdin(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn read_input(path: &Path) -> Result<String, CliFailure> {
    if is_stdin(path) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn write_output(path: &Path, data: &str) -> Result<(), CliFailure> {
    if is_stdin(path) {
        println!("{data}");
    } else {
        fs::write(path, data)?;
    }
    Ok(())
}

fn load_training(path: &Path) -> Result<TrainingSet, CliFailure> {
    Ok(TrainingSet::from_json(&read_input(path)?)?)
}

fn load_config(path: Option<&Path>, seed: Option<u64>) -> Result<ExperimentConfig, CliFailure> {
    let mut config = match path {
        Some(path) => ExperimentConfig::from_json(&fs::read_to_string(path)?)?,
        None => ExperimentConfig::default(),
    };
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    config.validate()?;
    Ok(config)
}

fn schema_for(schema_type: SchemaType) -> String {
    let schema = match schema_type {
        SchemaType::Training => serde_json::json!({
            "title": "training set",
            "type": "object",
            "required": ["x", "y"],
            "properties": {
                "x": { "type": "array", "items": { "type": "number" } },
                "y": { "type": "array", "items": { "type": "number" } }
            },
            "description": "Parallel arrays of equal, non-zero length"
        }),
        SchemaType::Events => serde_json::json!({
            "title": "session event (one per line)",
            "oneOf": [
                {
                    "properties": {
                        "kind": { "const": "pointer_move" },
                        "page_y": { "type": "number" }
                    }
                },
                { "properties": { "kind": { "const": "commit" } } },
                { "properties": { "kind": { "const": "proceed" } } }
            ]
        }),
        SchemaType::Result => serde_json::json!({
            "title": "session report",
            "type": "object",
            "properties": {
                "session_id": { "type": "string", "format": "uuid" },
                "started_at": { "type": "string", "format": "date-time" },
                "completed_at": { "type": "string", "format": "date-time" },
                "training_responses": { "type": "array", "items": { "type": "number" } },
                "result": {
                    "type": "object",
                    "properties": {
                        "x": { "type": "array", "items": { "type": "number" } },
                        "y": { "type": "array", "items": { "type": "number" } }
                    }
                }
            }
        }),
        SchemaType::Config => {
            serde_json::to_value(ExperimentConfig::default()).unwrap_or_default()
        }
    };
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

// Error types

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Session(SessionError),
    Json(serde_json::Error),
    BadEvent(String),
    NoInput,
    NoTraining,
    Incomplete,
    Rejected(String),
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<SessionError> for CliFailure {
    fn from(e: SessionError) -> Self {
        CliFailure::Session(e)
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CliFailure::Session(e) if e.is_bootstrap_failure() => CliError {
                code: "BOOTSTRAP_FAILURE".to_string(),
                message: e.to_string(),
                hint: Some("Check the training set and x_max".to_string()),
            },
            CliFailure::Session(e) => CliError {
                code: "SESSION_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CliFailure::BadEvent(msg) => CliError {
                code: "BAD_EVENT".to_string(),
                message: msg,
                hint: Some("Run 'fnlearn schema events' for the event format".to_string()),
            },
            CliFailure::NoInput => CliError {
                code: "NO_INPUT".to_string(),
                message: "Refusing to read events from an interactive terminal".to_string(),
                hint: Some("Pipe an event script or pass --events <file>".to_string()),
            },
            CliFailure::NoTraining => CliError {
                code: "NO_TRAINING".to_string(),
                message: "No training source given".to_string(),
                hint: Some("Pass --training <file> or --server <url>".to_string()),
            },
            CliFailure::Rejected(msg) => CliError {
                code: "REPORT_REJECTED".to_string(),
                message: msg,
                hint: Some("The session completed; check the server logs".to_string()),
            },
            CliFailure::Incomplete => CliError {
                code: "INCOMPLETE".to_string(),
                message: "Session did not reach completion".to_string(),
                hint: None,
            },
        }
    }
}
