use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use futures::StreamExt;
use puretone_audiometry::calibration::{
    CalibrationMapping, CalibrationStore, DeviceInfo, JsonFileCalibrationStore,
};
use puretone_audiometry::engine::{
    AudiometryManager, Clock, StubEmitter, SystemClock, TestEvent, TestOrchestrator,
};
use puretone_audiometry::storage::{JsonDirectoryResultStore, ResultStore};
use puretone_audiometry::{AppConfig, Ear, HearingClassifier, HearingLevel, SessionReport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Parser, Debug)]
#[command(
    name = "audiometry_sim",
    about = "Run a full pure-tone test against a simulated listener"
)]
struct Cli {
    /// True hearing threshold of the right ear (dB HL)
    #[arg(long, default_value_t = 20, allow_hyphen_values = true)]
    right_db: i32,
    /// True hearing threshold of the left ear (dB HL)
    #[arg(long, default_value_t = 20, allow_hyphen_values = true)]
    left_db: i32,
    /// Probability of answering "heard" to an inaudible tone
    #[arg(long, default_value_t = 0.0)]
    false_positive_rate: f64,
    /// Probability of not answering at all, letting the response window close
    #[arg(long, default_value_t = 0.0)]
    silence_rate: f64,
    /// Number of initial tones the stub emitter refuses to play
    #[arg(long, default_value_t = 0)]
    emitter_failures: u32,
    #[arg(long, value_enum, default_value_t = EarArg::Right)]
    starting_ear: EarArg,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// JSON configuration file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the response window (ms) to keep silent tones quick
    #[arg(long)]
    response_timeout_ms: Option<u64>,
    /// Override the pause before each tone after the first (ms)
    #[arg(long)]
    inter_tone_delay_ms: Option<u64>,
    /// Calibration profile JSON to map levels with
    #[arg(long)]
    calibration: Option<PathBuf>,
    /// Device identifier used to judge the calibration profile
    #[arg(long, default_value = "simulator")]
    device: String,
    /// Save the report into this directory instead of printing it
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EarArg {
    Left,
    Right,
}

impl From<EarArg> for Ear {
    fn from(arg: EarArg) -> Self {
        match arg {
            EarArg::Left => Ear::Left,
            EarArg::Right => Ear::Right,
        }
    }
}

/// Listener who hears every tone at or above their true threshold
struct SimulatedListener {
    right_db: i32,
    left_db: i32,
    false_positive_rate: f64,
    silence_rate: f64,
    rng: StdRng,
}

impl SimulatedListener {
    /// `None` means the listener stays silent
    fn react(&mut self, ear: Ear, level: HearingLevel) -> Option<bool> {
        if self.rng.gen_bool(self.silence_rate) {
            return None;
        }
        let threshold = match ear {
            Ear::Right => self.right_db,
            Ear::Left => self.left_db,
        };
        Some(level.db() >= threshold || self.rng.gen_bool(self.false_positive_rate))
    }
}

fn main() -> ExitCode {
    puretone_audiometry::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    ensure!(
        (0.0..=1.0).contains(&cli.false_positive_rate),
        "--false-positive-rate must be within [0, 1]"
    );
    ensure!(
        (0.0..=1.0).contains(&cli.silence_rate),
        "--silence-rate must be within [0, 1]"
    );

    let mut config = cli
        .config
        .as_ref()
        .map(AppConfig::load_from_file)
        .unwrap_or_default();
    if let Some(timeout) = cli.response_timeout_ms {
        config.session.response_timeout_ms = timeout;
    }
    if let Some(delay) = cli.inter_tone_delay_ms {
        config.session.inter_tone_delay_ms = delay;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mapping = match &cli.calibration {
        Some(path) => {
            let store = JsonFileCalibrationStore::new(path, DeviceInfo::new(cli.device.as_str()));
            let status = store
                .status(clock.now_ms(), config.calibration.max_age_ms())
                .with_context(|| format!("reading calibration {}", path.display()))?;
            eprintln!("Calibration status: {status:?}");
            CalibrationMapping::from_store(&store, &config.calibration, clock.now_ms())?
        }
        None => CalibrationMapping::uncalibrated(),
    };

    let emitter = Arc::new(StubEmitter::new());
    emitter.fail_next(cli.emitter_failures);
    let orchestrator = TestOrchestrator::new(emitter, mapping, config, clock);
    let result_store = cli
        .output_dir
        .as_ref()
        .map(|dir| Arc::new(JsonDirectoryResultStore::new(dir)) as Arc<dyn ResultStore>);
    let manager =
        AudiometryManager::with_services(orchestrator, HearingClassifier::new(), result_store);

    let listener = SimulatedListener {
        right_db: cli.right_db,
        left_db: cli.left_db,
        false_positive_rate: cli.false_positive_rate,
        silence_rate: cli.silence_rate,
        rng: StdRng::seed_from_u64(cli.seed),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let report = runtime.block_on(simulate(&manager, listener, cli.starting_ear.into()))?;

    if cli.output_dir.is_some() {
        let saved = manager.save_results()?;
        eprintln!("Saved session {}", saved.session_id());
    } else {
        println!("{}", report.to_json()?);
    }
    Ok(ExitCode::from(0))
}

async fn simulate(
    manager: &AudiometryManager,
    mut listener: SimulatedListener,
    starting_ear: Ear,
) -> Result<SessionReport> {
    let mut events = Box::pin(manager.event_stream());

    // A refused first tone is reported on the event stream as well
    let _ = manager.start_test(starting_ear);

    while let Some(event) = events.next().await {
        match event {
            TestEvent::ToneStarted { ear, level, .. } => {
                if let Some(heard) = listener.react(ear, level) {
                    manager.respond(heard)?;
                }
            }
            TestEvent::EmitterFault { code, message, .. } => {
                tracing::warn!("Emitter fault (code {code}): {message}; retrying");
                let _ = manager.retry();
            }
            TestEvent::ThresholdFound {
                ear,
                frequency,
                threshold,
            } => {
                tracing::info!(
                    "{} ear {:>5} Hz: {:>4} dB HL ({:?})",
                    ear,
                    frequency.hz(),
                    threshold.db(),
                    threshold.basis
                );
            }
            TestEvent::SessionCompleted { .. } => break,
            _ => {}
        }
    }

    Ok(manager.report()?)
}
