//! Geodrone CLI - render, play and inspect the environmental drone

use clap::{Parser, Subcommand, ValueEnum};
use geodrone::backend::{AudioBackend, CpalBackend};
use geodrone::config::EngineConfig;
use geodrone::engine::EnvironmentalAudioEngine;
use geodrone::error::{BackendResult, EngineError};
use geodrone::mapper::{MappingStrategy, ParameterMapper};
use geodrone::render::{Renderer, TelemetryScript};
use geodrone::service::EngineService;
use geodrone::snapshot::{EnvironmentalSnapshot, TelemetryUpdate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "geodrone")]
#[command(about = "Ambient drone driven by environmental telemetry", long_about = None)]
struct Cli {
    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Octave-spaced voices, one environmental factor each
    Drift,
    /// Solar-elevation fundamental with compass-colored partials
    Solar,
}

impl From<StrategyArg> for MappingStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Drift => MappingStrategy::IndependentDrift,
            StrategyArg::Solar => MappingStrategy::SolarHarmonic,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render a telemetry script (JSON) to a stereo WAV
    Render {
        /// Telemetry script; "-" reads stdin
        script: String,

        /// Output WAV file path
        output: PathBuf,

        /// Duration in seconds (default: 60.0)
        #[arg(short, long, default_value = "60.0")]
        duration: f32,

        /// Config file (default: platform config dir, else built-in)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// RNG seed for a reproducible render
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
    },

    /// Play live; telemetry updates are read as JSON lines from stdin
    Play {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop after this many seconds (default: until stdin closes)
        #[arg(short, long)]
        duration: Option<f32>,

        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
    },

    /// Print the targets a snapshot maps to, as JSON
    Map {
        #[arg(long, value_enum, default_value = "solar")]
        strategy: StrategyArg,

        #[arg(long, default_value = "8")]
        channels: usize,

        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        lat: f32,

        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        lon: f32,

        /// Meters per second
        #[arg(long, default_value = "0.0")]
        speed: f32,

        /// Degrees Celsius
        #[arg(long, default_value = "20.0", allow_hyphen_values = true)]
        temperature: f32,

        /// Percent
        #[arg(long, default_value = "50.0")]
        humidity: f32,

        /// Compass degrees
        #[arg(long, default_value = "0.0")]
        heading: f32,

        /// Fraction of the day (0.5 = noon)
        #[arg(long, default_value = "0.5")]
        time_of_day: f32,

        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Write the default configuration as TOML
    InitConfig {
        /// Target path (default: platform config dir)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Render {
            script,
            output,
            duration,
            config,
            seed,
            strategy,
        } => {
            let mut config = load_config(config.as_deref())?;
            if seed.is_some() {
                config.seed = seed;
            }
            if let Some(strategy) = strategy {
                config.strategy = strategy.into();
            }

            let script = if script == "-" {
                let mut json = String::new();
                std::io::Read::read_to_string(&mut std::io::stdin(), &mut json)?;
                TelemetryScript::from_json_str(&json)?
            } else {
                TelemetryScript::load(Path::new(&script))?
            };

            println!("🎵 Rendering {:.1}s to {}", duration, output.display());
            let stats = Renderer::new(config).render_to_file(&script, duration, &output)?;
            stats.print_summary();
        }

        Commands::Play {
            config,
            duration,
            strategy,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(strategy) = strategy {
                config.strategy = strategy.into();
            }
            play(config, duration)?;
        }

        Commands::Map {
            strategy,
            channels,
            lat,
            lon,
            speed,
            temperature,
            humidity,
            heading,
            time_of_day,
            seed,
        } => {
            let snapshot = EnvironmentalSnapshot::new(lat, lon, speed, temperature, time_of_day)
                .with_humidity(humidity)
                .with_heading(heading);
            let mapper = ParameterMapper::new(strategy.into(), channels);
            let targets = mapper.map(&snapshot, &mut StdRng::seed_from_u64(seed));
            println!("{}", serde_json::to_string_pretty(&targets)?);
        }

        Commands::InitConfig { path, force } => {
            let path = path
                .or_else(EngineConfig::default_path)
                .ok_or("no config directory on this platform; pass a path")?;
            if path.exists() && !force {
                return Err(format!("{} exists (use --force to overwrite)", path.display()).into());
            }
            EngineConfig::default().write_to_file(&path)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, geodrone::error::ConfigError> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::load_or_default(),
    }
}

fn open_cpal() -> BackendResult<Box<dyn AudioBackend>> {
    Ok(Box::new(CpalBackend::open()?))
}

fn play(config: EngineConfig, duration: Option<f32>) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = EnvironmentalAudioEngine::new(config, open_cpal)?;
    engine.register_observer(|frequencies: &[f32]| {
        let rounded: Vec<String> = frequencies.iter().map(|f| format!("{:.1}", f)).collect();
        info!("frequencies: [{}]", rounded.join(", "));
    });

    let service = EngineService::spawn(engine)?;
    let handle = service.handle();
    let status = handle.start()?;
    println!("🎵 Playing ({:?}); send telemetry as JSON lines on stdin", status);

    let reader = handle.clone();
    let stdin_thread = std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetryUpdate>(&line) {
                Ok(update) => match reader.update_telemetry(update) {
                    Ok(()) => {}
                    Err(EngineError::ServiceGone) => break,
                    Err(e) => warn!("telemetry rejected: {}", e),
                },
                Err(e) => warn!("ignoring telemetry line: {}", e),
            }
        }
    });

    match duration {
        Some(seconds) => std::thread::sleep(Duration::from_secs_f32(seconds.max(0.0))),
        None => {
            let _ = stdin_thread.join();
        }
    }

    handle.stop()?;
    service.shutdown();
    Ok(())
}
