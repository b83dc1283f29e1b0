// tuner-cli/src/main.rs

//! # Tuner Command Line
//!
//! Headless front end for `tuner-core`: opens the microphone (or a synthetic
//! sine), runs the engine on its worker thread and prints every state change.
//!
//! ## Threads
//! - **Main thread**: waits on worker events, Ctrl-C and the optional deadline
//! - **Worker thread**: capture and pitch detection, owned by `TunerWorker`

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{after, never, select};
use tuner_core::{AudioStream, CpalInput, PitchState, SineStream, TunerConfig, TunerWorker, WorkerEvent};

/// Real-time instrument tuner.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file; missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Input device name (default input device when omitted)
    #[arg(long, conflicts_with = "sine")]
    device: Option<String>,
    /// Use a synthetic sine of this frequency instead of a device
    #[arg(long, value_name = "HZ")]
    sine: Option<f32>,
    /// Amplitude of the synthetic sine
    #[arg(long, default_value_t = 0.3)]
    amplitude: f32,
    /// Bypass the high-pass/low-pass input filters
    #[arg(long, default_value_t = false)]
    no_filters: bool,
    /// Override the analysis window size in samples
    #[arg(long)]
    window_size: Option<usize>,
    /// Print one JSON object per state change
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<f64>,
    /// Print the effective configuration as JSON and exit
    #[arg(long, default_value_t = false)]
    dump_config: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = effective_config(&args)?;

    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let stream: Box<dyn AudioStream> = match (args.sine, &args.device) {
        (Some(freq), _) => Box::new(SineStream::new(freq, args.amplitude)),
        (None, Some(name)) => Box::new(CpalInput::named(name.clone())),
        (None, None) => Box::new(CpalInput::default_device()),
    };
    log::info!("Starting tuner on {}", stream.describe());

    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })
    .context("failed to install Ctrl-C handler")?;

    let (worker, events) =
        TunerWorker::spawn(config, Some(stream)).context("failed to start the tuner worker")?;
    let deadline = args
        .seconds
        .map(|s| after(Duration::from_secs_f64(s.max(0.0))))
        .unwrap_or_else(never);
    let started = Instant::now();
    let mut stdout = io::stdout().lock();
    let mut outcome = Ok(());

    loop {
        select! {
            recv(events) -> event => match event {
                Ok(WorkerEvent::State(state)) => {
                    if let Err(e) = print_state(&mut stdout, &state, args.json) {
                        outcome = Err(e).context("failed to write to stdout");
                        break;
                    }
                }
                Ok(WorkerEvent::SessionFailed(message)) => {
                    outcome = Err(anyhow::anyhow!(message)).context("could not open audio input");
                    break;
                }
                Err(_) => {
                    log::warn!("Tuner worker stopped unexpectedly");
                    break;
                }
            },
            recv(interrupt_rx) -> _ => {
                log::info!("Interrupted, shutting down");
                break;
            },
            recv(deadline) -> _ => {
                log::info!("Ran for {:.1} s, shutting down", started.elapsed().as_secs_f64());
                break;
            },
        }
    }

    worker.shutdown();
    outcome
}

/// Loads the configuration file (if any) and applies flag overrides.
fn effective_config(args: &Args) -> Result<TunerConfig> {
    let mut config = match &args.config {
        Some(path) => TunerConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => TunerConfig::default(),
    };
    if args.no_filters {
        config.enable_filters = false;
    }
    if let Some(window_size) = args.window_size {
        config.window_size = window_size;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_state(out: &mut impl Write, state: &PitchState, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, state)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{state}")?;
    }
    out.flush()?;
    Ok(())
}
