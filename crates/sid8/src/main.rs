//! Hosted SID-8: replays a register-write trace through the engine.
//!
//! A bus thread stands in for the host computer and its interrupt; the
//! main thread calibrates the host clock and runs the scheduler into the
//! default audio device, a WAV file or the PWM path.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use sid8::pwm::{PwmChannel, pwm_output};
use sid8::{
    AudioSink, BusDecoder, BusShared, ChipSettings, ClockCalibrator, Engine, HostSimulator, HostTrace, MonotonicClock,
    OutputMode, QueueConsumer, RunSummary, Sid8Config, VecSink, WavSink, channel, sid_bank,
};
use sid8_core::HostClock;

struct CliArgs {
    config: Option<PathBuf>,
    trace: Option<PathBuf>,
    host_hz: u64,
    seconds: Option<f64>,
    wav: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config: None,
        trace: None,
        host_hz: HostClock::PAL.frequency_hz,
        seconds: None,
        wav: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                cli.config = args.get(i).map(PathBuf::from);
            }
            "--trace" => {
                i += 1;
                cli.trace = args.get(i).map(PathBuf::from);
            }
            "--host-hz" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.host_hz = s.parse().unwrap_or(HostClock::PAL.frequency_hz);
                }
            }
            "--seconds" => {
                i += 1;
                cli.seconds = args.get(i).and_then(|s| s.parse().ok());
            }
            "--wav" => {
                i += 1;
                cli.wav = args.get(i).map(PathBuf::from);
            }
            "--help" | "-h" => {
                eprintln!("Usage: sid8 [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --config <file>   JSON engine configuration");
                eprintln!("  --trace <file>    JSON register-write trace [default: built-in demo]");
                eprintln!("  --host-hz <hz>    Simulated host bus clock [default: 985248]");
                eprintln!("  --seconds <s>     Length of the simulated run [default: trace length + 1s]");
                eprintln!("  --wav <file>      Write audio to a WAV file instead of the audio device");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

/// Stand-in PWM peripheral: counts duty loads.
struct CountingPwm(Arc<AtomicU64>);

impl PwmChannel for CountingPwm {
    fn set_duty(&mut self, _left: u32, _right: u32) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything the scheduler needs apart from its sink.
struct EngineParts {
    chips: ChipSettings,
    queue: QueueConsumer,
    shared: Arc<BusShared>,
}

fn run_engine<S: AudioSink>(parts: EngineParts, sink: S, config: &Sid8Config) -> Result<(RunSummary, S)> {
    let mut engine = Engine::new(sid_bank(parts.chips), parts.queue, parts.shared, sink, config)
        .context("Failed to start the scheduler")?;
    let summary = engine.run(&MonotonicClock::new());
    Ok((summary, engine.shutdown()))
}

#[cfg(feature = "native")]
fn open_device(config: &Sid8Config) -> Box<dyn AudioSink> {
    match sid8::CpalSink::new(config.sample_rate, config.audio.yield_frames as usize * 2) {
        Ok(sink) => Box::new(sink),
        Err(err) => {
            warn!("{err}; continuing without audio");
            Box::new(VecSink::new())
        }
    }
}

#[cfg(not(feature = "native"))]
fn open_device(_config: &Sid8Config) -> Box<dyn AudioSink> {
    warn!("Built without audio device support; continuing without audio");
    Box::new(VecSink::new())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = parse_args();

    let config = match &cli.config {
        Some(path) => Sid8Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => Sid8Config::default(),
    };
    let host_clock = HostClock::new(cli.host_hz);
    let trace = match &cli.trace {
        Some(path) => HostTrace::load(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            info!("No trace given, playing the built-in demo");
            HostTrace::demo(host_clock)
        }
    };
    let run_cycles = match cli.seconds {
        Some(seconds) => (seconds * host_clock.frequency_hz as f64) as u64,
        None => trace.end_cycle() + host_clock.frequency_hz,
    };

    let shared = Arc::new(BusShared::new());
    let (producer, queue) = channel(config.queue_capacity)?;
    let mut decoder = BusDecoder::new(Arc::clone(&shared), producer, config.register_read)
        .with_reset_debounce(config.reset.debounce_cycles);

    let duty_loads = Arc::new(AtomicU64::new(0));
    let pwm_sink = if config.output == OutputMode::Pwm {
        let (sink, output) = pwm_output(
            Box::new(CountingPwm(Arc::clone(&duty_loads))),
            config.audio.pwm_range,
            config.sample_rate,
            config.audio.pwm_buffer_frames as usize,
        );
        decoder = decoder.with_pwm(output);
        Some(sink)
    } else {
        None
    };

    let stop = Arc::new(AtomicBool::new(false));
    let bus = HostSimulator::new(trace, host_clock, run_cycles)
        .spawn(decoder, Arc::clone(&stop))
        .context("Failed to start the bus thread")?;

    let measured = match ClockCalibrator::new(config.calibration).calibrate(shared.as_ref(), &MonotonicClock::new()) {
        Ok(clock) => clock,
        Err(err) => {
            stop.store(true, Ordering::Relaxed);
            let _ = bus.join();
            return Err(err).context("Clock calibration failed");
        }
    };
    shared.set_host_clock(measured);

    let parts = EngineParts {
        chips: config.shared_chip_settings(),
        queue,
        shared: Arc::clone(&shared),
    };
    let summary = if let Some(sink) = pwm_sink {
        let (summary, sink) = run_engine(parts, sink, &config)?;
        if sink.dropped() > 0 {
            warn!("PWM buffer overflowed: {} frames dropped", sink.dropped());
        }
        summary
    } else if let Some(path) = &cli.wav {
        let sink = WavSink::create(path, config.sample_rate)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let (summary, sink) = run_engine(parts, sink, &config)?;
        let frames = sink.finish()?;
        info!("Wrote {frames} frames to {}", path.display());
        summary
    } else {
        run_engine(parts, open_device(&config), &config)?.0
    };

    stop.store(true, Ordering::Relaxed);
    let decoder = bus.join().map_err(|_| anyhow!("bus thread panicked"))?;
    if let Some(pwm) = decoder.pwm() {
        info!(
            "PWM: {} duty loads, {} underruns",
            duty_loads.load(Ordering::Relaxed),
            pwm.underruns()
        );
    }

    println!(
        "{}: {} host cycles, {} emulated, {} writes applied, {} frames, {} writes lost, {} resets",
        summary.reason,
        summary.host_cycles,
        summary.cycles_emulated,
        summary.events_applied,
        summary.frames,
        summary.evicted,
        summary.resets
    );
    Ok(())
}
