//! Headless run command: simulate until settled, write the plots.

use std::fs;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use serde::Serialize;

use pendulum::{
    DisplayUpdate, ExitReason, LoopExit, Pacer, PendulumError, PlotSet, RealTimePacer, RunEvent, Simulation,
    StartRequest, TrajectorySample, Unpaced,
};

use super::common::{parse_number, take_value};
use super::config::SimConfig;

/// Parameters block of the JSON export.
#[derive(Serialize)]
struct JsonParameters {
    length: f64,
    mass: f64,
    gravity: f64,
    damping: f64,
    initial_angle_deg: f64,
    initial_angular_velocity_deg: f64,
    time_step: f64,
}

/// JSON export of one run.
#[derive(Serialize)]
struct JsonTrajectory<'a> {
    generated_at: String,
    parameters: JsonParameters,
    outcome: &'static str,
    iterations: u64,
    samples: &'a [TrajectorySample],
}

/// Simulated-time cap for runs that cannot settle (`damping <= 0`).
pub const UNDAMPED_MAX_TIME: f64 = 60.0;

/// Options gathered from the command line.
struct RunOptions {
    config: SimConfig,
    max_time: Option<f64>,
    json_path: Option<String>,
    realtime: bool,
}

/// Execute the run command.
pub fn cmd_run(args: &[String]) {
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<RunOptions, String> {
    // Config file first so flags can override it regardless of order
    let mut config = SimConfig::default();
    if let Some(pos) = args.iter().position(|a| a == "-c" || a == "--config") {
        let path = take_value(args, pos, "--config")?;
        config = SimConfig::load(path).map_err(|e| e.to_string())?;
    }

    let mut max_time = None;
    let mut json_path = None;
    let mut realtime = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                i += 1;
            }
            "-l" | "--length" => {
                config.length = parse_number(args, i, "--length")?;
                i += 1;
            }
            "-m" | "--mass" => {
                config.mass = parse_number(args, i, "--mass")?;
                i += 1;
            }
            "-g" | "--gravity" => {
                config.gravity = parse_number(args, i, "--gravity")?;
                i += 1;
            }
            "-k" | "--damping" => {
                config.damping = parse_number(args, i, "--damping")?;
                i += 1;
            }
            "-a" | "--angle" => {
                config.angle_deg = parse_number(args, i, "--angle")?;
                i += 1;
            }
            "-w" | "--omega" => {
                config.angular_velocity_deg = parse_number(args, i, "--omega")?;
                i += 1;
            }
            "--dt" => {
                config.time_step = parse_number(args, i, "--dt")?;
                i += 1;
            }
            "-t" | "--max-time" => {
                max_time = Some(parse_number(args, i, "--max-time")?);
                i += 1;
            }
            "-o" | "--output" => {
                config.output_dir = take_value(args, i, "--output")?.into();
                i += 1;
            }
            "--keep" => config.retain_plots = true,
            "--no-keep" => config.retain_plots = false,
            "--json" => {
                json_path = Some(take_value(args, i, "--json")?.to_string());
                i += 1;
            }
            "--realtime" => realtime = true,
            other => return Err(format!("Unknown option: {}", other)),
        }
        i += 1;
    }

    if let Some(limit) = max_time {
        if !(limit.is_finite() && limit > 0.0) {
            return Err(format!("--max-time must be positive, got {}", limit));
        }
    }

    Ok(RunOptions {
        config,
        max_time,
        json_path,
        realtime,
    })
}

fn run(args: &[String]) -> Result<(), String> {
    let options = parse_args(args)?;
    let config = &options.config;
    let request = config.start_request().map_err(|e| e.to_string())?;
    let renderer = config.renderer();

    let pacer: Arc<dyn Pacer> = if options.realtime {
        Arc::new(RealTimePacer::new(config.frame_interval()))
    } else {
        Arc::new(Unpaced)
    };
    let (sim, events) = Simulation::new(config.pivot(), pacer);
    let mut sim = sim.with_renderer(renderer.clone());
    if options.max_time.is_none() && config.damping <= 0.0 {
        eprintln!(
            "No damping: the run cannot settle, stopping after {} s (use --max-time to change)",
            UNDAMPED_MAX_TIME
        );
    }
    if let Some(max_time) = effective_max_time(config, options.max_time) {
        sim = sim.with_step_limit(step_limit(max_time, request.time_step));
    }

    eprintln!(
        "Simulating: l={} m={} g={} k={} angle={}° omega={}°/s dt={}",
        config.length,
        config.mass,
        config.gravity,
        config.damping,
        config.angle_deg,
        config.angular_velocity_deg,
        config.time_step
    );
    let started = Instant::now();
    sim.start(request).map_err(|e| e.to_string())?;

    // Consume events while the loop runs so the channel never backs up.
    // The loop renders on its own when it settles; early stops are ours.
    let mut last_update: Option<DisplayUpdate> = None;
    let mut settled_plots = None;
    loop {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(RunEvent::Tick { update, .. }) => last_update = Some(update),
            Ok(RunEvent::Settled { plots, .. }) => {
                settled_plots = plots;
                break;
            }
            Ok(RunEvent::Stopped { .. }) => break,
            Err(RecvTimeoutError::Timeout) if sim.is_running() => {}
            Err(_) => break,
        }
    }
    let exit = sim.join().ok_or("run loop exited without reporting")?;
    let wall = started.elapsed();

    let samples = sim.snapshot();
    let plots = match settled_plots {
        Some(result) => result,
        None => renderer.render_run(&samples),
    }
    .map_err(|e| e.to_string())?;

    print_summary(&exit, last_update.as_ref(), wall.as_secs_f64() * 1000.0);
    print_plots(&plots);

    if let Some(path) = &options.json_path {
        write_json(path, config, &request, &exit, &samples).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// `--max-time`, or the undamped cap when the run could otherwise go forever.
fn effective_max_time(config: &SimConfig, max_time: Option<f64>) -> Option<f64> {
    match max_time {
        Some(limit) => Some(limit),
        None if config.damping <= 0.0 => Some(UNDAMPED_MAX_TIME),
        None => None,
    }
}

/// Steps needed to cover `max_time`, at least one.
///
/// The division can land a hair above a whole number (0.07 / 0.01), which
/// must not cost an extra step.
fn step_limit(max_time: f64, dt: f64) -> u64 {
    ((max_time / dt - 1e-9).ceil() as u64).max(1)
}

fn outcome_name(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::Settled => "settled",
        ExitReason::Cancelled => "cancelled",
        ExitReason::StepLimit => "time limit",
    }
}

fn print_summary(exit: &LoopExit, last: Option<&DisplayUpdate>, wall_ms: f64) {
    eprintln!();
    eprintln!("═══════════════════════════════════════════════");
    eprintln!("  RUN {}: {}", exit.run_id, outcome_name(exit.reason).to_uppercase());
    eprintln!("═══════════════════════════════════════════════");
    eprintln!("  Steps: {}", exit.iterations);
    if let Some(update) = last {
        eprintln!("  {}", update.time_label());
        eprintln!("  {}", update.angle_label());
        eprintln!("  {}", update.angular_velocity_label());
    }
    eprintln!("  Wall time (ms): {:.2}", wall_ms);
    eprintln!("═══════════════════════════════════════════════");
}

fn print_plots(plots: &PlotSet) {
    for (kind, artifact) in plots.iter() {
        match &artifact.path {
            Some(path) => eprintln!("Wrote: {} ({}x{})", path.display(), artifact.width, artifact.height),
            None => eprintln!(
                "Rendered: {} ({}x{}, not retained)",
                kind.file_name(),
                artifact.width,
                artifact.height
            ),
        }
    }
}

fn write_json(
    path: &str,
    config: &SimConfig,
    request: &StartRequest,
    exit: &LoopExit,
    samples: &[TrajectorySample],
) -> Result<(), PendulumError> {
    let export = JsonTrajectory {
        generated_at: chrono::Local::now().to_rfc3339(),
        parameters: JsonParameters {
            length: request.params.length,
            mass: request.params.mass,
            gravity: request.params.gravity,
            damping: request.params.damping,
            initial_angle_deg: config.angle_deg,
            initial_angular_velocity_deg: config.angular_velocity_deg,
            time_step: request.time_step,
        },
        outcome: outcome_name(exit.reason),
        iterations: exit.iterations,
        samples,
    };
    let json = serde_json::to_string_pretty(&export)
        .map_err(|e| PendulumError::Export(format!("failed to serialize trajectory: {}", e)))?;

    if path == "-" {
        println!("{}", json);
    } else {
        fs::write(path, &json).map_err(|e| PendulumError::Export(format!("failed to write {}: {}", path, e)))?;
        eprintln!("Wrote: {}", path);
    }
    Ok(())
}

/// Print usage information.
pub fn print_usage() {
    eprintln!("pendulum run - simulate without the TUI and write the plots");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    pendulum run [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config <file>    YAML config (flags override it)");
    eprintln!("    -l, --length <m>       Arm length (default: 1)");
    eprintln!("    -m, --mass <kg>        Bob mass (default: 1)");
    eprintln!("    -g, --gravity <m/s²>   Gravity (default: 9.81)");
    eprintln!("    -k, --damping <k>      Damping coefficient (default: 0.5)");
    eprintln!("    -a, --angle <deg>      Initial angle (default: 70)");
    eprintln!("    -w, --omega <deg/s>    Initial angular velocity (default: 0)");
    eprintln!("    --dt <s>               Time step (default: 0.01)");
    eprintln!("    -t, --max-time <s>     Stop after this much simulated time");
    eprintln!("                           (default with no damping: {} s)", UNDAMPED_MAX_TIME);
    eprintln!("    -o, --output <dir>     Plot directory (default: plots)");
    eprintln!("    --keep / --no-keep     Keep plot PNGs on disk (default: keep)");
    eprintln!("    --json <file>          Export the trajectory as JSON (- for stdout)");
    eprintln!("    --realtime             Pace steps in real time like the TUI");
}
