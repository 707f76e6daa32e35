//! Command line front end: generates detector schedules and synthetic
//! weights, and runs a schedule on the GPU or on the CPU reference.
//!
//! ```text
//! texmodel schedule <out.json> [size] [variant]
//! texmodel zero-weights <out.safetensors> [size] [variant]
//! texmodel run <schedule.json> <weights> [input.bin]
//! texmodel run-cpu <schedule.json> <weights> [input.bin]
//! ```
//!
//! Input files hold little-endian `f32` values. Without one, every input
//! element is 0.5.

use std::fs;
use std::process::ExitCode;
use std::time::Instant;

use log::{error, info};
use texmodel_inference::config::RuntimeConfig;
use texmodel_inference::cpu_runner::CpuRunner;
use texmodel_inference::errors::{
    InferenceError, ModelConfigError, ScheduleError, ShapeError, WeightFileError,
};
use texmodel_inference::gpu::{GpuContext, GpuRuntimeError, Runtime};
use texmodel_inference::schedule::Schedule;
use texmodel_inference::schedule_info::ScheduleInfo;
use texmodel_inference::weights::{Dtype, ResolvedWeights, WeightFile};
use texmodel_inference::yolo::{self, YoloConfig};
use thiserror::Error;

const USAGE: &str = "usage:
  texmodel schedule <out.json> [size] [variant]
  texmodel zero-weights <out.safetensors> [size] [variant]
  texmodel run <schedule.json> <weights> [input.bin]
  texmodel run-cpu <schedule.json> <weights> [input.bin]";

const DEFAULT_INPUT_VALUE: f32 = 0.5;

#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid schedule JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    ModelConfig(#[from] ModelConfigError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    WeightFile(#[from] WeightFileError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Gpu(#[from] GpuRuntimeError),
}

type CliResult<T> = Result<T, CliError>;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(message)) => {
            eprintln!("{message}\n{USAGE}");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> CliResult<()> {
    let command = args
        .first()
        .ok_or_else(|| CliError::Usage("missing command".to_string()))?;
    let rest = &args[1..];
    match command.as_str() {
        "schedule" => write_schedule(rest),
        "zero-weights" => write_zero_weights(rest),
        "run" => run_schedule(rest, false),
        "run-cpu" => run_schedule(rest, true),
        other => Err(CliError::Usage(format!("unknown command '{other}'"))),
    }
}

fn positional<'a>(args: &'a [String], index: usize, name: &str) -> CliResult<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| CliError::Usage(format!("missing argument <{name}>")))
}

/// Parses `[size] [variant]` following the output path.
fn model_config(args: &[String]) -> CliResult<YoloConfig> {
    let size = match args.get(1) {
        Some(s) => s
            .parse::<usize>()
            .map_err(|_| CliError::Usage(format!("invalid input size '{s}'")))?,
        None => 640,
    };
    let variant = args.get(2).map_or("n", String::as_str);
    Ok(YoloConfig::variant(variant)?.with_input_size(size, size))
}

fn write_file(path: &str, contents: &[u8]) -> CliResult<()> {
    fs::write(path, contents).map_err(|source| CliError::Io {
        path: path.to_string(),
        source,
    })
}

fn read_file(path: &str) -> CliResult<Vec<u8>> {
    fs::read(path).map_err(|source| CliError::Io {
        path: path.to_string(),
        source,
    })
}

fn write_schedule(args: &[String]) -> CliResult<()> {
    let path = positional(args, 0, "out.json")?;
    let config = model_config(args)?;
    let info = yolo::build_schedule(&config)?;
    // Validate before writing so broken graphs never reach disk.
    let schedule = Schedule::new(info.clone())?;
    write_file(path, info.to_json()?.as_bytes())?;
    info!(
        "Wrote schedule with {} steps and {} programs to {path}",
        schedule.steps().len(),
        schedule.programs().len()
    );
    Ok(())
}

fn write_zero_weights(args: &[String]) -> CliResult<()> {
    let path = positional(args, 0, "out.safetensors")?;
    let config = model_config(args)?;
    let writer = yolo::zero_weight_writer(&config, Dtype::F32)?;
    writer.write_to(path)?;
    info!("Wrote zero weights to {path}");
    Ok(())
}

fn run_schedule(args: &[String], cpu: bool) -> CliResult<()> {
    let schedule_path = positional(args, 0, "schedule.json")?;
    let weights_path = positional(args, 1, "weights")?;

    let json = String::from_utf8_lossy(&read_file(schedule_path)?).into_owned();
    let schedule = Schedule::new(ScheduleInfo::from_json(&json)?)?;
    let weights = ResolvedWeights::resolve(&WeightFile::open(weights_path)?, &schedule)?;

    let input = match args.get(2) {
        Some(path) => {
            let bytes = read_file(path)?;
            if !bytes.len().is_multiple_of(4) {
                return Err(ShapeError::MisalignedBytes { bytes: bytes.len() }.into());
            }
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }
        None => vec![DEFAULT_INPUT_VALUE; schedule.input_len()],
    };

    let start = Instant::now();
    let output = if cpu {
        CpuRunner::new(&schedule, &weights).infer(&input)?
    } else {
        let config = RuntimeConfig::from_env();
        let ctx = GpuContext::new(&config)?;
        let mut runtime = Runtime::new(ctx, schedule, &weights, &config)?;
        let setup = start.elapsed();
        let output = runtime.infer(&input)?;
        info!("Runtime setup took {setup:?}");
        output
    };
    info!("Inference finished in {:?}", start.elapsed());

    let checksum: f64 = output.iter().map(|&v| f64::from(v)).sum();
    let max = output.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    println!("output length: {}", output.len());
    println!("checksum: {checksum:.6}");
    println!("max: {max:.6}");
    Ok(())
}
