use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "shaderreel",
    author,
    version,
    about = "Screensaver that rotates through Shadertoy shaders",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Overrides applied on top of `config.toml`.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// How long each shader stays on screen (e.g. `5m`, `90s`).
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_duration)]
    pub shader_duration: Option<Duration>,

    /// Largest render scale divisor the adaptive controller may use.
    #[arg(long, global = true, value_name = "FACTOR")]
    pub undersample_max: Option<f32>,

    /// Target frame time (e.g. `33ms`, `16ms`).
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_duration)]
    pub frame_interval: Option<Duration>,

    /// Skip any remote fetches, even if an API key is available.
    #[arg(long, global = true)]
    pub cache_only: bool,

    /// Shadertoy API key; can also be supplied via the `SHADERTOY_API_KEY` env var.
    #[arg(long, global = true, env = "SHADERTOY_API_KEY", hide_env_values = true)]
    pub shadertoy_api_key: Option<String>,

    /// Settings file to use instead of `<home>/config.toml`.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive render units against an offscreen GPU target (default).
    Run(RunArgs),
    /// Print one enabled candidate from the list.
    Pick {
        /// Seed the selector so the same list always yields the same id.
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,
    },
    /// Fetch and validate a single shader definition.
    Fetch {
        /// Shadertoy shader id (e.g. `XsXXDn`).
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Prefetch every enabled candidate and its images into the cache.
    Warm,
    /// Print resolved paths for the list, cache, log, and config.
    Where,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Native render size for every unit.
    #[arg(
        long,
        value_name = "WIDTHxHEIGHT",
        value_parser = parse_size,
        default_value = "1280x720"
    )]
    pub size: (u32, u32),

    /// Stop after this many frames per unit; runs until killed otherwise.
    #[arg(long, value_name = "N")]
    pub frames: Option<u64>,

    /// Number of independent render units sharing the cache.
    #[arg(
        long,
        value_name = "N",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..=16)
    )]
    pub units: u32,

    /// Save the final frame of the first unit as a PNG (needs `--frames`).
    #[arg(long, value_name = "PATH", requires = "frames")]
    pub snapshot: Option<PathBuf>,

    /// Seed the selector for reproducible rotations.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            size: (1280, 720),
            frames: None,
            units: 1,
            snapshot: None,
            seed: None,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (w, h) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{trimmed}'"))?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("size must be greater than zero".into());
    }
    Ok((width, height))
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Ok(Duration::from_secs_f64(seconds));
        }
        return Err(format!("duration must be non-negative (got {trimmed})"));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}
