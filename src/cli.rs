// Copyright (c) Microsoft Corporation.

/// Provides command line interface (CLI) argument parsing functionality.
///
/// This module uses the `clap` crate to define and parse CLI arguments, and validates them into a
/// `CycleConfig`.
use std::error::Error;
use std::fmt;

use clap::{Parser, ValueEnum};

use crate::generator::GrowthPlan;

/// How progress events are printed.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable banners.
    Console,
    /// One JSON object per line.
    Json,
}

/// Represents the command line arguments for the application.
///
/// Every argument is optional. Without limits the run goes on until interrupted with Ctrl-C.
#[derive(Parser, Debug, Clone)]
#[clap(about = "Grows a matrix multiplication workload round after round behind a thread barrier")]
pub struct CliArgs {
    /// Dimension of the operand matrices in the first round.
    #[clap(short, long, default_value_t = 10)]
    pub initial_dimension: usize,
    /// Number of worker threads multiplying each round.
    #[clap(short, long, default_value_t = 4)]
    pub workers: usize,
    /// Factor the dimension is multiplied by between rounds.
    #[clap(short, long, default_value_t = 2)]
    pub growth_factor: usize,
    /// Value every cell of the left operand is filled with.
    #[clap(long, default_value_t = 1, allow_hyphen_values = true)]
    pub left_fill: i64,
    /// Value every cell of the right operand is filled with.
    #[clap(long, default_value_t = 2, allow_hyphen_values = true)]
    pub right_fill: i64,
    /// Stop after this many rounds were completed by every worker.
    #[clap(long)]
    pub max_rounds: Option<u64>,
    /// Stop instead of growing the matrices past this dimension.
    #[clap(long)]
    pub max_dimension: Option<usize>,
    /// How progress is printed.
    #[clap(short, long, value_enum, default_value_t = OutputFormat::Console)]
    pub format: OutputFormat,
}

/// Represents invalid combinations of arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroDimension,
    ZeroWorkers,
    GrowthFactorTooSmall(usize),
    ZeroMaxRounds,
    MaxDimensionBelowInitial { max: usize, initial: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroDimension => write!(f, "initial dimension must be at least 1"),
            ConfigError::ZeroWorkers => write!(f, "at least one worker is required"),
            ConfigError::GrowthFactorTooSmall(factor) => {
                write!(f, "growth factor must be at least 2, got {factor}")
            }
            ConfigError::ZeroMaxRounds => write!(f, "max rounds must be at least 1"),
            ConfigError::MaxDimensionBelowInitial { max, initial } => write!(
                f,
                "max dimension {max} is below the initial dimension {initial}"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Validated settings for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleConfig {
    pub initial_dimension: usize,
    pub worker_count: usize,
    pub plan: GrowthPlan,
}

impl CliArgs {
    pub fn into_config(self) -> Result<CycleConfig, ConfigError> {
        if self.initial_dimension == 0 {
            return Err(ConfigError::ZeroDimension);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.growth_factor < 2 {
            return Err(ConfigError::GrowthFactorTooSmall(self.growth_factor));
        }
        if self.max_rounds == Some(0) {
            return Err(ConfigError::ZeroMaxRounds);
        }
        if let Some(max) = self.max_dimension {
            if max < self.initial_dimension {
                return Err(ConfigError::MaxDimensionBelowInitial {
                    max,
                    initial: self.initial_dimension,
                });
            }
        }

        Ok(CycleConfig {
            initial_dimension: self.initial_dimension,
            worker_count: self.workers,
            plan: GrowthPlan {
                growth_factor: self.growth_factor,
                left_fill: self.left_fill,
                right_fill: self.right_fill,
                max_rounds: self.max_rounds,
                max_dimension: self.max_dimension,
            },
        })
    }
}

/// Parses the command line arguments and returns a `CliArgs` struct.
///
/// This function uses the `clap` crate's `Parser` trait to parse the command line arguments.
pub fn cli_arg_parser() -> CliArgs {
    CliArgs::parse()
}
