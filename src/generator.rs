// Copyright (c) Microsoft Corporation.

/// Provides the generator task: wait for every worker, grow the dimension, build fresh operands, start the
/// next round.
use std::sync::Arc;

use log::{debug, error, info};

use crate::cycle::{CycleError, CycleState};
use crate::matrix::{Matrix, WorkloadError};
use crate::report::{ProgressEvent, Reporter};
use crate::shutdown::Shutdown;

/// Represents errors that end the generator's loop abnormally.
#[derive(Debug)]
pub enum GeneratorError {
    Workload(WorkloadError),
    Cycle(CycleError),
    DimensionOverflow { dimension: usize, growth_factor: usize },
}

impl std::fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorError::Workload(e) => write!(f, "failed to build operands: {e}"),
            GeneratorError::Cycle(e) => write!(f, "round protocol failed: {e}"),
            GeneratorError::DimensionOverflow {
                dimension,
                growth_factor,
            } => write!(f, "dimension {dimension} * {growth_factor} overflows"),
        }
    }
}

impl std::error::Error for GeneratorError {}

/// How the operands are grown and filled each round, and when to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthPlan {
    pub growth_factor: usize,
    pub left_fill: i64,
    pub right_fill: i64,
    /// Stop once this many rounds were completed by every worker.
    pub max_rounds: Option<u64>,
    /// Stop instead of growing past this dimension.
    pub max_dimension: Option<usize>,
}

/// Where the generator's loop ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorOutcome {
    /// Rounds every worker completed.
    pub rounds: u64,
    /// Dimension of the last round the workers finished.
    pub final_dimension: usize,
}

pub struct Generator {
    cycle: Arc<CycleState>,
    shutdown: Arc<Shutdown>,
    reporter: Arc<dyn Reporter>,
    plan: GrowthPlan,
}

impl Generator {
    pub fn new(
        cycle: Arc<CycleState>,
        shutdown: Arc<Shutdown>,
        reporter: Arc<dyn Reporter>,
        plan: GrowthPlan,
    ) -> Self {
        Generator {
            cycle,
            shutdown,
            reporter,
            plan,
        }
    }

    /// The dimension of the round after one of size `dimension`.
    pub fn next_dimension(&self, dimension: usize) -> Result<usize, GeneratorError> {
        dimension
            .checked_mul(self.plan.growth_factor)
            .ok_or(GeneratorError::DimensionOverflow {
                dimension,
                growth_factor: self.plan.growth_factor,
            })
    }

    /// Runs until cancelled or until a limit in the plan is hit, at which point it asks for shutdown.
    ///
    /// Failures fault the cycle so blocked workers wake up, and trip the stop signal so the driver does too.
    pub fn run(self) -> Result<GeneratorOutcome, GeneratorError> {
        let mut outcome = GeneratorOutcome {
            rounds: 0,
            final_dimension: 0,
        };
        let result = self.run_rounds(&mut outcome);

        match &result {
            Ok(()) => info!(
                "generator stopped after {} round(s) at {}x{}",
                outcome.rounds, outcome.final_dimension, outcome.final_dimension
            ),
            Err(GeneratorError::Cycle(CycleError::Faulted(reason))) => {
                debug!("generator leaving faulted cycle: {}", reason)
            }
            Err(e) => {
                error!("generator failed: {}", e);
                self.cycle.fault(format!("generator failed: {e}"));
                self.shutdown.stop();
            }
        }
        result.map(|()| outcome)
    }

    fn run_rounds(&self, outcome: &mut GeneratorOutcome) -> Result<(), GeneratorError> {
        loop {
            let finished = match self.cycle.await_all_arrived() {
                Ok(finished) => finished,
                Err(CycleError::Cancelled) => return Ok(()),
                Err(e) => return Err(GeneratorError::Cycle(e)),
            };
            outcome.rounds = finished.round + 1;
            outcome.final_dimension = finished.dimension;

            if self.plan.max_rounds.is_some_and(|max| outcome.rounds >= max) {
                info!("completed {} round(s), requesting shutdown", outcome.rounds);
                self.shutdown.stop();
                return Ok(());
            }

            let dimension = self.next_dimension(finished.dimension)?;
            if self.plan.max_dimension.is_some_and(|max| dimension > max) {
                info!(
                    "next dimension {} exceeds the limit, requesting shutdown",
                    dimension
                );
                self.shutdown.stop();
                return Ok(());
            }

            debug!("building {}x{} operands", dimension, dimension);
            let left =
                Matrix::filled(dimension, self.plan.left_fill).map_err(GeneratorError::Workload)?;
            let right =
                Matrix::filled(dimension, self.plan.right_fill).map_err(GeneratorError::Workload)?;

            // announced while the workers are still parked, so it precedes every report of the new round
            let installed = self.cycle.install_next_round_with(left, right, |round| {
                self.reporter
                    .report(&ProgressEvent::NewRoundStarted { round, dimension })
            });

            match installed {
                Ok(round) => debug!("round {} released", round),
                Err(CycleError::Cancelled) => return Ok(()),
                Err(e) => return Err(GeneratorError::Cycle(e)),
            }
        }
    }
}
