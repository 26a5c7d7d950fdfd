// Copyright (c) Microsoft Corporation.

/// Wires a run together: initial state, the fixed worker threads and the generator thread, then shutdown.
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info};

use crate::cli::CycleConfig;
use crate::cycle::{CycleError, CycleState};
use crate::generator::{Generator, GeneratorError, GeneratorOutcome};
use crate::matrix::{Matrix, WorkloadError};
use crate::report::{ProgressEvent, Reporter};
use crate::shutdown::Shutdown;
use crate::worker::{FaultGuard, Worker, WorkerError};

/// Represents errors that prevent a run from starting or finishing cleanly.
///
/// # Variants
///
/// * `Setup` - The initial operands could not be built.
/// * `Cycle` - The initial shared state could not be created.
/// * `Spawn` - A task thread could not be started.
/// * `TaskFailed` - One or more tasks failed or panicked; one message per task.
#[derive(Debug)]
pub enum DriverError {
    Setup(WorkloadError),
    Cycle(CycleError),
    Spawn(io::Error),
    TaskFailed(Vec<String>),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Setup(e) => write!(f, "failed to build initial operands: {e}"),
            DriverError::Cycle(e) => write!(f, "failed to set up the cycle: {e}"),
            DriverError::Spawn(e) => write!(f, "failed to spawn a task thread: {e}"),
            DriverError::TaskFailed(failures) => {
                write!(f, "run aborted: {}", failures.join("; "))
            }
        }
    }
}

impl Error for DriverError {}

/// What a run achieved before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Rounds every worker completed.
    pub rounds: u64,
    /// Dimension of the last round the workers finished, or the initial one if none finished.
    pub final_dimension: usize,
    /// Rounds completed per worker, indexed by worker id.
    pub worker_rounds: Vec<u64>,
}

/// Runs the round cycle until `shutdown` is stopped, then cancels it and waits for every task.
///
/// `shutdown` may be tripped from outside (Ctrl-C), by the generator once a limit in the plan is reached, or
/// by a task that failed. A task failure, panics included, is reported as `DriverError::TaskFailed`.
pub fn run(
    config: &CycleConfig,
    shutdown: Arc<Shutdown>,
    reporter: Arc<dyn Reporter>,
) -> Result<RunSummary, DriverError> {
    let left =
        Matrix::filled(config.initial_dimension, config.plan.left_fill).map_err(DriverError::Setup)?;
    let right = Matrix::filled(config.initial_dimension, config.plan.right_fill)
        .map_err(DriverError::Setup)?;
    let cycle = Arc::new(
        CycleState::new(config.worker_count, left, right).map_err(DriverError::Cycle)?,
    );

    info!(
        "starting {} worker(s) at {}x{}",
        cycle.worker_count(),
        config.initial_dimension,
        config.initial_dimension
    );
    reporter.report(&ProgressEvent::NewRoundStarted {
        round: 0,
        dimension: config.initial_dimension,
    });

    let tasks = match spawn_tasks(config, &cycle, &shutdown, &reporter) {
        Ok(tasks) => tasks,
        Err(e) => return Err(DriverError::Spawn(e)),
    };

    shutdown.wait_for_stop_signal();
    info!("stop requested, cancelling the cycle");
    cycle.cancel();

    let (summary, failures) = tasks.join(config.initial_dimension);
    if !failures.is_empty() {
        for failure in &failures {
            error!("{}", failure);
        }
        return Err(DriverError::TaskFailed(failures));
    }

    reporter.report(&ProgressEvent::RunFinished {
        rounds: summary.rounds,
        final_dimension: summary.final_dimension,
    });
    Ok(summary)
}

struct Tasks {
    workers: Vec<JoinHandle<Result<u64, WorkerError>>>,
    generator: Option<JoinHandle<Result<GeneratorOutcome, GeneratorError>>>,
}

impl Tasks {
    /// Joins every task. Returns the summary plus one message per task that did not end cleanly.
    fn join(self, initial_dimension: usize) -> (RunSummary, Vec<String>) {
        let mut failures = Vec::new();
        let mut worker_rounds = Vec::with_capacity(self.workers.len());

        for (id, handle) in self.workers.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(rounds)) => worker_rounds.push(rounds),
                Ok(Err(e)) => {
                    worker_rounds.push(0);
                    failures.push(format!("worker {id}: {e}"));
                }
                Err(_) => {
                    worker_rounds.push(0);
                    failures.push(format!("worker {id} panicked"));
                }
            }
        }

        let mut summary = RunSummary {
            rounds: 0,
            final_dimension: initial_dimension,
            worker_rounds,
        };
        match self.generator.map(JoinHandle::join) {
            Some(Ok(Ok(outcome))) => {
                summary.rounds = outcome.rounds;
                if outcome.rounds > 0 {
                    summary.final_dimension = outcome.final_dimension;
                }
            }
            Some(Ok(Err(e))) => failures.push(format!("generator: {e}")),
            Some(Err(_)) => failures.push("generator panicked".to_string()),
            None => {}
        }

        (summary, failures)
    }
}

/// Starts the workers and the generator on named threads.
///
/// If a spawn fails, everything already started is cancelled and joined before the error is returned.
fn spawn_tasks(
    config: &CycleConfig,
    cycle: &Arc<CycleState>,
    shutdown: &Arc<Shutdown>,
    reporter: &Arc<dyn Reporter>,
) -> io::Result<Tasks> {
    let mut tasks = Tasks {
        workers: Vec::with_capacity(config.worker_count),
        generator: None,
    };

    if let Err(e) = spawn_into(&mut tasks, config, cycle, shutdown, reporter) {
        cycle.cancel();
        tasks.join(0);
        return Err(e);
    }
    Ok(tasks)
}

fn spawn_into(
    tasks: &mut Tasks,
    config: &CycleConfig,
    cycle: &Arc<CycleState>,
    shutdown: &Arc<Shutdown>,
    reporter: &Arc<dyn Reporter>,
) -> io::Result<()> {
    for id in 0..config.worker_count {
        let name = format!("worker-{id}");
        let guard = FaultGuard::new(name.clone(), Arc::clone(cycle), Arc::clone(shutdown));
        let worker = Worker::new(
            id,
            Arc::clone(cycle),
            Arc::clone(shutdown),
            Arc::clone(reporter),
        );
        let handle = thread::Builder::new().name(name).spawn(move || {
            let _guard = guard;
            worker.run()
        })?;
        tasks.workers.push(handle);
    }

    let guard = FaultGuard::new(
        "generator".to_string(),
        Arc::clone(cycle),
        Arc::clone(shutdown),
    );
    let generator = Generator::new(
        Arc::clone(cycle),
        Arc::clone(shutdown),
        Arc::clone(reporter),
        config.plan,
    );
    let handle = thread::Builder::new()
        .name("generator".to_string())
        .spawn(move || {
            let _guard = guard;
            generator.run()
        })?;
    tasks.generator = Some(handle);

    Ok(())
}
