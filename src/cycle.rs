// Copyright (c) Microsoft Corporation.

/// Provides the shared state every round is coordinated around, and the barrier protocol on top of it.
///
/// One mutex guards everything (round counter, dimension, operands, arrival count, terminal flags) and one
/// condition variable carries every wakeup. Workers and the generator are all waiters on that same
/// condition variable, each with its own predicate.
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::matrix::Matrix;

/// Represents errors returned by the round protocol.
///
/// # Variants
///
/// * `Cancelled` - The cycle was cancelled. This is the normal way tasks leave their loops.
/// * `Faulted` - Another task failed and marked the cycle as faulted.
/// * `LockPoisoned` - A thread panicked while holding the state lock.
/// * `NoWorkers` - A cycle needs at least one worker.
/// * `OperandMismatch` - Left and right operands handed in for a round have different dimensions.
/// * `StaleRound` - A worker arrived for a round that is not the current one.
/// * `TooManyArrivals` - More arrivals than workers for the same round.
/// * `RoundNotFinished` - The generator tried to install a round before every worker arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    Cancelled,
    Faulted(String),
    LockPoisoned(String),
    NoWorkers,
    OperandMismatch { left: usize, right: usize },
    StaleRound { current: u64, arrived_for: u64 },
    TooManyArrivals { worker_count: usize },
    RoundNotFinished { completed: usize, worker_count: usize },
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Cancelled => write!(f, "cycle cancelled"),
            CycleError::Faulted(reason) => write!(f, "cycle faulted: {reason}"),
            CycleError::LockPoisoned(e) => write!(f, "cycle state lock poisoned: {e}"),
            CycleError::NoWorkers => write!(f, "a cycle needs at least one worker"),
            CycleError::OperandMismatch { left, right } => write!(
                f,
                "operands must share a dimension, got {left}x{left} and {right}x{right}"
            ),
            CycleError::StaleRound {
                current,
                arrived_for,
            } => write!(
                f,
                "arrival for round {arrived_for} while round {current} is running"
            ),
            CycleError::TooManyArrivals { worker_count } => {
                write!(f, "more than {worker_count} arrivals in one round")
            }
            CycleError::RoundNotFinished {
                completed,
                worker_count,
            } => write!(
                f,
                "round not finished, {completed} of {worker_count} workers arrived"
            ),
        }
    }
}

impl Error for CycleError {}

/// A consistent view of one round, captured under the lock in a single step.
///
/// The operands are reference counted. The generator installs new ones by swapping handles, so a worker
/// holding a snapshot keeps computing on the old values untouched.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub round: u64,
    pub dimension: usize,
    pub left: Arc<Matrix>,
    pub right: Arc<Matrix>,
}

/// What the generator sees once every worker has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedRound {
    pub round: u64,
    pub dimension: usize,
}

struct RoundState {
    round: u64,
    dimension: usize,
    left: Arc<Matrix>,
    right: Arc<Matrix>,
    /// Workers that arrived at the barrier this round. Never above `worker_count`.
    completed: usize,
    /// Round the generator already collected through `await_all_arrived`.
    claimed: Option<u64>,
    cancelled: bool,
    fault: Option<String>,
}

impl RoundState {
    fn is_open(&self) -> bool {
        !self.cancelled && self.fault.is_none()
    }

    fn check_open(&self) -> Result<(), CycleError> {
        if let Some(reason) = &self.fault {
            return Err(CycleError::Faulted(reason.clone()));
        }
        if self.cancelled {
            return Err(CycleError::Cancelled);
        }
        Ok(())
    }
}

/// The state shared by all workers and the generator, plus the lock and condition variable guarding it.
pub struct CycleState {
    worker_count: usize,
    state: Mutex<RoundState>,
    cnd: Condvar,
}

impl CycleState {
    /// Creates the state for round 0 with the given operands.
    pub fn new(worker_count: usize, left: Matrix, right: Matrix) -> Result<CycleState, CycleError> {
        if worker_count == 0 {
            return Err(CycleError::NoWorkers);
        }
        if left.dimension() != right.dimension() {
            return Err(CycleError::OperandMismatch {
                left: left.dimension(),
                right: right.dimension(),
            });
        }

        Ok(CycleState {
            worker_count,
            state: Mutex::new(RoundState {
                round: 0,
                dimension: left.dimension(),
                left: Arc::new(left),
                right: Arc::new(right),
                completed: 0,
                claimed: None,
                cancelled: false,
                fault: None,
            }),
            cnd: Condvar::new(),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn lock(&self) -> Result<MutexGuard<'_, RoundState>, CycleError> {
        self.state
            .lock()
            .map_err(|e| CycleError::LockPoisoned(e.to_string()))
    }

    /// Captures the current round's dimension and operands in one critical section.
    pub fn snapshot(&self) -> Result<Snapshot, CycleError> {
        let state = self.lock()?;
        state.check_open()?;

        Ok(Snapshot {
            round: state.round,
            dimension: state.dimension,
            left: Arc::clone(&state.left),
            right: Arc::clone(&state.right),
        })
    }

    /// Records that a worker finished `round` and blocks until the generator has started the next one.
    ///
    /// The last worker to arrive wakes the generator. The wait re-checks the round counter on every wakeup,
    /// so a spurious wakeup or a notification meant for someone else never releases a worker early.
    pub fn arrive_and_wait(&self, round: u64) -> Result<(), CycleError> {
        let mut state = self.lock()?;
        state.check_open()?;

        if state.round != round {
            return Err(CycleError::StaleRound {
                current: state.round,
                arrived_for: round,
            });
        }
        if state.completed >= self.worker_count {
            return Err(CycleError::TooManyArrivals {
                worker_count: self.worker_count,
            });
        }

        state.completed += 1;
        if state.completed == self.worker_count {
            // workers wait on the same condvar, a single notify could land on one of them
            self.cnd.notify_all();
        }

        let state = self
            .cnd
            .wait_while(state, |s| s.round == round && s.is_open())
            .map_err(|e| CycleError::LockPoisoned(e.to_string()))?;

        if state.round != round {
            return Ok(());
        }
        state.check_open()
    }

    /// Blocks the generator until every worker has arrived for the current round.
    ///
    /// Each round is handed out once: calling this again before `install_next_round` keeps waiting rather
    /// than reporting the same round twice.
    pub fn await_all_arrived(&self) -> Result<CompletedRound, CycleError> {
        let state = self.lock()?;
        let mut state = self
            .cnd
            .wait_while(state, |s| {
                s.is_open() && (s.completed < self.worker_count || s.claimed == Some(s.round))
            })
            .map_err(|e| CycleError::LockPoisoned(e.to_string()))?;
        state.check_open()?;

        state.claimed = Some(state.round);
        Ok(CompletedRound {
            round: state.round,
            dimension: state.dimension,
        })
    }

    /// Installs brand-new operands, resets the arrival count and releases every waiting worker.
    ///
    /// Returns the number of the round that just started.
    pub fn install_next_round(&self, left: Matrix, right: Matrix) -> Result<u64, CycleError> {
        self.install_next_round_with(left, right, |_| {})
    }

    /// Same as `install_next_round`, but calls `announce` with the new round number once it is installed.
    ///
    /// `announce` runs under the lock, before any worker can observe the new round, and is skipped when the
    /// install fails.
    pub fn install_next_round_with(
        &self,
        left: Matrix,
        right: Matrix,
        announce: impl FnOnce(u64),
    ) -> Result<u64, CycleError> {
        if left.dimension() != right.dimension() {
            return Err(CycleError::OperandMismatch {
                left: left.dimension(),
                right: right.dimension(),
            });
        }
        let dimension = left.dimension();
        let (left, right) = (Arc::new(left), Arc::new(right));

        let mut state = self.lock()?;
        state.check_open()?;

        if state.completed != self.worker_count {
            return Err(CycleError::RoundNotFinished {
                completed: state.completed,
                worker_count: self.worker_count,
            });
        }

        state.dimension = dimension;
        state.left = left;
        state.right = right;
        state.completed = 0;
        state.claimed = None;
        state.round += 1;
        announce(state.round);
        self.cnd.notify_all();

        Ok(state.round)
    }

    /// Cancels the cycle. Every blocked task wakes up and returns `CycleError::Cancelled`.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cancelled = true;
        self.cnd.notify_all();
    }

    /// Marks the cycle as faulted so nobody is left waiting on a task that is gone.
    ///
    /// Only the first reason is kept.
    pub fn fault(&self, reason: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.fault.is_none() {
            state.fault = Some(reason.into());
        }
        self.cnd.notify_all();
    }
}
