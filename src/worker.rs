// Copyright (c) Microsoft Corporation.

/// Provides the worker task: snapshot the round, multiply, report, wait at the barrier, repeat.
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, error, info};

use crate::cycle::{CycleError, CycleState};
use crate::matrix::{multiply, WorkloadError};
use crate::report::{ProgressEvent, Reporter};
use crate::shutdown::Shutdown;

/// Represents errors that end a worker's loop abnormally.
#[derive(Debug)]
pub enum WorkerError {
    Workload(WorkloadError),
    Cycle(CycleError),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Workload(e) => write!(f, "workload failed: {e}"),
            WorkerError::Cycle(e) => write!(f, "round protocol failed: {e}"),
        }
    }
}

impl std::error::Error for WorkerError {}

/// Trips the cycle fault and the stop signal if the owning thread unwinds.
///
/// Without it a panicking worker would never arrive at the barrier and everybody else would wait forever.
pub struct FaultGuard {
    task: String,
    cycle: Arc<CycleState>,
    shutdown: Arc<Shutdown>,
}

impl FaultGuard {
    pub fn new(task: String, cycle: Arc<CycleState>, shutdown: Arc<Shutdown>) -> Self {
        FaultGuard {
            task,
            cycle,
            shutdown,
        }
    }
}

impl Drop for FaultGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("{} panicked, aborting the run", self.task);
            self.cycle.fault(format!("{} panicked", self.task));
            self.shutdown.stop();
        }
    }
}

/// One of the fixed set of threads doing the round's work.
pub struct Worker {
    id: usize,
    cycle: Arc<CycleState>,
    shutdown: Arc<Shutdown>,
    reporter: Arc<dyn Reporter>,
}

impl Worker {
    pub fn new(
        id: usize,
        cycle: Arc<CycleState>,
        shutdown: Arc<Shutdown>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Worker {
            id,
            cycle,
            shutdown,
            reporter,
        }
    }

    /// Runs rounds until the cycle is cancelled and returns how many rounds this worker completed.
    ///
    /// Any other failure marks the cycle faulted and trips the stop signal before returning, so the generator
    /// and the other workers wake up instead of waiting on an arrival that will never come.
    pub fn run(self) -> Result<u64, WorkerError> {
        let result = self.run_rounds();
        match &result {
            Ok(rounds) => info!("worker {} stopped after {} round(s)", self.id, rounds),
            Err(WorkerError::Cycle(CycleError::Faulted(reason))) => {
                debug!("worker {} leaving faulted cycle: {}", self.id, reason)
            }
            Err(e) => {
                error!("worker {} failed: {}", self.id, e);
                self.cycle.fault(format!("worker {} failed: {}", self.id, e));
                self.shutdown.stop();
            }
        }
        result
    }

    fn run_rounds(&self) -> Result<u64, WorkerError> {
        let mut completed = 0;
        loop {
            let snapshot = match self.cycle.snapshot() {
                Ok(snapshot) => snapshot,
                Err(CycleError::Cancelled) => return Ok(completed),
                Err(e) => return Err(WorkerError::Cycle(e)),
            };
            debug!(
                "worker {} starting round {} at {}x{}",
                self.id, snapshot.round, snapshot.dimension, snapshot.dimension
            );

            debug_assert_eq!(snapshot.left.dimension(), snapshot.dimension);

            let start = Instant::now();
            let product =
                multiply(&snapshot.left, &snapshot.right).map_err(WorkerError::Workload)?;
            let elapsed = start.elapsed();
            let checksum = product.checksum().map_err(WorkerError::Workload)?;

            self.reporter.report(&ProgressEvent::WorkerRoundCompleted {
                worker_id: self.id,
                round: snapshot.round,
                dimension: snapshot.dimension,
                elapsed,
                checksum,
            });

            match self.cycle.arrive_and_wait(snapshot.round) {
                Ok(()) => completed += 1,
                Err(CycleError::Cancelled) => return Ok(completed + 1),
                Err(e) => return Err(WorkerError::Cycle(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use crate::report::recording::RecordingReporter;
    use std::time::Duration;

    fn cycle(worker_count: usize, dimension: usize) -> Arc<CycleState> {
        Arc::new(
            CycleState::new(
                worker_count,
                Matrix::filled(dimension, 1).unwrap(),
                Matrix::filled(dimension, 2).unwrap(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_worker_reports_and_stops_on_cancel() {
        let cycle = cycle(1, 10);
        let reporter = Arc::new(RecordingReporter::default());

        let handle = thread::spawn({
            let worker = Worker::new(
                0,
                Arc::clone(&cycle),
                Arc::new(Shutdown::new()),
                reporter.clone(),
            );
            move || worker.run()
        });

        let completed = cycle.await_all_arrived().unwrap();
        assert_eq!(completed.dimension, 10);
        cycle.cancel();

        assert_eq!(handle.join().unwrap().unwrap(), 1);

        let events = reporter.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProgressEvent::WorkerRoundCompleted {
                worker_id,
                round,
                dimension,
                checksum,
                ..
            } => {
                assert_eq!((*worker_id, *round, *dimension), (0, 0, 10));
                // every cell of ones x twos is 2n, and there are n² cells
                assert_eq!(*checksum, 20 * 100);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_worker_leaves_faulted_cycle() {
        let cycle = cycle(2, 2);
        let reporter = Arc::new(RecordingReporter::default());

        let handle = thread::spawn({
            let worker = Worker::new(1, Arc::clone(&cycle), Arc::new(Shutdown::new()), reporter);
            move || worker.run()
        });

        thread::sleep(Duration::from_millis(50));
        cycle.fault("worker 0 failed");

        match handle.join().unwrap() {
            Err(WorkerError::Cycle(CycleError::Faulted(reason))) => {
                assert_eq!(reason, "worker 0 failed")
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_workload_error_faults_cycle_and_stops_run() {
        let cycle = Arc::new(
            CycleState::new(
                2,
                Matrix::filled(2, 4_000_000_000).unwrap(),
                Matrix::filled(2, 4_000_000_000).unwrap(),
            )
            .unwrap(),
        );
        let shutdown = Arc::new(Shutdown::new());
        let reporter = Arc::new(RecordingReporter::default());

        let result = Worker::new(0, Arc::clone(&cycle), shutdown.clone(), reporter.clone()).run();

        assert!(matches!(
            result,
            Err(WorkerError::Workload(WorkloadError::Overflow { row: 0, col: 0 }))
        ));
        assert!(shutdown.is_stopped());
        assert!(reporter.events().is_empty());
        match cycle.snapshot() {
            Err(CycleError::Faulted(reason)) => assert!(reason.contains("worker 0 failed")),
            other => panic!("unexpected snapshot {other:?}"),
        }
    }

    #[test]
    fn test_fault_guard_trips_on_panic() {
        let cycle = cycle(2, 2);
        let shutdown = Arc::new(Shutdown::new());

        let handle = thread::spawn({
            let guard = FaultGuard::new("worker 0".to_string(), Arc::clone(&cycle), shutdown.clone());
            move || {
                let _guard = guard;
                panic!("boom");
            }
        });

        assert!(handle.join().is_err());
        assert!(shutdown.is_stopped());
        assert_eq!(
            cycle.snapshot().map(|s| s.round),
            Err(CycleError::Faulted("worker 0 panicked".to_string()))
        );
    }

    #[test]
    fn test_fault_guard_is_quiet_on_normal_exit() {
        let cycle = cycle(1, 2);
        let shutdown = Arc::new(Shutdown::new());

        drop(FaultGuard::new("worker 0".to_string(), Arc::clone(&cycle), shutdown.clone()));

        assert!(!shutdown.is_stopped());
        assert!(cycle.snapshot().is_ok());
    }
}
