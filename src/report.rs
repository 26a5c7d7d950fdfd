// Copyright (c) Microsoft Corporation.

/// Provides progress reporting.
///
/// Tasks emit `ProgressEvent`s through a `Reporter`. How they end up on screen is up to the reporter: human
/// banners on the console, or one JSON object per line for piping into other tools.
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

/// Something worth telling the user about.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A worker finished its multiplication for a round.
    WorkerRoundCompleted {
        worker_id: usize,
        round: u64,
        dimension: usize,
        elapsed: Duration,
        checksum: i64,
    },
    /// The generator installed fresh operands and released the workers.
    NewRoundStarted { round: u64, dimension: usize },
    /// The run stopped. `rounds` counts rounds every worker finished.
    RunFinished { rounds: u64, final_dimension: usize },
}

/// Consumer of progress events. Shared by every task, hence `Send + Sync`.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Prints banners to standard output.
pub struct ConsoleReporter;

impl ConsoleReporter {
    fn render(event: &ProgressEvent) -> String {
        match event {
            ProgressEvent::WorkerRoundCompleted {
                worker_id,
                round,
                dimension,
                elapsed,
                checksum,
            } => format!(
                "=============================================\n\
                 >>> Worker {worker_id} completed matrix multiplication (round {round})\n\
                 Matrix size : {dimension}x{dimension}\n\
                 Checksum    : {checksum}\n\
                 Lead time   : [{:.6} seconds]\n\
                 =============================================",
                elapsed.as_secs_f64()
            ),
            ProgressEvent::NewRoundStarted { round, dimension } => format!(
                "\n---------------------------------------------------\n\
                 Generator: round {round} uses new matrices of size {dimension}x{dimension}\n\
                 ---------------------------------------------------"
            ),
            ProgressEvent::RunFinished {
                rounds,
                final_dimension,
            } => format!(
                "Finished after {rounds} complete round(s), last matrix size {final_dimension}x{final_dimension}"
            ),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: &ProgressEvent) {
        println!("{}", Self::render(event));
    }
}

/// Prints one JSON object per event, each tagged with the id of the run that produced it.
pub struct JsonReporter {
    run_id: Uuid,
}

impl JsonReporter {
    pub fn new() -> Self {
        JsonReporter {
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn to_json(&self, event: &ProgressEvent) -> serde_json::Value {
        let run_id = self.run_id.to_string();
        match event {
            ProgressEvent::WorkerRoundCompleted {
                worker_id,
                round,
                dimension,
                elapsed,
                checksum,
            } => json!({
                "run_id": run_id,
                "event": "worker_round_completed",
                "worker_id": worker_id,
                "round": round,
                "dimension": dimension,
                "elapsed_secs": elapsed.as_secs_f64(),
                "checksum": checksum,
            }),
            ProgressEvent::NewRoundStarted { round, dimension } => json!({
                "run_id": run_id,
                "event": "new_round_started",
                "round": round,
                "dimension": dimension,
            }),
            ProgressEvent::RunFinished {
                rounds,
                final_dimension,
            } => json!({
                "run_id": run_id,
                "event": "run_finished",
                "rounds": rounds,
                "final_dimension": final_dimension,
            }),
        }
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for JsonReporter {
    fn report(&self, event: &ProgressEvent) {
        println!("{}", self.to_json(event));
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_banner_mentions_size_and_worker() {
        let text = ConsoleReporter::render(&ProgressEvent::WorkerRoundCompleted {
            worker_id: 3,
            round: 1,
            dimension: 20,
            elapsed: Duration::from_millis(1500),
            checksum: 16000,
        });

        assert!(text.contains(">>> Worker 3 completed"));
        assert!(text.contains("Matrix size : 20x20"));
        assert!(text.contains("[1.500000 seconds]"));

        let text = ConsoleReporter::render(&ProgressEvent::NewRoundStarted {
            round: 2,
            dimension: 40,
        });
        assert!(text.contains("new matrices of size 40x40"));
    }

    #[test]
    fn test_json_lines_carry_run_id_and_fields() {
        let reporter = JsonReporter::new();

        let value = reporter.to_json(&ProgressEvent::WorkerRoundCompleted {
            worker_id: 0,
            round: 4,
            dimension: 160,
            elapsed: Duration::from_millis(250),
            checksum: 42,
        });
        assert_eq!(value["run_id"], reporter.run_id().to_string());
        assert_eq!(value["event"], "worker_round_completed");
        assert_eq!(value["dimension"], 160);
        assert_eq!(value["elapsed_secs"], 0.25);

        let value = reporter.to_json(&ProgressEvent::RunFinished {
            rounds: 5,
            final_dimension: 320,
        });
        assert_eq!(value["event"], "run_finished");
        assert_eq!(value["rounds"], 5);
    }

    #[test]
    fn test_reporters_have_distinct_run_ids() {
        assert_ne!(JsonReporter::new().run_id(), JsonReporter::new().run_id());
    }
}
