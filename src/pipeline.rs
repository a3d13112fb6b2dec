//! The phase orchestrator.
//!
//! [`Pipeline`] owns the command channel, the store connection, and the
//! operator prompt for one run, and sequences the two phases:
//!
//! Phase 1 (unattended): candidate query → export job → insert IN →
//! process job.
//!
//! Phase 2 (gated): re-query candidates → operator confirmation →
//! export job → insert IN → insert OUT → process job → verification report.
//!
//! The first timed-out or failed job run, or any store error, aborts the
//! pipeline; every exit path, success, failure, or operator cancellation,
//! passes through the same idempotent teardown exactly once.

use std::time::Duration;
use tracing::{debug, error, info};

use crate::channel::CommandChannel;
use crate::config::Config;
use crate::errors::PipelineError;
use crate::gate::{GateAnswer, Operator};
use crate::job::{self, Job, JobRun, JobStatus, PollSettings};
use crate::script::ScriptSet;
use crate::store::{ContractRecord, Store};
use crate::ui::PipelineUI;

/// Tables bound into the candidate queries, in placeholder order.
pub const CANDIDATE_TABLES: [&str; 2] = ["transaction", "transaction_out"];
/// Tables bound into both magic inserts, in placeholder order.
pub const INSERT_TABLES: [&str; 4] = ["transaction_in", "transaction_out", "transaction", "account"];
/// Tables bound into the final verification join, in placeholder order.
pub const VERIFY_TABLES: [&str; 3] = ["transaction", "transaction_in", "transaction_out"];

/// Overall run state. `Aborted` is terminal; no step resumes after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Init,
    Running,
    Aborted,
    Completed,
}

/// Everything the orchestrator needs besides its live resources.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub scripts: ScriptSet,
    pub export_job: Job,
    pub process_job: Job,
    pub poll: PollSettings,
    pub settle: Duration,
    pub verbose: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config, scripts: ScriptSet) -> Self {
        Self {
            scripts,
            export_job: config.export_job(),
            process_job: config.process_job(),
            poll: config.poll,
            settle: config.settle,
            verbose: config.verbose,
        }
    }
}

pub struct Pipeline<C, S, O>
where
    C: CommandChannel,
    S: Store,
    O: Operator,
{
    channel: C,
    store: S,
    operator: O,
    settings: PipelineSettings,
    ui: PipelineUI,
    status: PipelineStatus,
    current_phase: usize,
    torn_down: bool,
}

impl<C, S, O> Pipeline<C, S, O>
where
    C: CommandChannel,
    S: Store,
    O: Operator,
{
    pub fn new(channel: C, store: S, operator: O, settings: PipelineSettings) -> Self {
        let ui = PipelineUI::new(settings.verbose);
        Self {
            channel,
            store,
            operator,
            settings,
            ui,
            status: PipelineStatus::Init,
            current_phase: 0,
            torn_down: false,
        }
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    /// 0 before phase 1 starts, then the index of the phase in progress.
    pub fn current_phase(&self) -> usize {
        self.current_phase
    }

    /// Run both phases, then tear down unconditionally.
    ///
    /// This is the single entry point: success, failure, and operator
    /// cancellation all release resources here, exactly once.
    pub async fn execute(&mut self) -> Result<(), PipelineError> {
        let result = self.run().await;
        match &result {
            Ok(()) => info!("pipeline completed"),
            Err(e) if e.is_cancellation() => {
                self.status = PipelineStatus::Aborted;
                info!("session terminated by operator");
            }
            Err(e) => {
                self.status = PipelineStatus::Aborted;
                error!(error = %e, "pipeline aborted");
            }
        }
        self.teardown().await;
        result
    }

    async fn run(&mut self) -> Result<(), PipelineError> {
        self.status = PipelineStatus::Running;
        info!("all connections are set, starting to process");

        self.phase_one().await?;
        self.phase_two().await?;

        self.status = PipelineStatus::Completed;
        Ok(())
    }

    /// Phase 1 runs unattended once started.
    async fn phase_one(&mut self) -> Result<(), PipelineError> {
        self.current_phase = 1;
        self.ui.phase_header("First sequence");

        let candidates = self
            .store
            .query_contracts(&self.settings.scripts.phase_one_query, &CANDIDATE_TABLES)
            .await?;
        self.report_candidates(&candidates);

        let export = self.settings.export_job.clone();
        self.run_job(&export).await?;

        let insert_in = self.settings.scripts.insert_in.clone();
        let rows = self.store.insert(&insert_in, &INSERT_TABLES).await?;
        self.ui.inserted("First sequence - transactions", rows);
        tokio::time::sleep(self.settings.settle).await;

        let process = self.settings.process_job.clone();
        self.run_job(&process).await?;
        Ok(())
    }

    /// Phase 2: the operator is expected to have acted out-of-band between
    /// phases, so the candidate set is re-queried and confirmed at the gate
    /// before anything runs.
    async fn phase_two(&mut self) -> Result<(), PipelineError> {
        self.current_phase = 2;
        self.ui.gate_instructions();
        self.gate_loop().await?;

        self.ui.phase_header("Second sequence");
        let export = self.settings.export_job.clone();
        self.run_job(&export).await?;

        let insert_in = self.settings.scripts.insert_in.clone();
        let rows_in = self.store.insert(&insert_in, &INSERT_TABLES).await?;
        self.ui.inserted("Second sequence - transactions IN", rows_in);
        tokio::time::sleep(self.settings.settle).await;

        let insert_out = self.settings.scripts.insert_out.clone();
        let rows_out = self.store.insert(&insert_out, &INSERT_TABLES).await?;
        self.ui.inserted("Second sequence - transactions OUT", rows_out);
        tokio::time::sleep(self.settings.settle).await;

        let process = self.settings.process_job.clone();
        self.run_job(&process).await?;

        self.verify().await;
        Ok(())
    }

    /// Loop until the operator gives a recognized answer. Unrecognized
    /// input re-queries the candidate set and re-displays the count.
    async fn gate_loop(&mut self) -> Result<Vec<ContractRecord>, PipelineError> {
        loop {
            let candidates = self
                .store
                .query_contracts(&self.settings.scripts.phase_two_query, &CANDIDATE_TABLES)
                .await?;
            self.ui.candidate_count(candidates.len());
            info!(count = candidates.len(), "loans ready for second sequence");

            let line = self.operator.read_line("Enter")?;
            match GateAnswer::parse(&line) {
                GateAnswer::Proceed => {
                    self.report_candidates(&candidates);
                    return Ok(candidates);
                }
                GateAnswer::Cancel => {
                    debug!("operator declined at confirmation gate");
                    return Err(PipelineError::OperatorCancel);
                }
                GateAnswer::Refresh => continue,
            }
        }
    }

    /// Launch one job and poll for its completion marker. A timed-out run
    /// is fatal; the orchestrator never retries it.
    async fn run_job(&mut self, job: &Job) -> Result<JobRun, PipelineError> {
        let mut run = JobRun::new(job.name());
        job::launch(&mut self.channel, job, &mut run).await?;

        let status =
            job::confirm(&mut self.channel, job, &mut run, self.settings.poll, Some(&self.ui))
                .await?;
        match status {
            JobStatus::Completed => Ok(run),
            _ => Err(PipelineError::JobTimeout {
                job: job.name().to_string(),
                attempts: run.attempts,
            }),
        }
    }

    /// Post-commit verification join. Read-only, so a store error here is
    /// logged and reported but does not abort or roll anything back.
    async fn verify(&mut self) {
        match self
            .store
            .verify(&self.settings.scripts.verify_query, &VERIFY_TABLES)
            .await
        {
            Ok(records) => {
                if records.is_empty() {
                    info!("no loans for final check found");
                } else {
                    for record in &records {
                        info!(
                            contract = %record.contract_no,
                            status = %record.status,
                            transaction_out_id = ?record.transaction_out_id,
                            transaction_in_id = ?record.transaction_in_id,
                            "final check"
                        );
                    }
                }
                self.ui.verify_report(&records);
            }
            Err(e) => error!(error = %e, "verification query failed"),
        }
    }

    fn report_candidates(&self, candidates: &[ContractRecord]) {
        self.ui.candidate_count(candidates.len());
        for record in candidates {
            info!(
                contract = %record.contract_no,
                status = %record.status,
                "contract going to be processed"
            );
            self.ui.contract_line(record);
        }
    }

    /// Idempotent resource release: store first, then the command channel,
    /// mirroring setup in reverse.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.store.close().await;
        self.channel.close().await;
        self.ui.teardown_note();
        info!("teardown complete");
    }
}
