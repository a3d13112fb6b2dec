//! Job descriptors, run state, and the completion poller.
//!
//! Two fixed jobs exist per pipeline run: the homebanking export job and the
//! transaction process job. Each carries a launch command and a
//! completion-check command built as argument lists. The poller waits a
//! grace delay, then checks at a fixed interval up to a bounded number of
//! attempts; the completion marker is exit status 0 with at least one
//! output line.

use std::time::Duration;
use tracing::{error, info};

use crate::channel::CommandChannel;
use crate::errors::PipelineError;
use crate::ui::PipelineUI;

/// Immutable descriptor of one remote job.
#[derive(Debug, Clone)]
pub struct Job {
    name: String,
    launch: Vec<String>,
    check: Vec<String>,
}

impl Job {
    pub fn new(name: &str, launch: Vec<String>, check: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            launch,
            check,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn launch_argv(&self) -> &[String] {
        &self.launch
    }

    pub fn check_argv(&self) -> &[String] {
        &self.check
    }
}

/// Terminal-state machine for one launched job.
///
/// Status only moves Running → {Completed, TimedOut, Failed}; transition
/// methods are no-ops once a terminal state is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    TimedOut,
    Failed,
}

#[derive(Debug, Clone)]
pub struct JobRun {
    pub job_name: String,
    pub attempts: u32,
    status: JobStatus,
}

impl JobRun {
    pub fn new(job_name: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            attempts: 0,
            status: JobStatus::Running,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn complete(&mut self) {
        if self.status == JobStatus::Running {
            self.status = JobStatus::Completed;
        }
    }

    pub fn time_out(&mut self) {
        if self.status == JobStatus::Running {
            self.status = JobStatus::TimedOut;
        }
    }

    pub fn fail(&mut self) {
        if self.status == JobStatus::Running {
            self.status = JobStatus::Failed;
        }
    }
}

/// Poller timing. Per-job wall-clock budget = grace + max_attempts × interval.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub grace: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(20),
            interval: Duration::from_secs(10),
            max_attempts: 10,
        }
    }
}

/// Launch a job on the remote host. Any nonzero exit status is fatal.
pub async fn launch(
    channel: &mut dyn CommandChannel,
    job: &Job,
    run: &mut JobRun,
) -> Result<(), PipelineError> {
    info!(job = job.name(), "launching remote job");
    let output = match channel.execute(job.launch_argv()).await {
        Ok(output) => output,
        Err(e) => {
            run.fail();
            return Err(e);
        }
    };

    if !output.success() {
        for line in &output.stderr {
            error!(job = job.name(), stderr = %line, "launch stderr");
        }
        run.fail();
        return Err(PipelineError::JobLaunch {
            job: job.name().to_string(),
            exit_code: output.exit_code,
        });
    }
    Ok(())
}

/// Poll for the job's completion marker.
///
/// Returns `Ok(Completed)` as soon as a check succeeds, `Ok(TimedOut)` once
/// `max_attempts` are exhausted with no further attempt issued. Channel
/// errors mark the run failed and propagate.
pub async fn confirm(
    channel: &mut dyn CommandChannel,
    job: &Job,
    run: &mut JobRun,
    settings: PollSettings,
    ui: Option<&PipelineUI>,
) -> Result<JobStatus, PipelineError> {
    if let Some(ui) = ui {
        ui.poll_start(job.name());
    }
    tokio::time::sleep(settings.grace).await;

    for attempt in 1..=settings.max_attempts {
        tokio::time::sleep(settings.interval).await;
        run.attempts = attempt;

        let elapsed = settings.grace.as_secs() + u64::from(attempt) * settings.interval.as_secs();
        if let Some(ui) = ui {
            ui.poll_attempt(job.name(), elapsed);
        }
        info!(
            job = job.name(),
            attempt,
            elapsed_secs = elapsed,
            "checking for completion marker"
        );

        let output = match channel.execute(job.check_argv()).await {
            Ok(output) => output,
            Err(e) => {
                run.fail();
                return Err(e);
            }
        };

        if output.has_marker() {
            run.complete();
            info!(job = job.name(), attempt, "job FINISHED");
            if let Some(ui) = ui {
                ui.poll_finished(job.name());
            }
            return Ok(JobStatus::Completed);
        }
        info!(
            job = job.name(),
            exit_code = output.exit_code,
            "no completion marker yet"
        );
    }

    run.time_out();
    error!(
        job = job.name(),
        attempts = settings.max_attempts,
        "completion window expired"
    );
    if let Some(ui) = ui {
        ui.poll_timed_out(job.name(), settings.max_attempts);
    }
    Ok(JobStatus::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_is_running_with_no_attempts() {
        let run = JobRun::new("homebankingExportJob");
        assert_eq!(run.status(), JobStatus::Running);
        assert_eq!(run.attempts, 0);
    }

    #[test]
    fn terminal_status_never_reverses() {
        let mut run = JobRun::new("transactionProcessJob");
        run.complete();
        assert_eq!(run.status(), JobStatus::Completed);

        // Further transitions are ignored once terminal.
        run.time_out();
        run.fail();
        assert_eq!(run.status(), JobStatus::Completed);
    }

    #[test]
    fn timed_out_is_terminal() {
        let mut run = JobRun::new("homebankingExportJob");
        run.time_out();
        run.complete();
        assert_eq!(run.status(), JobStatus::TimedOut);
    }

    #[test]
    fn default_poll_budget_matches_two_minute_window() {
        let settings = PollSettings::default();
        let budget =
            settings.grace + settings.interval * settings.max_attempts;
        assert_eq!(budget, Duration::from_secs(120));
    }
}
