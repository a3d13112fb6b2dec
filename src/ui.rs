//! Operator-facing terminal output, rendered via `console` and `indicatif`.
//!
//! Tracing goes to the run log; this module is what the human at the
//! keyboard sees: the connection banner, per-phase headers, candidate
//! counts, a spinner while the poller waits, and the final verification
//! report.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::store::{ContractRecord, VerifyRecord};

pub struct PipelineUI {
    spinner: ProgressBar,
    verbose: bool,
}

impl PipelineUI {
    pub fn new(verbose: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("spinner template is a valid static string"),
        );
        Self { spinner, verbose }
    }

    pub fn banner(&self, host: &str) {
        let rule = "*".repeat(48);
        println!("{rule}");
        println!("  Store and command channel established");
        println!("  HOST: {}", style(host).bold());
        println!("{rule}");
    }

    pub fn phase_header(&self, title: &str) {
        println!("\n{} {} {}", "*".repeat(11), style(title).bold(), "*".repeat(11));
    }

    pub fn candidate_count(&self, count: usize) {
        println!(
            "\n{} transactions to be processed",
            style(count.to_string()).bold().cyan()
        );
    }

    pub fn contract_line(&self, record: &ContractRecord) {
        if self.verbose {
            println!(
                "  contract {}  status {}",
                record.contract_no, record.status
            );
        }
    }

    pub fn gate_instructions(&self) {
        println!(
            "\nInvest the loan demand as a user in the investor role, then confirm:\n  {} to continue, {} to quit, any other key to reload the candidate count.",
            style("y").green(),
            style("n").red()
        );
    }

    pub fn poll_start(&self, job: &str) {
        self.spinner.reset();
        self.spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner
            .set_message(format!("Waiting for {job} completion ..."));
    }

    pub fn poll_attempt(&self, job: &str, elapsed_secs: u64) {
        self.spinner.set_message(format!(
            "Looking for confirmation of {job} completion: {elapsed_secs} sec ..."
        ));
    }

    pub fn poll_finished(&self, job: &str) {
        self.spinner.finish_and_clear();
        println!("{} {job} finished with status COMPLETED", style("✔").green());
    }

    pub fn poll_timed_out(&self, job: &str, attempts: u32) {
        self.spinner.finish_and_clear();
        println!(
            "{} {job} did not confirm completion within {attempts} attempts",
            style("✘").red()
        );
    }

    pub fn inserted(&self, label: &str, rows: u64) {
        println!("{label}: {} rows inserted", style(rows.to_string()).bold());
    }

    pub fn verify_report(&self, records: &[VerifyRecord]) {
        println!(
            "\nFinal count of loans processed in recent time: {}",
            style(records.len().to_string()).bold().cyan()
        );
        for (index, record) in records.iter().enumerate() {
            println!(
                "{}. Contract number: {}\n   Transaction status: {}\n   transaction_out_id: {}\n   transaction_in_id: {}",
                index + 1,
                record.contract_no,
                record.status,
                display_id(record.transaction_out_id),
                display_id(record.transaction_in_id),
            );
        }
    }

    pub fn teardown_note(&self) {
        println!("\nStore connection and command channel fully terminated");
    }
}

fn display_id(id: Option<i64>) -> String {
    id.map_or_else(|| "-".to_string(), |v| v.to_string())
}
