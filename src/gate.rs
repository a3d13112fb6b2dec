//! The operator confirmation gate between the two phases.
//!
//! The orchestrator owns the gate loop; this module supplies the answer
//! grammar and the line-oriented prompt. Production reads through
//! `dialoguer`; tests substitute a scripted [`Operator`].

use dialoguer::Input;
use dialoguer::theme::ColorfulTheme;

use crate::errors::PipelineError;

/// What the operator's answer means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAnswer {
    /// `y`, `yes`, `ye` — continue into phase 2.
    Proceed,
    /// `n`, `no` — clean cancellation, same teardown as a failure.
    Cancel,
    /// Anything else — re-query the candidate set and prompt again.
    Refresh,
}

impl GateAnswer {
    /// Case-insensitive, whitespace-trimmed answer parsing.
    pub fn parse(line: &str) -> Self {
        match line.trim().to_lowercase().as_str() {
            "y" | "yes" | "ye" => GateAnswer::Proceed,
            "n" | "no" => GateAnswer::Cancel,
            _ => GateAnswer::Refresh,
        }
    }
}

/// One line of operator input at the gate.
pub trait Operator: Send {
    fn read_line(&mut self, prompt: &str) -> Result<String, PipelineError>;
}

/// Production operator prompt on the controlling terminal.
pub struct ConsoleOperator;

impl Operator for ConsoleOperator {
    fn read_line(&mut self, prompt: &str) -> Result<String, PipelineError> {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| PipelineError::ChannelIo {
                message: format!("operator prompt failed: {e}"),
            })
    }
}
