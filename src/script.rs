//! Loader for the `;`-delimited scripts file.
//!
//! The pipeline depends on exactly five statements in fixed positional
//! order; anything else fails before a connection is opened or a job is
//! launched.

use std::path::Path;
use tracing::{debug, info};

use crate::errors::PipelineError;

/// The five statements the pipeline executes, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptSet {
    pub phase_one_query: String,
    pub phase_two_query: String,
    pub insert_in: String,
    pub insert_out: String,
    pub verify_query: String,
}

impl ScriptSet {
    /// Load and validate the scripts file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::Script {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        debug!(path = %path.display(), "scripts file found");

        let set = Self::parse(&raw)?;
        info!(path = %path.display(), "scripts file loaded, 5 statements");
        Ok(set)
    }

    /// Split on `;`, trim, and require exactly five non-empty statements.
    ///
    /// A trailing `;` after the last statement is tolerated, so both
    /// "4 delimiters" and "5 delimiters with nothing after the last" parse.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let statements: Vec<String> = raw
            .split(';')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if statements.len() != 5 {
            return Err(PipelineError::Script {
                message: format!("expected 5 statements, found {}", statements.len()),
            });
        }

        let mut it = statements.into_iter();
        Ok(Self {
            phase_one_query: it.next().unwrap_or_default(),
            phase_two_query: it.next().unwrap_or_default(),
            insert_in: it.next().unwrap_or_default(),
            insert_out: it.next().unwrap_or_default(),
            verify_query: it.next().unwrap_or_default(),
        })
    }
}
