//! Error types for the care program engine.
//!
//! All engine operations are synchronous, in-memory mutations, so every error
//! here is a caller-input error surfaced at the call site. Nothing is retried
//! and nothing is partially applied: a rejected transition leaves the
//! enrollment untouched.

use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("a change date is required to leave state {current}")]
    MissingChangeDate { current: String },

    #[error("cannot leave state {current}: it already ended on {ended}")]
    StateAlreadyClosed { current: String, ended: NaiveDate },

    #[error("cannot close state {current} on {requested}: it did not start until {started}")]
    TransitionBeforeStart {
        current: String,
        started: NaiveDate,
        requested: NaiveDate,
    },

    #[error("transition from {from} to {to} is not allowed in workflow {workflow}")]
    IllegalTransition {
        workflow: String,
        from: String,
        to: String,
    },

    #[error("state {state} does not belong to workflow {workflow}")]
    StateNotInWorkflow { state: String, workflow: String },

    #[error("workflow {workflow} already has a state for concept {concept}")]
    DuplicateStateConcept { workflow: String, concept: String },

    #[error("state history in workflow {workflow} is inconsistent: {detail}")]
    InconsistentHistory { workflow: String, detail: String },

    #[error("program definition schema mismatch at {path}: {message}")]
    DefinitionSchema { path: String, message: String },

    #[error("invalid UUID in {field}: {value}")]
    InvalidUuid { field: String, value: String },

    #[error("failed to serialize program definition: {0}")]
    DefinitionSerialization(serde_yaml::Error),
}

pub type ProgramResult<T> = std::result::Result<T, ProgramError>;
