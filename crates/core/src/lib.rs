//! # CPE Core
//!
//! Domain model and transition engine for patient enrollment in structured
//! care programs.
//!
//! A [`Program`] owns independent [`ProgramWorkflow`]s, each a closed set of
//! mutually exclusive [`ProgramWorkflowState`]s with a transition legality
//! rule. A [`PatientProgram`] is one patient's enrollment in a program and
//! owns its full history of [`PatientState`] intervals across all workflows.
//! The engine validates and applies transitions, answers point-in-time
//! queries, and supports retroactive correction by voiding from the tail of
//! a workflow's history.
//!
//! Everything here is a pure in-memory mutation: no I/O, no locking, no
//! persistence. A service layer persists enrollments after these calls
//! return and is responsible for serialising concurrent mutators.

pub mod attributes;
pub mod audit;
pub mod concept;
pub mod definition;
pub mod enrollment;
pub mod error;
pub mod ids;
pub mod ordering;
pub mod program;
pub mod text;

pub use attributes::{PatientProgramAttribute, ProgramAttributeType};
pub use audit::{Audit, VoidInfo};
pub use concept::{Concept, ConceptName};
pub use definition::ProgramDefinition;
pub use enrollment::{PatientProgram, PatientState};
pub use error::{ProgramError, ProgramResult};
pub use ids::{LocationRef, PatientRef, UserRef};
pub use program::{Program, ProgramWorkflow, ProgramWorkflowState};
pub use text::{NonEmptyText, TextError};
