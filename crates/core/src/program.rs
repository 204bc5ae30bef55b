//! Program, workflow and state definitions.
//!
//! A `Program` names a care initiative and owns a set of independent
//! `ProgramWorkflow`s (axes of status such as "treatment status"). Each
//! workflow owns a closed set of mutually exclusive `ProgramWorkflowState`s
//! and the legality rule for moving between them. Definitions are
//! administrator-authored and effectively immutable once enrollments exist;
//! states are retired rather than deleted so old histories keep resolving.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::concept::Concept;
use crate::enrollment::PatientProgram;
use crate::error::{ProgramError, ProgramResult};
use crate::ordering::natural_order;

// ============================================================================
// ProgramWorkflowState
// ============================================================================

/// A single node in a workflow's state graph, identified by a concept.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgramWorkflowState {
    uuid: Uuid,
    concept: Concept,
    initial: bool,
    terminal: bool,
    retired: bool,
}

impl ProgramWorkflowState {
    /// Define a state.
    ///
    /// `initial` marks the state as eligible to open a workflow's history;
    /// `terminal` marks it as completing the whole enrollment on entry. A
    /// state may be both.
    pub fn new(uuid: Uuid, concept: Concept, initial: bool, terminal: bool) -> Self {
        Self {
            uuid,
            concept,
            initial,
            terminal,
            retired: false,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn concept(&self) -> &Concept {
        &self.concept
    }

    pub fn display_name(&self) -> &str {
        self.concept.display()
    }

    pub fn is_initial(&self) -> bool {
        self.initial
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Retire the state so it is no longer offered as a transition target.
    /// Existing history that references it stays valid.
    pub fn retire(&mut self) {
        self.retired = true;
    }
}

impl PartialEq for ProgramWorkflowState {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for ProgramWorkflowState {}

// ============================================================================
// ProgramWorkflow
// ============================================================================

/// One independent axis of status within a program.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgramWorkflow {
    uuid: Uuid,
    concept: Concept,
    states: Vec<ProgramWorkflowState>,
    retired: bool,
}

impl ProgramWorkflow {
    pub fn new(uuid: Uuid, concept: Concept) -> Self {
        Self {
            uuid,
            concept,
            states: Vec::new(),
            retired: false,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn concept(&self) -> &Concept {
        &self.concept
    }

    pub fn display_name(&self) -> &str {
        self.concept.display()
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn retire(&mut self) {
        self.retired = true;
    }

    pub fn states(&self) -> &[ProgramWorkflowState] {
        &self.states
    }

    /// Add a state to the workflow.
    ///
    /// # Errors
    ///
    /// Returns `ProgramError::DuplicateStateConcept` if the workflow already
    /// has a state for the same concept (state identity within a workflow is
    /// unique by concept), and `ProgramError::InvalidInput` on a duplicate
    /// state uuid.
    pub fn add_state(&mut self, state: ProgramWorkflowState) -> ProgramResult<()> {
        if self.states.iter().any(|s| s.uuid() == state.uuid()) {
            return Err(ProgramError::InvalidInput(format!(
                "workflow {} already has a state with uuid {}",
                self.display_name(),
                state.uuid()
            )));
        }
        if self
            .states
            .iter()
            .any(|s| s.concept() == state.concept())
        {
            return Err(ProgramError::DuplicateStateConcept {
                workflow: self.display_name().to_string(),
                concept: state.concept().display().to_string(),
            });
        }
        self.states.push(state);
        Ok(())
    }

    /// Look up a state by its uuid.
    pub fn state_by_uuid(&self, uuid: Uuid) -> Option<&ProgramWorkflowState> {
        self.states.iter().find(|s| s.uuid() == uuid)
    }

    /// Look up a state by the uuid of its concept.
    pub fn state_by_concept(&self, concept_uuid: Uuid) -> Option<&ProgramWorkflowState> {
        self.states.iter().find(|s| s.concept().uuid() == concept_uuid)
    }

    /// Look up a state by name.
    ///
    /// Matches against any name the state's concept carries in any locale;
    /// the first matching state wins.
    pub fn state_by_name(&self, name: &str) -> Option<&ProgramWorkflowState> {
        self.states.iter().find(|s| s.concept().has_name(name))
    }

    /// Whether moving from `from` to `to` is allowed.
    ///
    /// With no current state, only states flagged initial may be entered.
    /// From a current state, any other state is reachable; only the
    /// self-transition is rejected. Stricter adjacency graphs are a caller
    /// concern layered on top of this rule.
    pub fn is_legal_transition(
        &self,
        from: Option<&ProgramWorkflowState>,
        to: &ProgramWorkflowState,
    ) -> bool {
        match from {
            None => to.is_initial(),
            Some(from) => from.uuid() != to.uuid(),
        }
    }

    /// The states the given enrollment could legally move to next in this
    /// workflow, sorted by display name in natural order.
    ///
    /// Retired states stay resolvable in history but are never offered as
    /// transition targets.
    pub fn possible_next_states(&self, enrollment: &PatientProgram) -> Vec<&ProgramWorkflowState> {
        let current = enrollment
            .current_state(Some(self))
            .and_then(|patient_state| self.state_by_uuid(patient_state.state_uuid()));

        let mut candidates: Vec<&ProgramWorkflowState> = self
            .states
            .iter()
            .filter(|candidate| !candidate.is_retired())
            .filter(|candidate| self.is_legal_transition(current, candidate))
            .collect();
        candidates.sort_by(|a, b| natural_order(a.display_name(), b.display_name()));
        candidates
    }
}

impl PartialEq for ProgramWorkflow {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for ProgramWorkflow {}

// ============================================================================
// Program
// ============================================================================

/// A named care initiative owning a set of workflows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Program {
    uuid: Uuid,
    concept: Concept,
    workflows: Vec<ProgramWorkflow>,
    retired: bool,
}

impl Program {
    pub fn new(uuid: Uuid, concept: Concept) -> Self {
        Self {
            uuid,
            concept,
            workflows: Vec::new(),
            retired: false,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn concept(&self) -> &Concept {
        &self.concept
    }

    pub fn display_name(&self) -> &str {
        self.concept.display()
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn retire(&mut self) {
        self.retired = true;
    }

    pub fn workflows(&self) -> &[ProgramWorkflow] {
        &self.workflows
    }

    /// Add a workflow to the program.
    ///
    /// # Errors
    ///
    /// Returns `ProgramError::InvalidInput` on a duplicate workflow uuid.
    pub fn add_workflow(&mut self, workflow: ProgramWorkflow) -> ProgramResult<()> {
        if self.workflows.iter().any(|w| w.uuid() == workflow.uuid()) {
            return Err(ProgramError::InvalidInput(format!(
                "program {} already has a workflow with uuid {}",
                self.display_name(),
                workflow.uuid()
            )));
        }
        self.workflows.push(workflow);
        Ok(())
    }

    pub fn workflow_by_uuid(&self, uuid: Uuid) -> Option<&ProgramWorkflow> {
        self.workflows.iter().find(|w| w.uuid() == uuid)
    }

    /// Look up a workflow by any concept name in any locale.
    pub fn workflow_by_name(&self, name: &str) -> Option<&ProgramWorkflow> {
        self.workflows.iter().find(|w| w.concept().has_name(name))
    }

    /// The workflow that owns the state with the given uuid, if any.
    pub fn workflow_containing_state(&self, state_uuid: Uuid) -> Option<&ProgramWorkflow> {
        self.workflows
            .iter()
            .find(|w| w.state_by_uuid(state_uuid).is_some())
    }
}

impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for Program {}
