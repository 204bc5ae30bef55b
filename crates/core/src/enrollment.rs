//! Patient enrollments and the state transition engine.
//!
//! A `PatientProgram` is one patient's enrollment in a program. It owns the
//! full multiset of `PatientState` intervals across every workflow of that
//! program, and all mutations of that history go through it: transitions
//! close the current interval and open a new one, corrections void from the
//! tail and reopen the interval before it. `PatientState` records reference
//! their workflow and state by uuid only; they never hold a live
//! back-reference to a definition or to their owner.
//!
//! The engine performs no I/O and offers no internal locking. An enrollment
//! is owned by one logical transaction at a time; the persistence layer is
//! expected to serialise mutators. `verify_history` gives callers a
//! fail-fast check of the interval invariants.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

use crate::attributes::PatientProgramAttribute;
use crate::audit::{Audit, VoidInfo};
use crate::error::{ProgramError, ProgramResult};
use crate::ids::{LocationRef, PatientRef, UserRef};
use crate::ordering::{cmp_end_dates, cmp_start_dates};
use crate::program::{Program, ProgramWorkflow, ProgramWorkflowState};

// ============================================================================
// PatientState
// ============================================================================

/// One `[start, end)` interval during which an enrollment occupied a single
/// workflow state.
///
/// A missing start date counts as "always started"; a missing end date means
/// the interval is still open. Intervals are only ever mutated by the owning
/// enrollment: closed by a transition, voided by a correction, or reopened
/// when the interval after them is voided.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatientState {
    uuid: Uuid,
    workflow_uuid: Uuid,
    state_uuid: Uuid,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    audit: Audit,
    void: Option<VoidInfo>,
}

impl PatientState {
    fn new(workflow_uuid: Uuid, state_uuid: Uuid, start_date: Option<NaiveDate>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            workflow_uuid,
            state_uuid,
            start_date,
            end_date: None,
            audit: Audit::created_now(),
            void: None,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The uuid of the workflow this interval belongs to.
    pub fn workflow_uuid(&self) -> Uuid {
        self.workflow_uuid
    }

    /// The uuid of the `ProgramWorkflowState` occupied during this interval.
    pub fn state_uuid(&self) -> Uuid {
        self.state_uuid
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn audit(&self) -> &Audit {
        &self.audit
    }

    pub fn void_info(&self) -> Option<&VoidInfo> {
        self.void.as_ref()
    }

    pub fn is_voided(&self) -> bool {
        self.void.is_some()
    }

    /// Whether this interval covers the given date.
    pub fn is_active_on(&self, on: NaiveDate) -> bool {
        !self.is_voided()
            && self.start_date.is_none_or(|start| start <= on)
            && self.end_date.is_none_or(|end| end > on)
    }

    /// Deep copy with a fresh identity, for enrollment duplication.
    fn duplicate(&self) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            workflow_uuid: self.workflow_uuid,
            state_uuid: self.state_uuid,
            start_date: self.start_date,
            end_date: self.end_date,
            audit: self.audit.clone(),
            void: self.void.clone(),
        }
    }
}

/// Chronological ordering of intervals within one workflow: by start date
/// (missing start earliest), then end date (missing end latest), then uuid
/// as a stable tie-break.
pub fn interval_order(a: &PatientState, b: &PatientState) -> Ordering {
    cmp_start_dates(a.start_date, b.start_date)
        .then_with(|| cmp_end_dates(a.end_date, b.end_date))
        .then_with(|| a.uuid.cmp(&b.uuid))
}

/// The last interval in a chronologically sorted slice that covers `on`.
///
/// With a well-formed history at most one interval per workflow is active on
/// any date; taking the last match keeps the answer deterministic when the
/// data violates that invariant, and such data is logged.
pub fn latest_active<'a>(
    sorted_states: &[&'a PatientState],
    on: NaiveDate,
) -> Option<&'a PatientState> {
    let mut current = None;
    let mut active_count = 0usize;
    for state in sorted_states {
        if state.is_active_on(on) {
            current = Some(*state);
            active_count += 1;
        }
    }
    if active_count > 1 {
        tracing::warn!(
            active_count,
            on = %on,
            "more than one active state interval in a single workflow"
        );
    }
    current
}

// ============================================================================
// PatientProgram
// ============================================================================

/// One patient's enrollment in a program.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatientProgram {
    uuid: Uuid,
    patient: PatientRef,
    program_uuid: Uuid,
    location: Option<LocationRef>,
    date_enrolled: Option<NaiveDate>,
    date_completed: Option<NaiveDate>,
    states: Vec<PatientState>,
    pub(crate) attributes: Vec<PatientProgramAttribute>,
    audit: Audit,
    void: Option<VoidInfo>,
}

impl PatientProgram {
    /// Enroll a patient in a program.
    pub fn enroll(
        patient: PatientRef,
        program: &Program,
        location: Option<LocationRef>,
        date_enrolled: Option<NaiveDate>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            patient,
            program_uuid: program.uuid(),
            location,
            date_enrolled,
            date_completed: None,
            states: Vec::new(),
            attributes: Vec::new(),
            audit: Audit::created_now(),
            void: None,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn patient(&self) -> PatientRef {
        self.patient
    }

    pub fn program_uuid(&self) -> Uuid {
        self.program_uuid
    }

    pub fn location(&self) -> Option<LocationRef> {
        self.location
    }

    pub fn date_enrolled(&self) -> Option<NaiveDate> {
        self.date_enrolled
    }

    pub fn set_date_enrolled(&mut self, date: Option<NaiveDate>) {
        self.date_enrolled = date;
    }

    pub fn date_completed(&self) -> Option<NaiveDate> {
        self.date_completed
    }

    /// Set the completion date directly.
    ///
    /// The engine sets this itself when a workflow enters a terminal state.
    /// Voiding that terminal state does not clear it; correcting the
    /// completion date after such a void is the caller's decision.
    pub fn set_date_completed(&mut self, date: NaiveDate) {
        self.date_completed = Some(date);
    }

    pub fn clear_date_completed(&mut self) {
        self.date_completed = None;
    }

    pub fn audit(&self) -> &Audit {
        &self.audit
    }

    pub fn void_info(&self) -> Option<&VoidInfo> {
        self.void.as_ref()
    }

    pub fn is_voided(&self) -> bool {
        self.void.is_some()
    }

    /// Void the whole enrollment.
    pub fn void(&mut self, voided_by: UserRef, date_voided: DateTime<Utc>, reason: &str) {
        self.void = Some(VoidInfo::new(voided_by, date_voided, reason));
    }

    /// Whether the enrollment is active on the given date: not voided,
    /// enrolled on or before it, and not yet completed by it.
    pub fn active_on(&self, on: NaiveDate) -> bool {
        !self.is_voided()
            && self.date_enrolled.is_none_or(|enrolled| enrolled <= on)
            && self.date_completed.is_none_or(|completed| completed > on)
    }

    /// Whether the enrollment is active today.
    pub fn is_active(&self) -> bool {
        self.active_on(Utc::now().date_naive())
    }

    /// Every owned interval, voided ones included, in insertion order.
    pub fn states(&self) -> &[PatientState] {
        &self.states
    }

    /// Look up an owned interval by its uuid.
    pub fn state_by_uuid(&self, uuid: Uuid) -> Option<&PatientState> {
        self.states.iter().find(|s| s.uuid() == uuid)
    }

    fn sorted_states(&self) -> Vec<&PatientState> {
        let mut sorted: Vec<&PatientState> = self.states.iter().collect();
        sorted.sort_by(|a, b| interval_order(a, b));
        sorted
    }

    /// All intervals in the given workflow, chronologically sorted.
    pub fn states_in_workflow(
        &self,
        workflow: &ProgramWorkflow,
        include_voided: bool,
    ) -> Vec<&PatientState> {
        self.sorted_states()
            .into_iter()
            .filter(|s| s.workflow_uuid() == workflow.uuid())
            .filter(|s| include_voided || !s.is_voided())
            .collect()
    }

    /// The interval active today in the given workflow, or in any workflow
    /// when `workflow` is `None`.
    pub fn current_state(&self, workflow: Option<&ProgramWorkflow>) -> Option<&PatientState> {
        self.current_state_on(workflow, Utc::now().date_naive())
    }

    /// The interval active on `on` in the given workflow, or in any workflow
    /// when `workflow` is `None`.
    pub fn current_state_on(
        &self,
        workflow: Option<&ProgramWorkflow>,
        on: NaiveDate,
    ) -> Option<&PatientState> {
        let sorted: Vec<&PatientState> = self
            .sorted_states()
            .into_iter()
            .filter(|s| workflow.is_none_or(|w| s.workflow_uuid() == w.uuid()))
            .collect();
        latest_active(&sorted, on)
    }

    /// Every interval active today, across all workflows.
    pub fn current_states(&self) -> Vec<&PatientState> {
        let now = Utc::now().date_naive();
        self.sorted_states()
            .into_iter()
            .filter(|s| s.is_active_on(now))
            .collect()
    }

    /// The chronologically latest non-voided interval in each workflow that
    /// has any history, whether or not it is still open. Used for historical
    /// summaries after an enrollment has ended.
    pub fn most_recent_state_in_each_workflow(&self) -> Vec<&PatientState> {
        let mut latest: HashMap<Uuid, &PatientState> = HashMap::new();
        for state in self.sorted_states() {
            if !state.is_voided() {
                latest.insert(state.workflow_uuid(), state);
            }
        }
        let mut result: Vec<&PatientState> = latest.into_values().collect();
        result.sort_by(|a, b| interval_order(a, b));
        result
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Transition this enrollment to `target` within `workflow` on `on_date`.
    ///
    /// Closes the workflow's currently open interval (if any) at `on_date`
    /// and opens a new interval for `target` starting there. If `target` is
    /// terminal the whole enrollment is marked completed on that date. When
    /// the enrollment was already completed, the new interval is closed at
    /// the completion date immediately so a completed enrollment never gains
    /// a dangling open interval.
    ///
    /// `on_date` may be `None` only when the workflow has no current state.
    ///
    /// # Errors
    ///
    /// Rejects the call without mutating anything when `target` does not
    /// belong to `workflow`, when a mandatory change date is missing, when
    /// the current interval is already closed, when `on_date` precedes the
    /// current interval's start, or when the transition is illegal for the
    /// workflow.
    pub fn transition_to_state(
        &mut self,
        workflow: &ProgramWorkflow,
        target: &ProgramWorkflowState,
        on_date: Option<NaiveDate>,
    ) -> ProgramResult<()> {
        if workflow.state_by_uuid(target.uuid()).is_none() {
            return Err(ProgramError::StateNotInWorkflow {
                state: target.display_name().to_string(),
                workflow: workflow.display_name().to_string(),
            });
        }

        // Validate everything before touching the history: a rejected
        // transition must leave the enrollment untouched.
        let last_uuid = match self.current_state(Some(workflow)) {
            None => None,
            Some(last) => {
                let current_name = workflow
                    .state_by_uuid(last.state_uuid())
                    .map(ProgramWorkflowState::display_name)
                    .unwrap_or("<unknown>")
                    .to_string();

                let Some(on_date) = on_date else {
                    return Err(ProgramError::MissingChangeDate {
                        current: current_name,
                    });
                };
                if let Some(ended) = last.end_date() {
                    return Err(ProgramError::StateAlreadyClosed {
                        current: current_name,
                        ended,
                    });
                }
                if let Some(started) = last.start_date() {
                    if started > on_date {
                        return Err(ProgramError::TransitionBeforeStart {
                            current: current_name,
                            started,
                            requested: on_date,
                        });
                    }
                }
                let from = workflow.state_by_uuid(last.state_uuid());
                if !workflow.is_legal_transition(from, target) {
                    return Err(ProgramError::IllegalTransition {
                        workflow: workflow.display_name().to_string(),
                        from: current_name,
                        to: target.display_name().to_string(),
                    });
                }
                Some(last.uuid())
            }
        };

        if last_uuid.is_none() && !workflow.is_legal_transition(None, target) {
            return Err(ProgramError::IllegalTransition {
                workflow: workflow.display_name().to_string(),
                from: "<none>".to_string(),
                to: target.display_name().to_string(),
            });
        }

        if let Some(uuid) = last_uuid {
            if let Some(last) = self.states.iter_mut().find(|s| s.uuid() == uuid) {
                last.end_date = on_date;
            }
        }

        let mut new_state = PatientState::new(workflow.uuid(), target.uuid(), on_date);
        // An already-completed enrollment cannot gain an open interval in a
        // workflow it had no history in yet.
        if self.date_completed.is_some() {
            new_state.end_date = self.date_completed;
        }
        if target.is_terminal() {
            self.date_completed = on_date;
        }

        tracing::debug!(
            enrollment = %self.uuid,
            workflow = workflow.display_name(),
            state = target.display_name(),
            on = ?on_date,
            "applied state transition"
        );
        self.states.push(new_state);
        Ok(())
    }

    /// Void the chronologically last non-voided interval in `workflow`.
    ///
    /// If an interval precedes the voided one and had been closed, it is
    /// reopened: its end date is reset to the enrollment's completion date
    /// when one is set, otherwise to open, and its change bookkeeping is
    /// stamped with the voiding actor and instant. This keeps the
    /// one-open-interval invariant without rewriting history. Voiding with
    /// no history is a silent no-op.
    ///
    /// A `None` void instant stamps the current time.
    pub fn void_last_state(
        &mut self,
        workflow: &ProgramWorkflow,
        voided_by: UserRef,
        void_date: Option<DateTime<Utc>>,
        reason: &str,
    ) {
        let in_workflow: Vec<Uuid> = self
            .states_in_workflow(workflow, false)
            .iter()
            .map(|s| s.uuid())
            .collect();
        let Some(&last_uuid) = in_workflow.last() else {
            return;
        };
        let next_to_last_uuid = in_workflow
            .len()
            .checked_sub(2)
            .map(|index| in_workflow[index]);
        let void_date = void_date.unwrap_or_else(Utc::now);

        if let Some(last) = self.states.iter_mut().find(|s| s.uuid() == last_uuid) {
            last.void = Some(VoidInfo::new(voided_by, void_date, reason));
        }

        if let Some(uuid) = next_to_last_uuid {
            let completed = self.date_completed;
            if let Some(previous) = self.states.iter_mut().find(|s| s.uuid() == uuid) {
                if previous.end_date().is_some() {
                    previous.end_date = completed;
                    previous.audit.mark_changed(voided_by, void_date);
                }
            }
        }
    }

    /// Duplicate this enrollment with a fresh identity.
    ///
    /// Patient, program, location, dates, audit and void status are carried
    /// over; the state collection is deep-copied, each interval also getting
    /// a fresh identity. Attributes are not carried over. Correlating the
    /// copy to the record it supersedes is the caller's concern.
    pub fn duplicate(&self) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            patient: self.patient,
            program_uuid: self.program_uuid,
            location: self.location,
            date_enrolled: self.date_enrolled,
            date_completed: self.date_completed,
            states: self.states.iter().map(PatientState::duplicate).collect(),
            attributes: Vec::new(),
            audit: self.audit.clone(),
            void: self.void.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Consistency checking
    // ------------------------------------------------------------------------

    /// Fail-fast check of the interval invariants for one workflow.
    ///
    /// The engine itself cannot be driven into violating these through its
    /// public operations, but two transactions racing on separately loaded
    /// copies of one enrollment can. Persistence layers can run this before
    /// accepting a write.
    ///
    /// # Errors
    ///
    /// Returns `ProgramError::InconsistentHistory` when more than one
    /// interval is open, when a closed interval ends before it starts, or
    /// when the earliest interval's state is not flagged initial.
    pub fn verify_history(&self, workflow: &ProgramWorkflow) -> ProgramResult<()> {
        let states = self.states_in_workflow(workflow, false);

        let open_count = states.iter().filter(|s| s.end_date().is_none()).count();
        if open_count > 1 {
            return Err(ProgramError::InconsistentHistory {
                workflow: workflow.display_name().to_string(),
                detail: format!("{open_count} intervals are open at once"),
            });
        }

        for state in &states {
            if let (Some(start), Some(end)) = (state.start_date(), state.end_date()) {
                if end < start {
                    return Err(ProgramError::InconsistentHistory {
                        workflow: workflow.display_name().to_string(),
                        detail: format!("interval {} ends before it starts", state.uuid()),
                    });
                }
            }
        }

        if let Some(first) = states.first() {
            let initial = workflow
                .state_by_uuid(first.state_uuid())
                .is_some_and(ProgramWorkflowState::is_initial);
            if !initial {
                return Err(ProgramError::InconsistentHistory {
                    workflow: workflow.display_name().to_string(),
                    detail: "the earliest interval's state is not an initial state".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::Concept;
    use crate::NonEmptyText;

    fn concept(name: &str) -> Concept {
        Concept::new(
            Uuid::new_v4(),
            NonEmptyText::new(name).expect("valid name"),
            "en",
        )
    }

    fn state(name: &str, initial: bool, terminal: bool) -> ProgramWorkflowState {
        ProgramWorkflowState::new(Uuid::new_v4(), concept(name), initial, terminal)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn user() -> UserRef {
        UserRef::new(Uuid::new_v4())
    }

    /// A program with one treatment workflow: Enrolled (initial), Active,
    /// Completed (terminal).
    fn treatment_program() -> Program {
        let mut workflow = ProgramWorkflow::new(Uuid::new_v4(), concept("Treatment status"));
        workflow
            .add_state(state("Enrolled", true, false))
            .expect("add Enrolled");
        workflow
            .add_state(state("Active", false, false))
            .expect("add Active");
        workflow
            .add_state(state("Completed", false, true))
            .expect("add Completed");

        let mut program = Program::new(Uuid::new_v4(), concept("HIV Program"));
        program.add_workflow(workflow).expect("add workflow");
        program
    }

    fn enroll(program: &Program) -> PatientProgram {
        PatientProgram::enroll(
            PatientRef::new(Uuid::new_v4()),
            program,
            None,
            Some(date(2024, 1, 1)),
        )
    }

    fn walk_to_completion(program: &Program) -> PatientProgram {
        let workflow = &program.workflows()[0];
        let mut enrollment = enroll(program);
        for (name, month) in [("Enrolled", 1), ("Active", 2), ("Completed", 3)] {
            let target = workflow.state_by_name(name).expect(name);
            enrollment
                .transition_to_state(workflow, target, Some(date(2024, month, 1)))
                .expect("legal transition");
        }
        enrollment
    }

    #[test]
    fn full_walk_produces_closed_history_and_completion() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let enrollment = walk_to_completion(&program);

        let history = enrollment.states_in_workflow(workflow, false);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].start_date(), Some(date(2024, 1, 1)));
        assert_eq!(history[0].end_date(), Some(date(2024, 2, 1)));
        assert_eq!(history[1].start_date(), Some(date(2024, 2, 1)));
        assert_eq!(history[1].end_date(), Some(date(2024, 3, 1)));
        assert_eq!(history[2].start_date(), Some(date(2024, 3, 1)));
        assert_eq!(history[2].end_date(), None);
        assert_eq!(enrollment.date_completed(), Some(date(2024, 3, 1)));
        enrollment.verify_history(workflow).expect("consistent history");
    }

    #[test]
    fn terminal_state_ends_enrollment_activity() {
        let program = treatment_program();
        let enrollment = walk_to_completion(&program);

        assert!(enrollment.active_on(date(2024, 2, 15)));
        assert!(!enrollment.active_on(date(2024, 3, 1)));
        assert!(!enrollment.active_on(date(2024, 4, 1)));
    }

    #[test]
    fn point_in_time_query_finds_the_covering_interval() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let enrollment = walk_to_completion(&program);
        let active_uuid = workflow.state_by_name("Active").expect("Active").uuid();

        let current = enrollment
            .current_state_on(Some(workflow), date(2024, 2, 15))
            .expect("a state covers 2024-02-15");
        assert_eq!(current.state_uuid(), active_uuid);

        // Interval starts are inclusive, ends exclusive.
        let at_boundary = enrollment
            .current_state_on(Some(workflow), date(2024, 2, 1))
            .expect("a state covers 2024-02-01");
        assert_eq!(at_boundary.state_uuid(), active_uuid);
    }

    #[test]
    fn entering_a_non_initial_state_first_is_rejected() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let active = workflow.state_by_name("Active").expect("Active");
        let mut enrollment = enroll(&program);

        let err = enrollment
            .transition_to_state(workflow, active, Some(date(2024, 1, 1)))
            .expect_err("Active is not an initial state");
        assert!(matches!(err, ProgramError::IllegalTransition { .. }));
        assert!(enrollment.states().is_empty());
    }

    #[test]
    fn leaving_a_state_requires_a_change_date() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let enrolled = workflow.state_by_name("Enrolled").expect("Enrolled");
        let active = workflow.state_by_name("Active").expect("Active");
        let mut enrollment = enroll(&program);
        enrollment
            .transition_to_state(workflow, enrolled, Some(date(2024, 1, 1)))
            .expect("initial transition");

        let err = enrollment
            .transition_to_state(workflow, active, None)
            .expect_err("no change date given");
        assert!(matches!(err, ProgramError::MissingChangeDate { .. }));
        assert_eq!(enrollment.states().len(), 1);
    }

    #[test]
    fn closing_an_interval_before_it_opened_is_rejected() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let enrolled = workflow.state_by_name("Enrolled").expect("Enrolled");
        let active = workflow.state_by_name("Active").expect("Active");
        let mut enrollment = enroll(&program);
        enrollment
            .transition_to_state(workflow, enrolled, Some(date(2024, 2, 1)))
            .expect("initial transition");

        let err = enrollment
            .transition_to_state(workflow, active, Some(date(2024, 1, 15)))
            .expect_err("change date precedes the interval start");
        assert!(matches!(err, ProgramError::TransitionBeforeStart { .. }));
    }

    #[test]
    fn a_state_from_another_workflow_is_rejected() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let foreign = state("Elsewhere", true, false);
        let mut enrollment = enroll(&program);

        let err = enrollment
            .transition_to_state(workflow, &foreign, Some(date(2024, 1, 1)))
            .expect_err("state belongs to no workflow of this program");
        assert!(matches!(err, ProgramError::StateNotInWorkflow { .. }));
    }

    #[test]
    fn voiding_the_last_state_reopens_the_previous_interval() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let mut enrollment = enroll(&program);
        let enrolled = workflow.state_by_name("Enrolled").expect("Enrolled");
        let active = workflow.state_by_name("Active").expect("Active");
        enrollment
            .transition_to_state(workflow, enrolled, Some(date(2024, 1, 1)))
            .expect("to Enrolled");
        enrollment
            .transition_to_state(workflow, active, Some(date(2024, 2, 1)))
            .expect("to Active");

        enrollment.void_last_state(workflow, user(), None, "entered in error");

        let history = enrollment.states_in_workflow(workflow, false);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state_uuid(), enrolled.uuid());
        assert_eq!(history[0].end_date(), None, "previous interval reopened");
        assert!(history[0].audit().date_changed().is_some());

        let full = enrollment.states_in_workflow(workflow, true);
        assert_eq!(full.len(), 2, "voided interval is kept in the record");
        let voided = full
            .iter()
            .find(|s| s.is_voided())
            .expect("one voided interval");
        assert_eq!(
            voided.void_info().expect("void info").reason(),
            "entered in error"
        );
        enrollment.verify_history(workflow).expect("consistent history");
    }

    #[test]
    fn voiding_after_completion_leaves_date_completed_untouched() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let mut enrollment = walk_to_completion(&program);

        enrollment.void_last_state(workflow, user(), None, "entered in error");

        let history = enrollment.states_in_workflow(workflow, false);
        assert_eq!(history.len(), 2);
        // The reopened interval closes at the completion date, which stays
        // set until the caller corrects it explicitly.
        assert_eq!(history[1].end_date(), Some(date(2024, 3, 1)));
        assert_eq!(enrollment.date_completed(), Some(date(2024, 3, 1)));

        enrollment.clear_date_completed();
        assert_eq!(enrollment.date_completed(), None);
    }

    #[test]
    fn voiding_an_empty_workflow_is_an_idempotent_no_op() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let mut enrollment = enroll(&program);

        enrollment.void_last_state(workflow, user(), None, "nothing there");
        enrollment.void_last_state(workflow, user(), None, "still nothing");
        assert!(enrollment.states().is_empty());
    }

    #[test]
    fn transition_then_void_restores_the_open_interval() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let enrolled = workflow.state_by_name("Enrolled").expect("Enrolled");
        let active = workflow.state_by_name("Active").expect("Active");
        let mut enrollment = enroll(&program);
        enrollment
            .transition_to_state(workflow, enrolled, Some(date(2024, 1, 1)))
            .expect("to Enrolled");

        let before: Vec<(Uuid, Option<NaiveDate>, Option<NaiveDate>)> = enrollment
            .states_in_workflow(workflow, false)
            .iter()
            .map(|s| (s.state_uuid(), s.start_date(), s.end_date()))
            .collect();

        enrollment
            .transition_to_state(workflow, active, Some(date(2024, 2, 1)))
            .expect("to Active");
        enrollment.void_last_state(workflow, user(), None, "wrong entry");

        let after: Vec<(Uuid, Option<NaiveDate>, Option<NaiveDate>)> = enrollment
            .states_in_workflow(workflow, false)
            .iter()
            .map(|s| (s.state_uuid(), s.start_date(), s.end_date()))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn open_interval_stays_unique_across_transitions_and_voids() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let enrolled = workflow.state_by_name("Enrolled").expect("Enrolled");
        let active = workflow.state_by_name("Active").expect("Active");
        let mut enrollment = enroll(&program);

        enrollment
            .transition_to_state(workflow, enrolled, Some(date(2024, 1, 1)))
            .expect("to Enrolled");
        enrollment
            .transition_to_state(workflow, active, Some(date(2024, 2, 1)))
            .expect("to Active");
        enrollment.void_last_state(workflow, user(), None, "correction");
        enrollment
            .transition_to_state(workflow, active, Some(date(2024, 2, 10)))
            .expect("to Active again");

        let open: Vec<_> = enrollment
            .states_in_workflow(workflow, false)
            .into_iter()
            .filter(|s| s.end_date().is_none())
            .collect();
        assert_eq!(open.len(), 1);
        enrollment.verify_history(workflow).expect("consistent history");
    }

    #[test]
    fn transition_in_a_new_workflow_after_completion_is_closed_immediately() {
        let mut program = treatment_program();
        let mut pregnancy = ProgramWorkflow::new(Uuid::new_v4(), concept("Pregnancy status"));
        pregnancy
            .add_state(state("Not pregnant", true, false))
            .expect("add state");
        program.add_workflow(pregnancy).expect("add workflow");
        let program = program;

        let treatment = program.workflow_by_name("Treatment status").expect("workflow");
        let pregnancy = program.workflow_by_name("Pregnancy status").expect("workflow");
        let not_pregnant = pregnancy.state_by_name("Not pregnant").expect("state");

        let mut enrollment = enroll(&program);
        for (name, month) in [("Enrolled", 1), ("Active", 2), ("Completed", 3)] {
            let target = treatment.state_by_name(name).expect(name);
            enrollment
                .transition_to_state(treatment, target, Some(date(2024, month, 1)))
                .expect("legal transition");
        }

        enrollment
            .transition_to_state(pregnancy, not_pregnant, Some(date(2024, 4, 1)))
            .expect("transition in second workflow");

        let history = enrollment.states_in_workflow(pregnancy, false);
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].end_date(),
            Some(date(2024, 3, 1)),
            "new interval closed at the completion date"
        );
    }

    #[test]
    fn current_states_reports_one_interval_per_workflow() {
        let mut program = treatment_program();
        let mut pregnancy = ProgramWorkflow::new(Uuid::new_v4(), concept("Pregnancy status"));
        pregnancy
            .add_state(state("Not pregnant", true, false))
            .expect("add state");
        program.add_workflow(pregnancy).expect("add workflow");
        let program = program;

        let treatment = program.workflow_by_name("Treatment status").expect("workflow");
        let pregnancy = program.workflow_by_name("Pregnancy status").expect("workflow");

        let mut enrollment = enroll(&program);
        enrollment
            .transition_to_state(
                treatment,
                treatment.state_by_name("Enrolled").expect("Enrolled"),
                Some(date(2024, 1, 1)),
            )
            .expect("treatment transition");
        enrollment
            .transition_to_state(
                pregnancy,
                pregnancy.state_by_name("Not pregnant").expect("state"),
                Some(date(2024, 1, 2)),
            )
            .expect("pregnancy transition");

        let current = enrollment.current_states();
        assert_eq!(current.len(), 2);
        let workflows: std::collections::HashSet<Uuid> =
            current.iter().map(|s| s.workflow_uuid()).collect();
        assert_eq!(workflows.len(), 2);
    }

    #[test]
    fn most_recent_state_per_workflow_includes_closed_intervals() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let enrollment = walk_to_completion(&program);

        let recent = enrollment.most_recent_state_in_each_workflow();
        assert_eq!(recent.len(), 1);
        let completed_uuid = workflow.state_by_name("Completed").expect("Completed").uuid();
        assert_eq!(recent[0].state_uuid(), completed_uuid);
    }

    #[test]
    fn possible_next_states_follow_the_legality_rule() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let mut enrollment = enroll(&program);

        let from_empty: Vec<&str> = workflow
            .possible_next_states(&enrollment)
            .iter()
            .map(|s| s.display_name())
            .collect();
        assert_eq!(from_empty, vec!["Enrolled"]);

        enrollment
            .transition_to_state(
                workflow,
                workflow.state_by_name("Enrolled").expect("Enrolled"),
                Some(date(2024, 1, 1)),
            )
            .expect("initial transition");

        let from_enrolled: Vec<&str> = workflow
            .possible_next_states(&enrollment)
            .iter()
            .map(|s| s.display_name())
            .collect();
        assert_eq!(from_enrolled, vec!["Active", "Completed"]);
    }

    #[test]
    fn duplicate_copies_history_under_fresh_identities() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let enrollment = walk_to_completion(&program);

        let copy = enrollment.duplicate();
        assert_ne!(copy.uuid(), enrollment.uuid());
        assert_eq!(copy.patient(), enrollment.patient());
        assert_eq!(copy.date_enrolled(), enrollment.date_enrolled());
        assert_eq!(copy.date_completed(), enrollment.date_completed());

        let original = enrollment.states_in_workflow(workflow, true);
        let copied = copy.states_in_workflow(workflow, true);
        assert_eq!(original.len(), copied.len());
        for (a, b) in original.iter().zip(copied.iter()) {
            assert_ne!(a.uuid(), b.uuid(), "intervals get fresh identities");
            assert_eq!(a.state_uuid(), b.state_uuid());
            assert_eq!(a.start_date(), b.start_date());
            assert_eq!(a.end_date(), b.end_date());
        }
    }

    #[test]
    fn verify_history_detects_a_non_initial_first_state() {
        let program = treatment_program();
        let workflow = &program.workflows()[0];
        let enrolled = workflow.state_by_name("Enrolled").expect("Enrolled");
        let active = workflow.state_by_name("Active").expect("Active");
        let mut enrollment = enroll(&program);
        enrollment
            .transition_to_state(workflow, enrolled, Some(date(2024, 1, 1)))
            .expect("to Enrolled");
        enrollment
            .transition_to_state(workflow, active, Some(date(2024, 2, 1)))
            .expect("to Active");

        // Voiding the earliest interval is outside the engine's supported
        // correction path; simulate a racing writer corrupting the history.
        let first_uuid = enrollment.states_in_workflow(workflow, false)[0].uuid();
        if let Some(first) = enrollment.states.iter_mut().find(|s| s.uuid() == first_uuid) {
            first.void = Some(VoidInfo::new(user(), Utc::now(), "tampered"));
        }

        let err = enrollment
            .verify_history(workflow)
            .expect_err("history no longer starts with an initial state");
        assert!(matches!(err, ProgramError::InconsistentHistory { .. }));
    }
}
