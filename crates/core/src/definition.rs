//! Program definition wire format.
//!
//! Program, workflow and state definitions are administrator-authored YAML.
//! This module keeps a strict wire model (exact on-disk structure, unknown
//! keys rejected) separate from the domain types, and translates between the
//! two with full validation: uuids must parse, names must be non-empty,
//! every workflow needs at least one state and at least one initial state,
//! and duplicate states within a workflow are rejected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::concept::Concept;
use crate::error::{ProgramError, ProgramResult};
use crate::program::{Program, ProgramWorkflow, ProgramWorkflowState};
use crate::NonEmptyText;

const DEFAULT_LOCALE: &str = "en";

// ============================================================================
// Public operations
// ============================================================================

/// Program definition parsing and rendering.
///
/// Zero-sized namespacing type; all methods are associated functions.
pub struct ProgramDefinition;

impl ProgramDefinition {
    /// Parse a program definition from YAML text.
    ///
    /// Uses `serde_path_to_error` to report the path to the failing field
    /// (e.g. `program.workflows[0].states[2].uuid`) when the YAML does not
    /// match the wire schema.
    ///
    /// # Errors
    ///
    /// Returns a `ProgramError` if the YAML does not match the wire schema,
    /// any uuid fails to parse, any name is blank, a workflow has no states
    /// or no initial state, or a workflow holds duplicate states.
    pub fn parse(yaml_text: &str) -> ProgramResult<Program> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        let wire = match serde_path_to_error::deserialize::<_, DefinitionWire>(deserializer) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() {
                    "<root>".to_string()
                } else {
                    path
                };
                return Err(ProgramError::DefinitionSchema {
                    path,
                    message: source.to_string(),
                });
            }
        };

        wire_to_domain(wire)
    }

    /// Render a program back to definition YAML.
    ///
    /// # Errors
    ///
    /// Returns `ProgramError::DefinitionSerialization` if serialization
    /// fails.
    pub fn render(program: &Program) -> ProgramResult<String> {
        let wire = domain_to_wire(program);
        serde_yaml::to_string(&wire).map_err(ProgramError::DefinitionSerialization)
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct DefinitionWire {
    program: ProgramWire,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct ProgramWire {
    uuid: String,
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    workflows: Vec<WorkflowWire>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct WorkflowWire {
    uuid: String,
    name: String,
    states: Vec<StateWire>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct StateWire {
    uuid: String,
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    names: Vec<LocalisedNameWire>,
    #[serde(default, skip_serializing_if = "is_false")]
    initial: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    terminal: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    retired: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct LocalisedNameWire {
    locale: String,
    name: String,
}

fn is_false(value: &bool) -> bool {
    !value
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn parse_uuid(field: &str, value: &str) -> ProgramResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| ProgramError::InvalidUuid {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn parse_name(field: &str, value: &str) -> ProgramResult<NonEmptyText> {
    NonEmptyText::new(value)
        .map_err(|_| ProgramError::InvalidInput(format!("{field} must not be blank")))
}

fn wire_to_domain(wire: DefinitionWire) -> ProgramResult<Program> {
    let program_uuid = parse_uuid("program.uuid", &wire.program.uuid)?;
    let program_name = parse_name("program.name", &wire.program.name)?;
    let mut program = Program::new(
        program_uuid,
        Concept::new(program_uuid, program_name, DEFAULT_LOCALE),
    );

    for workflow_wire in wire.program.workflows {
        let workflow_uuid = parse_uuid("workflow.uuid", &workflow_wire.uuid)?;
        let workflow_name = parse_name("workflow.name", &workflow_wire.name)?;
        let mut workflow = ProgramWorkflow::new(
            workflow_uuid,
            Concept::new(workflow_uuid, workflow_name.clone(), DEFAULT_LOCALE),
        );

        if workflow_wire.states.is_empty() {
            return Err(ProgramError::InvalidInput(format!(
                "workflow {workflow_name} has no states"
            )));
        }

        let mut has_initial = false;
        for state_wire in workflow_wire.states {
            let state_uuid = parse_uuid("state.uuid", &state_wire.uuid)?;
            let state_name = parse_name("state.name", &state_wire.name)?;
            let mut concept = Concept::new(state_uuid, state_name, DEFAULT_LOCALE);
            for localised in state_wire.names {
                let name = parse_name("state name alias", &localised.name)?;
                concept = concept.with_name(name, localised.locale);
            }
            has_initial = has_initial || state_wire.initial;
            let mut state = ProgramWorkflowState::new(
                state_uuid,
                concept,
                state_wire.initial,
                state_wire.terminal,
            );
            if state_wire.retired {
                state.retire();
            }
            workflow.add_state(state)?;
        }

        if !has_initial {
            return Err(ProgramError::InvalidInput(format!(
                "workflow {workflow_name} has no initial state, so it could never be entered"
            )));
        }

        program.add_workflow(workflow)?;
    }

    Ok(program)
}

fn domain_to_wire(program: &Program) -> DefinitionWire {
    DefinitionWire {
        program: ProgramWire {
            uuid: program.uuid().to_string(),
            name: program.display_name().to_string(),
            workflows: program
                .workflows()
                .iter()
                .map(|workflow| WorkflowWire {
                    uuid: workflow.uuid().to_string(),
                    name: workflow.display_name().to_string(),
                    states: workflow
                        .states()
                        .iter()
                        .map(|state| StateWire {
                            uuid: state.uuid().to_string(),
                            name: state.display_name().to_string(),
                            names: state
                                .concept()
                                .names()
                                .iter()
                                .skip(1)
                                .map(|name| LocalisedNameWire {
                                    locale: name.locale().to_string(),
                                    name: name.name().to_string(),
                                })
                                .collect(),
                            initial: state.is_initial(),
                            terminal: state.is_terminal(),
                            retired: state.is_retired(),
                        })
                        .collect(),
                })
                .collect(),
        },
    }
}
