use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use uuid::Uuid;

use cpe_core::{
    PatientProgram, PatientRef, PatientState, Program, ProgramDefinition, ProgramWorkflow, UserRef,
};

#[derive(Parser)]
#[command(name = "cpe")]
#[command(about = "Care program enrollment engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a program definition and print its workflows and states
    Check {
        /// Path to a program definition YAML file
        definition: String,
    },
    /// Run an enrollment script against a program definition
    Simulate {
        /// Path to a program definition YAML file
        definition: String,
        /// Path to an enrollment script YAML file
        script: String,
    },
}

/// An enrollment script: a patient, an enrollment date and an ordered list
/// of transition/void steps addressed by workflow and state name.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Script {
    #[serde(default)]
    patient: Option<Uuid>,
    #[serde(default)]
    enrolled: Option<NaiveDate>,
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
enum Step {
    Transition {
        workflow: String,
        state: String,
        #[serde(default)]
        on: Option<NaiveDate>,
    },
    VoidLast {
        workflow: String,
        reason: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Check { definition }) => {
            let program = load_program(&definition)?;
            print_program(&program);
        }
        Some(Commands::Simulate { definition, script }) => {
            let program = load_program(&definition)?;
            let text = std::fs::read_to_string(&script)?;
            let script: Script = serde_yaml::from_str(&text)?;
            match run_script(&program, &script) {
                Ok(enrollment) => print_enrollment(&program, &enrollment),
                Err(e) => {
                    eprintln!("Error running script: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            println!("Use 'cpe --help' for commands");
        }
    }

    Ok(())
}

fn load_program(path: &str) -> Result<Program, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(ProgramDefinition::parse(&text)?)
}

fn run_script(
    program: &Program,
    script: &Script,
) -> Result<PatientProgram, Box<dyn std::error::Error>> {
    let patient = PatientRef::new(script.patient.unwrap_or_else(Uuid::new_v4));
    let operator = UserRef::new(Uuid::new_v4());
    let mut enrollment = PatientProgram::enroll(patient, program, None, script.enrolled);

    for step in &script.steps {
        match step {
            Step::Transition {
                workflow,
                state,
                on,
            } => {
                let workflow = workflow_named(program, workflow)?;
                let target = workflow
                    .state_by_name(state)
                    .ok_or_else(|| format!("no state named '{state}' in workflow '{workflow_name}'", workflow_name = workflow.display_name()))?;
                enrollment.transition_to_state(workflow, target, *on)?;
            }
            Step::VoidLast { workflow, reason } => {
                let workflow = workflow_named(program, workflow)?;
                enrollment.void_last_state(workflow, operator, None, reason);
            }
        }
    }

    Ok(enrollment)
}

fn workflow_named<'a>(
    program: &'a Program,
    name: &str,
) -> Result<&'a ProgramWorkflow, Box<dyn std::error::Error>> {
    program
        .workflow_by_name(name)
        .ok_or_else(|| format!("no workflow named '{name}' in program '{}'", program.display_name()).into())
}

fn print_program(program: &Program) {
    println!("Program: {} ({})", program.display_name(), program.uuid());
    for workflow in program.workflows() {
        println!("  Workflow: {}", workflow.display_name());
        for state in workflow.states() {
            let mut flags = Vec::new();
            if state.is_initial() {
                flags.push("initial");
            }
            if state.is_terminal() {
                flags.push("terminal");
            }
            if state.is_retired() {
                flags.push("retired");
            }
            if flags.is_empty() {
                println!("    State: {}", state.display_name());
            } else {
                println!("    State: {} [{}]", state.display_name(), flags.join(", "));
            }
        }
    }
}

fn print_enrollment(program: &Program, enrollment: &PatientProgram) {
    println!(
        "Enrollment {} of patient {}",
        enrollment.uuid(),
        enrollment.patient()
    );
    match enrollment.date_enrolled() {
        Some(date) => println!("  Enrolled: {date}"),
        None => println!("  Enrolled: (no date)"),
    }
    match enrollment.date_completed() {
        Some(date) => println!("  Completed: {date}"),
        None => println!("  Completed: still active"),
    }

    for workflow in program.workflows() {
        let history = enrollment.states_in_workflow(workflow, true);
        if history.is_empty() {
            continue;
        }
        println!("  Workflow: {}", workflow.display_name());
        for interval in history {
            println!("    {}", format_interval(workflow, interval));
        }
    }
}

fn format_interval(workflow: &ProgramWorkflow, interval: &PatientState) -> String {
    let state_name = workflow
        .state_by_uuid(interval.state_uuid())
        .map(|s| s.display_name())
        .unwrap_or("<unknown state>");
    let start = interval
        .start_date()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "..".to_string());
    let end = interval
        .end_date()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "open".to_string());
    match interval.void_info() {
        Some(info) => format!(
            "{state_name}: [{start}, {end}) VOIDED ({reason})",
            reason = info.reason()
        ),
        None => format!("{state_name}: [{start}, {end})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_an_enrollment_script() {
        let text = r#"enrolled: 2024-01-01
steps:
  - transition:
      workflow: Treatment status
      state: Enrolled
      on: 2024-01-01
  - void-last:
      workflow: Treatment status
      reason: entered in error
"#;
        let script: Script = serde_yaml::from_str(text).expect("parse script");
        assert_eq!(script.enrolled, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(script.steps.len(), 2);
        assert!(matches!(script.steps[1], Step::VoidLast { .. }));
    }

    #[test]
    fn rejects_a_script_with_unknown_keys() {
        let text = r#"steps: []
unexpected: true
"#;
        let err = serde_yaml::from_str::<Script>(text).expect_err("should reject unknown key");
        assert!(err.to_string().contains("unexpected"));
    }
}
