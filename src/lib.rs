pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    list_events_impl, list_tasks_impl, load_calendar_impl, load_tasks_impl, AppState,
};
use domain::models::{CalendarEvent, Section, Task};
use infrastructure::error::InfraError;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SectionView {
    section: Section,
    tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlannerSnapshot {
    workspace_root: String,
    timezone: String,
    sections: Vec<SectionView>,
    scheduled: Vec<Task>,
    events: Vec<CalendarEvent>,
}

pub fn init_tracing(verbose: u8) -> Result<(), InfraError> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid RUST_LOG filter: {error}")))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
    if let Err(error) = init_result {
        debug!(%error, "tracing subscriber already set, continuing");
    }
    Ok(())
}

/// Loads the workspace's tasks and default calendar window and prints them as
/// JSON on stdout.
pub fn run(workspace_root: PathBuf) -> Result<(), InfraError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let state = AppState::new(workspace_root.clone())?;
        load_tasks_impl(&state)
            .await
            .map_err(|error| {
                state.command_error("load_tasks", &error);
                error
            })?;
        load_calendar_impl(&state, None, None)
            .await
            .map_err(|error| {
                state.command_error("load_calendar", &error);
                error
            })?;

        let mut sections = Vec::with_capacity(Section::ALL.len());
        for section in Section::ALL {
            sections.push(SectionView {
                section,
                tasks: list_tasks_impl(&state, Some(section.as_str().to_string()))?,
            });
        }
        let snapshot = PlannerSnapshot {
            workspace_root: workspace_root.display().to_string(),
            timezone: state.config().timezone.clone(),
            sections,
            scheduled: state.tasks().scheduled_tasks()?,
            events: list_events_impl(&state)?,
        };
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        Ok::<(), InfraError>(())
    })
}
