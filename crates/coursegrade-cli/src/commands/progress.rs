//! The `coursegrade progress` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use coursegrade_core::progress::NodeState;
use coursegrade_executors::load_config_from;

use super::Workspace;

pub async fn execute(
    course_path: PathBuf,
    learner: String,
    progress: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let progress_path = progress.unwrap_or(config.progress_file);
    let workspace = Workspace::open(&course_path, &progress_path)?;

    let map = workspace.tracker.course_map(&learner).await?;
    let sections = workspace.tracker.unlocked_sections(&learner).await?;
    let summary = workspace.tracker.summary(&learner).await?;

    println!("Course: {} ({} nodes)", workspace.course.title, map.len());

    let mut table = Table::new();
    table.set_header(vec!["Step", "ID", "Kind", "Section", "State"]);
    for (node, state) in &map {
        let state = match state {
            NodeState::Locked => "locked",
            NodeState::Unlocked => "unlocked",
            NodeState::Completed => "completed",
        };
        let section = if node.tag.is_empty() { "-" } else { node.tag.as_str() };
        table.add_row(vec![
            Cell::new(node.step_order),
            Cell::new(&node.id),
            Cell::new(node.kind),
            Cell::new(section),
            Cell::new(state),
        ]);
    }
    println!("\n{table}\n");

    let sections: Vec<&str> = sections
        .iter()
        .map(|s| if s.is_empty() { "-" } else { s.as_str() })
        .collect();
    println!("Unlocked sections: {}", sections.join(", "));
    println!(
        "Completed: {} lessons, {} tasks of {} nodes",
        summary.lessons_completed, summary.tasks_completed, summary.total_nodes
    );

    Ok(())
}
