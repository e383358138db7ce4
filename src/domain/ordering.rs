use crate::domain::models::{Section, Task, TaskPosition};

/// Moves `task_id` into `to_section` at `to_index` and renumbers every touched
/// section densely. An index past the end appends. Returns the resulting
/// positions of all tasks in the touched sections, or `None` if the task is
/// unknown.
pub fn relocate_task(
    tasks: &mut [Task],
    task_id: &str,
    to_section: Section,
    to_index: usize,
) -> Option<Vec<TaskPosition>> {
    let moved = tasks.iter().position(|task| task.id == task_id)?;
    let from_section = tasks[moved].section;
    tasks[moved].section = to_section;

    let mut destination = section_sequence(tasks, to_section, Some(moved));
    let index = to_index.min(destination.len());
    destination.insert(index, moved);

    let mut touched = vec![destination];
    if from_section != to_section {
        touched.push(section_sequence(tasks, from_section, Some(moved)));
    }

    let mut positions = Vec::new();
    for sequence in touched {
        for (position, task_index) in sequence.into_iter().enumerate() {
            let task = &mut tasks[task_index];
            task.position = position as u32;
            positions.push(TaskPosition {
                id: task.id.clone(),
                section: task.section,
                position: task.position,
            });
        }
    }
    Some(positions)
}

/// Renumbers the unscheduled tasks of `section` to `0..n-1`, keeping their
/// relative order. Returns the positions of every task in the section.
pub fn compact_section(tasks: &mut [Task], section: Section) -> Vec<TaskPosition> {
    section_sequence(tasks, section, None)
        .into_iter()
        .enumerate()
        .map(|(position, task_index)| {
            let task = &mut tasks[task_index];
            task.position = position as u32;
            TaskPosition {
                id: task.id.clone(),
                section: task.section,
                position: task.position,
            }
        })
        .collect()
}

/// Position for a task appended to the end of `section`.
pub fn next_position(tasks: &[Task], section: Section) -> u32 {
    tasks
        .iter()
        .filter(|task| task.section == section && !task.is_scheduled())
        .map(|task| task.position + 1)
        .max()
        .unwrap_or(0)
}

pub fn is_dense(tasks: &[Task], section: Section) -> bool {
    let mut positions = tasks
        .iter()
        .filter(|task| task.section == section && !task.is_scheduled())
        .map(|task| task.position)
        .collect::<Vec<_>>();
    positions.sort_unstable();
    positions
        .iter()
        .enumerate()
        .all(|(expected, position)| *position as usize == expected)
}

/// Unscheduled tasks of a section in their current relative order.
pub fn ordered_section(tasks: &[Task], section: Section) -> Vec<Task> {
    section_sequence(tasks, section, None)
        .into_iter()
        .map(|index| tasks[index].clone())
        .collect()
}

fn section_sequence(tasks: &[Task], section: Section, moved: Option<usize>) -> Vec<usize> {
    let mut sequence = tasks
        .iter()
        .enumerate()
        .filter(|(index, task)| {
            Some(*index) != moved && task.section == section && !task.is_scheduled()
        })
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    sequence.sort_by_key(|index| tasks[*index].position);
    sequence
}
