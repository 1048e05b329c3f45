use chrono::{DateTime, Utc};

use crate::entities::{goal, step};
use crate::model::Progress;

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_goal_line(goal: &goal::Model) -> String {
    format!(
        "- [{}] {} (goal id {}, priority {})",
        goal.status, goal.title, goal.id, goal.priority
    )
}

pub fn format_step_line(step: &step::Model) -> String {
    match step.completed_at {
        Some(completed_at) => format!(
            "- [x] {} (step id {}, order {}, completed {})",
            step.title,
            step.id,
            step.sort_order,
            format_datetime(completed_at)
        ),
        None => format!(
            "- [ ] {} (step id {}, order {})",
            step.title, step.id, step.sort_order
        ),
    }
}

pub fn format_goal_detail(goal: &goal::Model, steps: Option<&[step::Model]>) -> String {
    let mut output = String::new();
    output.push_str(&format!("Goal ID: {}\n", goal.id));
    output.push_str(&format!("Chat ID: {}\n", goal.chat_id));
    output.push_str(&format!("Title: {}\n", goal.title));
    output.push_str(&format!("Status: {}\n", goal.status));
    output.push_str(&format!("Priority: {}\n", goal.priority));
    if let Some(description) = goal.description.as_deref() {
        output.push_str(&format!("Description: {description}\n"));
    }
    if let Some(deadline) = goal.deadline {
        output.push_str(&format!("Deadline: {}\n", format_datetime(deadline)));
    }
    if let Some(message_id) = goal.created_from_message_id.as_deref() {
        output.push_str(&format!("Source message: {message_id}\n"));
    }
    output.push_str(&format!("Created: {}\n", format_datetime(goal.created_at)));

    let Some(steps) = steps else {
        return output.trim_end().to_string();
    };

    output.push('\n');
    if steps.is_empty() {
        output.push_str("Steps: (none)");
        return output;
    }
    output.push_str("Steps:\n");
    for step in steps {
        output.push_str(&format_step_line(step));
        output.push('\n');
    }
    output.trim_end().to_string()
}

pub fn format_progress(progress: &Progress) -> String {
    format!(
        "Progress: {}/{} steps completed ({}%)",
        progress.completed, progress.total, progress.percentage
    )
}
