use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "goaltrack",
    version,
    about = "Turn chat plans into trackable goals and steps"
)]
pub struct Cli {
    /// Data directory (defaults to $GOALTRACK_HOME, then the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Requesting user identity (defaults to $GOALTRACK_USER)
    #[arg(long, global = true, value_name = "ID")]
    pub user_id: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage goals
    #[command(subcommand)]
    Goal(GoalCommand),
    /// Manage the steps of a goal
    #[command(subcommand)]
    Step(StepCommand),
    /// Extract a plan from raw text without storing anything
    Extract(ExtractArgs),
}

#[derive(Subcommand, Debug)]
pub enum GoalCommand {
    /// Turn raw plan text into a goal with steps
    Ingest(GoalIngest),
    /// Create a goal with explicit fields
    Add(GoalAdd),
    /// List goals for a chat, or all your goals
    List(GoalList),
    /// Show a single goal
    Show(GoalShow),
    /// Update fields of a goal
    Update(GoalUpdate),
    /// Delete a goal and its steps
    Remove(GoalRemove),
    /// Report step completion for a goal
    Progress(GoalProgress),
}

#[derive(Subcommand, Debug)]
pub enum StepCommand {
    /// Add a step to a goal
    Add(StepAdd),
    /// List the steps of a goal in order
    List(StepList),
    /// Rename a step
    Update(StepUpdate),
    /// Flip a step between completed and not completed
    Toggle(StepToggle),
    /// Delete a step and renumber the rest
    Remove(StepRemove),
    /// Assign new orders to steps of a goal
    Reorder(StepReorder),
    /// Apply several step changes atomically
    Bulk(StepBulk),
}

#[derive(Args, Debug)]
pub struct GoalIngest {
    /// Chat the plan came from
    pub chat_id: String,

    /// Message the plan came from
    #[arg(long, value_name = "ID")]
    pub message_id: Option<String>,

    /// Plan text (read from stdin when omitted)
    #[arg(long, value_name = "TEXT")]
    pub text: Option<String>,
}

#[derive(Args, Debug)]
pub struct GoalAdd {
    pub chat_id: String,
    pub title: String,

    /// Message the plan came from
    #[arg(long, value_name = "ID")]
    pub message_id: Option<String>,

    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,

    /// Step title; repeat for several, ordered as given
    #[arg(
        long = "step",
        value_name = "TITLE",
        conflicts_with_all = ["status", "priority", "deadline"]
    )]
    pub steps: Vec<String>,

    /// not_started, in_progress or completed
    #[arg(long, value_name = "STATUS")]
    pub status: Option<String>,

    /// low, medium or high
    #[arg(long, value_name = "PRIORITY")]
    pub priority: Option<String>,

    /// RFC 3339 timestamp, e.g. 2026-09-01T00:00:00Z
    #[arg(long, value_name = "WHEN")]
    pub deadline: Option<String>,
}

#[derive(Args, Debug)]
pub struct GoalList {
    /// Restrict to one chat; without it, all your goals are listed
    pub chat_id: Option<String>,

    /// Only list goals with this status (ignored when a chat is given)
    #[arg(long, value_name = "STATUS")]
    pub status: Option<String>,
}

#[derive(Args, Debug)]
pub struct GoalShow {
    pub id: String,

    /// Include the ordered step list
    #[arg(long)]
    pub with_steps: bool,
}

#[derive(Args, Debug)]
pub struct GoalUpdate {
    pub id: String,

    #[arg(long, value_name = "TEXT")]
    pub title: Option<String>,

    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,

    /// not_started, in_progress or completed
    #[arg(long, value_name = "STATUS")]
    pub status: Option<String>,

    /// low, medium or high
    #[arg(long, value_name = "PRIORITY")]
    pub priority: Option<String>,

    /// RFC 3339 timestamp
    #[arg(long, value_name = "WHEN")]
    pub deadline: Option<String>,
}

#[derive(Args, Debug)]
pub struct GoalRemove {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct GoalProgress {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct StepAdd {
    pub goal_id: String,
    pub title: String,

    /// Explicit position; the next free slot is used when omitted
    #[arg(long, value_name = "N", allow_hyphen_values = true)]
    pub order: Option<i32>,
}

#[derive(Args, Debug)]
pub struct StepList {
    pub goal_id: String,
}

#[derive(Args, Debug)]
pub struct StepUpdate {
    pub id: String,

    #[arg(long, value_name = "TEXT")]
    pub title: String,
}

#[derive(Args, Debug)]
pub struct StepToggle {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct StepRemove {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct StepReorder {
    pub goal_id: String,

    /// One or more STEP_ID:ORDER pairs
    #[arg(value_name = "STEP_ID:ORDER", required = true)]
    pub entries: Vec<String>,
}

#[derive(Args, Debug)]
pub struct StepBulk {
    pub goal_id: String,

    /// JSON object per change, e.g. '{"id":"...","is_completed":true}'
    #[arg(long = "change", value_name = "JSON", required = true)]
    pub changes: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Plan text (read from stdin when omitted)
    #[arg(long, value_name = "TEXT")]
    pub text: Option<String>,
}
