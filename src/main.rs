mod app;
mod cli;
mod db;
mod entities;
mod error;
mod extract;
mod model;
mod service;
mod util;

use std::io::Read;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::cli::{Cli, Command, GoalCommand, StepCommand};
use crate::error::AppError;
use crate::model::{
    GoalChanges, GoalStatus, NewGoal, Priority, StepBulkChange, StepDraft, StepOrderChange,
};
use crate::service::Service;

const DATA_DIR_ENV: &str = "GOALTRACK_HOME";
const USER_ID_ENV: &str = "GOALTRACK_USER";

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    match cli.command {
        // Extraction is pure, so it needs neither storage nor an identity.
        Command::Extract(args) => {
            let text = read_text(args.text)?;
            let plan = extract::extract(&text);
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
        command => {
            let requester = cli
                .user_id
                .or_else(|| std::env::var(USER_ID_ENV).ok());
            let requester = requester.as_deref();

            let data_dir = resolve_data_dir(cli.data_dir)?;
            let db_path = db::resolve_db_path(&data_dir);
            db::ensure_parent_dir(&db_path)?;
            let mut lock = db::open_lock(&db_path)?;
            let _guard = lock.write()?;
            debug!(db = %db_path.display(), "opening database");
            let db = db::connect(&db_path).await?;
            db::ensure_schema(&db).await?;
            let service = Service::new(App::new(db));

            match command {
                Command::Goal(command) => handle_goal(&service, requester, command).await,
                Command::Step(command) => handle_step(&service, requester, command).await,
                Command::Extract(_) => unreachable!("handled above"),
            }
        }
    }
}

fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf, AppError> {
    let dir = flag
        .or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    if dir.is_absolute() {
        Ok(dir)
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

fn read_text(arg: Option<String>) -> Result<String, AppError> {
    match arg {
        Some(text) => Ok(text),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn parse_deadline(value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| AppError::Validation(format!("invalid deadline {value:?}: {err}")))
}

fn parse_order_entry(entry: &str) -> Result<StepOrderChange, AppError> {
    let Some((id, order)) = entry.rsplit_once(':') else {
        return Err(AppError::Validation(format!(
            "invalid reorder entry {entry:?} (expected STEP_ID:ORDER)"
        )));
    };
    let order = order.parse::<i32>().map_err(|err| {
        AppError::Validation(format!("invalid order in {entry:?}: {err}"))
    })?;
    Ok(StepOrderChange {
        id: id.to_string(),
        order,
    })
}

async fn handle_goal(
    service: &Service,
    requester: Option<&str>,
    command: GoalCommand,
) -> Result<(), AppError> {
    match command {
        GoalCommand::Ingest(args) => {
            let text = read_text(args.text)?;
            let (goal, steps) = service
                .ingest_text(requester, &args.chat_id, args.message_id.as_deref(), &text)
                .await?;
            println!("Created goal ID: {} (steps: {})", goal.id, steps.len());
        }
        GoalCommand::Add(args) => {
            if !args.steps.is_empty() {
                let drafts = args.steps.iter().map(|title| StepDraft::new(title)).collect();
                let (goal, steps) = service
                    .create_from_plan(
                        requester,
                        &args.chat_id,
                        args.message_id.as_deref(),
                        &args.title,
                        args.description,
                        drafts,
                    )
                    .await?;
                println!("Created goal ID: {} (steps: {})", goal.id, steps.len());
                return Ok(());
            }
            let user_id = requester.ok_or(AppError::Unauthenticated)?;
            let mut input = NewGoal::new(&args.chat_id, user_id, &args.title);
            input.created_from_message_id = args.message_id;
            input.description = args.description;
            if let Some(status) = args.status.as_deref() {
                input.status = GoalStatus::parse(status)?;
            }
            if let Some(priority) = args.priority.as_deref() {
                input.priority = Priority::parse(priority)?;
            }
            if let Some(deadline) = args.deadline.as_deref() {
                input.deadline = Some(parse_deadline(deadline)?);
            }
            let goal = service.create_goal(requester, input).await?;
            println!("Created goal ID: {}", goal.id);
        }
        GoalCommand::List(args) => {
            let goals = match args.chat_id {
                Some(chat_id) => service.list_goals_by_chat(requester, &chat_id).await?,
                None => {
                    let status = args
                        .status
                        .as_deref()
                        .map(GoalStatus::parse)
                        .transpose()?;
                    service.list_goals(requester, status).await?
                }
            };
            if goals.is_empty() {
                println!("(no goals)");
            }
            for goal in &goals {
                println!("{}", util::format_goal_line(goal));
            }
        }
        GoalCommand::Show(args) => {
            let (goal, steps) = service.get_goal(requester, &args.id, args.with_steps).await?;
            println!("{}", util::format_goal_detail(&goal, steps.as_deref()));
        }
        GoalCommand::Update(args) => {
            let changes = GoalChanges {
                title: args.title,
                description: args.description,
                status: args.status.as_deref().map(GoalStatus::parse).transpose()?,
                priority: args.priority.as_deref().map(Priority::parse).transpose()?,
                deadline: args.deadline.as_deref().map(parse_deadline).transpose()?,
            };
            let goal = service.update_goal(requester, &args.id, changes).await?;
            println!("Updated goal ID: {}", goal.id);
        }
        GoalCommand::Remove(args) => {
            service.delete_goal(requester, &args.id).await?;
            println!("Deleted goal ID: {}", args.id);
        }
        GoalCommand::Progress(args) => {
            let progress = service.progress(requester, &args.id).await?;
            println!("{}", util::format_progress(&progress));
        }
    }
    Ok(())
}

async fn handle_step(
    service: &Service,
    requester: Option<&str>,
    command: StepCommand,
) -> Result<(), AppError> {
    match command {
        StepCommand::Add(args) => {
            let step = service
                .create_step(requester, &args.goal_id, &args.title, args.order)
                .await?;
            println!("Created step ID: {} (order {})", step.id, step.sort_order);
        }
        StepCommand::List(args) => {
            let steps = service.list_steps(requester, &args.goal_id).await?;
            if steps.is_empty() {
                println!("(no steps)");
            }
            for step in &steps {
                println!("{}", util::format_step_line(step));
            }
        }
        StepCommand::Update(args) => {
            let step = service
                .update_step_title(requester, &args.id, &args.title)
                .await?;
            println!("Updated step ID: {}", step.id);
        }
        StepCommand::Toggle(args) => {
            let step = service.toggle_step(requester, &args.id).await?;
            let state = if step.is_completed {
                "completed"
            } else {
                "not completed"
            };
            println!("Step {} is now {state}", step.id);
        }
        StepCommand::Remove(args) => {
            service.delete_step(requester, &args.id).await?;
            println!("Deleted step ID: {} (remaining steps renumbered)", args.id);
        }
        StepCommand::Reorder(args) => {
            let changes = args
                .entries
                .iter()
                .map(|entry| parse_order_entry(entry))
                .collect::<Result<Vec<_>, _>>()?;
            let steps = service
                .reorder_steps(requester, &args.goal_id, &changes)
                .await?;
            for step in &steps {
                println!("{}", util::format_step_line(step));
            }
        }
        StepCommand::Bulk(args) => {
            let changes = args
                .changes
                .iter()
                .map(|raw| serde_json::from_str::<StepBulkChange>(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let steps = service
                .bulk_update_steps(requester, &args.goal_id, changes)
                .await?;
            for step in &steps {
                println!("{}", util::format_step_line(step));
            }
        }
    }
    Ok(())
}
