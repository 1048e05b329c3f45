use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use url::Url;

use crate::entities::{goal, step};
use crate::error::AppError;

pub fn resolve_db_path(data_dir: &Path) -> PathBuf {
    resolve_goaltrack_dir(data_dir).join("goaltrack.db")
}

pub fn resolve_goaltrack_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(".goaltrack")
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn open_lock(path: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::Validation(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    Ok(Database::connect(&sqlite_url).await?)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    // Required for the goal -> step cascade to fire on sqlite.
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut goal_stmt = schema.create_table_from_entity(goal::Entity);
    goal_stmt.if_not_exists();
    db.execute(builder.build(&goal_stmt)).await?;

    let mut step_stmt = schema.create_table_from_entity(step::Entity);
    step_stmt.if_not_exists();
    db.execute(builder.build(&step_stmt)).await?;

    let mut step_index = Index::create()
        .name("idx_steps_goal_order")
        .table(step::Entity)
        .col(step::Column::GoalId)
        .col(step::Column::SortOrder)
        .to_owned();
    step_index.if_not_exists();
    db.execute(builder.build(&step_index)).await?;

    let mut chat_index = Index::create()
        .name("idx_goals_chat")
        .table(goal::Entity)
        .col(goal::Column::ChatId)
        .to_owned();
    chat_index.if_not_exists();
    db.execute(builder.build(&chat_index)).await?;

    let mut user_index = Index::create()
        .name("idx_goals_user")
        .table(goal::Entity)
        .col(goal::Column::UserId)
        .to_owned();
    user_index.if_not_exists();
    db.execute(builder.build(&user_index)).await?;

    Ok(())
}
