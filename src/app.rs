use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{goal, step};
use crate::error::AppError;
use crate::model::{
    GoalChanges, GoalStatus, NewGoal, Progress, StepBulkChange, StepChanges, StepDraft,
    StepOrderChange,
};

/// Persistence operations on goals and steps. Composite mutations run inside
/// a single transaction so partial writes are never observable.
pub struct App {
    db: DatabaseConnection,
}

impl App {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create_goal(&self, input: NewGoal) -> Result<goal::Model, AppError> {
        let created = self.create_goal_with_conn(&self.db, input).await?;
        debug!(goal_id = %created.id, "created goal");
        Ok(created)
    }

    async fn create_goal_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        input: NewGoal,
    ) -> Result<goal::Model, AppError> {
        ensure_non_empty("goal title", &input.title)?;
        let active = goal::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            chat_id: Set(input.chat_id),
            user_id: Set(input.user_id),
            created_from_message_id: Set(input.created_from_message_id),
            title: Set(input.title),
            description: Set(input.description),
            status: Set(input.status.as_str().to_string()),
            priority: Set(input.priority.as_str().to_string()),
            deadline: Set(input.deadline),
            created_at: Set(Utc::now()),
        };
        Ok(active.insert(db).await?)
    }

    pub async fn find_goal(&self, id: &str) -> Result<Option<goal::Model>, AppError> {
        Ok(goal::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn goals_for_chat(&self, chat_id: &str) -> Result<Vec<goal::Model>, AppError> {
        Ok(goal::Entity::find()
            .filter(goal::Column::ChatId.eq(chat_id))
            .order_by_asc(goal::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn goals_for_user(
        &self,
        user_id: &str,
        status: Option<GoalStatus>,
    ) -> Result<Vec<goal::Model>, AppError> {
        let mut select = goal::Entity::find().filter(goal::Column::UserId.eq(user_id));
        if let Some(status) = status {
            select = select.filter(goal::Column::Status.eq(status.as_str()));
        }
        Ok(select.order_by_asc(goal::Column::CreatedAt).all(&self.db).await?)
    }

    /// Partial update: only supplied fields are written, the rest are left
    /// untouched.
    pub async fn update_goal(
        &self,
        id: &str,
        changes: GoalChanges,
    ) -> Result<goal::Model, AppError> {
        if let Some(title) = changes.title.as_deref() {
            ensure_non_empty("goal title", title)?;
        }

        let existing = goal::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("goal id {id}")))?;

        let GoalChanges {
            title,
            description,
            status,
            priority,
            deadline,
        } = changes;
        if title.is_none()
            && description.is_none()
            && status.is_none()
            && priority.is_none()
            && deadline.is_none()
        {
            return Ok(existing);
        }

        let mut active = goal::ActiveModel {
            id: Set(existing.id.clone()),
            ..Default::default()
        };
        if let Some(title) = title {
            active.title = Set(title);
        }
        if let Some(description) = description {
            active.description = Set(Some(description));
        }
        if let Some(status) = status {
            active.status = Set(status.as_str().to_string());
        }
        if let Some(priority) = priority {
            active.priority = Set(priority.as_str().to_string());
        }
        if let Some(deadline) = deadline {
            active.deadline = Set(Some(deadline));
        }

        match active.update(&self.db).await {
            Ok(model) => Ok(model),
            Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
                Err(AppError::NotFound(format!("goal id {id}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Deletes a goal; its steps go with it via the storage-layer cascade.
    pub async fn delete_goal(&self, id: &str) -> Result<(), AppError> {
        let result = goal::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("goal id {id}")));
        }
        debug!(goal_id = %id, "deleted goal");
        Ok(())
    }

    pub async fn create_step(
        &self,
        goal_id: &str,
        title: &str,
        order: Option<i32>,
    ) -> Result<step::Model, AppError> {
        ensure_non_empty("step title", title)?;
        if let Some(order) = order {
            ensure_non_negative("step order", order)?;
        }

        let txn = self.db.begin().await?;
        let result: Result<step::Model, AppError> = async {
            require_goal_with_conn(&txn, goal_id).await?;
            let sort_order = match order {
                Some(order) => order,
                None => next_order_with_conn(&txn, goal_id).await?,
            };
            insert_step_with_conn(&txn, goal_id, title, sort_order).await
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Bulk step creation under an existing goal. Drafts without an explicit
    /// order are sequenced from the current maximum, in array order.
    pub async fn create_steps(
        &self,
        goal_id: &str,
        drafts: Vec<StepDraft>,
    ) -> Result<Vec<step::Model>, AppError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        for draft in &drafts {
            ensure_non_empty("step title", &draft.title)?;
            if let Some(order) = draft.order {
                ensure_non_negative("step order", order)?;
            }
        }

        let txn = self.db.begin().await?;
        let result: Result<Vec<step::Model>, AppError> = async {
            require_goal_with_conn(&txn, goal_id).await?;
            let mut next = next_order_with_conn(&txn, goal_id).await?;
            let mut created = Vec::with_capacity(drafts.len());
            for draft in drafts {
                let sort_order = match draft.order {
                    Some(order) => order,
                    None => {
                        let order = next;
                        next += 1;
                        order
                    }
                };
                created.push(insert_step_with_conn(&txn, goal_id, &draft.title, sort_order).await?);
            }
            Ok(created)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn find_step(&self, id: &str) -> Result<Option<step::Model>, AppError> {
        Ok(step::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn steps_for_goal(&self, goal_id: &str) -> Result<Vec<step::Model>, AppError> {
        steps_for_goal_with_conn(&self.db, goal_id).await
    }

    pub async fn update_step(
        &self,
        id: &str,
        changes: StepChanges,
    ) -> Result<step::Model, AppError> {
        let txn = self.db.begin().await?;
        let result = update_step_with_conn(&txn, id, changes).await;
        finalize_transaction(txn, result).await
    }

    /// Flips completion, with the same `completed_at` bookkeeping as
    /// `update_step`. Concurrent toggles race at the storage layer and the
    /// last committed write wins.
    pub async fn toggle_step(&self, id: &str) -> Result<step::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<step::Model, AppError> = async {
            let existing = step::Entity::find_by_id(id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("step id {id}")))?;
            let changes = StepChanges {
                title: None,
                is_completed: Some(!existing.is_completed),
            };
            update_step_with_conn(&txn, id, changes).await
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Deletes a step and renumbers the surviving siblings to a dense
    /// zero-based sequence, as one transaction.
    pub async fn delete_step(&self, id: &str) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        let result: Result<(), AppError> = async {
            let existing = step::Entity::find_by_id(id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("step id {id}")))?;
            step::Entity::delete_by_id(id).exec(&txn).await?;
            renumber_steps_with_conn(&txn, &existing.goal_id).await?;
            Ok(())
        }
        .await;

        finalize_transaction(txn, result).await?;
        debug!(step_id = %id, "deleted step");
        Ok(())
    }

    /// Atomically inserts a goal with all its plan steps. Steps get
    /// zero-based sequential orders matching list order unless a draft
    /// carries an explicit override. Nothing is committed on failure.
    pub async fn ingest(
        &self,
        input: NewGoal,
        drafts: Vec<StepDraft>,
    ) -> Result<(goal::Model, Vec<step::Model>), AppError> {
        ensure_non_empty("goal title", &input.title)?;
        for draft in &drafts {
            ensure_non_empty("step title", &draft.title)?;
            if let Some(order) = draft.order {
                ensure_non_negative("step order", order)?;
            }
        }

        let txn = self.db.begin().await?;
        let result: Result<(goal::Model, Vec<step::Model>), AppError> = async {
            let goal_model = self.create_goal_with_conn(&txn, input).await?;
            let mut steps = Vec::with_capacity(drafts.len());
            for (idx, draft) in drafts.into_iter().enumerate() {
                let sort_order = draft.order.unwrap_or(idx as i32);
                steps.push(
                    insert_step_with_conn(&txn, &goal_model.id, &draft.title, sort_order).await?,
                );
            }
            Ok((goal_model, steps))
        }
        .await;

        let result = finalize_transaction(txn, result).await?;
        debug!(goal_id = %result.0.id, steps = result.1.len(), "ingested plan");
        Ok(result)
    }

    /// Bulk order overwrite. Each step must belong to the goal. Uniqueness
    /// and density are the caller's responsibility here; only `delete_step`
    /// repairs them.
    pub async fn reorder_steps(
        &self,
        goal_id: &str,
        changes: &[StepOrderChange],
    ) -> Result<Vec<step::Model>, AppError> {
        for change in changes {
            ensure_non_negative("step order", change.order)?;
        }

        let txn = self.db.begin().await?;
        let result: Result<Vec<step::Model>, AppError> = async {
            require_goal_with_conn(&txn, goal_id).await?;
            for change in changes {
                let existing = require_owned_step_with_conn(&txn, goal_id, &change.id).await?;
                let mut active: step::ActiveModel = existing.into();
                active.sort_order = Set(change.order);
                active.update(&txn).await?;
            }
            steps_for_goal_with_conn(&txn, goal_id).await
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Applies per-step field updates plus optional order overwrites as one
    /// transaction: all entries succeed or none do.
    pub async fn bulk_update_steps(
        &self,
        goal_id: &str,
        changes: Vec<StepBulkChange>,
    ) -> Result<Vec<step::Model>, AppError> {
        for change in &changes {
            if let Some(title) = change.title.as_deref() {
                ensure_non_empty("step title", title)?;
            }
            if let Some(order) = change.order {
                ensure_non_negative("step order", order)?;
            }
        }

        let txn = self.db.begin().await?;
        let result: Result<Vec<step::Model>, AppError> = async {
            require_goal_with_conn(&txn, goal_id).await?;
            for change in changes {
                require_owned_step_with_conn(&txn, goal_id, &change.id).await?;
                let updated = update_step_with_conn(
                    &txn,
                    &change.id,
                    StepChanges {
                        title: change.title,
                        is_completed: change.is_completed,
                    },
                )
                .await?;
                if let Some(order) = change.order {
                    let mut active: step::ActiveModel = updated.into();
                    active.sort_order = Set(order);
                    active.update(&txn).await?;
                }
            }
            steps_for_goal_with_conn(&txn, goal_id).await
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn progress(&self, goal_id: &str) -> Result<Progress, AppError> {
        require_goal_with_conn(&self.db, goal_id).await?;
        let total = step::Entity::find()
            .filter(step::Column::GoalId.eq(goal_id))
            .count(&self.db)
            .await?;
        let completed = step::Entity::find()
            .filter(step::Column::GoalId.eq(goal_id))
            .filter(step::Column::IsCompleted.eq(true))
            .count(&self.db)
            .await?;
        let percentage = if total == 0 {
            0
        } else {
            ((completed as f64) * 100.0 / (total as f64)).round() as u32
        };
        Ok(Progress {
            completed,
            total,
            percentage,
        })
    }
}

async fn require_goal_with_conn<C: ConnectionTrait>(
    db: &C,
    goal_id: &str,
) -> Result<goal::Model, AppError> {
    goal::Entity::find_by_id(goal_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("goal id {goal_id}")))
}

async fn require_owned_step_with_conn<C: ConnectionTrait>(
    db: &C,
    goal_id: &str,
    step_id: &str,
) -> Result<step::Model, AppError> {
    let existing = step::Entity::find_by_id(step_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("step id {step_id}")))?;
    if existing.goal_id != goal_id {
        return Err(AppError::NotFound(format!(
            "step {step_id} does not belong to goal {goal_id}"
        )));
    }
    Ok(existing)
}

async fn steps_for_goal_with_conn<C: ConnectionTrait>(
    db: &C,
    goal_id: &str,
) -> Result<Vec<step::Model>, AppError> {
    Ok(step::Entity::find()
        .filter(step::Column::GoalId.eq(goal_id))
        .order_by_asc(step::Column::SortOrder)
        .order_by_asc(step::Column::CreatedAt)
        .all(db)
        .await?)
}

async fn next_order_with_conn<C: ConnectionTrait>(
    db: &C,
    goal_id: &str,
) -> Result<i32, AppError> {
    let last = step::Entity::find()
        .filter(step::Column::GoalId.eq(goal_id))
        .order_by_desc(step::Column::SortOrder)
        .one(db)
        .await?;
    Ok(last.map(|step| step.sort_order + 1).unwrap_or(0))
}

async fn insert_step_with_conn<C: ConnectionTrait>(
    db: &C,
    goal_id: &str,
    title: &str,
    sort_order: i32,
) -> Result<step::Model, AppError> {
    let active = step::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        goal_id: Set(goal_id.to_string()),
        title: Set(title.to_string()),
        is_completed: Set(false),
        sort_order: Set(sort_order),
        completed_at: Set(None),
        created_at: Set(Utc::now()),
    };
    Ok(active.insert(db).await?)
}

async fn update_step_with_conn<C: ConnectionTrait>(
    db: &C,
    id: &str,
    changes: StepChanges,
) -> Result<step::Model, AppError> {
    if let Some(title) = changes.title.as_deref() {
        ensure_non_empty("step title", title)?;
    }

    let existing = step::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("step id {id}")))?;

    if changes.title.is_none() && changes.is_completed.is_none() {
        return Ok(existing);
    }

    let mut active = step::ActiveModel {
        id: Set(existing.id.clone()),
        ..Default::default()
    };
    if let Some(title) = changes.title {
        active.title = Set(title);
    }
    if let Some(is_completed) = changes.is_completed {
        // completed_at tracks is_completed within the same write.
        active.is_completed = Set(is_completed);
        active.completed_at = Set(is_completed.then(Utc::now));
    }

    match active.update(db).await {
        Ok(model) => Ok(model),
        Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
            Err(AppError::NotFound(format!("step id {id}")))
        }
        Err(err) => Err(err.into()),
    }
}

/// Rewrites the goal's surviving steps to the dense sequence `0..n-1`,
/// preserving their current relative order.
async fn renumber_steps_with_conn<C: ConnectionTrait>(
    db: &C,
    goal_id: &str,
) -> Result<(), AppError> {
    let steps = steps_for_goal_with_conn(db, goal_id).await?;
    for (idx, step_model) in steps.into_iter().enumerate() {
        let desired_order = idx as i32;
        if step_model.sort_order != desired_order {
            let mut active: step::ActiveModel = step_model.into();
            active.sort_order = Set(desired_order);
            active.update(db).await?;
        }
    }
    Ok(())
}

async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}

fn ensure_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{label} cannot be empty")));
    }
    Ok(())
}

fn ensure_non_negative(label: &str, value: i32) -> Result<(), AppError> {
    if value < 0 {
        return Err(AppError::Validation(format!(
            "{label} cannot be negative (got {value})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::Priority;
    use tempfile::TempDir;

    const TEST_USER_ID: &str = "user-1";
    const TEST_CHAT_ID: &str = "chat-1";

    async fn setup_app() -> (TempDir, App) {
        let dir = TempDir::new().expect("temp dir");
        let db_path = db::resolve_db_path(dir.path());
        db::ensure_parent_dir(&db_path).expect("ensure parent");
        let db = db::connect(&db_path).await.expect("connect db");
        db::ensure_schema(&db).await.expect("ensure schema");
        (dir, App::new(db))
    }

    async fn create_goal(app: &App, title: &str) -> goal::Model {
        app.create_goal(NewGoal::new(TEST_CHAT_ID, TEST_USER_ID, title))
            .await
            .expect("create goal")
    }

    async fn add_step(app: &App, goal_id: &str, title: &str) -> step::Model {
        app.create_step(goal_id, title, None).await.expect("create step")
    }

    fn orders(steps: &[step::Model]) -> Vec<i32> {
        steps.iter().map(|step| step.sort_order).collect()
    }

    #[tokio::test]
    async fn create_goal_applies_defaults() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;

        assert!(!goal.id.is_empty());
        assert_eq!(goal.status, GoalStatus::NotStarted.as_str());
        assert_eq!(goal.priority, Priority::Medium.as_str());
        assert_eq!(goal.description, None);
        assert_eq!(goal.deadline, None);
    }

    #[tokio::test]
    async fn create_goal_rejects_blank_title_without_writing() {
        let (_dir, app) = setup_app().await;
        let err = app
            .create_goal(NewGoal::new(TEST_CHAT_ID, TEST_USER_ID, "   "))
            .await
            .unwrap_err();
        match err {
            AppError::Validation(message) => {
                assert!(message.contains("goal title cannot be empty"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let count = goal::Entity::find().count(&app.db).await.expect("count goals");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn update_goal_writes_only_supplied_fields() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;

        let updated = app
            .update_goal(
                &goal.id,
                GoalChanges {
                    status: Some(GoalStatus::InProgress),
                    ..Default::default()
                },
            )
            .await
            .expect("update goal");

        assert_eq!(updated.status, GoalStatus::InProgress.as_str());
        assert_eq!(updated.title, "Learn guitar");
        assert_eq!(updated.priority, Priority::Medium.as_str());
    }

    #[tokio::test]
    async fn update_goal_rejects_blank_title() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;

        let err = app
            .update_goal(
                &goal.id,
                GoalChanges {
                    title: Some("   ".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        match err {
            AppError::Validation(message) => {
                assert!(message.contains("goal title cannot be empty"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let goal_after = app.find_goal(&goal.id).await.expect("find goal").expect("goal");
        assert_eq!(goal_after.title, "Learn guitar");
    }

    #[tokio::test]
    async fn update_goal_reports_missing_id() {
        let (_dir, app) = setup_app().await;
        let err = app
            .update_goal("no-such-goal", GoalChanges::default())
            .await
            .unwrap_err();
        match err {
            AppError::NotFound(message) => {
                assert!(message.contains("goal id no-such-goal"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_goal_cascades_to_steps() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        add_step(&app, &goal.id, "Buy a guitar").await;
        add_step(&app, &goal.id, "Practice daily").await;

        app.delete_goal(&goal.id).await.expect("delete goal");

        let remaining = step::Entity::find().count(&app.db).await.expect("count steps");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn delete_goal_reports_missing_id() {
        let (_dir, app) = setup_app().await;
        let err = app.delete_goal("no-such-goal").await.unwrap_err();
        match err {
            AppError::NotFound(message) => {
                assert!(message.contains("goal id no-such-goal"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn goal_reads_return_empty_when_nothing_matches() {
        let (_dir, app) = setup_app().await;
        assert!(app.find_goal("missing").await.expect("find").is_none());
        assert!(app.goals_for_chat("missing").await.expect("by chat").is_empty());
        assert!(app
            .goals_for_user("missing", None)
            .await
            .expect("by user")
            .is_empty());
        assert!(app.steps_for_goal("missing").await.expect("steps").is_empty());
    }

    #[tokio::test]
    async fn goals_for_user_filters_by_status() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        create_goal(&app, "Run a marathon").await;
        app.update_goal(
            &goal.id,
            GoalChanges {
                status: Some(GoalStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .expect("update goal");

        let completed = app
            .goals_for_user(TEST_USER_ID, Some(GoalStatus::Completed))
            .await
            .expect("by user");
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, goal.id);

        let all = app.goals_for_user(TEST_USER_ID, None).await.expect("by user");
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn create_step_assigns_dense_orders_from_zero() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;

        let first = add_step(&app, &goal.id, "Buy a guitar").await;
        let second = add_step(&app, &goal.id, "Practice daily").await;

        assert_eq!(first.sort_order, 0);
        assert_eq!(second.sort_order, 1);
        assert!(!first.is_completed);
        assert_eq!(first.completed_at, None);
    }

    #[tokio::test]
    async fn create_step_respects_explicit_order() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;

        let step = app
            .create_step(&goal.id, "Buy a guitar", Some(7))
            .await
            .expect("create step");
        assert_eq!(step.sort_order, 7);

        // Implicit orders continue after the maximum.
        let next = add_step(&app, &goal.id, "Practice daily").await;
        assert_eq!(next.sort_order, 8);
    }

    #[tokio::test]
    async fn create_step_requires_existing_goal() {
        let (_dir, app) = setup_app().await;
        let err = app.create_step("no-such-goal", "Step", None).await.unwrap_err();
        match err {
            AppError::NotFound(message) => {
                assert!(message.contains("goal id no-such-goal"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_steps_sequences_drafts_without_explicit_order() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        add_step(&app, &goal.id, "Buy a guitar").await;

        let created = app
            .create_steps(
                &goal.id,
                vec![
                    StepDraft::new("Practice daily"),
                    StepDraft {
                        title: "Join a band".to_string(),
                        order: Some(10),
                    },
                    StepDraft::new("Record a song"),
                ],
            )
            .await
            .expect("create steps");

        // Sequence continues from max+1; the explicit order is untouched and
        // does not consume a slot.
        assert_eq!(orders(&created), vec![1, 10, 2]);
    }

    #[tokio::test]
    async fn update_step_completion_sets_and_clears_timestamp() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        let step = add_step(&app, &goal.id, "Buy a guitar").await;

        let done = app
            .update_step(
                &step.id,
                StepChanges {
                    is_completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .expect("complete step");
        assert!(done.is_completed);
        assert!(done.completed_at.is_some());

        let undone = app
            .update_step(
                &step.id,
                StepChanges {
                    is_completed: Some(false),
                    ..Default::default()
                },
            )
            .await
            .expect("reopen step");
        assert!(!undone.is_completed);
        assert_eq!(undone.completed_at, None);
    }

    #[tokio::test]
    async fn toggle_twice_returns_to_not_completed() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        let step = add_step(&app, &goal.id, "Buy a guitar").await;

        let toggled = app.toggle_step(&step.id).await.expect("toggle");
        assert!(toggled.is_completed);
        assert!(toggled.completed_at.is_some());

        let toggled_back = app.toggle_step(&step.id).await.expect("toggle back");
        assert!(!toggled_back.is_completed);
        assert_eq!(toggled_back.completed_at, None);
    }

    #[tokio::test]
    async fn delete_step_renumbers_remaining_densely() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        let first = add_step(&app, &goal.id, "Buy a guitar").await;
        let middle = add_step(&app, &goal.id, "Practice daily").await;
        let last = add_step(&app, &goal.id, "Join a band").await;

        app.delete_step(&middle.id).await.expect("delete step");

        let remaining = app.steps_for_goal(&goal.id).await.expect("list steps");
        assert_eq!(orders(&remaining), vec![0, 1]);
        assert_eq!(remaining[0].id, first.id);
        assert_eq!(remaining[1].id, last.id);
    }

    #[tokio::test]
    async fn delete_step_reports_missing_id() {
        let (_dir, app) = setup_app().await;
        let err = app.delete_step("no-such-step").await.unwrap_err();
        match err {
            AppError::NotFound(message) => {
                assert!(message.contains("step id no-such-step"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ingest_creates_goal_with_zero_based_steps() {
        let (_dir, app) = setup_app().await;
        let (goal, steps) = app
            .ingest(
                NewGoal::new(TEST_CHAT_ID, TEST_USER_ID, "Learn guitar"),
                vec![StepDraft::new("Buy a guitar"), StepDraft::new("Practice daily")],
            )
            .await
            .expect("ingest");

        assert_eq!(goal.title, "Learn guitar");
        assert_eq!(orders(&steps), vec![0, 1]);
        assert_eq!(steps[0].goal_id, goal.id);
    }

    #[tokio::test]
    async fn ingest_persists_nothing_on_failure() {
        let (_dir, app) = setup_app().await;
        let err = app
            .ingest(
                NewGoal::new(TEST_CHAT_ID, TEST_USER_ID, "Learn guitar"),
                vec![StepDraft::new("Buy a guitar"), StepDraft::new("   ")],
            )
            .await
            .unwrap_err();
        match err {
            AppError::Validation(message) => {
                assert!(message.contains("step title cannot be empty"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let goals = goal::Entity::find().count(&app.db).await.expect("count goals");
        let steps = step::Entity::find().count(&app.db).await.expect("count steps");
        assert_eq!(goals, 0);
        assert_eq!(steps, 0);
    }

    #[tokio::test]
    async fn reorder_rejects_step_of_another_goal() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        let other = create_goal(&app, "Run a marathon").await;
        let foreign = add_step(&app, &other.id, "Buy shoes").await;

        let err = app
            .reorder_steps(
                &goal.id,
                &[StepOrderChange {
                    id: foreign.id.clone(),
                    order: 0,
                }],
            )
            .await
            .unwrap_err();
        match err {
            AppError::NotFound(message) => {
                assert!(message.contains("does not belong to goal"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let untouched = app.find_step(&foreign.id).await.expect("find").expect("step");
        assert_eq!(untouched.sort_order, 0);
    }

    #[tokio::test]
    async fn reorder_allows_duplicates_until_delete_repairs_density() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        let first = add_step(&app, &goal.id, "Buy a guitar").await;
        add_step(&app, &goal.id, "Practice daily").await;
        let last = add_step(&app, &goal.id, "Join a band").await;

        // Duplicate orders are accepted as-is.
        let reordered = app
            .reorder_steps(
                &goal.id,
                &[StepOrderChange {
                    id: first.id.clone(),
                    order: 1,
                }],
            )
            .await
            .expect("reorder");
        assert_eq!(orders(&reordered), vec![1, 1, 2]);

        // A delete restores a dense unique sequence.
        app.delete_step(&last.id).await.expect("delete step");
        let remaining = app.steps_for_goal(&goal.id).await.expect("list steps");
        assert_eq!(orders(&remaining), vec![0, 1]);
    }

    #[tokio::test]
    async fn bulk_update_applies_all_entries_or_none() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        let first = add_step(&app, &goal.id, "Buy a guitar").await;
        let second = add_step(&app, &goal.id, "Practice daily").await;

        let err = app
            .bulk_update_steps(
                &goal.id,
                vec![
                    StepBulkChange {
                        id: first.id.clone(),
                        title: Some("Buy an electric guitar".to_string()),
                        is_completed: Some(true),
                        order: None,
                    },
                    StepBulkChange {
                        id: second.id.clone(),
                        title: None,
                        is_completed: None,
                        order: Some(-1),
                    },
                ],
            )
            .await
            .unwrap_err();
        match err {
            AppError::Validation(message) => {
                assert!(message.contains("step order cannot be negative"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let untouched = app.find_step(&first.id).await.expect("find").expect("step");
        assert_eq!(untouched.title, "Buy a guitar");
        assert!(!untouched.is_completed);
    }

    #[tokio::test]
    async fn bulk_update_rolls_back_midway_failures() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        let first = add_step(&app, &goal.id, "Buy a guitar").await;

        let err = app
            .bulk_update_steps(
                &goal.id,
                vec![
                    StepBulkChange {
                        id: first.id.clone(),
                        title: None,
                        is_completed: Some(true),
                        order: None,
                    },
                    StepBulkChange {
                        id: "no-such-step".to_string(),
                        title: None,
                        is_completed: Some(true),
                        order: None,
                    },
                ],
            )
            .await
            .unwrap_err();
        match err {
            AppError::NotFound(message) => {
                assert!(message.contains("step id no-such-step"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // The first entry's write was rolled back with the rest.
        let untouched = app.find_step(&first.id).await.expect("find").expect("step");
        assert!(!untouched.is_completed);
        assert_eq!(untouched.completed_at, None);
    }

    #[tokio::test]
    async fn bulk_update_completes_and_reorders() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        let first = add_step(&app, &goal.id, "Buy a guitar").await;
        let second = add_step(&app, &goal.id, "Practice daily").await;

        let steps = app
            .bulk_update_steps(
                &goal.id,
                vec![
                    StepBulkChange {
                        id: first.id.clone(),
                        title: None,
                        is_completed: Some(true),
                        order: Some(1),
                    },
                    StepBulkChange {
                        id: second.id.clone(),
                        title: Some("Practice every day".to_string()),
                        is_completed: None,
                        order: Some(0),
                    },
                ],
            )
            .await
            .expect("bulk update");

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].id, second.id);
        assert_eq!(steps[0].title, "Practice every day");
        assert_eq!(steps[1].id, first.id);
        assert!(steps[1].is_completed);
        assert!(steps[1].completed_at.is_some());
    }

    #[tokio::test]
    async fn progress_rounds_percentage() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;
        let first = add_step(&app, &goal.id, "Buy a guitar").await;
        add_step(&app, &goal.id, "Practice daily").await;
        add_step(&app, &goal.id, "Join a band").await;
        app.toggle_step(&first.id).await.expect("toggle");

        let progress = app.progress(&goal.id).await.expect("progress");
        assert_eq!(
            progress,
            Progress {
                completed: 1,
                total: 3,
                percentage: 33,
            }
        );
    }

    #[tokio::test]
    async fn progress_is_zero_for_goal_without_steps() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, "Learn guitar").await;

        let progress = app.progress(&goal.id).await.expect("progress");
        assert_eq!(
            progress,
            Progress {
                completed: 0,
                total: 0,
                percentage: 0,
            }
        );
    }
}
