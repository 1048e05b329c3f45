use crate::app::App;
use crate::entities::{goal, step};
use crate::error::AppError;
use crate::extract;
use crate::model::{
    GoalChanges, GoalStatus, NewGoal, Progress, StepBulkChange, StepChanges, StepDraft,
    StepOrderChange,
};

/// Caller-facing boundary. Every operation takes the requesting identity as
/// resolved by the session collaborator; `None` means unauthenticated, and a
/// requester that does not own the target goal is refused.
pub struct Service {
    app: App,
}

impl Service {
    pub fn new(app: App) -> Self {
        Self { app }
    }

    /// Extracts a plan from raw assistant text and persists it as a goal
    /// with steps, atomically.
    pub async fn ingest_text(
        &self,
        requester: Option<&str>,
        chat_id: &str,
        message_id: Option<&str>,
        text: &str,
    ) -> Result<(goal::Model, Vec<step::Model>), AppError> {
        let user_id = require_identity(requester)?;
        let plan = extract::extract(text);
        let mut input = NewGoal::new(chat_id, user_id, &plan.goal_title);
        input.description = plan.description;
        input.created_from_message_id = message_id.map(str::to_string);
        let drafts = input_steps(plan.steps.iter().map(|step| step.title.clone()));
        self.app.ingest(input, drafts).await
    }

    /// Persists an already-extracted plan as a goal with steps.
    pub async fn create_from_plan(
        &self,
        requester: Option<&str>,
        chat_id: &str,
        message_id: Option<&str>,
        title: &str,
        description: Option<String>,
        drafts: Vec<StepDraft>,
    ) -> Result<(goal::Model, Vec<step::Model>), AppError> {
        let user_id = require_identity(requester)?;
        let mut input = NewGoal::new(chat_id, user_id, title);
        input.description = description;
        input.created_from_message_id = message_id.map(str::to_string);
        self.app.ingest(input, drafts).await
    }

    pub async fn create_goal(
        &self,
        requester: Option<&str>,
        input: NewGoal,
    ) -> Result<goal::Model, AppError> {
        let user_id = require_identity(requester)?;
        if input.user_id != user_id {
            return Err(AppError::Forbidden(
                "cannot create a goal for another user".to_string(),
            ));
        }
        self.app.create_goal(input).await
    }

    pub async fn get_goal(
        &self,
        requester: Option<&str>,
        id: &str,
        with_steps: bool,
    ) -> Result<(goal::Model, Option<Vec<step::Model>>), AppError> {
        let user_id = require_identity(requester)?;
        let goal = self.owned_goal(user_id, id).await?;
        let steps = if with_steps {
            Some(self.app.steps_for_goal(&goal.id).await?)
        } else {
            None
        };
        Ok((goal, steps))
    }

    /// Goals of the chat that belong to the requester. Other users' goals in
    /// the same chat are filtered out rather than refused.
    pub async fn list_goals_by_chat(
        &self,
        requester: Option<&str>,
        chat_id: &str,
    ) -> Result<Vec<goal::Model>, AppError> {
        let user_id = require_identity(requester)?;
        let goals = self.app.goals_for_chat(chat_id).await?;
        Ok(goals
            .into_iter()
            .filter(|goal| goal.user_id == user_id)
            .collect())
    }

    pub async fn list_goals(
        &self,
        requester: Option<&str>,
        status: Option<GoalStatus>,
    ) -> Result<Vec<goal::Model>, AppError> {
        let user_id = require_identity(requester)?;
        self.app.goals_for_user(user_id, status).await
    }

    pub async fn update_goal(
        &self,
        requester: Option<&str>,
        id: &str,
        changes: GoalChanges,
    ) -> Result<goal::Model, AppError> {
        let user_id = require_identity(requester)?;
        self.owned_goal(user_id, id).await?;
        self.app.update_goal(id, changes).await
    }

    pub async fn delete_goal(&self, requester: Option<&str>, id: &str) -> Result<(), AppError> {
        let user_id = require_identity(requester)?;
        self.owned_goal(user_id, id).await?;
        self.app.delete_goal(id).await
    }

    pub async fn create_step(
        &self,
        requester: Option<&str>,
        goal_id: &str,
        title: &str,
        order: Option<i32>,
    ) -> Result<step::Model, AppError> {
        let user_id = require_identity(requester)?;
        self.owned_goal(user_id, goal_id).await?;
        self.app.create_step(goal_id, title, order).await
    }

    pub async fn list_steps(
        &self,
        requester: Option<&str>,
        goal_id: &str,
    ) -> Result<Vec<step::Model>, AppError> {
        let user_id = require_identity(requester)?;
        self.owned_goal(user_id, goal_id).await?;
        self.app.steps_for_goal(goal_id).await
    }

    pub async fn update_step_title(
        &self,
        requester: Option<&str>,
        step_id: &str,
        title: &str,
    ) -> Result<step::Model, AppError> {
        let user_id = require_identity(requester)?;
        self.owned_step(user_id, step_id).await?;
        self.app
            .update_step(
                step_id,
                StepChanges {
                    title: Some(title.to_string()),
                    is_completed: None,
                },
            )
            .await
    }

    pub async fn toggle_step(
        &self,
        requester: Option<&str>,
        step_id: &str,
    ) -> Result<step::Model, AppError> {
        let user_id = require_identity(requester)?;
        self.owned_step(user_id, step_id).await?;
        self.app.toggle_step(step_id).await
    }

    pub async fn delete_step(
        &self,
        requester: Option<&str>,
        step_id: &str,
    ) -> Result<(), AppError> {
        let user_id = require_identity(requester)?;
        self.owned_step(user_id, step_id).await?;
        self.app.delete_step(step_id).await
    }

    pub async fn reorder_steps(
        &self,
        requester: Option<&str>,
        goal_id: &str,
        changes: &[StepOrderChange],
    ) -> Result<Vec<step::Model>, AppError> {
        let user_id = require_identity(requester)?;
        self.owned_goal(user_id, goal_id).await?;
        self.app.reorder_steps(goal_id, changes).await
    }

    pub async fn bulk_update_steps(
        &self,
        requester: Option<&str>,
        goal_id: &str,
        changes: Vec<StepBulkChange>,
    ) -> Result<Vec<step::Model>, AppError> {
        let user_id = require_identity(requester)?;
        self.owned_goal(user_id, goal_id).await?;
        self.app.bulk_update_steps(goal_id, changes).await
    }

    pub async fn progress(
        &self,
        requester: Option<&str>,
        goal_id: &str,
    ) -> Result<Progress, AppError> {
        let user_id = require_identity(requester)?;
        self.owned_goal(user_id, goal_id).await?;
        self.app.progress(goal_id).await
    }

    async fn owned_goal(&self, user_id: &str, goal_id: &str) -> Result<goal::Model, AppError> {
        let goal = self
            .app
            .find_goal(goal_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("goal id {goal_id}")))?;
        if goal.user_id != user_id {
            return Err(AppError::Forbidden(format!(
                "goal {goal_id} belongs to another user"
            )));
        }
        Ok(goal)
    }

    async fn owned_step(&self, user_id: &str, step_id: &str) -> Result<step::Model, AppError> {
        let step = self
            .app
            .find_step(step_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("step id {step_id}")))?;
        self.owned_goal(user_id, &step.goal_id).await?;
        Ok(step)
    }
}

fn require_identity(requester: Option<&str>) -> Result<&str, AppError> {
    requester.ok_or(AppError::Unauthenticated)
}

fn input_steps(titles: impl Iterator<Item = String>) -> Vec<StepDraft> {
    titles.map(|title| StepDraft { title, order: None }).collect()
}
