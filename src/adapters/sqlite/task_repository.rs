//! SQLite-backed `TaskRepository` (C1).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RetryPolicy, Task, TaskState, TaskType};
use crate::domain::ports::{TaskFilter, TaskPage, TaskRepository};

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Task> {
    let task_type_str: String = row.try_get("task_type")?;
    let state_str: String = row.try_get("state")?;
    let payload_str: String = row.try_get("payload")?;

    Ok(Task {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        task_type: TaskType::from_str(&task_type_str)
            .ok_or_else(|| DomainError::SerializationError(format!("unknown task_type {task_type_str}")))?,
        state: TaskState::from_str(&state_str)
            .ok_or_else(|| DomainError::SerializationError(format!("unknown state {state_str}")))?,
        immediate: row.try_get::<i64, _>("immediate")? != 0,
        execute_time: parse_datetime(&row.try_get::<String, _>("execute_time")?)?,
        retry_count: row.try_get::<i64, _>("retry_count")? as u32,
        retry_policy: RetryPolicy::new(
            row.try_get::<i64, _>("max_attempts")? as u32,
            row.try_get::<i64, _>("backoff_sec")? as u64,
        ),
        payload: serde_json::from_str(&payload_str)?,
        parent_task_id: parse_optional_uuid(row.try_get("parent_task_id")?)?,
        trace_id: parse_uuid(&row.try_get::<String, _>("trace_id")?)?,
        group_id: parse_uuid(&row.try_get::<String, _>("group_id")?)?,
        project_id: parse_optional_uuid(row.try_get("project_id")?)?,
        user_id: parse_optional_uuid(row.try_get("user_id")?)?,
        level: row.try_get::<i64, _>("level")? as u32,
        trace_carrier: row.try_get("trace_carrier")?,
        group_carrier: row.try_get("group_carrier")?,
        error_message: row.try_get("error_message")?,
        created_at: parse_datetime(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_datetime(&row.try_get::<String, _>("updated_at")?)?,
    })
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn upsert(&self, task: &Task) -> DomainResult<()> {
        let payload = serde_json::to_string(&task.payload)?;
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, task_type, state, immediate, execute_time, retry_count,
                max_attempts, backoff_sec, payload, parent_task_id, trace_id,
                group_id, project_id, user_id, level, trace_carrier,
                group_carrier, error_message, archived, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                task_type = excluded.task_type,
                state = excluded.state,
                immediate = excluded.immediate,
                execute_time = excluded.execute_time,
                retry_count = excluded.retry_count,
                max_attempts = excluded.max_attempts,
                backoff_sec = excluded.backoff_sec,
                payload = excluded.payload,
                parent_task_id = excluded.parent_task_id,
                trace_id = excluded.trace_id,
                group_id = excluded.group_id,
                project_id = excluded.project_id,
                user_id = excluded.user_id,
                level = excluded.level,
                trace_carrier = excluded.trace_carrier,
                group_carrier = excluded.group_carrier,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.task_type.as_str())
        .bind(task.state.as_str())
        .bind(task.immediate as i64)
        .bind(task.execute_time.to_rfc3339())
        .bind(task.retry_count as i64)
        .bind(task.retry_policy.max_attempts as i64)
        .bind(task.retry_policy.backoff_sec as i64)
        .bind(payload)
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(task.trace_id.to_string())
        .bind(task.group_id.to_string())
        .bind(task.project_id.map(|id| id.to_string()))
        .bind(task.user_id.map(|id| id.to_string()))
        .bind(task.level as i64)
        .bind(&task.trace_carrier)
        .bind(&task.group_carrier)
        .bind(&task.error_message)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list_by_trace(&self, trace_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE trace_id = ? ORDER BY level ASC, created_at ASC")
            .bind(trace_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn list_by_group(&self, group_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE group_id = ? ORDER BY created_at ASC")
            .bind(group_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn list_paged(&self, filter: TaskFilter, cursor: Option<Uuid>, limit: u32) -> DomainResult<TaskPage> {
        let mut sql = String::from("SELECT * FROM tasks WHERE 1 = 1");
        if filter.state.is_some() {
            sql.push_str(" AND state = ?");
        }
        if filter.group_id.is_some() {
            sql.push_str(" AND group_id = ?");
        }
        if filter.project_id.is_some() {
            sql.push_str(" AND project_id = ?");
        }
        if cursor.is_some() {
            sql.push_str(" AND id > ?");
        }
        sql.push_str(" ORDER BY id ASC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(state) = filter.state {
            query = query.bind(state.as_str());
        }
        if let Some(group_id) = filter.group_id {
            query = query.bind(group_id.to_string());
        }
        if let Some(project_id) = filter.project_id {
            query = query.bind(project_id.to_string());
        }
        if let Some(cursor) = cursor {
            query = query.bind(cursor.to_string());
        }
        // Fetch one extra row to know whether a next page exists.
        query = query.bind((limit + 1) as i64);

        let rows = query.fetch_all(&self.pool).await?;
        let mut tasks: Vec<Task> = rows.iter().map(row_to_task).collect::<DomainResult<_>>()?;
        let next_cursor = if tasks.len() > limit as usize {
            tasks.truncate(limit as usize);
            tasks.last().map(|t| t.id)
        } else {
            None
        };
        Ok(TaskPage { tasks, next_cursor })
    }

    async fn list_by_state(&self, state: TaskState) -> DomainResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE state = ? AND archived = 0")
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn archive(&self, id: Uuid) -> DomainResult<()> {
        sqlx::query("UPDATE tasks SET archived = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Compare-and-swap state transition used by the dispatcher so a promoted
/// task is never observed as both `Pending` and `Running` (§4.1).
pub async fn transition_if_state(
    pool: &SqlitePool,
    id: Uuid,
    expected: TaskState,
    next: TaskState,
    now: DateTime<Utc>,
) -> DomainResult<bool> {
    let result = sqlx::query("UPDATE tasks SET state = ?, updated_at = ? WHERE id = ? AND state = ?")
        .bind(next.as_str())
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .bind(expected.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}
