//! Canonical TODO persistence.
//!
//! One row per distinct source communication at steady state. Upserts
//! route through a same-source guard so re-analysis converges on the
//! existing row instead of inserting a sibling, and a `done` status set by
//! the user is never resurrected by a later batch.

use rusqlite::params;

use super::{DbError, PipelineDb};
use crate::types::{Todo, TodoStatus, TodoType};

/// Optional filters for downstream read queries.
#[derive(Debug, Clone, Default)]
pub struct TodoFilter {
    pub project_tag: Option<String>,
    pub status: Option<TodoStatus>,
}

const TODO_COLUMNS: &str = "id, todo_type, title, description, priority, deadline, requester,
        persona, source_communication_id, evidence, status, created_at, updated_at,
        project_tag, project_full_name";

impl PipelineDb {
    /// Insert or update a canonical todo.
    ///
    /// Two guards run before the write:
    /// 1. **Source guard**: if a row for the same `source_communication_id`
    ///    already exists under a different id, that row is updated in place
    ///    (keeping its id and `created_at`) so one source never yields two
    ///    rows.
    /// 2. **Done guard**: a row already marked `done` is left untouched
    ///    except for backfilling a missing project name.
    pub fn upsert_todo(&self, todo: &Todo) -> Result<(), DbError> {
        if let Some(existing) = self.get_todo_for_source(&todo.source_communication_id)? {
            if existing.status == TodoStatus::Done {
                if existing.project_full_name.is_none() {
                    if let (Some(tag), Some(name)) = (&todo.project_tag, &todo.project_full_name) {
                        self.set_project_tag(&existing.id, tag, name)?;
                    }
                }
                return Ok(());
            }
            if existing.id != todo.id {
                return self.update_todo_in_place(&existing.id, &existing.created_at, todo);
            }
        }

        let evidence = serde_json::to_string(&todo.evidence)
            .map_err(|e| DbError::Corrupt(format!("evidence serialization: {e}")))?;
        self.conn.execute(
            "INSERT INTO todos (
                id, todo_type, title, description, priority, deadline, requester,
                persona, source_communication_id, evidence, status, created_at,
                updated_at, project_tag, project_full_name
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(id) DO UPDATE SET
                todo_type = excluded.todo_type,
                title = excluded.title,
                description = excluded.description,
                priority = excluded.priority,
                deadline = excluded.deadline,
                requester = excluded.requester,
                persona = excluded.persona,
                source_communication_id = excluded.source_communication_id,
                evidence = excluded.evidence,
                status = excluded.status,
                updated_at = excluded.updated_at,
                project_tag = excluded.project_tag,
                project_full_name = excluded.project_full_name",
            params![
                todo.id,
                todo.todo_type.as_str(),
                todo.title,
                todo.description,
                todo.priority,
                todo.deadline,
                todo.requester,
                todo.persona,
                todo.source_communication_id,
                evidence,
                todo.status.as_str(),
                todo.created_at,
                todo.updated_at,
                todo.project_tag,
                todo.project_full_name,
            ],
        )?;
        Ok(())
    }

    /// Overwrite an existing row's content while preserving its identity.
    fn update_todo_in_place(
        &self,
        existing_id: &str,
        existing_created_at: &str,
        todo: &Todo,
    ) -> Result<(), DbError> {
        let evidence = serde_json::to_string(&todo.evidence)
            .map_err(|e| DbError::Corrupt(format!("evidence serialization: {e}")))?;
        self.conn.execute(
            "UPDATE todos SET
                todo_type = ?2, title = ?3, description = ?4, priority = ?5,
                deadline = ?6, requester = ?7, persona = ?8, evidence = ?9,
                status = ?10, created_at = ?11, updated_at = ?12,
                project_tag = ?13, project_full_name = ?14
             WHERE id = ?1",
            params![
                existing_id,
                todo.todo_type.as_str(),
                todo.title,
                todo.description,
                todo.priority,
                todo.deadline,
                todo.requester,
                todo.persona,
                evidence,
                todo.status.as_str(),
                existing_created_at,
                todo.updated_at,
                todo.project_tag,
                todo.project_full_name,
            ],
        )?;
        Ok(())
    }

    /// Mark a todo as done with the current timestamp.
    pub fn mark_todo_done(&self, id: &str) -> Result<(), DbError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE todos SET status = 'done', updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(())
    }

    /// Set a todo's project classification. Used to backfill rows whose
    /// classification completed after the todo was persisted.
    pub fn set_project_tag(&self, id: &str, code: &str, full_name: &str) -> Result<(), DbError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE todos SET project_tag = ?1, project_full_name = ?2, updated_at = ?3
             WHERE id = ?4",
            params![code, full_name, now, id],
        )?;
        Ok(())
    }

    /// Fill in `project_full_name` for rows that have a tag but no display
    /// name, resolving through the given lookup. Returns the number of rows
    /// updated.
    pub fn backfill_missing_full_names(
        &self,
        resolve: impl Fn(&str) -> String,
    ) -> Result<usize, DbError> {
        let pending: Vec<(String, String)> = {
            let mut stmt = self.conn.prepare(
                "SELECT id, project_tag FROM todos
                 WHERE project_tag IS NOT NULL AND project_full_name IS NULL",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };

        for (id, tag) in &pending {
            self.set_project_tag(id, tag, &resolve(tag))?;
        }
        Ok(pending.len())
    }

    /// Get a single todo by its id.
    pub fn get_todo_by_id(&self, id: &str) -> Result<Option<Todo>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_todo_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Get the canonical todo for a source communication, if one exists.
    pub fn get_todo_for_source(&self, source_id: &str) -> Result<Option<Todo>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TODO_COLUMNS} FROM todos
             WHERE source_communication_id = ?1
             ORDER BY created_at, id
             LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![source_id], Self::map_todo_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Read surface for downstream consumers: todos for one persona with
    /// optional project/status filters. Deadlined todos come first (soonest
    /// deadline), then by priority.
    pub fn get_todos_for_persona(
        &self,
        persona: &str,
        filter: &TodoFilter,
    ) -> Result<Vec<Todo>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TODO_COLUMNS} FROM todos
             WHERE persona = ?1
               AND (?2 IS NULL OR project_tag = ?2)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY
               CASE WHEN deadline IS NULL THEN 1 ELSE 0 END,
               deadline,
               priority,
               created_at"
        ))?;

        let status = filter.status.map(|s| s.as_str());
        let rows = stmt.query_map(
            params![persona, filter.project_tag, status],
            Self::map_todo_row,
        )?;

        let mut todos = Vec::new();
        for row in rows {
            todos.push(row?);
        }
        Ok(todos)
    }

    /// Groups of persisted todos sharing one source communication id.
    /// Steady state is zero groups; non-empty output means an earlier run
    /// predates same-source guarding and needs cleanup.
    pub fn find_duplicate_source_groups(&self) -> Result<Vec<(String, Vec<Todo>)>, DbError> {
        let sources: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT source_communication_id FROM todos
                 GROUP BY source_communication_id
                 HAVING COUNT(*) > 1
                 ORDER BY source_communication_id",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let mut groups = Vec::with_capacity(sources.len());
        for source in sources {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {TODO_COLUMNS} FROM todos
                 WHERE source_communication_id = ?1
                 ORDER BY created_at, id"
            ))?;
            let rows = stmt.query_map(params![source], Self::map_todo_row)?;
            let todos: Vec<Todo> = rows.collect::<Result<_, _>>()?;
            groups.push((source, todos));
        }
        Ok(groups)
    }

    /// Delete a todo row. Used when duplicate cleanup discards losers.
    pub fn delete_todo(&self, id: &str) -> Result<(), DbError> {
        self.conn.execute("DELETE FROM todos WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Helper: map the standard 15-column todo SELECT.
    fn map_todo_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Todo> {
        let todo_type: String = row.get(1)?;
        let evidence_raw: String = row.get(9)?;
        let evidence: Vec<String> = serde_json::from_str(&evidence_raw).unwrap_or_else(|e| {
            log::warn!("Malformed evidence column, treating as empty: {}", e);
            Vec::new()
        });
        let status: String = row.get(10)?;
        Ok(Todo {
            id: row.get(0)?,
            todo_type: TodoType::parse(&todo_type),
            title: row.get(2)?,
            description: row.get(3)?,
            priority: row.get(4)?,
            deadline: row.get(5)?,
            requester: row.get(6)?,
            persona: row.get(7)?,
            source_communication_id: row.get(8)?,
            evidence,
            status: TodoStatus::parse(&status),
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
            project_tag: row.get(13)?,
            project_full_name: row.get(14)?,
        })
    }
}
