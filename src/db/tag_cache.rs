//! Persistent classification cache: one row per classified communication.
//!
//! Entries never expire — communication content is immutable once created,
//! so a classification stays valid until explicitly invalidated or
//! overwritten by a cache-bypass re-run. `put` is a plain last-writer-wins
//! upsert; there is no concurrent-writer coordination requirement.

use std::collections::BTreeMap;

use rusqlite::params;

use super::{DbError, PipelineDb};
use crate::types::ProjectTag;

impl PipelineDb {
    /// Look up a cached classification by communication id.
    pub fn get_cached_tag(&self, id: &str) -> Result<Option<ProjectTag>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT code, full_name, reason, classified_at
             FROM project_tag_cache
             WHERE id = ?1",
        )?;

        let mut rows = stmt.query_map(params![id], |row| {
            Ok(ProjectTag {
                code: row.get(0)?,
                full_name: row.get(1)?,
                reason: row.get(2)?,
                classified_at: row.get(3)?,
            })
        })?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Insert or replace the cached classification for a communication.
    /// Atomic at the row level: a concurrent reader sees either the old
    /// entry or the new one, never a partial write.
    pub fn put_cached_tag(&self, id: &str, tag: &ProjectTag) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO project_tag_cache (id, code, full_name, reason, classified_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                full_name = excluded.full_name,
                reason = excluded.reason,
                classified_at = excluded.classified_at",
            params![id, tag.code, tag.full_name, tag.reason, tag.classified_at],
        )?;
        Ok(())
    }

    /// Drop the cached classification for a communication, if any.
    pub fn invalidate_cached_tag(&self, id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM project_tag_cache WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Cache statistics: total entries and per-code counts. Operators use
    /// these to judge whether a partial run is trustworthy.
    pub fn cache_stats(&self) -> Result<(usize, BTreeMap<String, usize>), DbError> {
        let total: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM project_tag_cache",
            [],
            |row| row.get::<_, i64>(0).map(|n| n as usize),
        )?;

        let mut by_code = BTreeMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT code, COUNT(*) FROM project_tag_cache GROUP BY code",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        for row in rows {
            let (code, count) = row?;
            by_code.insert(code, count);
        }

        Ok((total, by_code))
    }
}
