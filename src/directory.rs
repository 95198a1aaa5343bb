//! Static project and participant lookup tables.
//!
//! The directory is loaded once (from explicit entries or from the
//! simulated-office database) and stays read-only for the duration of a
//! pipeline run. It is passed explicitly into the classifier rather than
//! held as ambient state.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::DbError;

/// One registered project: its short code, display name, and the name
/// fragments used for keyword classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    pub code: String,
    pub full_name: String,
    pub summary: Option<String>,
    /// Extra registered fragments (campaign names, abbreviations).
    pub aliases: Vec<String>,
}

impl ProjectEntry {
    /// Name fragments checked by the keyword rule, longest-match wins.
    ///
    /// Derived variants: the full name, the name with spaces stripped, a
    /// bracketed form (subject markers like `[Health Assist]`), the first
    /// word when the name carries a version digit ("Portal 2.0" → "portal"),
    /// plus any registered aliases. All lowercase; the code itself is
    /// matched separately on word boundaries.
    pub fn match_fragments(&self) -> Vec<String> {
        let name = self.full_name.to_lowercase();
        let mut fragments = vec![name.clone(), format!("[{name}]"), name.replace(' ', "")];
        if name.chars().any(|c| c.is_ascii_digit()) {
            if let Some(first) = name.split_whitespace().next() {
                fragments.push(first.to_string());
            }
        }
        fragments.extend(self.aliases.iter().map(|a| a.to_lowercase()));
        fragments.retain(|f| !f.is_empty());
        fragments.dedup();
        fragments
    }
}

/// Immutable mapping of project codes to entries and of participant
/// identities (email address or display name) to project codes.
#[derive(Debug, Clone, Default)]
pub struct ProjectDirectory {
    projects: BTreeMap<String, ProjectEntry>,
    participants: HashMap<String, Vec<String>>,
}

impl ProjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project. If its code collides with an existing entry, a
    /// numeric suffix is appended (`WC`, `WC1`, `WC2`, ...). Returns the
    /// code actually used.
    pub fn insert_project(&mut self, entry: ProjectEntry) -> String {
        let mut code = entry.code.clone();
        let mut counter = 1;
        while self.projects.contains_key(&code) {
            code = format!("{}{}", entry.code, counter);
            counter += 1;
        }
        self.projects.insert(code.clone(), ProjectEntry { code: code.clone(), ..entry });
        code
    }

    /// Associate a participant identity with a project code. Duplicate
    /// assignments are ignored.
    pub fn assign_participant(&mut self, identity: &str, code: &str) {
        let codes = self.participants.entry(identity.to_string()).or_default();
        if !codes.iter().any(|c| c == code) {
            codes.push(code.to_string());
        }
    }

    pub fn project(&self, code: &str) -> Option<&ProjectEntry> {
        self.projects.get(code)
    }

    /// Display name for a code; falls back to the code itself for codes
    /// the directory does not know (e.g. override-pinned codes).
    pub fn full_name_for(&self, code: &str) -> String {
        self.projects
            .get(code)
            .map(|p| p.full_name.clone())
            .unwrap_or_else(|| code.to_string())
    }

    /// Project codes a participant belongs to, in assignment order.
    pub fn projects_for(&self, identity: &str) -> &[String] {
        self.participants
            .get(identity)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All registered projects in code order.
    pub fn projects(&self) -> impl Iterator<Item = &ProjectEntry> {
        self.projects.values()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Generate a short code from a project name: initials of the first two
    /// ASCII words, a single word's first four letters, or a deterministic
    /// `P{nnn}` fallback for names with no ASCII words at all.
    pub fn generate_code(name: &str) -> String {
        let words: Vec<&str> = name
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|w| !w.is_empty())
            .collect();
        match words.len() {
            0 => {
                let sum: u32 = name.bytes().map(u32::from).sum();
                format!("P{:03}", sum % 1000)
            }
            1 => words[0].chars().take(4).collect::<String>().to_uppercase(),
            _ => words
                .iter()
                .take(2)
                .filter_map(|w| w.chars().next())
                .collect::<String>()
                .to_uppercase(),
        }
    }

    /// Load projects and participant assignments from the simulated-office
    /// database (`project_plans`, `project_assignments`, `people`).
    ///
    /// Each person is mapped under both their email address and display
    /// name, since emails identify senders on the email channel and handles
    /// or names identify them on chat.
    pub fn from_simulation_db(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut directory = Self::new();

        let mut code_by_project_id: HashMap<i64, String> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT id, project_name, project_summary FROM project_plans ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?;
            for row in rows {
                let (id, name, summary) = row?;
                let code = directory.insert_project(ProjectEntry {
                    code: Self::generate_code(&name),
                    full_name: name,
                    summary,
                    aliases: Vec::new(),
                });
                code_by_project_id.insert(id, code);
            }
        }

        {
            let mut stmt = conn.prepare(
                "SELECT pa.project_id, p.name, p.email_address
                 FROM project_assignments pa
                 JOIN people p ON pa.person_id = p.id
                 ORDER BY pa.project_id, p.name",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?;
            for row in rows {
                let (project_id, name, email) = row?;
                let Some(code) = code_by_project_id.get(&project_id) else {
                    continue;
                };
                if let Some(email) = email.as_deref().filter(|e| !e.is_empty()) {
                    directory.assign_participant(email, code);
                }
                if let Some(name) = name.as_deref().filter(|n| !n.is_empty()) {
                    directory.assign_participant(name, code);
                }
            }
        }

        log::info!(
            "Loaded {} projects and {} participant identities from {}",
            directory.projects.len(),
            directory.participants.len(),
            path.display()
        );
        Ok(directory)
    }
}
