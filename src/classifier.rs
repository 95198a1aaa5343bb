//! Project classification for inbound communications.
//!
//! Classification is an ordered chain of rule evaluators sharing one
//! interface, so rules can be added or reordered without touching the
//! classifier's control flow. Precedence: explicit overrides, then
//! participant mapping, then keyword matching, then the `UNKNOWN` sentinel.
//!
//! Results are cached per communication id. Content is immutable once
//! generated, so a cached tag stays valid until a caller bypasses the cache
//! explicitly.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::db::{DbError, PipelineDb};
use crate::directory::ProjectDirectory;
use crate::types::{Communication, ProjectTag};

/// A successful rule evaluation: the project code plus a human-readable
/// justification recorded in the cache.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub code: String,
    pub reason: String,
}

/// One evaluator in the classification chain.
pub trait ClassifyRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return a match, or `None` to fall through to the next rule.
    fn try_classify(&self, comm: &Communication) -> Option<RuleMatch>;
}

/// Lowercase and strip combining marks so keyword matching is case- and
/// diacritic-insensitive ("Café" matches "cafe").
pub(crate) fn normalize_for_match(text: &str) -> String {
    text.nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Which communication attribute an override rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideField {
    Subject,
    Sender,
}

/// One pinned correction: an exact (normalized) attribute value mapped to a
/// project code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideEntry {
    pub field: OverrideField,
    pub marker: String,
    pub code: String,
}

/// Highest-precedence rule: exact-match corrections for known
/// misclassifications.
pub struct OverrideRule {
    entries: Vec<OverrideEntry>,
}

impl OverrideRule {
    pub fn new(entries: Vec<OverrideEntry>) -> Self {
        Self { entries }
    }
}

impl ClassifyRule for OverrideRule {
    fn name(&self) -> &'static str {
        "override"
    }

    fn try_classify(&self, comm: &Communication) -> Option<RuleMatch> {
        for entry in &self.entries {
            let value = match entry.field {
                OverrideField::Subject => comm.subject.as_deref().unwrap_or(""),
                OverrideField::Sender => comm.sender.as_str(),
            };
            if normalize_for_match(value) == normalize_for_match(&entry.marker) {
                return Some(RuleMatch {
                    code: entry.code.clone(),
                    reason: format!("override: {} = {:?}", entry.field_name(), entry.marker),
                });
            }
        }
        None
    }
}

impl OverrideEntry {
    fn field_name(&self) -> &'static str {
        match self.field {
            OverrideField::Subject => "subject",
            OverrideField::Sender => "sender",
        }
    }
}

/// Second rule: a sender listed in the directory under exactly one project
/// classifies to that project. Senders on several projects are ambiguous
/// and fall through to keyword matching.
pub struct ParticipantRule {
    directory: Arc<ProjectDirectory>,
}

impl ParticipantRule {
    pub fn new(directory: Arc<ProjectDirectory>) -> Self {
        Self { directory }
    }
}

impl ClassifyRule for ParticipantRule {
    fn name(&self) -> &'static str {
        "participant"
    }

    fn try_classify(&self, comm: &Communication) -> Option<RuleMatch> {
        match self.directory.projects_for(&comm.sender) {
            [code] => Some(RuleMatch {
                code: code.clone(),
                reason: format!("participant: {} is on {}", comm.sender, code),
            }),
            _ => None,
        }
    }
}

/// Third rule: scan subject and body for each project's registered name
/// fragments. The longest matched fragment wins; ties break by project code
/// ascending. Project codes themselves only count on word boundaries, so a
/// two-letter code like `HA` never fires inside an ordinary word.
pub struct KeywordRule {
    /// (code, fragment) pairs with fragments pre-normalized, plus compiled
    /// word-boundary patterns for the codes.
    fragments: Vec<(String, String)>,
    code_patterns: Vec<(String, regex::Regex)>,
}

impl KeywordRule {
    pub fn new(directory: &ProjectDirectory) -> Self {
        let mut fragments = Vec::new();
        let mut code_patterns = Vec::new();
        for entry in directory.projects() {
            for fragment in entry.match_fragments() {
                fragments.push((entry.code.clone(), normalize_for_match(&fragment)));
            }
            let pattern = format!(r"\b{}\b", regex::escape(&entry.code.to_lowercase()));
            if let Ok(re) = regex::Regex::new(&pattern) {
                code_patterns.push((entry.code.clone(), re));
            }
        }
        Self {
            fragments,
            code_patterns,
        }
    }
}

impl ClassifyRule for KeywordRule {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn try_classify(&self, comm: &Communication) -> Option<RuleMatch> {
        let text = normalize_for_match(&format!(
            "{} {}",
            comm.subject.as_deref().unwrap_or(""),
            comm.body
        ));

        // Collect every hit, then pick longest fragment / smallest code.
        let mut best: Option<(usize, String, String)> = None; // (len, code, fragment)
        let mut consider = |code: &str, fragment: &str| {
            let candidate = (fragment.chars().count(), code.to_string(), fragment.to_string());
            best = match best.take() {
                None => Some(candidate),
                Some(current) => {
                    // Longer fragment wins; equal length prefers the
                    // lexicographically smaller code.
                    if candidate.0 > current.0 || (candidate.0 == current.0 && candidate.1 < current.1)
                    {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        };

        for (code, fragment) in &self.fragments {
            if text.contains(fragment.as_str()) {
                consider(code, fragment);
            }
        }
        for (code, re) in &self.code_patterns {
            if re.is_match(&text) {
                consider(code, &code.to_lowercase());
            }
        }

        best.map(|(_, code, fragment)| RuleMatch {
            code: code.to_string(),
            reason: format!("keyword: {:?}", fragment),
        })
    }
}

/// Outcome of one classification call, including whether the cache served
/// it (for batch summary accounting).
#[derive(Debug, Clone)]
pub struct Classification {
    pub tag: ProjectTag,
    pub cache_hit: bool,
}

/// Decides the project code for one communication: cache first, then the
/// rule chain, writing the result back through the cache.
pub struct ProjectTagClassifier {
    rules: Vec<Box<dyn ClassifyRule>>,
    directory: Arc<ProjectDirectory>,
}

impl ProjectTagClassifier {
    /// Standard chain: override → participant → keyword.
    pub fn new(directory: Arc<ProjectDirectory>, overrides: Vec<OverrideEntry>) -> Self {
        let rules: Vec<Box<dyn ClassifyRule>> = vec![
            Box::new(OverrideRule::new(overrides)),
            Box::new(ParticipantRule::new(Arc::clone(&directory))),
            Box::new(KeywordRule::new(&directory)),
        ];
        Self { rules, directory }
    }

    /// Custom rule chain, evaluated in the given order.
    pub fn with_rules(directory: Arc<ProjectDirectory>, rules: Vec<Box<dyn ClassifyRule>>) -> Self {
        Self { rules, directory }
    }

    /// Classify one communication.
    ///
    /// With `use_cache`, a cached entry is returned unchanged with no rule
    /// evaluation and no cache write. Otherwise the rule chain runs and the
    /// result — including `UNKNOWN` — overwrites any prior cache entry, so
    /// repeated runs never re-pay evaluation cost. Callers that want to
    /// retry ambiguous cases must pass `use_cache = false`.
    ///
    /// A communication with neither subject nor body classifies as
    /// `UNKNOWN`; only store failures are errors.
    pub fn classify(
        &self,
        db: &PipelineDb,
        comm: &Communication,
        use_cache: bool,
    ) -> Result<Classification, DbError> {
        if use_cache {
            if let Some(tag) = db.get_cached_tag(&comm.id)? {
                log::debug!("Classification cache hit for {}: {}", comm.id, tag.code);
                return Ok(Classification {
                    tag,
                    cache_hit: true,
                });
            }
        }

        let tag = self.evaluate(comm);
        db.put_cached_tag(&comm.id, &tag)?;
        Ok(Classification {
            tag,
            cache_hit: false,
        })
    }

    /// Run the rule chain without touching the cache.
    fn evaluate(&self, comm: &Communication) -> ProjectTag {
        if comm.is_blank() {
            log::info!("Communication {} has no subject or body, tagging UNKNOWN", comm.id);
            return ProjectTag::unknown();
        }

        for rule in &self.rules {
            if let Some(m) = rule.try_classify(comm) {
                log::info!(
                    "Classified {} as {} via {} rule",
                    comm.id,
                    m.code,
                    rule.name()
                );
                return ProjectTag::new(
                    &m.code,
                    &self.directory.full_name_for(&m.code),
                    Some(m.reason),
                );
            }
        }

        log::info!("No rule matched {}, tagging UNKNOWN", comm.id);
        ProjectTag::unknown()
    }
}
