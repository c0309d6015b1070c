//! Builder profile and skill mastery state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mastery level at or above which a skill counts as mastered.
pub const MASTERY_LEVEL: f64 = 0.8;

/// Mastery level below which a practiced skill counts as weak.
pub const WEAK_LEVEL: f64 = 0.3;

/// Level a skill starts at the first time the builder touches it.
pub const STARTING_LEVEL: f64 = 0.1;

/// Singleton record describing the builder agent as a whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuilderProfile {
    /// Stable identifier of the builder this profile describes.
    pub id: String,

    /// Scored attempts recorded so far.
    pub task_count: u64,

    /// Running mean over all recorded scores.
    pub average_score: f64,

    /// Skills at or above [`MASTERY_LEVEL`].
    pub skills_mastered: BTreeSet<String>,

    /// Practiced skills below [`WEAK_LEVEL`].
    pub weak_skills: BTreeSet<String>,

    /// Recurring style problems and how often each was flagged.
    pub style_flags: BTreeMap<String, u32>,

    /// Last time any field changed.
    pub last_updated: DateTime<Utc>,
}

impl Default for BuilderProfile {
    fn default() -> Self {
        Self {
            id: "builder".to_string(),
            task_count: 0,
            average_score: 0.0,
            skills_mastered: BTreeSet::new(),
            weak_skills: BTreeSet::new(),
            style_flags: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Mastery state for one skill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillState {
    /// Exponentially-weighted mastery level in [0, 1].
    pub level: f64,

    /// Scored attempts that exercised this skill.
    pub tasks_completed: u64,

    /// Last time a task exercised this skill.
    pub last_used: DateTime<Utc>,
}

/// Every skill the builder has touched, plus the fixed category catalog
/// used to propose unexplored skills.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillMap {
    pub skills: BTreeMap<String, SkillState>,
    pub categories: BTreeMap<String, Vec<String>>,
}

impl Default for SkillMap {
    fn default() -> Self {
        Self {
            skills: BTreeMap::new(),
            categories: default_categories(),
        }
    }
}

fn default_categories() -> BTreeMap<String, Vec<String>> {
    let mut categories = BTreeMap::new();
    categories.insert(
        "fundamentals".to_string(),
        vec![
            "control_flow".to_string(),
            "data_structures".to_string(),
            "file_io".to_string(),
            "string_manipulation".to_string(),
        ],
    );
    categories.insert(
        "techniques".to_string(),
        vec![
            "algorithms".to_string(),
            "concurrency".to_string(),
            "parsing".to_string(),
            "recursion".to_string(),
        ],
    );
    categories.insert(
        "quality".to_string(),
        vec![
            "documentation".to_string(),
            "error_handling".to_string(),
            "refactoring".to_string(),
            "testing".to_string(),
        ],
    );
    categories
}

impl SkillMap {
    /// Current level for `skill`, if the builder has touched it.
    pub fn level(&self, skill: &str) -> Option<f64> {
        self.skills.get(skill).map(|s| s.level)
    }

    /// The full catalog across all categories, sorted and deduplicated.
    pub fn catalog(&self) -> BTreeSet<String> {
        self.categories.values().flatten().cloned().collect()
    }

    /// Catalog skills the builder has never touched.
    pub fn unexplored(&self) -> Vec<String> {
        self.catalog()
            .into_iter()
            .filter(|skill| !self.skills.contains_key(skill))
            .collect()
    }

    /// Fetch the state for `skill`, creating it at [`STARTING_LEVEL`] on
    /// first sight.
    pub fn entry(&mut self, skill: &str, now: DateTime<Utc>) -> &mut SkillState {
        self.skills
            .entry(skill.to_string())
            .or_insert_with(|| SkillState {
                level: STARTING_LEVEL,
                tasks_completed: 0,
                last_used: now,
            })
    }

    /// Skills at or above [`MASTERY_LEVEL`].
    pub fn mastered(&self) -> BTreeSet<String> {
        self.skills
            .iter()
            .filter(|(_, state)| state.level >= MASTERY_LEVEL)
            .map(|(skill, _)| skill.clone())
            .collect()
    }

    /// Practiced skills below [`WEAK_LEVEL`].
    pub fn weak(&self) -> BTreeSet<String> {
        self.skills
            .iter()
            .filter(|(_, state)| state.level < WEAK_LEVEL && state.tasks_completed > 0)
            .map(|(skill, _)| skill.clone())
            .collect()
    }
}
