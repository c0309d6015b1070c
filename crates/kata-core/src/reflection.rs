//! Post-task reflection: style flag mining and learning summaries.
//!
//! Reflections come back as free text. A small keyword table turns
//! weaknesses into the style flag slugs the profile counts, and the whole
//! reflection is persisted as a per-task learning summary.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use kata_store::JsonStore;

use crate::domain::{BuilderProfile, Task};
use crate::error::Result;
use crate::keys;

/// Keyword fragments mapped to the style flag they indicate. Matching is
/// case-insensitive substring search over each weakness line.
const KEYWORD_FLAGS: &[(&str, &str)] = &[
    ("hardcoded", "hardcoded_paths"),
    ("error handling", "missing_error_handling"),
    ("documentation", "poor_documentation"),
    ("comment", "poor_documentation"),
    ("variable name", "poor_variable_names"),
];

/// What the reflector concluded about one attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Reflection {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub lessons: Vec<String>,
}

/// Persisted record of a reflection, one per completed task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningSummary {
    pub task_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub lessons: Vec<String>,

    /// The same content rendered as markdown for human review.
    pub rendered: String,
}

/// Style flag slugs indicated by the reflection's weaknesses, deduplicated.
pub fn mine_style_flags(reflection: &Reflection) -> Vec<String> {
    let mut flags = BTreeSet::new();
    for weakness in &reflection.weaknesses {
        let lowered = weakness.to_lowercase();
        for (keyword, flag) in KEYWORD_FLAGS {
            if lowered.contains(keyword) {
                flags.insert((*flag).to_string());
            }
        }
    }
    flags.into_iter().collect()
}

/// Fold a reflection into the profile and persist the learning summary.
///
/// Each mined style flag bumps its counter on the profile by one per
/// reflection, however many weakness lines triggered it.
pub async fn apply_reflection(
    store: &JsonStore,
    task: &Task,
    reflection: &Reflection,
    score: f64,
) -> Result<LearningSummary> {
    let flags = mine_style_flags(reflection);
    if !flags.is_empty() {
        let mined = flags.clone();
        store
            .mutate::<BuilderProfile, _, _>(keys::BUILDER_PROFILE, move |profile| {
                for flag in &mined {
                    *profile.style_flags.entry(flag.clone()).or_insert(0) += 1;
                }
                profile.last_updated = Utc::now();
            })
            .await?;
    }

    let summary = LearningSummary {
        task_id: task.id,
        timestamp: Utc::now(),
        score,
        strengths: reflection.strengths.clone(),
        weaknesses: reflection.weaknesses.clone(),
        lessons: reflection.lessons.clone(),
        rendered: render_markdown(task, reflection, score),
    };
    store.save(&keys::task_summary(&task.id), &summary).await?;

    debug!(
        task_id = %task.id,
        flags = flags.len(),
        "reflection applied"
    );
    Ok(summary)
}

fn render_markdown(task: &Task, reflection: &Reflection, score: f64) -> String {
    let mut out = String::new();
    out.push_str("# Learning Summary\n\n");
    out.push_str(&format!("Task: {}\n", task.id));
    out.push_str(&format!("Goal: {}\n", task.goal));
    out.push_str(&format!("Score: {score:.1}\n\n"));
    push_section(&mut out, "Strengths", &reflection.strengths);
    push_section(&mut out, "Weaknesses", &reflection.weaknesses);
    push_section(&mut out, "Lessons", &reflection.lessons);
    out
}

fn push_section(out: &mut String, title: &str, items: &[String]) {
    out.push_str(&format!("## {title}\n"));
    if items.is_empty() {
        out.push_str("- (none)\n");
    } else {
        for item in items {
            out.push_str(&format!("- {item}\n"));
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskSource;
    use tempfile::tempdir;

    fn sample_task() -> Task {
        Task::new(TaskSource::Trainer, "practice parsing", 0.5, 10, 3)
    }

    #[test]
    fn keywords_map_to_flags_case_insensitively() {
        let reflection = Reflection {
            strengths: vec!["clean structure".to_string()],
            weaknesses: vec![
                "Hardcoded the output path".to_string(),
                "weak ERROR HANDLING around the file read".to_string(),
            ],
            lessons: Vec::new(),
        };
        let flags = mine_style_flags(&reflection);
        assert_eq!(flags, vec!["hardcoded_paths", "missing_error_handling"]);
    }

    #[test]
    fn repeated_keywords_dedupe_within_one_reflection() {
        let reflection = Reflection {
            weaknesses: vec![
                "no documentation on the helper".to_string(),
                "missing documentation for main".to_string(),
                "comments are sparse".to_string(),
            ],
            ..Default::default()
        };
        let flags = mine_style_flags(&reflection);
        assert_eq!(flags, vec!["poor_documentation"]);
    }

    #[test]
    fn strengths_never_raise_flags() {
        let reflection = Reflection {
            strengths: vec!["thorough error handling".to_string()],
            ..Default::default()
        };
        assert!(mine_style_flags(&reflection).is_empty());
    }

    #[tokio::test]
    async fn flags_accumulate_on_the_profile() {
        let dir = tempdir().expect("tempdir");
        let store = JsonStore::open(dir.path()).expect("store");
        let task = sample_task();
        let reflection = Reflection {
            weaknesses: vec!["hardcoded temp directory".to_string()],
            ..Default::default()
        };

        apply_reflection(&store, &task, &reflection, 60.0)
            .await
            .expect("apply");
        apply_reflection(&store, &task, &reflection, 65.0)
            .await
            .expect("apply");

        let profile: BuilderProfile = store
            .load(keys::BUILDER_PROFILE)
            .await
            .expect("load")
            .expect("present");
        assert_eq!(profile.style_flags.get("hardcoded_paths"), Some(&2));
    }

    #[tokio::test]
    async fn summary_is_persisted_per_task() {
        let dir = tempdir().expect("tempdir");
        let store = JsonStore::open(dir.path()).expect("store");
        let task = sample_task();
        let reflection = Reflection {
            strengths: vec!["solved on the first attempt".to_string()],
            weaknesses: Vec::new(),
            lessons: vec!["split parsing from output early".to_string()],
        };

        let summary = apply_reflection(&store, &task, &reflection, 88.5)
            .await
            .expect("apply");
        assert_eq!(summary.task_id, task.id);
        assert!(summary.rendered.contains("## Strengths"));
        assert!(summary.rendered.contains("Score: 88.5"));
        assert!(summary.rendered.contains("- (none)"));

        let stored: LearningSummary = store
            .load(&keys::task_summary(&task.id))
            .await
            .expect("load")
            .expect("present");
        assert_eq!(stored, summary);
    }

    #[tokio::test]
    async fn clean_reflection_leaves_profile_untouched() {
        let dir = tempdir().expect("tempdir");
        let store = JsonStore::open(dir.path()).expect("store");
        let reflection = Reflection {
            strengths: vec!["good naming".to_string()],
            ..Default::default()
        };

        apply_reflection(&store, &sample_task(), &reflection, 90.0)
            .await
            .expect("apply");
        let profile: Option<BuilderProfile> =
            store.load(keys::BUILDER_PROFILE).await.expect("load");
        assert!(profile.is_none());
    }
}
