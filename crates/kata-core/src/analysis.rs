//! Builder profile analysis feeding trainer decisions.
//!
//! A pure pass over the profile and skill map that surfaces what deserves
//! practice: skills stuck near the floor, recurring style problems, skills
//! going stale, and skills sitting right below a breakthrough.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{BuilderProfile, SkillMap};
use crate::strategy::FocusKind;

/// Level below which a practiced skill counts as a gap.
const GAP_LEVEL: f64 = 0.3;
/// Gap level that makes the gap high priority.
const GAP_HIGH_LEVEL: f64 = 0.2;
/// Style flag count that makes the issue worth practicing.
const FLAG_COUNT: u32 = 3;
/// Style flag count that makes the issue high priority.
const FLAG_HIGH_COUNT: u32 = 5;
/// Days without use after which a learned skill goes stale.
const STALE_DAYS: i64 = 7;
/// Days without use that make staleness high priority.
const STALE_HIGH_DAYS: i64 = 14;
/// Mastery band eligible for an advancement push.
const ADVANCE_MIN: f64 = 0.4;
const ADVANCE_MAX: f64 = 0.7;
/// Tasks a skill needs before an advancement push makes sense.
const ADVANCE_TASKS: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
        }
    }
}

/// A practiced skill stuck below [`GAP_LEVEL`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillGap {
    pub skill: String,
    pub level: f64,
    pub priority: Priority,
}

/// A style flag raised often enough to practice against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleIssue {
    pub issue: String,
    pub count: u32,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    /// A learned skill going unused.
    Refresh,
    /// A mid-level skill ready for a stretch.
    Advancement,
}

/// A learning opportunity that is neither a gap nor a style problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Opportunity {
    pub skill: String,
    pub kind: OpportunityKind,
    pub priority: Priority,
    /// Days since last use (refresh opportunities only).
    pub idle_days: Option<i64>,
}

/// Everything the trainer needs to decide what to practice next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileAnalysis {
    /// Gaps sorted worst level first, ties alphabetical.
    pub skill_gaps: Vec<SkillGap>,

    /// Style issues sorted most frequent first, ties alphabetical.
    pub style_issues: Vec<StyleIssue>,

    /// Refresh opportunities sorted longest idle first, then advancement
    /// opportunities sorted highest level first; ties alphabetical.
    pub opportunities: Vec<Opportunity>,

    /// Catalog skills the builder has never touched, sorted.
    pub unexplored: Vec<String>,

    /// Practiced skills sorted by task count descending, ties alphabetical.
    pub practiced: Vec<String>,

    /// Single best focus if the trainer skips the weighted draw.
    pub recommended_focus: FocusKind,
}

/// Analyze the profile and skill map as of `now`.
pub fn analyze(profile: &BuilderProfile, skills: &SkillMap, now: DateTime<Utc>) -> ProfileAnalysis {
    let mut skill_gaps = Vec::new();
    let mut opportunities = Vec::new();
    let mut practiced = Vec::new();

    for (skill, state) in &skills.skills {
        if state.tasks_completed > 0 {
            practiced.push((state.tasks_completed, skill.clone()));
            if state.level < GAP_LEVEL {
                skill_gaps.push(SkillGap {
                    skill: skill.clone(),
                    level: state.level,
                    priority: if state.level < GAP_HIGH_LEVEL {
                        Priority::High
                    } else {
                        Priority::Medium
                    },
                });
            }
        }

        let idle_days = (now - state.last_used).num_days();
        if state.level > GAP_LEVEL && idle_days > STALE_DAYS {
            opportunities.push(Opportunity {
                skill: skill.clone(),
                kind: OpportunityKind::Refresh,
                priority: if idle_days > STALE_HIGH_DAYS {
                    Priority::High
                } else {
                    Priority::Medium
                },
                idle_days: Some(idle_days),
            });
        }

        if (ADVANCE_MIN..=ADVANCE_MAX).contains(&state.level)
            && state.tasks_completed >= ADVANCE_TASKS
        {
            opportunities.push(Opportunity {
                skill: skill.clone(),
                kind: OpportunityKind::Advancement,
                priority: Priority::Medium,
                idle_days: None,
            });
        }
    }

    let mut style_issues: Vec<StyleIssue> = profile
        .style_flags
        .iter()
        .filter(|(_, count)| **count >= FLAG_COUNT)
        .map(|(issue, count)| StyleIssue {
            issue: issue.clone(),
            count: *count,
            priority: if *count >= FLAG_HIGH_COUNT {
                Priority::High
            } else {
                Priority::Medium
            },
        })
        .collect();

    skill_gaps.sort_by(|a, b| {
        a.level
            .partial_cmp(&b.level)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.skill.cmp(&b.skill))
    });
    style_issues.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.issue.cmp(&b.issue)));
    opportunities.sort_by(|a, b| match (a.kind, b.kind) {
        (OpportunityKind::Refresh, OpportunityKind::Advancement) => std::cmp::Ordering::Less,
        (OpportunityKind::Advancement, OpportunityKind::Refresh) => std::cmp::Ordering::Greater,
        (OpportunityKind::Refresh, OpportunityKind::Refresh) => b
            .idle_days
            .cmp(&a.idle_days)
            .then_with(|| a.skill.cmp(&b.skill)),
        (OpportunityKind::Advancement, OpportunityKind::Advancement) => {
            let left = skills.level(&a.skill).unwrap_or(0.0);
            let right = skills.level(&b.skill).unwrap_or(0.0);
            right
                .partial_cmp(&left)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.skill.cmp(&b.skill))
        }
    });

    practiced.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    let practiced = practiced.into_iter().map(|(_, skill)| skill).collect();

    let recommended_focus = recommend(&skill_gaps, &style_issues, &opportunities);

    ProfileAnalysis {
        skill_gaps,
        style_issues,
        opportunities,
        unexplored: skills.unexplored(),
        practiced,
        recommended_focus,
    }
}

/// Priority cascade: high gaps, high style issues, high opportunities, then
/// the medium tiers in the same order, else general improvement.
fn recommend(
    gaps: &[SkillGap],
    issues: &[StyleIssue],
    opportunities: &[Opportunity],
) -> FocusKind {
    for priority in [Priority::High, Priority::Medium] {
        if let Some(gap) = gaps.iter().find(|g| g.priority == priority) {
            return FocusKind::SkillGap {
                skill: gap.skill.clone(),
            };
        }
        if let Some(issue) = issues.iter().find(|i| i.priority == priority) {
            return FocusKind::StyleIssue {
                issue: issue.issue.clone(),
            };
        }
        if let Some(opportunity) = opportunities.iter().find(|o| o.priority == priority) {
            return match opportunity.kind {
                OpportunityKind::Refresh => FocusKind::Regression {
                    skill: opportunity.skill.clone(),
                },
                OpportunityKind::Advancement => FocusKind::Advancement {
                    skill: opportunity.skill.clone(),
                },
            };
        }
    }
    FocusKind::GeneralImprovement
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn skill_map_with(entries: &[(&str, f64, u64, i64)]) -> SkillMap {
        // (skill, level, tasks_completed, days_since_use)
        let mut map = SkillMap::default();
        let now = Utc::now();
        for (skill, level, tasks, idle) in entries {
            let state = map.entry(skill, now - Duration::days(*idle));
            state.level = *level;
            state.tasks_completed = *tasks;
        }
        map
    }

    #[test]
    fn empty_state_recommends_general_improvement() {
        let analysis = analyze(&BuilderProfile::default(), &SkillMap::default(), Utc::now());
        assert!(analysis.skill_gaps.is_empty());
        assert_eq!(analysis.recommended_focus, FocusKind::GeneralImprovement);
        assert_eq!(analysis.unexplored.len(), 12);
    }

    #[test]
    fn gaps_found_and_sorted_worst_first() {
        let skills = skill_map_with(&[
            ("parsing", 0.25, 2, 0),
            ("testing", 0.15, 1, 0),
            ("algorithms", 0.15, 4, 0),
            ("recursion", 0.5, 3, 0),
        ]);
        let analysis = analyze(&BuilderProfile::default(), &skills, Utc::now());

        let names: Vec<&str> = analysis.skill_gaps.iter().map(|g| g.skill.as_str()).collect();
        assert_eq!(names, vec!["algorithms", "testing", "parsing"]);
        assert_eq!(analysis.skill_gaps[0].priority, Priority::High);
        assert_eq!(analysis.skill_gaps[2].priority, Priority::Medium);
    }

    #[test]
    fn untouched_skills_are_not_gaps() {
        let skills = skill_map_with(&[("parsing", 0.1, 0, 0)]);
        let analysis = analyze(&BuilderProfile::default(), &skills, Utc::now());
        assert!(analysis.skill_gaps.is_empty());
    }

    #[test]
    fn style_issues_ranked_by_count() {
        let mut profile = BuilderProfile::default();
        profile.style_flags.insert("hardcoded_paths".to_string(), 6);
        profile.style_flags.insert("poor_documentation".to_string(), 3);
        profile.style_flags.insert("magic_numbers".to_string(), 1);

        let analysis = analyze(&profile, &SkillMap::default(), Utc::now());
        assert_eq!(analysis.style_issues.len(), 2);
        assert_eq!(analysis.style_issues[0].issue, "hardcoded_paths");
        assert_eq!(analysis.style_issues[0].priority, Priority::High);
        assert_eq!(analysis.style_issues[1].priority, Priority::Medium);
    }

    #[test]
    fn stale_skills_surface_as_refresh_opportunities() {
        let skills = skill_map_with(&[
            ("parsing", 0.6, 5, 20),
            ("testing", 0.5, 4, 9),
            ("algorithms", 0.2, 2, 30),
        ]);
        let analysis = analyze(&BuilderProfile::default(), &skills, Utc::now());

        let refresh: Vec<&Opportunity> = analysis
            .opportunities
            .iter()
            .filter(|o| o.kind == OpportunityKind::Refresh)
            .collect();
        // A level 0.2 skill is a gap, not a refresh target.
        assert_eq!(refresh.len(), 2);
        assert_eq!(refresh[0].skill, "parsing");
        assert_eq!(refresh[0].priority, Priority::High);
        assert_eq!(refresh[1].skill, "testing");
        assert_eq!(refresh[1].priority, Priority::Medium);
    }

    #[test]
    fn advancement_needs_band_and_history() {
        let skills = skill_map_with(&[
            ("parsing", 0.6, 5, 0),
            ("testing", 0.6, 1, 0),
            ("algorithms", 0.9, 8, 0),
        ]);
        let analysis = analyze(&BuilderProfile::default(), &skills, Utc::now());

        let advancement: Vec<&Opportunity> = analysis
            .opportunities
            .iter()
            .filter(|o| o.kind == OpportunityKind::Advancement)
            .collect();
        assert_eq!(advancement.len(), 1);
        assert_eq!(advancement[0].skill, "parsing");
    }

    #[test]
    fn recommendation_prefers_high_gap_over_high_style() {
        let mut profile = BuilderProfile::default();
        profile.style_flags.insert("hardcoded_paths".to_string(), 9);
        let skills = skill_map_with(&[("testing", 0.1, 2, 0)]);

        let analysis = analyze(&profile, &skills, Utc::now());
        assert_eq!(
            analysis.recommended_focus,
            FocusKind::SkillGap {
                skill: "testing".to_string()
            }
        );
    }

    #[test]
    fn recommendation_falls_through_to_medium_tier() {
        let skills = skill_map_with(&[("parsing", 0.25, 2, 0)]);
        let analysis = analyze(&BuilderProfile::default(), &skills, Utc::now());
        assert_eq!(
            analysis.recommended_focus,
            FocusKind::SkillGap {
                skill: "parsing".to_string()
            }
        );
    }

    #[test]
    fn practiced_ranked_by_task_count() {
        let skills = skill_map_with(&[
            ("parsing", 0.5, 2, 0),
            ("testing", 0.5, 7, 0),
            ("recursion", 0.5, 7, 0),
        ]);
        let analysis = analyze(&BuilderProfile::default(), &skills, Utc::now());
        assert_eq!(analysis.practiced, vec!["recursion", "testing", "parsing"]);
    }
}
