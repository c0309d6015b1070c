//! Turns a selected focus into a concrete practice task.

use crate::config::LoopConfig;
use crate::domain::{Task, TaskSource};
use crate::strategy::{FocusKind, SkillFocus};

/// Renders trainer tasks from a focus and the current difficulty.
///
/// Synthesis is deterministic: the same focus at the same difficulty always
/// produces the same goal, constraints, and skill set.
pub struct TaskSynthesizer {
    trainer_priority: u32,
    max_attempts: u32,
}

impl TaskSynthesizer {
    pub fn new(config: &LoopConfig) -> Self {
        Self {
            trainer_priority: config.trainer_task_priority,
            max_attempts: config.max_attempts_default,
        }
    }

    pub fn synthesize(&self, focus: &SkillFocus, difficulty: f64) -> Task {
        let band = difficulty_band(difficulty);
        let goal = render_goal(&focus.focus, band);

        let mut constraints = baseline_constraints();
        let mut skills = Vec::new();
        if let Some(skill) = focus.focus.skill() {
            constraints.extend(skill_constraints(skill));
            skills.push(skill.to_string());
        }
        if let FocusKind::StyleIssue { issue } = &focus.focus {
            constraints.push(style_constraint(issue));
        }

        let mut task = Task::new(
            TaskSource::Trainer,
            goal,
            difficulty,
            self.trainer_priority,
            self.max_attempts,
        )
        .with_constraints(constraints)
        .with_skills(skills);

        task.extensions.insert(
            "focus".to_string(),
            serde_json::Value::String(focus.focus.to_string()),
        );
        task.extensions.insert(
            "strategy".to_string(),
            serde_json::Value::String(focus.strategy.as_str().to_string()),
        );
        task
    }
}

/// Difficulty rendered as an adjective for goal text.
fn difficulty_band(difficulty: f64) -> &'static str {
    if difficulty < 0.3 {
        "basic"
    } else if difficulty < 0.7 {
        "intermediate"
    } else {
        "advanced"
    }
}

fn render_goal(focus: &FocusKind, band: &str) -> String {
    match focus {
        FocusKind::SkillGap { skill } => format!(
            "Strengthen {skill} with a {band} exercise on {}",
            exercise_hint(skill)
        ),
        FocusKind::StyleIssue { issue } => format!(
            "Complete a {band} exercise while eliminating the {} habit",
            issue.replace('_', " ")
        ),
        FocusKind::Regression { skill } => format!(
            "Refresh {skill} with a {band} exercise on {} before it goes stale",
            exercise_hint(skill)
        ),
        FocusKind::Advancement { skill } => format!(
            "Push {skill} further with a {band} exercise on {}",
            exercise_hint(skill)
        ),
        FocusKind::Exploration { skill } => format!(
            "Try {skill} for the first time with a {band} exercise on {}",
            exercise_hint(skill)
        ),
        FocusKind::Consolidation { skill } => format!(
            "Consolidate {skill} by combining {} with earlier work at {band} level",
            exercise_hint(skill)
        ),
        FocusKind::GeneralImprovement => {
            format!("Open practice: pick any approach and deliver a clean {band} solution")
        }
    }
}

/// What practicing each catalog skill actually looks like.
fn exercise_hint(skill: &str) -> &'static str {
    match skill {
        "control_flow" => "branching and loop-heavy logic",
        "data_structures" => "choosing and combining collections",
        "file_io" => "reading and writing files safely",
        "string_manipulation" => "text transformation",
        "algorithms" => "a classic algorithmic problem",
        "concurrency" => "coordinating parallel work",
        "parsing" => "turning raw text into structure",
        "recursion" => "a recursive decomposition",
        "documentation" => "explaining code as it is written",
        "error_handling" => "failure paths and recovery",
        "refactoring" => "restructuring working code",
        "testing" => "verifying behavior with tests",
        _ => "general programming practice",
    }
}

fn baseline_constraints() -> Vec<String> {
    vec!["the program must run unmodified and exit zero on success".to_string()]
}

fn skill_constraints(skill: &str) -> Vec<String> {
    let constraint = match skill {
        "control_flow" => "no early returns hiding the main control path",
        "data_structures" => "justify the collection types chosen in a comment",
        "file_io" => "clean up any files the program creates",
        "string_manipulation" => "no regular expressions, build the transforms by hand",
        "algorithms" => "state the time complexity in a comment",
        "concurrency" => "the result must be deterministic despite parallel execution",
        "parsing" => "parse the input without third-party parsing libraries",
        "recursion" => "the core logic must be recursive, not iterative",
        "documentation" => "every function carries a short docstring",
        "error_handling" => "handle every failure path explicitly",
        "refactoring" => "preserve observable behavior exactly",
        "testing" => "include at least three test cases that run with the program",
        _ => return Vec::new(),
    };
    vec![constraint.to_string()]
}

/// Remedial constraint for a recurring style problem.
fn style_constraint(issue: &str) -> String {
    match issue {
        "hardcoded_paths" => {
            "read paths from arguments or configuration, never hardcode them".to_string()
        }
        "missing_error_handling" => {
            "wrap fallible operations and report failures clearly".to_string()
        }
        "poor_documentation" => "document every function as you write it".to_string(),
        "poor_variable_names" => "use descriptive variable names throughout".to_string(),
        other => format!("avoid the {} habit", other.replace('_', " ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Strategy, TaskStatus};

    fn synthesizer() -> TaskSynthesizer {
        TaskSynthesizer::new(&LoopConfig::default())
    }

    fn gap_focus(skill: &str) -> SkillFocus {
        SkillFocus {
            strategy: Strategy::SkillGapFilling,
            focus: FocusKind::SkillGap {
                skill: skill.to_string(),
            },
        }
    }

    #[test]
    fn trainer_tasks_carry_trainer_defaults() {
        let task = synthesizer().synthesize(&gap_focus("parsing"), 0.5);
        assert_eq!(task.source, TaskSource::Trainer);
        assert_eq!(task.priority, 10);
        assert_eq!(task.max_attempts, 3);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.difficulty, 0.5);
    }

    #[test]
    fn focus_skill_becomes_required_skill() {
        let task = synthesizer().synthesize(&gap_focus("parsing"), 0.5);
        assert!(task.required_skills.contains("parsing"));
        assert!(task.goal.contains("parsing"));
        assert!(task
            .constraints
            .iter()
            .any(|c| c.contains("third-party parsing libraries")));
    }

    #[test]
    fn style_focus_adds_remedy_and_no_skill() {
        let focus = SkillFocus {
            strategy: Strategy::StyleImprovement,
            focus: FocusKind::StyleIssue {
                issue: "hardcoded_paths".to_string(),
            },
        };
        let task = synthesizer().synthesize(&focus, 0.4);
        assert!(task.required_skills.is_empty());
        assert!(task.goal.contains("hardcoded paths"));
        assert!(task
            .constraints
            .iter()
            .any(|c| c.contains("never hardcode them")));
    }

    #[test]
    fn difficulty_renders_as_band_adjective() {
        let synth = synthesizer();
        assert!(synth.synthesize(&gap_focus("testing"), 0.2).goal.contains("basic"));
        assert!(synth
            .synthesize(&gap_focus("testing"), 0.5)
            .goal
            .contains("intermediate"));
        assert!(synth
            .synthesize(&gap_focus("testing"), 0.8)
            .goal
            .contains("advanced"));
    }

    #[test]
    fn focus_and_strategy_are_tagged_in_extensions() {
        let task = synthesizer().synthesize(&gap_focus("recursion"), 0.5);
        assert_eq!(
            task.extensions.get("focus").and_then(|v| v.as_str()),
            Some("skill_gap:recursion")
        );
        assert_eq!(
            task.extensions.get("strategy").and_then(|v| v.as_str()),
            Some("skill_gap_filling")
        );
    }

    #[test]
    fn synthesis_is_deterministic() {
        let synth = synthesizer();
        let a = synth.synthesize(&gap_focus("file_io"), 0.6);
        let b = synth.synthesize(&gap_focus("file_io"), 0.6);
        assert_eq!(a.goal, b.goal);
        assert_eq!(a.constraints, b.constraints);
        assert_eq!(a.required_skills, b.required_skills);
    }
}
