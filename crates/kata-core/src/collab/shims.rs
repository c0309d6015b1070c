//! Built-in collaborators used until a real builder is wired in.
//!
//! The generator renders a small runnable Python program from the task
//! text, and the reflector derives a reflection from observable run facts.
//! Both are deliberately simple; they exist so the daemon exercises the
//! full cycle out of the box.

use async_trait::async_trait;

use crate::domain::Task;
use crate::error::Result;
use crate::reflection::Reflection;

use super::{CodeGenerator, ExecutionOutcome, Reflector};

/// Renders a deterministic Python program that restates the task.
#[derive(Debug, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CodeGenerator for TemplateGenerator {
    async fn generate_code(&self, task: &Task) -> Result<String> {
        let mut code = String::new();
        code.push_str("#!/usr/bin/env python3\n");
        code.push_str(&format!("\"\"\"{}\"\"\"\n\n", task.goal.replace('"', "'")));
        for constraint in &task.constraints {
            code.push_str(&format!("# constraint: {constraint}\n"));
        }
        code.push_str("\n\ndef main():\n");
        code.push_str(&format!(
            "    print(\"kata attempt: {}\")\n",
            task.goal.replace('"', "'").replace('\n', " ")
        ));
        for skill in &task.required_skills {
            code.push_str(&format!("    print(\"practicing: {skill}\")\n"));
        }
        code.push_str("\n\nif __name__ == \"__main__\":\n");
        code.push_str("    main()\n");
        Ok(code)
    }
}

/// Derives a reflection from run facts alone: exit status, stderr noise,
/// and whether the program said anything.
#[derive(Debug, Default)]
pub struct HeuristicReflector;

impl HeuristicReflector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Reflector for HeuristicReflector {
    async fn reflect(&self, task: &Task, outcome: &ExecutionOutcome) -> Result<Reflection> {
        let mut reflection = Reflection::default();
        if outcome.succeeded() {
            reflection
                .strengths
                .push(format!("completed \"{}\" cleanly", task.goal));
            if outcome.stderr.trim().is_empty() {
                reflection.strengths.push("no stderr noise".to_string());
            } else {
                reflection
                    .weaknesses
                    .push("stderr warnings point at loose error handling".to_string());
            }
            if outcome.stdout.trim().is_empty() {
                reflection
                    .weaknesses
                    .push("produced no output, so behavior documentation is thin".to_string());
            }
            reflection
                .lessons
                .push("bank this approach for similar goals".to_string());
        } else {
            reflection
                .weaknesses
                .push(format!("run exited with code {}", outcome.exit_code));
            reflection
                .weaknesses
                .push("error handling did not cover the failure path".to_string());
            reflection
                .lessons
                .push("reproduce the failure before the next attempt".to_string());
        }
        Ok(reflection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::fakes::{failing_outcome, passing_outcome};
    use crate::domain::TaskSource;
    use crate::reflection::mine_style_flags;

    fn task() -> Task {
        Task::new(TaskSource::Trainer, "practice parsing", 0.5, 10, 3)
            .with_constraints(vec!["no third-party libraries".to_string()])
            .with_skills(["parsing".to_string()])
    }

    #[tokio::test]
    async fn generated_code_restates_the_task() {
        let code = TemplateGenerator::new()
            .generate_code(&task())
            .await
            .expect("generate");
        assert!(code.contains("practice parsing"));
        assert!(code.contains("# constraint: no third-party libraries"));
        assert!(code.contains("practicing: parsing"));
        assert!(code.starts_with("#!/usr/bin/env python3"));
    }

    #[tokio::test]
    async fn failed_runs_reflect_into_minable_weaknesses() {
        let reflection = HeuristicReflector::new()
            .reflect(&task(), &failing_outcome(1, "Traceback"))
            .await
            .expect("reflect");
        assert!(reflection.strengths.is_empty());
        assert!(mine_style_flags(&reflection).contains(&"missing_error_handling".to_string()));
    }

    #[tokio::test]
    async fn clean_runs_reflect_into_strengths() {
        let reflection = HeuristicReflector::new()
            .reflect(&task(), &passing_outcome())
            .await
            .expect("reflect");
        assert_eq!(reflection.strengths.len(), 2);
        assert!(reflection.weaknesses.is_empty());
        assert!(mine_style_flags(&reflection).is_empty());
    }

    #[tokio::test]
    async fn noisy_success_still_flags_error_handling() {
        let mut outcome = passing_outcome();
        outcome.stderr = "DeprecationWarning: ...".to_string();
        let reflection = HeuristicReflector::new()
            .reflect(&task(), &outcome)
            .await
            .expect("reflect");
        assert!(mine_style_flags(&reflection).contains(&"missing_error_handling".to_string()));
    }
}
