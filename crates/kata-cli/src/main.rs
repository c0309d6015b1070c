//! Kata CLI - inspect and feed the practice loop.
//!
//! The `kata` command operates on the same memory root as the `katad`
//! daemon, so tasks queued here are picked up by the next free cycle and
//! everything the trainer records can be inspected while it runs.
//!
//! ## Commands
//!
//! - `add-task`: Queue a task for the builder
//! - `list-tasks`: Show queued or recorded tasks
//! - `show-task`: Show one task with its result and learning summary
//! - `profile`: Show the builder profile
//! - `skills`: Show skill levels and the current gap analysis
//! - `trend`: Show the performance trend over recent scores
//! - `curve`: Show the difficulty controller state and history

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::Level;
use uuid::Uuid;

use kata_core::{
    analyze, init_tracing, keys, BuilderProfile, DifficultyController, LearningSummary, LoopConfig,
    ScoreTracker, SkillMap, Task, TaskQueue, TaskSource, TaskStatus, Trend,
};
use kata_store::{CodeArchive, JsonStore};

#[derive(Parser)]
#[command(name = "kata")]
#[command(author = "Kata Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Adaptive practice loop for a self-training coding agent", long_about = None)]
struct Cli {
    /// Memory root shared with the katad daemon
    #[arg(long, env = "KATA_MEMORY_DIR", default_value = ".kata/memory", global = true)]
    memory_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a task for the builder's next free cycle
    AddTask {
        /// What the generated program should accomplish
        goal: String,

        /// Difficulty in [0, 1]
        #[arg(short, long, default_value_t = 0.5)]
        difficulty: f64,

        /// Constraint the solution must honor (repeatable)
        #[arg(short, long = "constraint")]
        constraints: Vec<String>,

        /// Skill the task exercises (repeatable)
        #[arg(short, long = "skill")]
        skills: Vec<String>,

        /// Queue priority; lower numbers are served first
        #[arg(short, long)]
        priority: Option<u32>,

        /// Attempt budget before the task is marked failed
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// List queued tasks, or recorded tasks when filtering by status
    ListTasks {
        /// Only tasks in this state: pending, running, completed or failed
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of tasks to show
        #[arg(short, long, default_value_t = 20)]
        count: usize,
    },

    /// Show one task record, its last result, and its learning summary
    ShowTask {
        /// Task ID
        id: Uuid,

        /// Print the raw task record as pretty JSON
        #[arg(long)]
        raw: bool,
    },

    /// Show the builder profile
    Profile,

    /// Show tracked skills and the current gap analysis
    Skills,

    /// Show the performance trend over recent scores
    Trend {
        /// Number of recent scores to fit (default: configured window)
        #[arg(short, long)]
        window: Option<usize>,
    },

    /// Show the current difficulty and its adjustment history
    Curve {
        /// Maximum number of history entries to show
        #[arg(short, long, default_value_t = 10)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let store = Arc::new(
        JsonStore::open(&cli.memory_dir)
            .with_context(|| format!("Failed to open memory root {:?}", cli.memory_dir))?,
    );
    let config = LoopConfig::load_or_init(&store)
        .await
        .context("Failed to load loop configuration")?;

    match cli.command {
        Commands::AddTask {
            goal,
            difficulty,
            constraints,
            skills,
            priority,
            max_attempts,
        } => {
            cmd_add_task(
                &store,
                &config,
                goal,
                difficulty,
                constraints,
                skills,
                priority,
                max_attempts,
            )
            .await
        }
        Commands::ListTasks { status, count } => {
            cmd_list_tasks(&store, &config, status.as_deref(), count).await
        }
        Commands::ShowTask { id, raw } => cmd_show_task(&store, &config, id, raw).await,
        Commands::Profile => cmd_profile(&store).await,
        Commands::Skills => cmd_skills(&store).await,
        Commands::Trend { window } => cmd_trend(&store, &config, window).await,
        Commands::Curve { count } => cmd_curve(&store, &config, count).await,
    }
}

/// Queue a user task
#[allow(clippy::too_many_arguments)]
async fn cmd_add_task(
    store: &Arc<JsonStore>,
    config: &LoopConfig,
    goal: String,
    difficulty: f64,
    constraints: Vec<String>,
    skills: Vec<String>,
    priority: Option<u32>,
    max_attempts: Option<u32>,
) -> Result<()> {
    if !(0.0..=1.0).contains(&difficulty) {
        anyhow::bail!("Difficulty must be in [0, 1], got {}", difficulty);
    }
    if goal.trim().is_empty() {
        anyhow::bail!("Goal must not be empty");
    }

    let queue = TaskQueue::new(Arc::clone(store), config);
    let priority = priority.unwrap_or(config.user_task_priority);

    let task_id = match max_attempts {
        Some(budget) => {
            let task = Task::new(TaskSource::User, goal, difficulty, priority, budget)
                .with_constraints(constraints)
                .with_skills(skills);
            let id = task.id;
            queue.enqueue(task).await?;
            id
        }
        None => {
            queue
                .submit_task(goal, difficulty, constraints, skills, priority)
                .await?
        }
    };

    println!("Queued task {}", task_id);
    println!("Position: {}", queue_position(&queue, task_id).await?);

    Ok(())
}

async fn queue_position(queue: &TaskQueue, task_id: Uuid) -> Result<String> {
    let pending = queue.pending().await?;
    Ok(pending
        .iter()
        .position(|t| t.id == task_id)
        .map(|i| format!("{} of {}", i + 1, pending.len()))
        .unwrap_or_else(|| "already served".to_string()))
}

/// List tasks: the queue in serve order, or all records when filtered
async fn cmd_list_tasks(
    store: &Arc<JsonStore>,
    config: &LoopConfig,
    status: Option<&str>,
    count: usize,
) -> Result<()> {
    let queue = TaskQueue::new(Arc::clone(store), config);

    let tasks: Vec<Task> = match status {
        Some(raw) => {
            let wanted = parse_status(raw)?;
            queue
                .all_tasks()
                .await?
                .into_iter()
                .filter(|t| t.status == wanted)
                .collect()
        }
        None => queue.pending().await?,
    };

    if tasks.is_empty() {
        match status {
            Some(raw) => println!("No {} tasks found.", raw),
            None => println!("Queue is empty. Add one with 'kata add-task'."),
        }
        return Ok(());
    }

    for task in tasks.iter().take(count) {
        println!(
            "{}  p{:<3} {:<9} {:<7} d={:.2}  {}",
            task.id, task.priority, task.status, task.source, task.difficulty, task.goal
        );
    }
    if tasks.len() > count {
        println!("... and {} more", tasks.len() - count);
    }

    Ok(())
}

fn parse_status(raw: &str) -> Result<TaskStatus> {
    match raw {
        "pending" => Ok(TaskStatus::Pending),
        "running" => Ok(TaskStatus::Running),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        other => anyhow::bail!(
            "Unknown status '{}' (expected pending, running, completed or failed)",
            other
        ),
    }
}

/// Show one task record in full
async fn cmd_show_task(store: &Arc<JsonStore>, config: &LoopConfig, id: Uuid, raw: bool) -> Result<()> {
    let queue = TaskQueue::new(Arc::clone(store), config);
    let Some(task) = queue.get_task(id).await? else {
        anyhow::bail!("No task found with id {}", id);
    };

    if raw {
        println!("{}", serde_json::to_string_pretty(&task)?);
        return Ok(());
    }

    println!("task {}", task.id);
    println!("Status:     {}", task.status);
    println!("Source:     {}", task.source);
    println!("Goal:       {}", task.goal);
    println!("Difficulty: {:.2}", task.difficulty);
    println!("Priority:   {}", task.priority);
    println!("Attempts:   {} of {}", task.attempts, task.max_attempts);
    println!(
        "Created:    {}",
        task.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if !task.constraints.is_empty() {
        println!("Constraints:");
        for constraint in &task.constraints {
            println!("  - {}", constraint);
        }
    }
    if !task.required_skills.is_empty() {
        let skills: Vec<&str> = task.required_skills.iter().map(String::as_str).collect();
        println!("Skills:     {}", skills.join(", "));
    }

    if let Some(result) = &task.result {
        let verdict = if result.success { "success" } else { "failure" };
        println!();
        println!(
            "Last result: {} (score {:.1}, ran {:.2}s)",
            verdict, result.score, result.execution_time
        );
        if let Some(error) = &result.error {
            println!("Error:       {}", error);
        }
    }

    let archive = CodeArchive::new(store.root().join(keys::CODE_ARCHIVE_DIR))?;
    let archived = archive.list(&id.to_string())?;
    if !archived.is_empty() {
        println!();
        println!("Archived code:");
        for path in &archived {
            println!("  {}", path.display());
        }
    }

    if let Some(summary) = store
        .load::<LearningSummary>(&keys::task_summary(&id))
        .await?
    {
        println!();
        println!("{}", summary.rendered.trim_end());
    }

    Ok(())
}

/// Show the builder profile
async fn cmd_profile(store: &Arc<JsonStore>) -> Result<()> {
    let profile: BuilderProfile = store.load_or_default(keys::BUILDER_PROFILE).await?;

    if profile.task_count == 0 {
        println!("No tasks scored yet. Start katad, or queue one with 'kata add-task'.");
        return Ok(());
    }

    println!("builder {}", profile.id);
    println!("Tasks scored:  {}", profile.task_count);
    println!("Average score: {:.1}", profile.average_score);
    println!(
        "Last updated:  {}",
        profile.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if !profile.skills_mastered.is_empty() {
        let mastered: Vec<&str> = profile.skills_mastered.iter().map(String::as_str).collect();
        println!("Mastered:      {}", mastered.join(", "));
    }
    if !profile.weak_skills.is_empty() {
        let weak: Vec<&str> = profile.weak_skills.iter().map(String::as_str).collect();
        println!("Weak:          {}", weak.join(", "));
    }
    if !profile.style_flags.is_empty() {
        println!("Style flags:");
        for (flag, count) in &profile.style_flags {
            println!("  {:>2}x {}", count, flag);
        }
    }

    Ok(())
}

/// Show skill levels plus what the trainer would target next
async fn cmd_skills(store: &Arc<JsonStore>) -> Result<()> {
    let profile: BuilderProfile = store.load_or_default(keys::BUILDER_PROFILE).await?;
    let skills: SkillMap = store.load_or_default(keys::SKILL_MAP).await?;

    if skills.skills.is_empty() {
        println!("No skills tracked yet.");
    } else {
        println!("{} skills tracked", skills.skills.len());
        for (name, state) in &skills.skills {
            println!(
                "  {:<20} level {:.2}  {:>3} tasks  last used {}",
                name,
                state.level,
                state.tasks_completed,
                state.last_used.format("%Y-%m-%d")
            );
        }
    }

    let analysis = analyze(&profile, &skills, Utc::now());

    if !analysis.skill_gaps.is_empty() {
        println!();
        println!("Gaps:");
        for gap in &analysis.skill_gaps {
            println!(
                "  {:<20} level {:.2}  {}",
                gap.skill,
                gap.level,
                gap.priority.as_str()
            );
        }
    }
    if !analysis.style_issues.is_empty() {
        println!();
        println!("Style issues:");
        for issue in &analysis.style_issues {
            println!(
                "  {:<20} flagged {}x  {}",
                issue.issue,
                issue.count,
                issue.priority.as_str()
            );
        }
    }
    if !analysis.opportunities.is_empty() {
        println!();
        println!("Opportunities:");
        for opp in &analysis.opportunities {
            let detail = match opp.idle_days {
                Some(days) => format!("idle {} days", days),
                None => "ready to advance".to_string(),
            };
            println!("  {:<20} {}  {}", opp.skill, detail, opp.priority.as_str());
        }
    }
    if !analysis.unexplored.is_empty() {
        let unexplored: Vec<&str> = analysis.unexplored.iter().map(String::as_str).collect();
        println!();
        println!("Unexplored:    {}", unexplored.join(", "));
    }

    println!();
    println!("Recommended focus: {}", analysis.recommended_focus);

    Ok(())
}

/// Show the fitted performance trend
async fn cmd_trend(store: &Arc<JsonStore>, config: &LoopConfig, window: Option<usize>) -> Result<()> {
    let tracker = ScoreTracker::new(Arc::clone(store), config);
    let window = window.unwrap_or(config.trend_window_n);

    match tracker.performance_trend(window).await? {
        Trend::Insufficient { samples } => {
            println!(
                "Not enough scores to fit a trend ({} recorded, need at least 2).",
                samples
            );
        }
        Trend::Measured {
            samples,
            mean,
            slope,
        } => {
            let direction = if slope > config.trend_upper_threshold {
                "improving"
            } else if slope < config.trend_lower_threshold {
                "declining"
            } else {
                "steady"
            };
            println!("Trend over the last {} scores: {}", samples, direction);
            println!("Mean score: {:.1}", mean);
            println!("Slope:      {:+.3} points per task", slope);
        }
    }

    Ok(())
}

/// Show the difficulty controller state and its shift history
async fn cmd_curve(store: &Arc<JsonStore>, config: &LoopConfig, count: usize) -> Result<()> {
    let controller = DifficultyController::new(Arc::clone(store), config);
    let state = controller.state().await?;

    println!(
        "Difficulty: {:.2} (started at {:.2})",
        state.current, state.initial
    );
    match state.last_success_difficulty {
        Some(d) => println!("Last success at: {:.2}", d),
        None => println!("No successful task yet."),
    }

    if state.history.is_empty() {
        println!("No adjustments recorded yet.");
        return Ok(());
    }

    println!();
    println!(
        "Last {} adjustments (newest first):",
        count.min(state.history.len())
    );
    for shift in state.history.iter().rev().take(count) {
        let trend = shift
            .trend_sample
            .map(|s| format!("{:+.3}", s))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  {}  {:.2} ({:+.2})  trend {}",
            shift.timestamp.format("%Y-%m-%d %H:%M:%S"),
            shift.value,
            shift.delta,
            trend
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn test_store() -> (tempfile::TempDir, Arc<JsonStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::open(dir.path()).unwrap());
        (dir, store)
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn status_filter_parses_the_four_states() {
        assert_eq!(parse_status("pending").unwrap(), TaskStatus::Pending);
        assert_eq!(parse_status("running").unwrap(), TaskStatus::Running);
        assert_eq!(parse_status("completed").unwrap(), TaskStatus::Completed);
        assert_eq!(parse_status("failed").unwrap(), TaskStatus::Failed);
        assert!(parse_status("done").is_err());
    }

    #[tokio::test]
    async fn add_task_lands_in_the_queue() {
        let (_dir, store) = test_store();
        let config = LoopConfig::load_or_init(&store).await.unwrap();

        cmd_add_task(
            &store,
            &config,
            "Write a CSV parser".to_string(),
            0.4,
            vec!["no third-party imports".to_string()],
            vec!["parsing".to_string()],
            None,
            None,
        )
        .await
        .unwrap();

        let queue = TaskQueue::new(Arc::clone(&store), &config);
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].goal, "Write a CSV parser");
        assert_eq!(pending[0].source, TaskSource::User);
        assert_eq!(pending[0].priority, config.user_task_priority);
        assert_eq!(pending[0].max_attempts, config.max_attempts_default);
    }

    #[tokio::test]
    async fn add_task_rejects_out_of_range_difficulty() {
        let (_dir, store) = test_store();
        let config = LoopConfig::load_or_init(&store).await.unwrap();

        let result = cmd_add_task(
            &store,
            &config,
            "too hard".to_string(),
            1.5,
            Vec::new(),
            Vec::new(),
            None,
            None,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn add_task_honors_priority_and_budget_overrides() {
        let (_dir, store) = test_store();
        let config = LoopConfig::load_or_init(&store).await.unwrap();

        cmd_add_task(
            &store,
            &config,
            "one shot only".to_string(),
            0.5,
            Vec::new(),
            Vec::new(),
            Some(2),
            Some(1),
        )
        .await
        .unwrap();

        let queue = TaskQueue::new(Arc::clone(&store), &config);
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].priority, 2);
        assert_eq!(pending[0].max_attempts, 1);
    }

    #[tokio::test]
    async fn show_task_fails_cleanly_for_unknown_id() {
        let (_dir, store) = test_store();
        let config = LoopConfig::load_or_init(&store).await.unwrap();

        let result = cmd_show_task(&store, &config, Uuid::new_v4(), false).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn show_task_renders_text_and_raw() {
        let (_dir, store) = test_store();
        let config = LoopConfig::load_or_init(&store).await.unwrap();

        let queue = TaskQueue::new(Arc::clone(&store), &config);
        let id = queue
            .submit_task("inspect me", 0.5, Vec::new(), Vec::new(), 1)
            .await
            .unwrap();

        cmd_show_task(&store, &config, id, false).await.unwrap();
        cmd_show_task(&store, &config, id, true).await.unwrap();
    }

    #[tokio::test]
    async fn inspection_commands_tolerate_an_empty_store() {
        let (_dir, store) = test_store();
        let config = LoopConfig::load_or_init(&store).await.unwrap();

        cmd_list_tasks(&store, &config, None, 20).await.unwrap();
        cmd_list_tasks(&store, &config, Some("completed"), 20)
            .await
            .unwrap();
        cmd_profile(&store).await.unwrap();
        cmd_skills(&store).await.unwrap();
        cmd_trend(&store, &config, None).await.unwrap();
        cmd_curve(&store, &config, 10).await.unwrap();
    }
}
