//! Weighted strategy selection over the profile analysis.
//!
//! Each strategy draws its candidates from one pool of the analysis. A
//! strategy with an empty pool is not viable this round. Among viable
//! strategies the pick is a weighted random draw over the persisted
//! weights; within a strategy the pick is deterministic, always the top
//! candidate of the already-sorted pool.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use kata_store::JsonStore;

use crate::analysis::{OpportunityKind, ProfileAnalysis};
use crate::config::LoopConfig;
use crate::domain::{Strategy, StrategyWeights};
use crate::error::Result;
use crate::keys;

/// What a synthesized task should practice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FocusKind {
    SkillGap { skill: String },
    StyleIssue { issue: String },
    Regression { skill: String },
    Advancement { skill: String },
    Exploration { skill: String },
    Consolidation { skill: String },
    GeneralImprovement,
}

impl FocusKind {
    /// The skill this focus targets, when it targets one.
    pub fn skill(&self) -> Option<&str> {
        match self {
            FocusKind::SkillGap { skill }
            | FocusKind::Regression { skill }
            | FocusKind::Advancement { skill }
            | FocusKind::Exploration { skill }
            | FocusKind::Consolidation { skill } => Some(skill),
            FocusKind::StyleIssue { .. } | FocusKind::GeneralImprovement => None,
        }
    }
}

impl fmt::Display for FocusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusKind::SkillGap { skill } => write!(f, "skill_gap:{skill}"),
            FocusKind::StyleIssue { issue } => write!(f, "style_issue:{issue}"),
            FocusKind::Regression { skill } => write!(f, "regression:{skill}"),
            FocusKind::Advancement { skill } => write!(f, "advancement:{skill}"),
            FocusKind::Exploration { skill } => write!(f, "exploration:{skill}"),
            FocusKind::Consolidation { skill } => write!(f, "consolidation:{skill}"),
            FocusKind::GeneralImprovement => f.write_str("general_improvement"),
        }
    }
}

/// A strategy paired with the concrete focus it picked.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkillFocus {
    pub strategy: Strategy,
    pub focus: FocusKind,
}

/// Draws the next practice focus and keeps strategy weights persisted.
pub struct StrategySelector {
    store: Arc<JsonStore>,
    floor: f64,
    nudge: f64,
    rng: StdRng,
}

impl StrategySelector {
    pub fn new(store: Arc<JsonStore>, config: &LoopConfig) -> Self {
        Self::with_rng(store, config, StdRng::from_entropy())
    }

    /// Build with a caller-supplied RNG for reproducible draws.
    pub fn with_rng(store: Arc<JsonStore>, config: &LoopConfig, rng: StdRng) -> Self {
        Self {
            store,
            floor: config.strategy_floor_weight,
            nudge: config.strategy_nudge,
            rng,
        }
    }

    /// Pick the next focus from the analysis.
    ///
    /// With nothing viable in any pool this still returns a focus, falling
    /// back to consolidation with a general-improvement target.
    pub async fn next_focus(&mut self, analysis: &ProfileAnalysis) -> Result<SkillFocus> {
        let mut pools = viable_pools(analysis);
        if pools.is_empty() {
            debug!("no viable strategy pool, falling back to general improvement");
            return Ok(SkillFocus {
                strategy: Strategy::Consolidation,
                focus: FocusKind::GeneralImprovement,
            });
        }

        let weights = self
            .store
            .load_or_default::<StrategyWeights>(keys::STRATEGY_WEIGHTS)
            .await?;
        let total: f64 = pools.iter().map(|(s, _)| weights.weight(*s)).sum();

        let (strategy, focus) = if total <= f64::EPSILON {
            let index = self.rng.gen_range(0..pools.len());
            pools.swap_remove(index)
        } else {
            let mut point = self.rng.gen::<f64>() * total;
            let mut chosen = pools.len() - 1;
            for (index, (candidate, _)) in pools.iter().enumerate() {
                let weight = weights.weight(*candidate);
                if point < weight {
                    chosen = index;
                    break;
                }
                point -= weight;
            }
            pools.swap_remove(chosen)
        };

        debug!(strategy = %strategy, focus = %focus, "selected practice focus");
        Ok(SkillFocus { strategy, focus })
    }

    /// Feed a task outcome back into the persisted weights.
    ///
    /// Success rewards the strategy immediately. A single failure only
    /// counts; the weight drops once failures run back to back. Weights are
    /// re-normalized to sum 1 with every weight held at the floor or above.
    /// Returns the strategy's weight after the update.
    pub async fn update_weights(&self, strategy: Strategy, success: bool) -> Result<f64> {
        let nudge = self.nudge;
        let floor = self.floor;
        let updated = self
            .store
            .mutate::<StrategyWeights, _, _>(keys::STRATEGY_WEIGHTS, |weights| {
                if success {
                    weights.consecutive_failures.remove(&strategy);
                    *weights.weights.entry(strategy).or_insert(0.0) += nudge;
                } else {
                    let failures = weights.consecutive_failures.entry(strategy).or_insert(0);
                    *failures += 1;
                    if *failures >= 2 {
                        *weights.weights.entry(strategy).or_insert(0.0) -= nudge;
                    }
                }
                normalize_with_floor(weights, floor);
                weights.weight(strategy)
            })
            .await?;
        debug!(
            strategy = %strategy,
            success,
            weight = updated,
            "strategy weights updated"
        );
        Ok(updated)
    }
}

/// Top candidate per strategy, taken from the analysis pools.
fn viable_pools(analysis: &ProfileAnalysis) -> Vec<(Strategy, FocusKind)> {
    let mut pools = Vec::new();
    if let Some(gap) = analysis.skill_gaps.first() {
        pools.push((
            Strategy::SkillGapFilling,
            FocusKind::SkillGap {
                skill: gap.skill.clone(),
            },
        ));
    }
    if let Some(issue) = analysis.style_issues.first() {
        pools.push((
            Strategy::StyleImprovement,
            FocusKind::StyleIssue {
                issue: issue.issue.clone(),
            },
        ));
    }
    if let Some(stale) = analysis
        .opportunities
        .iter()
        .find(|o| o.kind == OpportunityKind::Refresh)
    {
        pools.push((
            Strategy::RegressionPrevention,
            FocusKind::Regression {
                skill: stale.skill.clone(),
            },
        ));
    }
    if let Some(ready) = analysis
        .opportunities
        .iter()
        .find(|o| o.kind == OpportunityKind::Advancement)
    {
        pools.push((
            Strategy::SkillAdvancement,
            FocusKind::Advancement {
                skill: ready.skill.clone(),
            },
        ));
    }
    if let Some(skill) = analysis.unexplored.first() {
        pools.push((
            Strategy::Exploration,
            FocusKind::Exploration {
                skill: skill.clone(),
            },
        ));
    }
    if let Some(skill) = analysis.practiced.first() {
        pools.push((
            Strategy::Consolidation,
            FocusKind::Consolidation {
                skill: skill.clone(),
            },
        ));
    }
    pools
}

/// Clamp every strategy to the floor and rescale so the total is 1.
///
/// The floor share (`n * floor`) is reserved first; the remaining budget is
/// split in proportion to each weight's excess over the floor. If nothing
/// sits above the floor the weights degenerate to an even split.
fn normalize_with_floor(weights: &mut StrategyWeights, floor: f64) {
    let n = Strategy::ALL.len() as f64;
    let mut excess = 0.0;
    for strategy in Strategy::ALL {
        let weight = weights.weights.entry(strategy).or_insert(0.0);
        if *weight < floor {
            *weight = floor;
        }
        excess += *weight - floor;
    }

    let budget = 1.0 - n * floor;
    if excess > f64::EPSILON && budget > 0.0 {
        for weight in weights.weights.values_mut() {
            *weight = floor + (*weight - floor) * budget / excess;
        }
    } else {
        for weight in weights.weights.values_mut() {
            *weight = 1.0 / n;
        }
    }
}
