//! Graph runner
//!
//! Walks a selection of the [`AssetGraph`] in dependency order and runs every
//! asset whose selected upstreams have succeeded. Independent assets run
//! concurrently on a [`JoinSet`]; the shared database lock serializes their
//! statements.
//!
//! Failures never abort the process. Each asset ends in exactly one
//! [`AssetStatus`], collected into a [`RunReport`].

use crate::assets::{Asset, AssetContext, Materialization};
use crate::error::{PipelineError, Result};
use crate::graph::AssetGraph;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What the runner does after an asset fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Keep running every asset that does not depend on the failure
    #[default]
    BestEffort,
    /// Start nothing new after the first failure; in-flight assets finish
    FailFast,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BestEffort => write!(f, "best-effort"),
            Self::FailFast => write!(f, "fail-fast"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "best-effort" | "best_effort" => Ok(Self::BestEffort),
            "fail-fast" | "fail_fast" => Ok(Self::FailFast),
            other => Err(PipelineError::config(format!(
                "unknown failure policy '{}', expected 'best-effort' or 'fail-fast'",
                other
            ))),
        }
    }
}

/// Final state of one asset in a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssetStatus {
    Succeeded {
        materialization: Materialization,
        elapsed_ms: u64,
    },
    Failed {
        error: String,
        elapsed_ms: u64,
    },
    Skipped {
        reason: String,
    },
}

impl AssetStatus {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Short label for tables and log lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub policy: FailurePolicy,
    pub outcomes: BTreeMap<String, AssetStatus>,
}

impl RunReport {
    /// True when every selected asset succeeded
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(AssetStatus::is_succeeded)
    }

    pub fn status(&self, asset: &str) -> Option<&AssetStatus> {
        self.outcomes.get(asset)
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.names_where(AssetStatus::is_succeeded)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names_where(AssetStatus::is_failed)
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_where(AssetStatus::is_skipped)
    }

    fn names_where(&self, pred: impl Fn(&AssetStatus) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, status)| pred(status))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at).to_std().unwrap_or_default()
    }

    /// One-line summary, e.g. `2 succeeded, 1 failed, 0 skipped`
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} skipped",
            self.succeeded().len(),
            self.failed().len(),
            self.skipped().len()
        )
    }
}

type TaskOutput = (String, std::result::Result<Result<Materialization>, String>, Duration);

/// Executes selections of an asset graph
pub struct Runner {
    graph: AssetGraph,
    policy: FailurePolicy,
}

impl Runner {
    /// `graph` must already be built
    pub fn new(graph: AssetGraph, policy: FailurePolicy) -> Self {
        Self { graph, policy }
    }

    pub fn graph(&self) -> &AssetGraph {
        &self.graph
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run every asset in the graph
    pub async fn run_all(&self, ctx: &AssetContext) -> RunReport {
        let selection = self.graph.topological_order().iter().cloned().collect();
        self.run(ctx, &selection).await
    }

    /// Run the named assets, see [`AssetGraph::select`]
    pub async fn run_selected(
        &self,
        ctx: &AssetContext,
        names: &[String],
        with_upstream: bool,
    ) -> Result<RunReport> {
        let selection = self.graph.select(names, with_upstream)?;
        Ok(self.run(ctx, &selection).await)
    }

    /// Run `selection`; names outside the graph are ignored
    pub async fn run(&self, ctx: &AssetContext, selection: &BTreeSet<String>) -> RunReport {
        let started_at = Utc::now();
        info!(
            run_id = %ctx.run_id,
            assets = selection.len(),
            policy = %self.policy,
            "Starting pipeline run"
        );

        let mut pending: Vec<String> = self
            .graph
            .topological_order()
            .iter()
            .filter(|name| selection.contains(*name))
            .cloned()
            .collect();
        let mut in_flight: BTreeSet<String> = BTreeSet::new();
        let mut outcomes: BTreeMap<String, AssetStatus> = BTreeMap::new();
        let mut first_failure: Option<String> = None;
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();

        loop {
            if let (FailurePolicy::FailFast, Some(failed)) = (self.policy, &first_failure) {
                for name in pending.drain(..) {
                    let reason = format!("run stopped after '{}' failed", failed);
                    warn!(asset = %name, reason = %reason, "Skipped {}", name);
                    outcomes.insert(name, AssetStatus::Skipped { reason });
                }
            }

            let mut still_pending = Vec::with_capacity(pending.len());
            for name in pending.drain(..) {
                match self.readiness(&name, selection, &outcomes) {
                    Readiness::Ready => match self.graph.get(&name) {
                        Some(asset) => {
                            spawn_asset(&mut tasks, Arc::clone(asset), ctx.clone());
                            in_flight.insert(name);
                        },
                        None => {
                            outcomes.insert(
                                name.clone(),
                                AssetStatus::Failed {
                                    error: PipelineError::UnknownAsset(name).to_string(),
                                    elapsed_ms: 0,
                                },
                            );
                        },
                    },
                    Readiness::Blocked(reason) => {
                        warn!(asset = %name, reason = %reason, "Skipped {}", name);
                        outcomes.insert(name, AssetStatus::Skipped { reason });
                    },
                    Readiness::Waiting => still_pending.push(name),
                }
            }
            pending = still_pending;

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            let (name, result, elapsed) = match joined {
                Ok(output) => output,
                Err(err) => {
                    error!(error = %err, "Asset task did not complete");
                    continue;
                },
            };
            in_flight.remove(&name);
            let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

            let status = match result {
                Ok(Ok(materialization)) => {
                    info!(
                        asset = %name,
                        rows = materialization.row_count,
                        elapsed_ms,
                        "Materialized {} ({} rows)",
                        name,
                        materialization.row_count
                    );
                    AssetStatus::Succeeded { materialization, elapsed_ms }
                },
                Ok(Err(err)) => {
                    error!(asset = %name, error = %err, elapsed_ms, "Failed to materialize {}", name);
                    AssetStatus::Failed { error: err.to_string(), elapsed_ms }
                },
                Err(message) => {
                    let err = PipelineError::AssetPanicked { asset: name.clone(), message };
                    error!(asset = %name, error = %err, elapsed_ms, "Failed to materialize {}", name);
                    AssetStatus::Failed { error: err.to_string(), elapsed_ms }
                },
            };

            if status.is_failed() && first_failure.is_none() {
                first_failure = Some(name.clone());
            }
            outcomes.insert(name, status);
        }

        // Only reachable if a task was cancelled underneath us
        for name in in_flight.into_iter().chain(pending) {
            outcomes.entry(name).or_insert_with(|| AssetStatus::Failed {
                error: "asset task did not complete".to_string(),
                elapsed_ms: 0,
            });
        }

        let report = RunReport {
            run_id: ctx.run_id,
            started_at,
            finished_at: Utc::now(),
            policy: self.policy,
            outcomes,
        };

        if report.is_success() {
            info!(run_id = %report.run_id, summary = %report.summary(), "Pipeline run finished");
        } else {
            warn!(run_id = %report.run_id, summary = %report.summary(), "Pipeline run finished with failures");
        }
        report
    }

    fn readiness(
        &self,
        name: &str,
        selection: &BTreeSet<String>,
        outcomes: &BTreeMap<String, AssetStatus>,
    ) -> Readiness {
        let mut waiting = false;
        for dep in self.graph.dependencies(name).into_iter().flatten() {
            if !selection.contains(dep) {
                continue;
            }
            match outcomes.get(dep) {
                Some(AssetStatus::Succeeded { .. }) => {},
                Some(AssetStatus::Failed { .. }) => {
                    return Readiness::Blocked(format!("upstream '{}' failed", dep));
                },
                Some(AssetStatus::Skipped { .. }) => {
                    return Readiness::Blocked(format!("upstream '{}' was skipped", dep));
                },
                None => waiting = true,
            }
        }
        if waiting {
            Readiness::Waiting
        } else {
            Readiness::Ready
        }
    }
}

enum Readiness {
    Ready,
    Waiting,
    Blocked(String),
}

fn spawn_asset(tasks: &mut JoinSet<TaskOutput>, asset: Arc<dyn Asset>, ctx: AssetContext) {
    tasks.spawn(async move {
        let name = asset.name().to_string();
        info!(asset = %name, "Materializing {}", name);
        let started = Instant::now();
        let result = AssertUnwindSafe(asset.materialize(&ctx))
            .catch_unwind()
            .await
            .map_err(panic_message);
        (name, result, started.elapsed())
    });
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
