//! Flow executor: the generate / integrate / validate / remediate cycle.
//!
//! Phases run in dependency order. Within a phase, worker tasks fan out
//! concurrently (bounded by a semaphore) and join at a wait-for-all barrier;
//! one failed task never cancels its siblings. The joined fragment set is
//! spliced into the template in a single pass, validated, and routed: issues
//! either trigger a bounded regeneration round (restoring the template to
//! its pre-phase state) or abort the flow with a snapshot of the last valid
//! document. Asset acquisition runs after the last phase and can only
//! degrade the run, never abort it.

use crate::assets::{AssetResolver, AssetResult, AssetSearch, AssetStore, RetryPolicy};
use crate::audit::{
    AuditLogger, PhaseAudit, PhaseOutcome, RunConfig, RunStatus, TaskAudit, TaskOutcome,
};
use crate::errors::{FlowError, GenerationError};
use crate::flow::scheduler::{FlowScheduler, PhaseStatus};
use crate::flow::state::{FinalReport, PhaseRunResult};
use crate::fragment::Fragment;
use crate::generator::FragmentGenerator;
use crate::integrate::{integrate, AppliedFragment};
use crate::issue::{Issue, IssueCategory};
use crate::phase::{FlowPlan, JoinMode, Phase, TaskSpec};
use crate::registry::MarkerRegistry;
use crate::router::Router;
use crate::template::Template;
use crate::validate::Validator;
use anyhow::Context;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

/// Executor knobs, resolved from the effective configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub output_root: PathBuf,
    pub plan_file: PathBuf,
    pub template_file: PathBuf,
    /// Final document filename under the output root
    pub document_name: String,
    pub max_remediation_rounds: u32,
    pub worker_timeout: Duration,
    pub max_parallel_workers: usize,
    pub duration_tolerance: f64,
    pub asset_retry: RetryPolicy,
}

/// Outcome of running one phase, before it is folded into the report.
enum PhaseVerdict {
    Completed {
        applied: Vec<AppliedFragment>,
        warnings: Vec<Issue>,
        rounds: u32,
    },
    Aborted {
        fatal: Vec<Issue>,
        rounds: u32,
    },
}

pub struct FlowExecutor {
    config: ExecutorConfig,
    generator: Arc<dyn FragmentGenerator>,
    search: Arc<dyn AssetSearch>,
}

impl FlowExecutor {
    pub fn new(
        config: ExecutorConfig,
        generator: Arc<dyn FragmentGenerator>,
        search: Arc<dyn AssetSearch>,
    ) -> Self {
        Self {
            config,
            generator,
            search,
        }
    }

    /// Execute the full plan against the template source.
    ///
    /// Pre-execution validation failures (bad graph, bad registry) are
    /// returned as `Err`. Everything that happens during execution -
    /// including a fatal abort - is reported through the `FinalReport`.
    pub async fn run(&self, plan: &FlowPlan, template_source: &str) -> Result<FinalReport, FlowError> {
        let marker_tokens: Vec<String> = plan.markers.iter().map(|d| d.marker.clone()).collect();
        let mut template = Template::new(template_source, &marker_tokens);

        let registry = MarkerRegistry::from_decls(plan.markers.clone())?;
        registry.validate(&template, &plan.phases)?;

        let mut scheduler = FlowScheduler::from_phases(&plan.phases)?;
        let router = Router::new(self.config.max_remediation_rounds);

        let mut logger = AuditLogger::new(&self.config.output_root.join("audit"));
        logger.ensure_directories()?;
        logger.start_run(RunConfig {
            plan_file: self.config.plan_file.clone(),
            template_file: self.config.template_file.clone(),
            output_root: self.config.output_root.clone(),
            max_remediation_rounds: self.config.max_remediation_rounds,
            worker_timeout_secs: self.config.worker_timeout.as_secs(),
            max_parallel_workers: self.config.max_parallel_workers,
        })?;

        let waves = scheduler.compute_waves();
        info!(phases = scheduler.phase_count(), waves = waves.len(), "flow plan scheduled");

        let mut phase_results: Vec<PhaseRunResult> = Vec::new();
        let mut unresolved: Vec<Issue> = Vec::new();
        let mut warnings_present = false;
        let mut snapshot_path: Option<PathBuf> = None;
        let mut order_base = 0usize;
        let mut aborted = false;

        'flow: while !scheduler.all_complete() {
            let ready: Vec<Phase> = scheduler
                .ready_phases()
                .iter()
                .map(|n| n.phase.clone())
                .collect();
            if ready.is_empty() {
                break;
            }

            for phase in ready {
                scheduler.mark_running(&phase.id);
                logger.add_phase(PhaseAudit::new(&phase.id, &phase.name))?;
                info!(phase = %phase.id, tasks = phase.tasks.len(), "phase started");

                let started = Instant::now();
                let backup = template.clone();

                let (verdict, task_audits) = self
                    .run_phase(&phase, &mut template, &backup, &registry, &router, order_base)
                    .await?;

                match verdict {
                    PhaseVerdict::Completed {
                        applied,
                        warnings,
                        rounds,
                    } => {
                        order_base += applied.len();
                        warnings_present |= !warnings.is_empty();
                        let version = template.version();

                        let outcome = if warnings.is_empty() {
                            PhaseOutcome::Completed
                        } else {
                            PhaseOutcome::CompletedWithWarnings
                        };
                        logger.update_last_phase(|p| {
                            p.tasks = task_audits.clone();
                            p.remediation_rounds = rounds;
                            p.template_version = Some(version);
                            p.issues = warnings.clone();
                            p.finish(outcome.clone());
                        })?;

                        scheduler.mark_completed(&phase.id, version);
                        phase_results.push(PhaseRunResult {
                            phase_id: phase.id.clone(),
                            status: PhaseStatus::Completed {
                                template_version: version,
                            },
                            applied,
                            issues: warnings,
                            remediation_rounds: rounds,
                            duration: started.elapsed(),
                        });
                        info!(phase = %phase.id, version, rounds, "phase completed");
                    }
                    PhaseVerdict::Aborted { fatal, rounds } => {
                        // Retain the last valid document state
                        template = backup;
                        let summaries: Vec<String> =
                            fatal.iter().map(|i| i.summary()).collect();
                        error!(phase = %phase.id, issues = ?summaries, "phase aborted");

                        let path =
                            logger.write_snapshot(&phase.id, template.content())?;
                        snapshot_path = Some(path);

                        logger.update_last_phase(|p| {
                            p.tasks = task_audits.clone();
                            p.remediation_rounds = rounds;
                            p.issues = fatal.clone();
                            p.finish(PhaseOutcome::Aborted {
                                message: summaries.join(", "),
                            });
                        })?;

                        scheduler.mark_aborted(&phase.id, &summaries.join(", "));
                        phase_results.push(PhaseRunResult {
                            phase_id: phase.id.clone(),
                            status: PhaseStatus::Aborted {
                                error: summaries.join(", "),
                            },
                            applied: Vec::new(),
                            issues: fatal.clone(),
                            remediation_rounds: rounds,
                            duration: started.elapsed(),
                        });
                        unresolved.extend(fatal);
                        aborted = true;
                        break 'flow;
                    }
                }
            }
        }

        if aborted {
            scheduler.skip_remaining();
            for node in scheduler.nodes() {
                if matches!(node.status, PhaseStatus::Skipped)
                    && !phase_results.iter().any(|r| r.phase_id == node.phase.id)
                {
                    phase_results.push(PhaseRunResult {
                        phase_id: node.phase.id.clone(),
                        status: PhaseStatus::Skipped,
                        applied: Vec::new(),
                        issues: Vec::new(),
                        remediation_rounds: 0,
                        duration: Duration::ZERO,
                    });
                }
            }
        }

        // Asset pass: never aborts, only degrades.
        let mut asset_results: Vec<AssetResult> = Vec::new();
        if !aborted && !plan.assets.is_empty() {
            asset_results = self.resolve_assets(plan).await?;
            for result in &asset_results {
                if !result.success {
                    warnings_present = true;
                    unresolved.push(
                        Issue::new(
                            IssueCategory::AssetAcquisition,
                            &format!(
                                "Asset {} unresolved after {} attempts, placeholder substituted",
                                result.spec_id,
                                result.trace.len()
                            ),
                        ),
                    );
                }
            }
            logger.record_assets(&asset_results)?;
        }

        let mut document_path = None;
        if !aborted {
            template.freeze();
            let path = self.config.output_root.join(&self.config.document_name);
            std::fs::write(&path, template.content())
                .with_context(|| format!("Failed to write document: {}", path.display()))?;
            document_path = Some(path);
        }

        let status = if aborted {
            RunStatus::Aborted
        } else if warnings_present {
            RunStatus::Degraded
        } else {
            RunStatus::Succeeded
        };

        logger.record_unresolved(&unresolved)?;
        logger.finish_run(status)?;

        Ok(FinalReport {
            status,
            phases: phase_results,
            document: document_path,
            snapshot: snapshot_path,
            unresolved_issues: unresolved,
            assets: asset_results,
            template_version: template.version(),
        })
    }

    /// Run one phase through generation, integration, validation, and the
    /// bounded remediation loop.
    async fn run_phase(
        &self,
        phase: &Phase,
        template: &mut Template,
        backup: &Template,
        registry: &MarkerRegistry,
        router: &Router,
        order_base: usize,
    ) -> Result<(PhaseVerdict, Vec<TaskAudit>), FlowError> {
        let validator = Validator::new(registry);
        let mut task_audits: Vec<TaskAudit> = Vec::new();

        let outcomes = self.generate_all(&phase.tasks, phase.join_mode).await;
        let (mut fragments, mut gen_issues) = collect_outcomes(outcomes, &mut task_audits);

        let mut carried: Vec<Issue> = Vec::new();
        let mut rounds = 0u32;

        loop {
            let integration = integrate(template, &fragments, order_base)?;
            let task_refs: Vec<&TaskSpec> = phase.tasks.iter().collect();
            let report = validator.validate(template, &fragments, &task_refs, &phase.id);

            let mut fresh = gen_issues.clone();
            fresh.extend(integration.issues.clone());
            fresh.extend(report.issues);
            let mut issues = merge_attempts(&carried, fresh);

            let routing = router.route(&mut issues, registry);

            if !routing.fatal.is_empty() {
                return Ok((
                    PhaseVerdict::Aborted {
                        fatal: routing.fatal,
                        rounds,
                    },
                    task_audits,
                ));
            }

            if routing.regenerate.is_empty() {
                return Ok((
                    PhaseVerdict::Completed {
                        applied: integration.applied,
                        warnings: routing.warnings,
                        rounds,
                    },
                    task_audits,
                ));
            }

            if rounds >= self.config.max_remediation_rounds {
                // Per-issue bounds should escalate first, but a rotating set
                // of issues could otherwise loop forever.
                let mut fatal: Vec<Issue> =
                    issues.into_iter().filter(|i| i.severity.is_blocking()).collect();
                for issue in &mut fatal {
                    issue.escalate();
                }
                warn!(phase = %phase.id, rounds, "remediation bound exhausted");
                return Ok((PhaseVerdict::Aborted { fatal, rounds }, task_audits));
            }
            rounds += 1;

            // Roll back this phase's splices and re-run the offending tasks;
            // fragments from healthy workers are reused as-is.
            *template = backup.clone();
            carried = issues;

            let mut targets: Vec<&TaskSpec> = Vec::new();
            for target in &routing.regenerate {
                let task = match &target.producer {
                    Some(producer) => phase.tasks.iter().find(|t| &t.id == producer),
                    None => phase.task_for_marker(&target.marker),
                };
                if let Some(task) = task {
                    if !targets.iter().any(|t| t.id == task.id) {
                        targets.push(task);
                    }
                }
            }
            info!(
                phase = %phase.id,
                round = rounds,
                targets = targets.len(),
                "remediation round started"
            );

            let regen_specs: Vec<TaskSpec> = targets.into_iter().cloned().collect();
            fragments.retain(|f| !regen_specs.iter().any(|t| t.id == f.producer));
            gen_issues.clear();

            let outcomes = self.generate_all(&regen_specs, phase.join_mode).await;
            let (new_fragments, new_issues) = collect_outcomes(outcomes, &mut task_audits);
            fragments.extend(new_fragments);
            gen_issues = new_issues;
        }
    }

    /// Fan generation out over the task set and join at a wait-for-all
    /// barrier. Each task gets its own timeout; a failure is captured as a
    /// result, never propagated early.
    async fn generate_all(
        &self,
        tasks: &[TaskSpec],
        join_mode: JoinMode,
    ) -> Vec<(TaskSpec, Result<Fragment, GenerationError>, Duration)> {
        if tasks.is_empty() {
            return Vec::new();
        }

        match join_mode {
            JoinMode::Sequential => {
                let mut out = Vec::with_capacity(tasks.len());
                for task in tasks {
                    let started = Instant::now();
                    let result = self.generate_one(task).await;
                    out.push((task.clone(), result, started.elapsed()));
                }
                out
            }
            JoinMode::Parallel => {
                let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_workers));
                let (tx, mut rx) = mpsc::channel(tasks.len());

                for task in tasks {
                    let task = task.clone();
                    let tx = tx.clone();
                    let semaphore = semaphore.clone();
                    let generator = self.generator.clone();
                    let timeout = self.config.worker_timeout;

                    tokio::spawn(async move {
                        // Semaphore closed means the executor is gone
                        let Ok(_permit) = semaphore.acquire_owned().await else {
                            return;
                        };
                        let started = Instant::now();
                        let result = match tokio::time::timeout(timeout, generator.generate(&task))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(GenerationError::Timeout {
                                task: task.id.clone(),
                                seconds: timeout.as_secs(),
                            }),
                        };
                        tx.send((task, result, started.elapsed())).await.ok();
                    });
                }
                drop(tx);

                let mut by_id: HashMap<String, (TaskSpec, Result<Fragment, GenerationError>, Duration)> =
                    HashMap::new();
                while let Some(outcome) = rx.recv().await {
                    by_id.insert(outcome.0.id.clone(), outcome);
                }

                // Re-establish plan order; completion order is jitter.
                tasks
                    .iter()
                    .filter_map(|t| by_id.remove(&t.id))
                    .collect()
            }
        }
    }

    async fn generate_one(&self, task: &TaskSpec) -> Result<Fragment, GenerationError> {
        match tokio::time::timeout(self.config.worker_timeout, self.generator.generate(task)).await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout {
                task: task.id.clone(),
                seconds: self.config.worker_timeout.as_secs(),
            }),
        }
    }

    /// Resolve and persist every asset spec in the plan.
    async fn resolve_assets(&self, plan: &FlowPlan) -> Result<Vec<AssetResult>, FlowError> {
        let store = AssetStore::new(&self.config.output_root);
        store
            .ensure_directories()
            .map_err(|e| FlowError::Other(anyhow::Error::new(e)))?;
        let resolver = AssetResolver::new(
            self.search.as_ref(),
            self.config.asset_retry.clone(),
            self.config.duration_tolerance,
        );

        let mut results = Vec::with_capacity(plan.assets.len());
        for spec in &plan.assets {
            let mut result = resolver.resolve(spec).await;
            if result.success {
                if let Err(e) = store.persist(self.search.as_ref(), spec, &mut result).await {
                    warn!(spec = %spec.id, error = %e, "asset download failed, using placeholder");
                    result.success = false;
                    result.resolved = None;
                    result.placeholder = true;
                }
            }
            results.push(result);
        }

        store
            .write_manifests(&plan.assets, &results)
            .map_err(|e| FlowError::Other(anyhow::Error::new(e)))?;
        Ok(results)
    }
}

/// Split generation outcomes into fragments and generation issues, and
/// append an audit row per task. Re-runs of a task replace its earlier row.
fn collect_outcomes(
    outcomes: Vec<(TaskSpec, Result<Fragment, GenerationError>, Duration)>,
    task_audits: &mut Vec<TaskAudit>,
) -> (Vec<Fragment>, Vec<Issue>) {
    let mut fragments = Vec::new();
    let mut issues = Vec::new();

    for (task, result, duration) in outcomes {
        let prior_attempts = match task_audits.iter().position(|a| a.task_id == task.id) {
            Some(idx) => task_audits.remove(idx).attempts,
            None => 0,
        };

        let outcome = match &result {
            Ok(_) => TaskOutcome::Succeeded,
            Err(GenerationError::Timeout { seconds, .. }) => {
                TaskOutcome::TimedOut { seconds: *seconds }
            }
            Err(e) => TaskOutcome::Failed {
                message: e.to_string(),
            },
        };
        task_audits.push(TaskAudit {
            task_id: task.id.clone(),
            marker: task.marker.clone(),
            duration_secs: duration.as_secs_f64(),
            outcome,
            attempts: prior_attempts + 1,
        });

        match result {
            Ok(fragment) => fragments.push(fragment),
            Err(e) => {
                warn!(task = %task.id, marker = %task.marker, error = %e, "worker task failed");
                issues.push(
                    Issue::new(IssueCategory::Generation, &e.to_string())
                        .with_marker(&task.marker)
                        .with_producer(&task.id),
                );
            }
        }
    }

    (fragments, issues)
}

/// Carry remediation-attempt counters from the previous round onto fresh
/// issues that describe the same defect.
fn merge_attempts(previous: &[Issue], fresh: Vec<Issue>) -> Vec<Issue> {
    fresh
        .into_iter()
        .map(|mut issue| {
            if let Some(prior) = previous.iter().find(|p| {
                p.category == issue.category
                    && p.marker == issue.marker
                    && p.producer == issue.producer
            }) {
                issue.attempts = prior.attempts;
            }
            issue
        })
        .collect()
}
