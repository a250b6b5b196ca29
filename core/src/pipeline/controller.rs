use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;

use crate::config::{AppConfig, CacheConfig};
use crate::error::{PipelineError, TaskError, TaskFailure};
use crate::executor::{
    settle_all, OutputRendererPlugin, RenderEvent, TaskExecutor, TaskOutcome, TaskOutput, TaskSpec,
};
use crate::merge::{self, Artifact};
use crate::pool::{CacheKey, CacheSpec, Priority, ProviderPool};
use crate::provider::{GenerateOptions, Provider, ProviderRegistry};
use crate::request::Request;
use crate::utility::{compliance, structured_data};

use super::plan::{
    PipelinePlan, COMPLIANCE_TASK, LOCAL_SOURCE, META_BLOCK_TASK, STRUCTURED_DATA_TASK,
};
use super::prompts;
use super::select;
use super::stage::{PipelineRun, StageKind, StageRecord};

type LocalWork = Box<dyn FnOnce() -> Result<Value, TaskError> + Send>;

enum Work {
    Generate {
        provider: Arc<dyn Provider>,
        prompt: String,
        options: GenerateOptions,
        cache: Option<CacheSpec>,
    },
    Local(LocalWork),
}

struct StageTask {
    spec: TaskSpec,
    work: Work,
}

/// Drives Foundation -> Enhancement -> Finalization for one request at a time.
///
/// Holds no per-run state, so one controller can serve concurrent runs; the
/// injected [`ProviderPool`] is what they share.
pub struct PipelineController {
    registry: ProviderRegistry,
    pool: ProviderPool,
    executor: TaskExecutor,
    plan: PipelinePlan,
    cache: CacheConfig,
    max_parallel_tasks: usize,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
}

impl PipelineController {
    pub fn new(config: &AppConfig, registry: ProviderRegistry, pool: ProviderPool) -> Self {
        Self {
            registry,
            pool,
            executor: TaskExecutor::new(config.executor.task_timeout()),
            plan: PipelinePlan::from_config(&config.pipeline),
            cache: config.cache.clone(),
            max_parallel_tasks: config.executor.max_parallel_tasks.max(1),
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn OutputRendererPlugin>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    pub fn pool(&self) -> &ProviderPool {
        &self.pool
    }

    /// Runs every stage in order and merges the result.
    ///
    /// Per-task failures are captured in the stage records. The only
    /// pipeline-level errors are an invalid request and
    /// [`PipelineError::NoFoundationOutput`], in which case no later stage
    /// is submitted.
    pub async fn run_pipeline(&self, request: Request) -> Result<PipelineRun, PipelineError> {
        request.validate()?;

        let start = Instant::now();
        let mut run = PipelineRun::new(request);
        let run_id = run.id.to_string();
        tracing::info!(
            target: "forge.pipeline",
            run_id = %run_id,
            subject = %run.request.subject(),
            "pipeline run start"
        );
        self.emit(RenderEvent::RunStart {
            run_id: run_id.clone(),
            subject: run.request.subject().to_string(),
            stages: StageKind::ALL.iter().map(|s| s.to_string()).collect(),
        });

        let tasks = self.foundation_tasks(&run.request);
        let record = self.run_stage(&run_id, StageKind::Foundation, tasks).await;
        run.stages.push(record);

        let base = run
            .stage(StageKind::Foundation)
            .and_then(|r| select::best_foundation(&self.plan, r))
            .and_then(select::usable_text)
            .map(str::to_string);
        let Some(base) = base else {
            let failures: BTreeMap<String, String> = run
                .stage(StageKind::Foundation)
                .map(|r| {
                    r.errors()
                        .iter()
                        .map(|(k, f)| (k.clone(), f.error.to_string()))
                        .chain(
                            r.outcomes()
                                .keys()
                                .map(|k| (k.clone(), "empty output".to_string())),
                        )
                        .collect()
                })
                .unwrap_or_default();
            let err = PipelineError::NoFoundationOutput {
                run_id: run_id.clone(),
                failures,
            };
            tracing::error!(target: "forge.pipeline", run_id = %run_id, error = %err, "pipeline aborted");
            self.emit(RenderEvent::RunEnd {
                run_id,
                success: false,
                duration_ms: start.elapsed().as_millis() as u64,
                error: Some(err.to_string()),
            });
            return Err(err);
        };

        let tasks = self.enhancement_tasks(&run.request, &base);
        let record = self.run_stage(&run_id, StageKind::Enhancement, tasks).await;
        run.stages.push(record);

        // Draft for finalization: Foundation body with Enhancement overlays.
        let draft = merge::synthesize(&self.plan, &run.stages).unwrap_or_else(|| Artifact {
            body: base.clone(),
            ..Artifact::default()
        });
        let tasks = self.finalization_tasks(&run.request, &draft);
        let record = self.run_stage(&run_id, StageKind::Finalization, tasks).await;
        run.stages.push(record);

        let artifact = merge::synthesize(&self.plan, &run.stages).unwrap_or(draft);
        run.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            target: "forge.pipeline",
            run_id = %run_id,
            duration_ms = run.duration_ms,
            warnings = artifact.warnings.len(),
            "pipeline run complete"
        );
        run.artifact = Some(artifact);

        self.emit(RenderEvent::RunEnd {
            run_id,
            success: true,
            duration_ms: run.duration_ms,
            error: None,
        });
        Ok(run)
    }

    fn foundation_tasks(&self, request: &Request) -> Vec<StageTask> {
        let (prompt, options) = prompts::foundation(request);
        self.plan
            .foundation_precedence()
            .filter_map(|name| {
                self.generate_task(
                    StageKind::Foundation,
                    name,
                    name,
                    Priority::HIGH,
                    prompt.clone(),
                    options.clone(),
                )
            })
            .collect()
    }

    fn enhancement_tasks(&self, request: &Request, base: &str) -> Vec<StageTask> {
        self.plan
            .enhancement()
            .iter()
            .filter_map(|task| {
                let (prompt, options) = prompts::enhancement(task.kind, request, base);
                self.generate_task(
                    StageKind::Enhancement,
                    &task.name,
                    &task.provider,
                    Priority::NORMAL,
                    prompt,
                    options,
                )
            })
            .collect()
    }

    fn finalization_tasks(&self, request: &Request, draft: &Artifact) -> Vec<StageTask> {
        let mut tasks = Vec::with_capacity(3);

        let (body, req, metadata) = (draft.body.clone(), request.clone(), draft.metadata.clone());
        tasks.push(StageTask {
            spec: TaskSpec::new(STRUCTURED_DATA_TASK, LOCAL_SOURCE),
            work: Work::Local(Box::new(move || {
                Ok(structured_data::build(&body, &req, &metadata))
            })),
        });

        let (body, req) = (draft.body.clone(), request.clone());
        tasks.push(StageTask {
            spec: TaskSpec::new(COMPLIANCE_TASK, LOCAL_SOURCE),
            work: Work::Local(Box::new(move || {
                serde_json::to_value(compliance::check(&body, &req)).map_err(|e| TaskError::Utility {
                    message: e.to_string(),
                })
            })),
        });

        if let Some(provider) = self.plan.meta_provider() {
            let (prompt, options) = prompts::meta_block(request, &draft.body);
            if let Some(task) = self.generate_task(
                StageKind::Finalization,
                META_BLOCK_TASK,
                provider,
                Priority::LOW,
                prompt,
                options,
            ) {
                tasks.push(task);
            }
        }
        tasks
    }

    /// A provider-backed task, or `None` when the provider is not registered.
    fn generate_task(
        &self,
        stage: StageKind,
        name: &str,
        provider: &str,
        priority: Priority,
        prompt: String,
        options: GenerateOptions,
    ) -> Option<StageTask> {
        let Some(handle) = self.registry.get(provider) else {
            tracing::debug!(
                target: "forge.pipeline",
                stage = %stage,
                task = %name,
                provider = %provider,
                "provider not registered; task skipped"
            );
            return None;
        };

        let cache = self
            .cache
            .ttl_for(stage.operation_class())
            .map(|ttl| CacheSpec {
                key: CacheKey::new(
                    provider,
                    stage.as_str(),
                    &[prompt.as_str(), options.cache_fingerprint().as_str()],
                ),
                ttl,
            });

        Some(StageTask {
            spec: TaskSpec::new(name, provider).with_priority(priority),
            work: Work::Generate {
                provider: handle,
                prompt,
                options,
                cache,
            },
        })
    }

    async fn run_stage(&self, run_id: &str, stage: StageKind, tasks: Vec<StageTask>) -> StageRecord {
        let mut record = StageRecord::new(stage);
        record.mark_running();

        let names: Vec<String> = tasks.iter().map(|t| t.spec.name.clone()).collect();
        tracing::info!(
            target: "forge.pipeline",
            run_id,
            stage = %stage,
            tasks = names.len(),
            "stage start"
        );
        self.emit(RenderEvent::StageStart {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            tasks: names,
        });

        let results = settle_all(tasks, self.max_parallel_tasks, |task| {
            self.run_task(run_id, stage, task)
        })
        .await;
        for result in results {
            record.record(result);
        }
        record.mark_completed();

        let (succeeded, failed) = (record.outcomes().len(), record.errors().len());
        if stage.requires_output() && succeeded == 0 {
            tracing::warn!(target: "forge.pipeline", run_id, stage = %stage, failed, "stage produced no output");
        }
        tracing::info!(
            target: "forge.pipeline",
            run_id,
            stage = %stage,
            succeeded,
            failed,
            "stage completed"
        );
        self.emit(RenderEvent::StageEnd {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            succeeded,
            failed,
        });
        record
    }

    async fn run_task(
        &self,
        run_id: &str,
        stage: StageKind,
        task: StageTask,
    ) -> Result<TaskOutcome, TaskFailure> {
        let StageTask { spec, work } = task;
        let pool = &self.pool;

        let result = match work {
            Work::Generate {
                provider,
                prompt,
                options,
                cache,
            } => {
                self.executor
                    .run(&spec, |priority| async move {
                        pool.generate(provider.as_ref(), priority, &prompt, &options, cache.as_ref())
                            .await
                            .map(TaskOutput::from)
                    })
                    .await
            }
            Work::Local(f) => {
                self.executor
                    .run(&spec, |_| async move { f().map(TaskOutput::json) })
                    .await
            }
        };

        let (success, duration_ms, error) = match &result {
            Ok(o) => (true, o.duration_ms, None),
            Err(f) => (false, f.elapsed_ms, Some(f.error.to_string())),
        };
        self.emit(RenderEvent::TaskComplete {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            task: spec.name.clone(),
            source: spec.source.clone(),
            success,
            duration_ms,
            error,
        });
        result
    }

    fn emit(&self, event: RenderEvent) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&event);
        }
    }
}
