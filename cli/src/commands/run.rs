use std::io::Write;

use forge_core::config::AppConfig;
use forge_core::error::CliError;
use forge_core::request::{Request, RequestOptions};
use forge_core::{PipelineController, PipelineRun, ProviderPool};
use forge_plugins::factory;
use serde_json::json;

use super::cli::{OutputFormat, RunArgs};

pub fn build_request(args: &RunArgs) -> Request {
    let mut options = RequestOptions::default();
    if let Some(n) = args.min_words {
        options.min_words = n;
    }
    options.tone = args.tone.clone();
    options.audience = args.audience.clone();

    let mut request = Request::new(args.subject.clone())
        .with_content_type(args.content_type)
        .with_options(options);
    if let Some(k) = &args.keyword {
        request = request.with_keyword(k.clone());
    }
    request
}

/// Executes one pipeline run and prints its result. Returns the exit code.
pub async fn run(args: &RunArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let registry =
        factory::build_registry(cfg).map_err(|e| CliError::Config(format!("{e:#}")))?;
    if registry.is_empty() {
        tracing::warn!(target: "forge.pipeline", "no providers configured");
    }

    let progress = args.format == OutputFormat::Text
        && !args.no_progress
        && atty::is(atty::Stream::Stderr);
    let renderer = factory::build_renderer(args.format.as_str(), progress);

    let pool = ProviderPool::new(cfg.pool.clone());
    let controller = PipelineController::new(cfg, registry, pool.clone()).with_renderer(renderer);

    let result = controller.run_pipeline(build_request(args)).await;
    for snap in pool.snapshot() {
        tracing::debug!(
            target: "forge.pool",
            provider = %snap.provider,
            mode = ?snap.mode,
            consecutive_failures = snap.consecutive_failures,
            "pool state at exit"
        );
    }
    pool.shutdown().await;

    let run = result?;
    if let Some(path) = &args.out {
        write_run(path, &run)?;
    }
    print_result(args.format, &run)?;
    Ok(0)
}

fn write_run(path: &std::path::Path, run: &PipelineRun) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(run).map_err(|e| CliError::Command(e.to_string()))?;
    std::fs::write(path, json)?;
    tracing::info!(target: "forge.pipeline", path = %path.display(), "run record written");
    Ok(())
}

fn print_result(format: OutputFormat, run: &PipelineRun) -> Result<(), CliError> {
    let Some(artifact) = run.artifact() else {
        return Ok(());
    };
    let mut out = std::io::stdout().lock();
    match format {
        OutputFormat::Text => {
            writeln!(out, "{}", artifact.body)?;
            for w in &artifact.warnings {
                eprintln!("warning: {w}");
            }
        }
        OutputFormat::Jsonl => {
            let line = json!({
                "v": 1,
                "event_type": "run.result",
                "run_id": run.id.to_string(),
                "duration_ms": run.duration_ms,
                "artifact": artifact,
            });
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::config::{ProviderBackend, ProviderConfig, StaticProviderConfig};
    use forge_core::error::PipelineError;
    use forge_core::request::ContentType;

    fn args(subject: &str) -> RunArgs {
        RunArgs {
            subject: subject.into(),
            keyword: Some("oil change".into()),
            content_type: ContentType::Guide,
            min_words: Some(10),
            tone: Some("friendly".into()),
            audience: None,
            format: OutputFormat::Jsonl,
            out: None,
            no_progress: true,
        }
    }

    fn static_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.pipeline.foundation = vec!["fixture".into()];
        cfg.pipeline.enhancement = Vec::new();
        cfg.pipeline.meta_provider = None;
        cfg.providers = vec![ProviderConfig {
            name: "fixture".into(),
            timeout_ms: None,
            backend: ProviderBackend::Static(StaticProviderConfig {
                content: "# Oil change basics\n\nChange your oil every 5,000 miles.".into(),
            }),
        }];
        cfg
    }

    #[test]
    fn test_build_request_maps_flags() {
        let req = build_request(&args("Oil change"));
        assert_eq!(req.subject(), "Oil change");
        assert_eq!(req.keyword(), Some("oil change"));
        assert_eq!(req.content_type(), ContentType::Guide);
        assert_eq!(req.options().min_words, 10);
        assert_eq!(req.options().tone.as_deref(), Some("friendly"));
    }

    #[tokio::test]
    async fn test_run_writes_run_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut a = args("Oil change");
        a.out = Some(path.clone());

        let code = run(&a, &static_config()).await.unwrap();
        assert_eq!(code, 0);

        let record: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            record["artifact"]["body"],
            "# Oil change basics\n\nChange your oil every 5,000 miles."
        );
        assert_eq!(record["stages"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_run_without_foundation_maps_to_exit_30() {
        let mut cfg = static_config();
        cfg.pipeline.foundation = vec!["missing".into()];

        let err = run(&args("Oil change"), &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            CliError::Pipeline(PipelineError::NoFoundationOutput { .. })
        ));
        assert_eq!(err.exit_code(), 30);
    }

    #[tokio::test]
    async fn test_empty_subject_maps_to_exit_31() {
        let err = run(&args("   "), &static_config()).await.unwrap_err();
        assert_eq!(err.exit_code(), 31);
    }
}
