mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{base_config, controller, registry, RecordingRenderer, Reply, ScriptedProvider};
use forge_core::config::{EnhancementConfig, EnhancementKind};
use forge_core::error::{PipelineError, ProviderErrorKind};
use forge_core::pipeline::{StageKind, StageStatus, COMPLIANCE_TASK, META_BLOCK_TASK, STRUCTURED_DATA_TASK};
use forge_core::pool::BreakerMode;
use forge_core::{PipelineController, ProviderPool, Request};
use pretty_assertions::assert_eq;

fn oil_change() -> Request {
    Request::new("oil change").with_keyword("engine maintenance")
}

#[tokio::test]
async fn oil_change_scenario_overlays_enhancement_on_surviving_foundation() {
    let a = ScriptedProvider::ok("a", "# Oil change\n\nA's engine maintenance draft.");
    let b = ScriptedProvider::failing("b");
    let c = ScriptedProvider::ok("c", "# Oil change\n\nC's polished engine maintenance text.");
    let ctl = controller(&base_config(), &[a.clone(), b.clone(), c.clone()]);

    let run = ctl.run_pipeline(oil_change()).await.unwrap();

    let foundation = run.stage(StageKind::Foundation).unwrap();
    assert_eq!(foundation.status(), StageStatus::Completed);
    assert!(foundation.outcomes().contains_key("a"));
    assert_eq!(foundation.errors().keys().collect::<Vec<_>>(), vec!["b"]);

    let enhancement = run.stage(StageKind::Enhancement).unwrap();
    assert_eq!(enhancement.outcomes().keys().collect::<Vec<_>>(), vec!["c"]);
    assert!(enhancement.errors().is_empty());

    // C was parameterized by A's output and its body replaced A's.
    assert!(c.prompts()[0].contains("A's engine maintenance draft."));
    let artifact = run.artifact().unwrap();
    assert_eq!(artifact.body, "# Oil change\n\nC's polished engine maintenance text.");
    assert_eq!(artifact.contributors["foundation"], vec!["a"]);
    assert_eq!(artifact.contributors["enhancement"], vec!["c"]);

    // Local finalization ran against the enhanced draft.
    assert_eq!(artifact.structured_data["headline"], "Oil change");
    assert!(artifact.compliance_score.is_some());
    assert_eq!(run.stages.len(), 3);
}

#[tokio::test]
async fn body_equals_selected_foundation_without_body_enhancements() {
    let mut cfg = base_config();
    cfg.pipeline.enhancement.clear();
    cfg.pipeline.primary = Some("b".into());

    let a = ScriptedProvider::ok("a", "from a");
    let b = ScriptedProvider::ok("b", "from b");
    let ctl = controller(&cfg, &[a, b]);

    let run = ctl.run_pipeline(oil_change()).await.unwrap();
    assert_eq!(run.artifact().unwrap().body, "from b");
    assert!(run.stage(StageKind::Enhancement).unwrap().outcomes().is_empty());
}

#[tokio::test]
async fn all_foundation_providers_absent_is_fatal_before_enhancement() {
    let c = ScriptedProvider::ok("c", "enhanced");
    let renderer = Arc::new(RecordingRenderer::default());
    let ctl = controller(&base_config(), &[c.clone()]).with_renderer(renderer.clone());

    let err = ctl.run_pipeline(oil_change()).await.unwrap_err();

    match err {
        PipelineError::NoFoundationOutput { failures, .. } => assert!(failures.is_empty()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(c.calls(), 0);
    assert_eq!(
        renderer.event_types(),
        vec!["run.start", "stage.start", "stage.end", "run.end"]
    );
}

#[tokio::test]
async fn all_foundation_failures_are_reported() {
    let a = ScriptedProvider::failing("a");
    let b = ScriptedProvider::new("b", Reply::Text("   ".into()));
    let c = ScriptedProvider::ok("c", "enhanced");
    let ctl = controller(&base_config(), &[a, b, c.clone()]);

    let err = ctl.run_pipeline(oil_change()).await.unwrap_err();
    let PipelineError::NoFoundationOutput { failures, .. } = err else {
        panic!("expected NoFoundationOutput");
    };
    assert_eq!(failures.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(failures["b"], "empty output");
    assert_eq!(c.calls(), 0);
}

#[tokio::test]
async fn enhancement_and_finalization_failures_still_produce_artifact() {
    let mut cfg = base_config();
    cfg.pipeline.meta_provider = Some("m".into());
    cfg.pipeline.enhancement.push(EnhancementConfig {
        provider: "seo".into(),
        kind: EnhancementKind::Metadata,
        name: None,
    });

    let a = ScriptedProvider::ok("a", "foundation body");
    let c = ScriptedProvider::failing("c");
    let seo = ScriptedProvider::new("seo", Reply::Fail(ProviderErrorKind::Quota));
    let m = ScriptedProvider::failing("m");
    let ctl = controller(&cfg, &[a, c, seo, m.clone()]);

    let run = ctl.run_pipeline(oil_change()).await.unwrap();
    let artifact = run.artifact().unwrap();

    assert_eq!(artifact.body, "foundation body");
    assert!(artifact.metadata.is_empty());
    assert!(artifact.meta.is_empty());
    assert!(artifact.warnings.is_empty());
    assert_eq!(artifact.contributors["enhancement"], Vec::<String>::new());

    let enhancement = run.stage(StageKind::Enhancement).unwrap();
    assert_eq!(enhancement.errors().keys().collect::<Vec<_>>(), vec!["c", "seo"]);

    let finalization = run.stage(StageKind::Finalization).unwrap();
    assert!(finalization.errors().contains_key(META_BLOCK_TASK));
    assert!(finalization.outcomes().contains_key(STRUCTURED_DATA_TASK));
    assert!(finalization.outcomes().contains_key(COMPLIANCE_TASK));
    assert_eq!(m.calls(), 1);
}

#[tokio::test]
async fn metadata_and_meta_block_are_merged_into_their_fields() {
    let mut cfg = base_config();
    cfg.pipeline.meta_provider = Some("m".into());
    cfg.pipeline.enhancement = vec![EnhancementConfig {
        provider: "seo".into(),
        kind: EnhancementKind::Metadata,
        name: None,
    }];

    let a = ScriptedProvider::ok("a", "# Heading\n\nbody");
    let seo = ScriptedProvider::ok("seo", r#"{"title": "Oil Change 101", "tags": ["car"]}"#);
    let m = ScriptedProvider::ok(
        "m",
        "```json\n{\"meta_title\": \"Oil\", \"meta_description\": \"How\"}\n```",
    );
    let ctl = controller(&cfg, &[a, seo, m]);

    let run = ctl.run_pipeline(oil_change()).await.unwrap();
    let artifact = run.artifact().unwrap();

    assert_eq!(artifact.body, "# Heading\n\nbody");
    assert_eq!(artifact.metadata["title"], "Oil Change 101");
    assert_eq!(artifact.structured_data["headline"], "Oil Change 101");
    assert_eq!(artifact.meta["meta_title"], "Oil");
    assert_eq!(
        artifact.contributors["finalization"],
        vec![COMPLIANCE_TASK, META_BLOCK_TASK, STRUCTURED_DATA_TASK]
    );
}

#[tokio::test]
async fn reruns_with_same_successes_are_deterministic() {
    let mut cfg = base_config();
    cfg.pipeline.enhancement = vec![
        EnhancementConfig {
            provider: "c".into(),
            kind: EnhancementKind::Body,
            name: None,
        },
        EnhancementConfig {
            provider: "d".into(),
            kind: EnhancementKind::Body,
            name: None,
        },
    ];

    let mut bodies = Vec::new();
    for c_delay in [Duration::from_millis(1), Duration::from_millis(30)] {
        let a = ScriptedProvider::slow("a", Duration::from_millis(20), "from a");
        let b = ScriptedProvider::slow("b", Duration::from_millis(1), "from b");
        let c = ScriptedProvider::slow("c", c_delay, "from c");
        let d = ScriptedProvider::slow("d", Duration::from_millis(10), "from d");
        let ctl = controller(&cfg, &[a, b, c.clone(), d]);

        let run = ctl.run_pipeline(oil_change()).await.unwrap();
        assert!(c.prompts()[0].contains("from a"));
        bodies.push(run.artifact().unwrap().body.clone());
    }
    assert_eq!(bodies, vec!["from d", "from d"]);
}

#[tokio::test]
async fn invalid_request_starts_no_stage() {
    let a = ScriptedProvider::ok("a", "x");
    let ctl = controller(&base_config(), &[a.clone()]);

    let err = ctl.run_pipeline(Request::new("  ")).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
    assert_eq!(a.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn timed_out_task_fails_alone_and_releases_its_slot() {
    let mut cfg = base_config();
    cfg.executor.task_timeout_ms = 100;

    let a = ScriptedProvider::slow("a", Duration::from_secs(10), "too late");
    let b = ScriptedProvider::ok("b", "from b");
    let ctl = controller(&cfg, &[a, b]);

    let run = ctl.run_pipeline(oil_change()).await.unwrap();
    let foundation = run.stage(StageKind::Foundation).unwrap();
    assert_eq!(foundation.errors()["a"].error.kind(), "task_timeout");
    assert_eq!(run.artifact().unwrap().body, "from b");

    let snap = ctl.pool().provider_snapshot("a").unwrap();
    assert_eq!(snap.active, 0);
    assert_eq!(snap.consecutive_failures, 1);
}

#[tokio::test]
async fn breaker_state_outlives_runs() {
    let mut cfg = base_config();
    cfg.pool.failure_threshold = 2;
    cfg.pool.cooldown_ms = 60_000;

    let a = ScriptedProvider::failing("a");
    let b = ScriptedProvider::ok("b", "from b");
    let ctl = controller(&cfg, &[a.clone(), b]);

    for _ in 0..2 {
        ctl.run_pipeline(oil_change()).await.unwrap();
    }
    assert_eq!(
        ctl.pool().provider_snapshot("a").unwrap().mode,
        BreakerMode::Open
    );

    let run = ctl.run_pipeline(oil_change()).await.unwrap();
    let foundation = run.stage(StageKind::Foundation).unwrap();
    assert_eq!(foundation.errors()["a"].error.kind(), "provider_unavailable");
    assert_eq!(a.calls(), 2);
}

#[tokio::test]
async fn shared_pool_serves_independent_controllers() {
    let cfg = base_config();
    let pool = ProviderPool::new(cfg.pool.clone());
    let a = ScriptedProvider::ok("a", "from a");

    let first = PipelineController::new(&cfg, registry(&[a.clone()]), pool.clone());
    let second = PipelineController::new(&cfg, registry(&[a.clone()]), pool.clone());
    let (r1, r2) = tokio::join!(
        first.run_pipeline(oil_change()),
        second.run_pipeline(Request::new("brake pads")),
    );

    assert_eq!(r1.unwrap().artifact().unwrap().body, "from a");
    assert_eq!(r2.unwrap().artifact().unwrap().body, "from a");
    assert_eq!(a.calls(), 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn cached_foundation_is_reused_across_runs() {
    let mut cfg = base_config();
    cfg.cache.enabled = true;

    let a = ScriptedProvider::ok("a", "from a").then(Reply::Text("first".into()));
    let ctl = controller(&cfg, &[a.clone()]);

    let first = ctl.run_pipeline(oil_change()).await.unwrap();
    let second = ctl.run_pipeline(oil_change()).await.unwrap();

    assert_eq!(a.calls(), 1);
    assert_eq!(first.artifact().unwrap().body, "first");
    assert_eq!(second.artifact().unwrap().body, "first");

    // A different request is a different key.
    ctl.run_pipeline(Request::new("brake pads")).await.unwrap();
    assert_eq!(a.calls(), 2);
}

#[tokio::test]
async fn render_events_follow_stage_order() {
    let a = ScriptedProvider::ok("a", "from a");
    let c = ScriptedProvider::ok("c", "from c");
    let renderer = Arc::new(RecordingRenderer::default());
    let ctl = controller(&base_config(), &[a, c]).with_renderer(renderer.clone());

    ctl.run_pipeline(oil_change()).await.unwrap();

    assert_eq!(
        renderer.event_types(),
        vec![
            "run.start",
            "stage.start",
            "task.complete",
            "stage.end",
            "stage.start",
            "task.complete",
            "stage.end",
            "stage.start",
            "task.complete",
            "task.complete",
            "stage.end",
            "run.end",
        ]
    );
}
