#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use forge_core::config::{AppConfig, EnhancementConfig, EnhancementKind};
use forge_core::error::{ProviderError, ProviderErrorKind};
use forge_core::executor::{OutputRendererPlugin, RenderEvent};
use forge_core::provider::{GenerateOptions, Generation, Provider};
use forge_core::{PipelineController, ProviderPool, ProviderRegistry};

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(ProviderErrorKind),
    Slow(Duration, String),
}

/// Provider double that replays scripted replies and records prompts.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn ok(name: &str, text: &str) -> Arc<Self> {
        Self::new(name, Reply::Text(text.to_string()))
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Self::new(name, Reply::Fail(ProviderErrorKind::Connect))
    }

    pub fn slow(name: &str, delay: Duration, text: &str) -> Arc<Self> {
        Self::new(name, Reply::Slow(delay, text.to_string()))
    }

    /// Queues replies used before falling back to the default.
    pub fn then(self: &Arc<Self>, reply: Reply) -> Arc<Self> {
        self.script.lock().unwrap().push_back(reply);
        self.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Text(text) => Ok(Generation::text(text)),
            Reply::Fail(kind) => Err(ProviderError::new(kind, format!("{} scripted failure", self.name))),
            Reply::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(Generation::text(text))
            }
        }
    }
}

/// Renderer double that keeps every event.
#[derive(Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<RenderEvent>>,
}

impl RecordingRenderer {
    pub fn events(&self) -> Vec<RenderEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(RenderEvent::event_type).collect()
    }
}

impl OutputRendererPlugin for RecordingRenderer {
    fn name(&self) -> &str {
        "recording"
    }

    fn format(&self) -> &str {
        "memory"
    }

    fn render(&self, event: &RenderEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Foundation `[a, b]`, body enhancement `c`, caching off.
pub fn base_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.cache.enabled = false;
    cfg.pipeline.foundation = vec!["a".into(), "b".into()];
    cfg.pipeline.enhancement = vec![EnhancementConfig {
        provider: "c".into(),
        kind: EnhancementKind::Body,
        name: None,
    }];
    cfg
}

pub fn registry(providers: &[Arc<ScriptedProvider>]) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for p in providers {
        registry.register(p.clone());
    }
    registry
}

pub fn controller(cfg: &AppConfig, providers: &[Arc<ScriptedProvider>]) -> PipelineController {
    let pool = ProviderPool::without_sweeper(cfg.pool.clone());
    PipelineController::new(cfg, registry(providers), pool)
}
