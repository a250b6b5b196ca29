use std::collections::BTreeSet;

use crate::config::{EnhancementKind, PipelineConfig};

pub const STRUCTURED_DATA_TASK: &str = "structured_data";
pub const COMPLIANCE_TASK: &str = "compliance";
pub const META_BLOCK_TASK: &str = "meta_block";

/// Source name recorded for tasks computed in-process.
pub const LOCAL_SOURCE: &str = "local";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancementTask {
    pub name: String,
    pub provider: String,
    pub kind: EnhancementKind,
}

/// Declared precedence for selection and merge. Built once from config.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelinePlan {
    foundation: Vec<String>,
    primary: Option<String>,
    enhancement: Vec<EnhancementTask>,
    meta_provider: Option<String>,
}

impl PipelinePlan {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        let mut seen = BTreeSet::new();
        let mut foundation = Vec::with_capacity(cfg.foundation.len());
        for name in &cfg.foundation {
            if seen.insert(name.as_str()) {
                foundation.push(name.clone());
            } else {
                tracing::warn!(target: "forge.pipeline", provider = %name, "duplicate foundation provider ignored");
            }
        }

        let mut seen = BTreeSet::new();
        let mut enhancement = Vec::with_capacity(cfg.enhancement.len());
        for e in &cfg.enhancement {
            let name = e.name.clone().unwrap_or_else(|| e.provider.clone());
            if !seen.insert(name.clone()) {
                tracing::warn!(target: "forge.pipeline", task = %name, "duplicate enhancement task ignored");
                continue;
            }
            enhancement.push(EnhancementTask {
                name,
                provider: e.provider.clone(),
                kind: e.kind,
            });
        }

        Self {
            foundation,
            primary: cfg.primary.clone(),
            enhancement,
            meta_provider: cfg.meta_provider.clone(),
        }
    }

    pub fn foundation(&self) -> &[String] {
        &self.foundation
    }

    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    pub fn enhancement(&self) -> &[EnhancementTask] {
        &self.enhancement
    }

    pub fn meta_provider(&self) -> Option<&str> {
        self.meta_provider.as_deref()
    }

    /// Foundation candidates in selection order: `primary`, then declared order.
    pub fn foundation_precedence(&self) -> impl Iterator<Item = &str> {
        let primary = self.primary.as_deref();
        primary
            .into_iter()
            .chain(self.foundation.iter().map(String::as_str).filter(move |n| Some(*n) != primary))
    }
}
