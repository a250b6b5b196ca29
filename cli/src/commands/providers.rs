use forge_core::config::AppConfig;
use forge_core::pipeline::PipelinePlan;
use serde_json::{json, Value};

/// One row per configured provider: backend kind, pool limits and pipeline roles.
pub fn provider_rows(cfg: &AppConfig) -> Vec<Value> {
    let plan = PipelinePlan::from_config(&cfg.pipeline);
    cfg.providers
        .iter()
        .map(|p| {
            let limits = cfg.pool.limits_for(&p.name);
            let mut roles = Vec::new();
            if plan.primary() == Some(p.name.as_str()) {
                roles.push("primary".to_string());
            }
            if plan.foundation().iter().any(|f| f == &p.name) {
                roles.push("foundation".to_string());
            }
            for task in plan.enhancement().iter().filter(|t| t.provider == p.name) {
                roles.push(format!("enhancement:{}", task.name));
            }
            if plan.meta_provider() == Some(p.name.as_str()) {
                roles.push("meta_block".to_string());
            }
            json!({
                "name": p.name,
                "kind": p.backend.kind(),
                "max_concurrency": limits.max_concurrency,
                "failure_threshold": limits.failure_threshold,
                "cooldown_ms": limits.cooldown.as_millis() as u64,
                "roles": roles,
            })
        })
        .collect()
}

pub fn print_providers(cfg: &AppConfig, as_json: bool) -> i32 {
    let rows = provider_rows(cfg);
    if as_json {
        println!("{}", Value::Array(rows));
        return 0;
    }
    if rows.is_empty() {
        println!("no providers configured");
        return 0;
    }
    for row in &rows {
        let roles: Vec<&str> = row["roles"]
            .as_array()
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        println!(
            "{:<16} {:<18} concurrency={} threshold={} cooldown={}ms roles={}",
            row["name"].as_str().unwrap_or_default(),
            row["kind"].as_str().unwrap_or_default(),
            row["max_concurrency"],
            row["failure_threshold"],
            row["cooldown_ms"],
            if roles.is_empty() {
                "-".to_string()
            } else {
                roles.join(",")
            }
        );
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::config::{
        EnhancementConfig, EnhancementKind, ProviderBackend, ProviderConfig,
        ProviderLimitsOverride, StaticProviderConfig,
    };

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.into(),
            timeout_ms: None,
            backend: ProviderBackend::Static(StaticProviderConfig {
                content: String::new(),
            }),
        }
    }

    #[test]
    fn test_provider_rows_report_limits_and_roles() {
        let mut cfg = AppConfig::default();
        cfg.providers = vec![provider("a"), provider("b")];
        cfg.pipeline.foundation = vec!["a".into()];
        cfg.pipeline.primary = Some("a".into());
        cfg.pipeline.enhancement = vec![EnhancementConfig {
            provider: "b".into(),
            kind: EnhancementKind::Metadata,
            name: Some("seo".into()),
        }];
        cfg.pipeline.meta_provider = Some("b".into());
        cfg.pool.providers.insert(
            "b".into(),
            ProviderLimitsOverride {
                max_concurrency: Some(5),
                ..ProviderLimitsOverride::default()
            },
        );

        let rows = provider_rows(&cfg);
        assert_eq!(rows[0]["roles"], json!(["primary", "foundation"]));
        assert_eq!(rows[0]["max_concurrency"], 2);
        assert_eq!(rows[1]["kind"], "static");
        assert_eq!(rows[1]["max_concurrency"], 5);
        assert_eq!(rows[1]["roles"], json!(["enhancement:seo", "meta_block"]));
    }
}
