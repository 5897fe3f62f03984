use scia_core::config::{AppConfig, DispatchPolicy};
use scia_llm::providers::presets::{all_preset_names, needs_api_key};
use scia_tools::SalesDataset;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub fn run_doctor(config: &AppConfig) -> bool {
    let checks = vec![
        check_provider(config),
        check_api_key(config),
        check_dataset(config),
        check_web_search(config),
        check_orchestration(config),
        check_retry(config),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
    fail_count == 0
}

fn check_provider(config: &AppConfig) -> CheckResult {
    let provider = config.model.provider.as_str();
    let known = matches!(provider, "anthropic" | "claude" | "openai")
        || all_preset_names().contains(&provider);

    CheckResult {
        label: "Provider".into(),
        ok: known || config.model.base_url.is_some(),
        detail: if known {
            format!("{} ({})", provider, config.model.model_id)
        } else if config.model.base_url.is_some() {
            format!("{} (custom OpenAI-compatible endpoint)", provider)
        } else {
            format!("Unknown provider '{}' and no base_url set", provider)
        },
    }
}

fn check_api_key(config: &AppConfig) -> CheckResult {
    let has_key = config
        .model
        .api_key
        .as_ref()
        .map_or(false, |k| !k.is_empty() && !k.starts_with("${"));
    let provider = &config.model.provider;

    if !needs_api_key(provider) || has_key {
        CheckResult {
            label: "API Key".into(),
            ok: true,
            detail: if has_key {
                "Configured".into()
            } else {
                format!("Not required for {}", provider)
            },
        }
    } else {
        CheckResult {
            label: "API Key".into(),
            ok: false,
            detail: format!("No API key set for provider '{}'", provider),
        }
    }
}

fn check_dataset(config: &AppConfig) -> CheckResult {
    let path = config.data_path();
    match SalesDataset::load(&path) {
        Ok(data) => CheckResult {
            label: "Dataset".into(),
            ok: !data.is_empty(),
            detail: format!(
                "{} ({} rows, {} products, {} suppliers)",
                path.display(),
                data.records().len(),
                data.products().len(),
                data.by_supplier().len()
            ),
        },
        Err(e) => CheckResult {
            label: "Dataset".into(),
            ok: false,
            detail: format!("{}: {}", path.display(), e),
        },
    }
}

fn check_web_search(config: &AppConfig) -> CheckResult {
    match config.web_search {
        Some(ref search) if search.api_key.is_empty() || search.api_key.starts_with("${") => {
            CheckResult {
                label: "Web Search".into(),
                ok: false,
                detail: format!("{}: API key not set", search.provider),
            }
        }
        Some(ref search) => CheckResult {
            label: "Web Search".into(),
            ok: true,
            detail: format!("{} (supplier_analyst)", search.provider),
        },
        None => CheckResult {
            label: "Web Search".into(),
            ok: true,
            detail: "Not configured (supplier_analyst runs without market news)".into(),
        },
    }
}

fn check_orchestration(config: &AppConfig) -> CheckResult {
    let orch = &config.orchestration;
    let timeout = orch
        .run_timeout_secs
        .map(|s| format!("run timeout {}s", s))
        .unwrap_or_else(|| "no run timeout".into());

    CheckResult {
        label: "Dispatch".into(),
        ok: orch.max_concurrency > 0,
        detail: match orch.dispatch {
            DispatchPolicy::Sequential => format!("sequential, {}", timeout),
            DispatchPolicy::Concurrent => {
                format!("concurrent (max {}), {}", orch.max_concurrency, timeout)
            }
        },
    }
}

fn check_retry(config: &AppConfig) -> CheckResult {
    let retry = &config.retry;
    CheckResult {
        label: "Retry".into(),
        ok: retry.max_attempts > 0,
        detail: if retry.free_tier {
            format!(
                "free tier: {} attempts, backoff {}s x 2^n",
                retry.max_attempts, retry.backoff_base_secs
            )
        } else {
            "paid tier: errors propagate immediately".into()
        },
    }
}
