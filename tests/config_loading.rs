use std::io::Write;

use scia_core::config::{AppConfig, DispatchPolicy};
use scia_core::error::SciaError;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write toml");
    tmp
}

#[test]
fn test_load_full_config_from_file() {
    let tmp = write_config(
        r#"
[model]
provider = "anthropic"
model_id = "claude-sonnet-4-20250514"
api_key = "sk-test-key"
max_tokens = 2048
temperature = 0.2

[orchestration]
dispatch = "concurrent"
max_concurrency = 2
run_timeout_secs = 120

[retry]
free_tier = true
max_attempts = 4
backoff_base_secs = 10

[specialists]
data_path = "/srv/scia/sales.csv"
max_turns = 5

[web_search]
provider = "tavily"
api_key = "tvly-test"
"#,
    );

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "anthropic");
    assert_eq!(config.model.model_id, "claude-sonnet-4-20250514");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 2048);

    assert_eq!(config.orchestration.dispatch, DispatchPolicy::Concurrent);
    assert_eq!(config.orchestration.max_concurrency, 2);
    assert_eq!(config.orchestration.run_timeout_secs, Some(120));

    assert!(config.retry.free_tier);
    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.retry.backoff_base_secs, 10);

    assert_eq!(config.data_path().to_str(), Some("/srv/scia/sales.csv"));
    assert_eq!(config.specialists.max_turns, 5);

    let search = config.web_search.expect("web_search present");
    assert_eq!(search.provider, "tavily");
    assert_eq!(search.api_key, "tvly-test");
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SCIA_TEST_API_KEY", "expanded-key-value");

    let tmp = write_config(
        r#"
[model]
provider = "groq"
model_id = "llama-3.3-70b-versatile"
api_key = "${SCIA_TEST_API_KEY}"
"#,
    );
    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key.as_deref(), Some("expanded-key-value"));

    std::env::remove_var("SCIA_TEST_API_KEY");
}

#[test]
fn test_missing_file_is_config_not_found() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/scia.toml")).unwrap_err();
    assert!(matches!(err, SciaError::ConfigNotFound(_)));
}

#[test]
fn test_invalid_values_are_rejected_on_load() {
    let tmp = write_config(
        r#"
[model]
model_id = "llama3.1"

[retry]
max_attempts = 0
"#,
    );
    assert!(matches!(AppConfig::load(tmp.path()), Err(SciaError::Config(_))));
}

#[test]
fn test_unknown_dispatch_policy_is_a_parse_error() {
    let tmp = write_config(
        r#"
[model]
model_id = "llama3.1"

[orchestration]
dispatch = "parallel"
"#,
    );
    assert!(matches!(AppConfig::load(tmp.path()), Err(SciaError::Config(_))));
}

#[test]
fn test_shipped_config_parses() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scia.toml");
    let config = AppConfig::load(&path).expect("load shipped config");
    assert_eq!(config.orchestration.dispatch, DispatchPolicy::Sequential);
    assert!(config.retry.free_tier);
    assert!(config.web_search.is_none());
}
