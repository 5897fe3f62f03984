use std::collections::HashMap;

use scia_core::config::ModelConfig;

/// A named provider preset for OpenAI-compatible APIs.
pub struct ProviderPreset {
    pub default_base_url: &'static str,
    pub needs_api_key: bool,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "ollama" => Some(ProviderPreset {
            default_base_url: "http://localhost:11434/v1/chat/completions",
            needs_api_key: false,
            extra_headers: &[],
        }),
        "groq" => Some(ProviderPreset {
            default_base_url: "https://api.groq.com/openai/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        "openrouter" => Some(ProviderPreset {
            default_base_url: "https://openrouter.ai/api/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[("X-Title", "scia")],
        }),
        "together" => Some(ProviderPreset {
            default_base_url: "https://api.together.xyz/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        "mistral" => Some(ProviderPreset {
            default_base_url: "https://api.mistral.ai/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        "deepseek" => Some(ProviderPreset {
            default_base_url: "https://api.deepseek.com/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        _ => None,
    }
}

/// Build extra headers from a preset + user config overrides.
pub fn build_extra_headers(
    preset: &ProviderPreset,
    user_headers: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = preset
        .extra_headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    // User values win
    for (k, v) in user_headers {
        headers.insert(k.clone(), v.clone());
    }

    headers
}

/// Fill in the preset's base URL and headers where the user left them unset.
///
/// Providers without a preset (`openai`, `anthropic`) come back unchanged.
pub fn apply_preset(config: &ModelConfig) -> ModelConfig {
    let mut resolved = config.clone();
    if let Some(preset) = get_preset(&config.provider) {
        if resolved.base_url.is_none() {
            resolved.base_url = Some(preset.default_base_url.to_string());
        }
        resolved.extra_headers = build_extra_headers(&preset, &config.extra_headers);
    }
    resolved
}

/// Whether the configured provider is expected to carry an API key.
pub fn needs_api_key(provider: &str) -> bool {
    match get_preset(provider) {
        Some(preset) => preset.needs_api_key,
        None => true,
    }
}

/// List all known preset provider names.
pub fn all_preset_names() -> &'static [&'static str] {
    &["ollama", "groq", "openrouter", "together", "mistral", "deepseek"]
}
