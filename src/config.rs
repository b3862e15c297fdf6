use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const TASK_PLACEHOLDER: &str = "{task}";

#[derive(Debug, Deserialize)]
pub(crate) struct Config {
    pub(crate) base_dir: PathBuf,
    #[serde(default)]
    pub(crate) log_path: Option<PathBuf>,
    pub(crate) wiki: WikiConfig,
    pub(crate) mail: MailConfig,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WikiConfig {
    pub(crate) api_url: String,
    pub(crate) username: String,
    #[serde(default = "default_global_status_page")]
    pub(crate) global_status_page: String,
    #[serde(default = "default_task_status_page")]
    pub(crate) task_status_page: String,
    #[serde(default = "default_timeout_secs")]
    pub(crate) timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MailConfig {
    pub(crate) command: String,
    pub(crate) fallback_log: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub(crate) timeout_secs: u64,
    #[serde(default)]
    pub(crate) to: Vec<String>,
    #[serde(default)]
    pub(crate) cc: Vec<String>,
    #[serde(default)]
    pub(crate) bcc: Vec<String>,
}

fn default_global_status_page() -> String {
    "Benutzer:JogoBot/active".to_string()
}

fn default_task_status_page() -> String {
    format!("Benutzer:JogoBot/{}/active.js", TASK_PLACEHOLDER)
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug)]
pub(crate) struct LoadedConfig {
    pub(crate) config: Config,
    pub(crate) warnings: Vec<String>,
}

pub(crate) fn load_config(path: &Path) -> Result<LoadedConfig, String> {
    let content = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read config {}: {}", path.display(), err))?;
    let value: Value = serde_yaml::from_str(&content)
        .map_err(|err| format!("Failed to parse config {}: {}", path.display(), err))?;
    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        _ => {
            return Err(format!(
                "Config {} must be a YAML mapping",
                path.display()
            ))
        }
    };

    let warnings = unknown_top_level_keys(&mapping);
    emit_unknown_key_warnings(&warnings);
    validate_required_fields(&mapping)?;

    let config: Config = serde_path_to_error::deserialize(Value::Mapping(mapping))
        .map_err(|err| format!("Failed to parse config {}: {}", path.display(), err))?;
    validate_config(&config)?;

    Ok(LoadedConfig { config, warnings })
}

/// Checks that survive deserialization: placeholders, timeouts and recipients.
pub(crate) fn validate_config(config: &Config) -> Result<(), String> {
    if !config.wiki.task_status_page.contains(TASK_PLACEHOLDER) {
        return Err(format!(
            "wiki.task_status_page must contain the {} placeholder",
            TASK_PLACEHOLDER
        ));
    }
    if config.wiki.global_status_page.trim().is_empty() {
        return Err("wiki.global_status_page must not be empty".to_string());
    }
    if config.wiki.timeout_secs == 0 {
        return Err("wiki.timeout_secs must be a positive integer (got 0)".to_string());
    }
    if config.mail.timeout_secs == 0 {
        return Err("mail.timeout_secs must be a positive integer (got 0)".to_string());
    }

    let recipients = [
        ("mail.to", &config.mail.to),
        ("mail.cc", &config.mail.cc),
        ("mail.bcc", &config.mail.bcc),
    ];
    for (label, list) in recipients {
        if list.iter().any(|address| address.trim().is_empty()) {
            return Err(format!("{} must not contain empty addresses", label));
        }
    }
    if recipients.iter().all(|(_, list)| list.is_empty()) {
        return Err("mail needs at least one recipient in to, cc or bcc".to_string());
    }

    Ok(())
}

fn emit_unknown_key_warnings(keys: &[String]) {
    for key in keys {
        eprintln!("Warning: unknown config key: {}", key);
    }
}

fn unknown_top_level_keys(mapping: &Mapping) -> Vec<String> {
    let allowed = ["base_dir", "log_path", "wiki", "mail"];

    mapping
        .keys()
        .filter_map(|key| key.as_str().map(|value| value.to_string()))
        .filter(|key| !allowed.contains(&key.as_str()))
        .collect()
}

fn validate_required_fields(mapping: &Mapping) -> Result<(), String> {
    require_non_empty_string(mapping, "base_dir", "base_dir")?;

    let wiki = require_mapping(mapping, "wiki", "wiki")?;
    require_non_empty_string(wiki, "api_url", "wiki.api_url")?;
    require_non_empty_string(wiki, "username", "wiki.username")?;

    let mail = require_mapping(mapping, "mail", "mail")?;
    require_non_empty_string(mail, "command", "mail.command")?;
    require_non_empty_string(mail, "fallback_log", "mail.fallback_log")?;

    Ok(())
}

fn require_mapping<'a>(
    mapping: &'a Mapping,
    key_name: &str,
    label: &str,
) -> Result<&'a Mapping, String> {
    let key = Value::String(key_name.to_string());
    match mapping.get(&key) {
        None => Err(format!("Missing required config value: {}", label)),
        Some(Value::Null) => Err(format!("{} must not be null", label)),
        Some(Value::Mapping(value)) => Ok(value),
        Some(_) => Err(format!("{} must be a mapping", label)),
    }
}

fn require_non_empty_string(mapping: &Mapping, key_name: &str, label: &str) -> Result<(), String> {
    let key = Value::String(key_name.to_string());
    match mapping.get(&key) {
        None => Err(format!("Missing required config value: {}", label)),
        Some(Value::Null) => Err(format!("{} must not be null", label)),
        Some(Value::String(value)) => {
            if value.trim().is_empty() {
                Err(format!("{} must not be empty", label))
            } else {
                Ok(())
            }
        }
        Some(_) => Err(format!("{} must be a string", label)),
    }
}
