#![forbid(unsafe_code)]

//! Runtime settings layered as CLI override > process env > `.env` file >
//! built-in default.

use crate::engine::ytdlp::DEFAULT_BINARY;
use crate::resolver::DEFAULT_PLATFORM_DOMAIN;
use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DOWNLOAD_ROOT: &str = "./downloads";
pub const DEFAULT_MAX_ITEMS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub download_root: PathBuf,
    pub cookies_file: Option<PathBuf>,
    pub max_items: usize,
    pub engine_binary: PathBuf,
    pub platform_domain: String,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub download_root: Option<PathBuf>,
    pub cookies_file: Option<PathBuf>,
    pub max_items: Option<usize>,
    pub platform_domain: Option<String>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> RuntimeSettings {
    build_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let download_root = overrides
        .download_root
        .or_else(|| lookup_value("DOWNLOAD_ROOT", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_ROOT));
    let cookies_file = overrides
        .cookies_file
        .or_else(|| lookup_value("COOKIES_FILE", file_vars, &env_lookup).map(PathBuf::from));
    let max_items = overrides
        .max_items
        .or_else(|| {
            lookup_value("MAX_ITEMS", file_vars, &env_lookup)
                .and_then(|value| value.parse::<usize>().ok())
        })
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_ITEMS);
    let engine_binary = lookup_value("YT_DLP_BIN", file_vars, &env_lookup)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY));
    let platform_domain = overrides
        .platform_domain
        .and_then(non_blank)
        .or_else(|| lookup_value("PLATFORM_DOMAIN", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_PLATFORM_DOMAIN.to_string());

    RuntimeSettings {
        download_root,
        cookies_file,
        max_items,
        engine_binary,
        platform_domain,
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(non_blank)
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned().and_then(non_blank))
}

/// Reads `KEY=value` pairs. A missing file is an empty map; comments and
/// malformed lines are skipped.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
