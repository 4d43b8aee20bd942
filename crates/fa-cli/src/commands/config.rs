//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use fa_core::config::{self, ClientConfig};

fn resolve(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Get a config value by dotted key, e.g. `broker.host`.
/// Keys absent from the file fall back to their default values.
pub fn config_get(config_path: Option<&Path>, key: &str) -> Result<bool> {
    let path = resolve(config_path);
    let effective: ClientConfig = if path.exists() {
        config::load_config(&path)?
    } else {
        ClientConfig::default()
    };
    let mut current = toml::Value::try_from(&effective).context("Failed to serialize config")?;
    for part in key.split('.') {
        match current {
            toml::Value::Table(mut t) => match t.remove(part) {
                Some(v) => current = v,
                None => {
                    print_error(&format!("Key not found: {}", key));
                    return Ok(false);
                }
            },
            _ => {
                print_error(&format!("Key not found: {}", key));
                return Ok(false);
            }
        }
    }

    match current {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Table(_) => println!("{}", toml::to_string_pretty(&current)?),
        other => println!("{}", other),
    }
    Ok(true)
}

/// Set a config value by dotted key.
///
/// The edited file must still parse and validate as a client config,
/// otherwise nothing is written.
pub fn config_set(config_path: Option<&Path>, key: &str, value: &str) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_info("Creating default configuration...");
        config_init(Some(&path), false)?;
    }

    let mut table = read_table(&path)?;

    let parts: Vec<&str> = key.split('.').collect();
    let (last_key, parents) = parts
        .split_last()
        .filter(|(last, _)| !last.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Invalid key: {:?}", key))?;

    let mut current = &mut table;
    for part in parents {
        current = current
            .entry(part.to_string())
            .or_insert(toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("Cannot navigate to key: {}", key))?;
    }
    current.insert(last_key.to_string(), parse_value(value));

    let candidate: ClientConfig = toml::Value::Table(table.clone())
        .try_into()
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;
    candidate
        .validate()
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;

    let new_content = toml::to_string_pretty(&table)?;
    std::fs::write(&path, new_content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Set {} = {}", key, value));
    Ok(())
}

fn parse_value(value: &str) -> toml::Value {
    if value == "true" {
        toml::Value::Boolean(true)
    } else if value == "false" {
        toml::Value::Boolean(false)
    } else if let Ok(i) = value.parse::<i64>() {
        toml::Value::Integer(i)
    } else {
        toml::Value::String(value.to_string())
    }
}

/// Show the effective configuration
pub fn config_show(config_path: Option<&Path>) -> Result<()> {
    let path = resolve(config_path);

    let effective = if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
        config::load_client_config(Some(&path))?
    } else {
        print_warning(&format!("No configuration file found at {:?}, showing defaults", path));
        print_info("Run 'face-analysis config init' to create one");
        ClientConfig::default()
    };
    println!();
    println!("{}", toml::to_string_pretty(&effective)?);

    Ok(())
}

/// Write the default configuration
pub fn config_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = resolve(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&path, &ClientConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}

/// Print the config file path
pub fn config_path(config_path: Option<&Path>) {
    println!("{}", resolve(config_path).display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        config_set(Some(&path), "broker.host", "mqtt.example.com").unwrap();
        config_set(Some(&path), "stage_timeout", "45").unwrap();

        let config = config::load_client_config(Some(&path)).unwrap();
        assert_eq!(config.broker.host, "mqtt.example.com");
        assert_eq!(config.stage_timeout, std::time::Duration::from_secs(45));
        assert_eq!(config.language, "zh");
    }

    #[test]
    fn test_set_rejects_invalid_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        config_init(Some(&path), false).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        assert!(config_set(Some(&path), "broker.port", "not-a-port").is_err());
        assert!(config_set(Some(&path), "topic_namespace", "a/+/b").is_err());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_get_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(config_get(Some(&path), "broker.port").unwrap());
        assert!(!config_get(Some(&path), "broker.nope").unwrap());
    }

    #[test]
    fn test_init_does_not_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "event_id = \"fair\"\n").unwrap();

        config_init(Some(&path), false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "event_id = \"fair\"\n");

        config_init(Some(&path), true).unwrap();
        let config = config::load_client_config(Some(&path)).unwrap();
        assert_eq!(config.event_id, "default");
    }
}
