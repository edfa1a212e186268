//! Configuration loading helpers
//!
//! Services describe their configuration as a `serde` struct; this module
//! layers a configuration file with prefixed environment variables.

use std::path::Path;

use errors::{config_error, ServiceError, ServiceResult};
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// Build the figment for a configuration file
///
/// The file format is chosen from the extension (`toml`, `yaml`/`yml`, `json`).
pub fn file_figment(path: &Path) -> ServiceResult<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| config_error!("Config file must have an extension: {}", path.display()))?;

    let figment = match extension {
        "toml" => Figment::new().merge(Toml::file(path)),
        "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
        "json" => Figment::new().merge(Json::file(path)),
        _ => return Err(config_error!("Unsupported config file format: {}", extension)),
    };

    Ok(figment)
}

/// Load configuration from a file, overlaid with `{PREFIX}_*` environment variables
///
/// Nested keys in environment variables are separated by a double underscore,
/// e.g. `CANSRV_SERVICE__STRICT_PAYLOAD=true`.
pub fn load_config_from_file<T, P>(path: P, env_prefix: Option<&str>) -> ServiceResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(ServiceError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let mut figment = file_figment(path)?;
    if let Some(prefix) = env_prefix {
        debug!("Applying environment overrides with prefix {}_", prefix);
        figment = figment.merge(Env::prefixed(&format!("{}_", prefix)).split("__"));
    }

    let config = figment.extract().map_err(|e| {
        ServiceError::Configuration(format!(
            "Failed to load configuration from {}: {}",
            path.display(),
            e
        ))
    })?;

    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestConfig {
        name: String,
        #[serde(default)]
        port: u16,
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_yaml_and_toml() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = write_file(&dir, "svc.yaml", "name: yaml-svc\nport: 7\n");
        let config: TestConfig = load_config_from_file(&yaml, None).unwrap();
        assert_eq!(
            config,
            TestConfig {
                name: "yaml-svc".into(),
                port: 7
            }
        );

        let toml = write_file(&dir, "svc.toml", "name = \"toml-svc\"\n");
        let config: TestConfig = load_config_from_file(&toml, None).unwrap();
        assert_eq!(config.name, "toml-svc");
        assert_eq!(config.port, 0);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result: ServiceResult<TestConfig> =
            load_config_from_file("/nonexistent/cansrv.yaml", None);
        assert!(matches!(result, Err(ServiceError::Configuration(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "svc.ini", "name=x");
        let result: ServiceResult<TestConfig> = load_config_from_file(&path, None);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Unsupported config file format"));
    }

    #[test]
    fn test_invalid_content_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.yaml", "port: not-a-number\n");
        let result: ServiceResult<TestConfig> = load_config_from_file(&path, None);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("bad.yaml"));
    }
}
