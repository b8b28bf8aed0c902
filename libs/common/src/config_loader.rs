//! Configuration loading helper functions
//!
//! Layers configuration sources with figment: struct defaults, then an
//! optional file (format chosen by extension), then prefixed environment
//! variables.

use std::path::Path;

use errors::{LinkError, LinkResult};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

/// Separator for nested keys in environment variables (`LINKSRV_SERVICE__NAME`)
pub const ENV_NESTING_SEPARATOR: &str = "__";

/// Build the layered figment for a config type
///
/// A missing `path` is an error; pass `None` to run on defaults and
/// environment only.
pub fn build_figment<T>(path: Option<&Path>, env_prefix: &str) -> LinkResult<Figment>
where
    T: Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(LinkError::Configuration(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| LinkError::Configuration("Invalid file extension".to_string()))?;

        figment = match extension {
            "json" => figment.merge(Json::file(path)),
            "toml" => figment.merge(Toml::file(path)),
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            _ => {
                return Err(LinkError::Configuration(format!(
                    "Unsupported config format: {}",
                    extension
                )))
            },
        };
        info!("Loading configuration from {}", path.display());
    } else {
        debug!("No config file given, using defaults and environment");
    }

    Ok(figment.merge(Env::prefixed(env_prefix).split(ENV_NESTING_SEPARATOR)))
}

/// Load a config type from defaults, an optional file and the environment
pub fn load_config<T>(path: Option<&Path>, env_prefix: &str) -> LinkResult<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    build_figment::<T>(path, env_prefix)?
        .extract()
        .map_err(|e| LinkError::Configuration(format!("Failed to parse config: {}", e)))
}
