use crate::entities::registry::{OpponentFilter, OpponentSort, DEFAULT_CREATURE_CAPACITY};
use crate::net::features::{FeatureGate, GameFeature};
use crate::world::minimap::DEFAULT_SECTOR_CAPACITY;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct AppConfig {
    pub capture: PathBuf,
    pub options_path: Option<PathBuf>,
    pub appearances_path: Option<PathBuf>,
    pub client_version: Option<u16>,
    pub build_version: Option<u16>,
    pub log_level: Option<String>,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        Self::from_args_with_env(args, |name| std::env::var(name).ok())
    }

    pub fn from_args_with_env(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        if args.len() < 2 {
            return Err(
                "usage: tibia-client <capture> [options.yaml] [appearances.yaml]".to_string(),
            );
        }

        let capture = Path::new(&args[1]).to_path_buf();
        let options_path = args.get(2).map(PathBuf::from);
        let appearances_path = args.get(3).map(PathBuf::from);
        let env_value = |name: &str| {
            env(name).and_then(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };
        let parse_version = |name: &str| -> Result<Option<u16>, String> {
            env_value(name)
                .map(|value| {
                    value
                        .parse::<u16>()
                        .map_err(|err| format!("{name}={value} is not a version: {err}"))
                })
                .transpose()
        };

        Ok(Self {
            capture,
            options_path,
            appearances_path,
            client_version: parse_version("TIBIA_CLIENT_VERSION")?,
            build_version: parse_version("TIBIA_BUILD_VERSION")?,
            log_level: env_value("TIBIA_LOG_LEVEL"),
        })
    }
}

/// Replay settings read from the options file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientOptions {
    pub client_version: u16,
    pub build_version: u16,
    /// Features negotiated on top of the version defaults.
    pub extra_features: Vec<GameFeature>,
    pub disabled_features: Vec<GameFeature>,
    pub opponent_filter: OpponentFilter,
    pub opponent_sort: OpponentSort,
    pub creature_capacity: usize,
    pub minimap_sectors: usize,
    pub log_level: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_version: 772,
            build_version: 0,
            extra_features: Vec::new(),
            disabled_features: Vec::new(),
            opponent_filter: OpponentFilter::default(),
            opponent_sort: OpponentSort::default(),
            creature_capacity: DEFAULT_CREATURE_CAPACITY,
            minimap_sectors: DEFAULT_SECTOR_CAPACITY,
            log_level: "info".to_string(),
        }
    }
}

impl ClientOptions {
    pub fn from_yaml_str(content: &str) -> Result<Self, String> {
        serde_yaml::from_str(content).map_err(|err| format!("options parse failed: {}", err))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| format!("read {} failed: {}", path.display(), err))?;
        Self::from_yaml_str(&content)
    }

    /// Environment overrides win over the file.
    pub fn apply_overrides(&mut self, config: &AppConfig) {
        if let Some(version) = config.client_version {
            self.client_version = version;
        }
        if let Some(build) = config.build_version {
            self.build_version = build;
        }
        if let Some(level) = &config.log_level {
            self.log_level = level.clone();
        }
    }

    pub fn feature_gate(&self) -> FeatureGate {
        let mut gate = FeatureGate::for_client(self.client_version, self.build_version);
        for feature in &self.extra_features {
            gate.enable(*feature);
        }
        for feature in &self.disabled_features {
            gate.disable(*feature);
        }
        gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::registry::OpponentSortKey;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn positional_arguments_and_env_overrides() {
        let config = AppConfig::from_args_with_env(
            &args(&["tibia-client", "capture.bin", "options.yaml"]),
            |name| match name {
                "TIBIA_CLIENT_VERSION" => Some(" 1098 ".to_string()),
                "TIBIA_LOG_LEVEL" => Some("   ".to_string()),
                _ => None,
            },
        )
        .expect("config");
        assert_eq!(config.capture, PathBuf::from("capture.bin"));
        assert_eq!(config.options_path, Some(PathBuf::from("options.yaml")));
        assert_eq!(config.appearances_path, None);
        assert_eq!(config.client_version, Some(1098));
        assert_eq!(config.build_version, None);
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn missing_capture_is_a_usage_error() {
        let err = AppConfig::from_args_with_env(&args(&["tibia-client"]), |_| None)
            .expect_err("usage");
        assert!(err.starts_with("usage:"));
    }

    #[test]
    fn bad_version_is_rejected() {
        let result = AppConfig::from_args_with_env(&args(&["tibia-client", "c.bin"]), |name| {
            (name == "TIBIA_BUILD_VERSION").then(|| "eleven".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn options_default_missing_fields() {
        let options = ClientOptions::from_yaml_str(
            "client_version: 1041\nextra_features: [creature_icons]\ndisabled_features: [thing_marks]\nopponent_sort:\n  key: hitpoints\n",
        )
        .expect("options");
        assert_eq!(options.creature_capacity, DEFAULT_CREATURE_CAPACITY);
        assert_eq!(options.opponent_sort.key, OpponentSortKey::Hitpoints);

        let gate = options.feature_gate();
        assert!(gate.container_paginated());
        assert!(gate.creature_has_icons());
        assert!(!gate.object_has_mark());
    }

    #[test]
    fn unknown_option_fields_fail() {
        assert!(ClientOptions::from_yaml_str("client_versoin: 1041\n").is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut options = ClientOptions::default();
        let config = AppConfig {
            capture: PathBuf::from("c.bin"),
            options_path: None,
            appearances_path: None,
            client_version: Some(860),
            build_version: None,
            log_level: Some("debug".to_string()),
        };
        options.apply_overrides(&config);
        assert_eq!(options.client_version, 860);
        assert_eq!(options.log_level, "debug");
    }
}
