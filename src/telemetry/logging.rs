use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Default)]
pub struct LogConfig {
    pub level: String,
}

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Installs the global fmt subscriber. Later calls are no-ops.
pub fn init(config: &LogConfig) -> Result<(), String> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }
    let filter = build_filter(&config.level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| format!("log system init failed: {}", err))?;
    let _ = INSTALLED.set(());
    Ok(())
}

fn build_filter(level: &str) -> Result<EnvFilter, String> {
    let level = level.trim();
    let directive = if level.is_empty() { DEFAULT_LEVEL } else { level };
    EnvFilter::try_new(directive).map_err(|err| format!("bad log level {directive:?}: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_level_falls_back_to_info() {
        let filter = build_filter("  ").expect("filter");
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn directives_are_accepted() {
        assert!(build_filter("tibia_client=debug,warn").is_ok());
        assert!(build_filter("tibia_client=loud").is_err());
    }

    #[test]
    fn init_twice_is_harmless() {
        let config = LogConfig {
            level: "warn".to_string(),
        };
        assert!(init(&config).is_ok());
        assert!(init(&config).is_ok());
    }
}
