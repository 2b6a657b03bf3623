//! `contour.toml` loading and command-line overrides

use anyhow::{Context, Result};
use clap::Args;
use contour_transform::LowerOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "contour.toml";

/// Project configuration file
///
/// ```toml
/// [lower]
/// stack_environments = true
/// default_area = "scratch"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lower: LowerOptions,
}

impl Config {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load `path`, or `contour.toml` in the working directory if present
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid configuration in {}", path.display()))
    }
}

/// Lowering flags shared by `lower` and `layout`
#[derive(Args, Debug)]
pub struct OptionArgs {
    /// Configuration file (default: ./contour.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Heap-allocate every record
    #[arg(long)]
    pub no_stack: bool,

    /// Allocation area for general records and closures
    #[arg(long)]
    pub area: Option<String>,

    /// Recompute reference sets from the tree before lowering
    #[arg(long)]
    pub annotate: bool,
}

impl OptionArgs {
    /// Configuration file settings with command-line overrides applied
    pub fn resolve(&self) -> Result<LowerOptions> {
        let mut options = Config::load(self.config.as_deref())?.lower;
        if self.no_stack {
            options.stack_environments = false;
        }
        if let Some(area) = &self.area {
            options.default_area = Some(area.clone());
        }
        log::debug!("lowering options: {:?}", options);
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = Config::parse("[lower]\nstack_environments = false\ndefault_area = \"pool\"\n").unwrap();
        assert!(!config.lower.stack_environments);
        assert_eq!(config.lower.default_area.as_deref(), Some("pool"));
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.lower, LowerOptions::default());
        let config = Config::parse("[lower]\n").unwrap();
        assert!(config.lower.stack_environments);
    }

    #[test]
    fn test_flags_override_file() {
        let args = OptionArgs {
            config: None,
            no_stack: true,
            area: Some("arena".to_string()),
            annotate: false,
        };
        let options = args.resolve().unwrap();
        assert!(!options.stack_environments);
        assert_eq!(options.default_area.as_deref(), Some("arena"));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/contour.toml"))).is_err());
    }
}
