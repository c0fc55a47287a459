//! Configuration management for the CLI
//!
//! Sources, lowest precedence first: built-in defaults, a TOML file
//! (`--config`, else `~/.config/dsb/config.toml` when present), then
//! `DSB_`-prefixed environment variables. Command line flags are applied
//! on top by the commands themselves.

use anyhow::{anyhow, Context, Result};
use dataset_lib::builder::{DEFAULT_VM_NAME_FILTER, ENERGY_PROFILE, VM_POWER_PROFILE};
use dataset_lib::split::{DEFAULT_SEED, DEFAULT_TEST_SIZE};
use dataset_lib::{BucketWidth, DatasetProfile, SplitOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Feature and target overrides for one dataset profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub features: Option<Vec<String>>,
    pub target: Option<String>,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Alignment bucket width, e.g. `1min` or `30s`
    pub bucket: BucketWidth,
    /// Fraction of rows held out for testing
    pub test_size: f64,
    pub random_seed: u64,
    /// Substring VM names must contain for the VM power dataset; empty
    /// disables the filter
    pub vm_name_filter: String,
    pub energy: ProfileConfig,
    pub vm_power: ProfileConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket: BucketWidth::default(),
            test_size: DEFAULT_TEST_SIZE,
            random_seed: DEFAULT_SEED,
            vm_name_filter: DEFAULT_VM_NAME_FILTER.to_string(),
            energy: ProfileConfig::default(),
            vm_power: ProfileConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from file and environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        match explicit {
            Some(path) => {
                builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
            }
            None => {
                if let Some(path) = Self::default_path() {
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("DSB")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// `~/.config/dsb/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("dsb").join("config.toml"))
    }

    pub fn vm_filter(&self) -> Option<&str> {
        let needle = self.vm_name_filter.trim();
        (!needle.is_empty()).then_some(needle)
    }

    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            test_size: self.test_size,
            seed: self.random_seed,
        }
    }

    /// The named profile with configured feature and target overrides and
    /// the configured VM name filter
    pub fn profile(&self, name: &str) -> Result<DatasetProfile> {
        self.profile_with_filter(name, self.vm_filter())
    }

    /// Like [`PipelineConfig::profile`] with an explicit VM name filter
    pub fn profile_with_filter(
        &self,
        name: &str,
        vm_filter: Option<&str>,
    ) -> Result<DatasetProfile> {
        let mut profile = DatasetProfile::by_name(name, vm_filter).ok_or_else(|| {
            anyhow!(
                "unknown profile `{}`, expected `{}` or `{}`",
                name,
                ENERGY_PROFILE,
                VM_POWER_PROFILE
            )
        })?;
        let overrides = if profile.name == ENERGY_PROFILE {
            &self.energy
        } else {
            &self.vm_power
        };
        if let Some(features) = &overrides.features {
            profile = profile.with_features(features.clone());
        }
        if let Some(target) = &overrides.target {
            profile = profile.with_target(target.clone());
        }
        profile.validate()?;
        Ok(profile)
    }
}
