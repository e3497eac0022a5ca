use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use subflags_core::constants::{
    FLAG_ALLOW_UNKNOWN_FLAGS, FLAG_CONFIG, FLAG_CONFIG_UPDATE_INTERVAL, FLAG_DUMPFLAGS,
};
use subflags_core::{FlagSet, FlagSetError, Var};

use crate::file::{ApplyOptions, ConfigError, ConfigFile, Scope};

/// Handles to the four flags the config loader owns.
#[derive(Debug, Clone)]
pub struct ReservedFlags {
    pub allow_unknown_flags: Var<bool>,
    pub config: Var<String>,
    pub config_update_interval: Var<Duration>,
    pub dumpflags: Var<bool>,
}

impl ReservedFlags {
    /// Defines the reserved flags in the global set.
    ///
    /// Call this before creating subcommands so that every subcommand picks them up.
    pub fn declare(globals: &mut FlagSet) -> Result<Self, FlagSetError> {
        Ok(Self {
            allow_unknown_flags: globals.define(
                FLAG_ALLOW_UNKNOWN_FLAGS,
                false,
                "Don't fail if the config file contains unknown flags",
            )?,
            config: globals.define(
                FLAG_CONFIG,
                String::new(),
                "Path to a TOML config file with flag values",
            )?,
            config_update_interval: globals.define(
                FLAG_CONFIG_UPDATE_INTERVAL,
                Duration::ZERO,
                "Update interval for re-reading the config file. Zero disables re-reading",
            )?,
            dumpflags: globals.define(
                FLAG_DUMPFLAGS,
                false,
                "Print all flag values in config file syntax and exit",
            )?,
        })
    }

    /// The `--config` path, if one was given.
    pub fn config_path(&self) -> Option<PathBuf> {
        let path = self.config.get();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }

    /// Options for [`crate::ConfigFile::apply`] that keep the command-line values in `skip`.
    pub fn apply_options<I>(&self, skip: I) -> ApplyOptions
    where
        I: IntoIterator<Item = String>,
    {
        ApplyOptions {
            allow_unknown: self.allow_unknown_flags.get(),
            skip: skip.into_iter().collect(),
        }
    }

    /// Like [`ReservedFlags::apply_options`], but honours `allowUnknownFlags` from `file`.
    ///
    /// The file's global `allowUnknownFlags` entry is assigned to `globals` first, so it
    /// governs the rest of that same file. A value given on the command line (in `skip`)
    /// still wins.
    pub fn options_for<I>(
        &self,
        file: &ConfigFile,
        globals: &mut FlagSet,
        skip: I,
    ) -> Result<ApplyOptions, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let skip: HashSet<String> = skip.into_iter().collect();
        if !skip.contains(FLAG_ALLOW_UNKNOWN_FLAGS) {
            let entry = file
                .entries(Scope::Global)?
                .into_iter()
                .find(|(name, _)| name == FLAG_ALLOW_UNKNOWN_FLAGS);
            if let Some((name, raw)) = entry {
                globals
                    .set(&name, &raw)
                    .map_err(|source| ConfigError::Flag {
                        origin: file.origin().to_string(),
                        source,
                    })?;
            }
        }
        Ok(self.apply_options(skip))
    }
}
