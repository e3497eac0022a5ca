use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use subflags_core::constants::{FLAG_CONFIG, FLAG_DUMPFLAGS};
use subflags_core::{FlagSet, FlagSetError};

/// Top-level table holding one section per subcommand, e.g. `[subcommand.serve]`.
pub const SUBCOMMAND_TABLE: &str = "subcommand";

/// Errors raised while loading or applying a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML config: {origin}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("unknown flag '{name}' in config {origin}")]
    UnknownFlag { origin: String, name: String },
    #[error("unsupported {found} value for flag '{name}' in config {origin}")]
    UnsupportedValue {
        origin: String,
        name: String,
        found: &'static str,
    },
    #[error("config {origin}: {source}")]
    Flag {
        origin: String,
        #[source]
        source: FlagSetError,
    },
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default, rename = "subcommand")]
    subcommands: BTreeMap<String, toml::Table>,
    #[serde(flatten)]
    flags: toml::Table,
}

/// Which part of a config file to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// Top-level keys, for the global flag set.
    Global,
    /// The `[subcommand.<name>]` section.
    Subcommand(&'a str),
}

/// Controls how [`ConfigFile::apply`] treats skipped and unknown entries.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Ignore entries that name no defined flag instead of failing.
    pub allow_unknown: bool,
    /// Flags that keep their current value, usually the ones given on the command line.
    pub skip: HashSet<String>,
}

/// Flag names grouped by what [`ConfigFile::apply`] did with them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    pub unknown: Vec<String>,
}

/// A parsed TOML file of flag values.
///
/// Nested tables flatten into dotted flag names, so `[server] port = 80` and
/// `"server.port" = 80` both target the flag `server.port`.
#[derive(Debug)]
pub struct ConfigFile {
    origin: String,
    document: ConfigDocument,
}

impl ConfigFile {
    /// Reads and parses the TOML file at `path`.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path.display().to_string())
    }

    /// Parses TOML text. The origin is reported as `<inline>`.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, "<inline>".to_string())
    }

    fn parse(text: &str, origin: String) -> Result<Self, ConfigError> {
        let document = toml::from_str::<ConfigDocument>(text).map_err(|source| {
            ConfigError::Parse {
                origin: origin.clone(),
                source,
            }
        })?;
        debug!(
            origin = %origin,
            subcommands = document.subcommands.len(),
            "parsed config file"
        );
        Ok(Self { origin, document })
    }

    /// Where the file came from, for diagnostics.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Subcommand sections present in the file.
    pub fn subcommands(&self) -> impl Iterator<Item = &str> {
        self.document.subcommands.keys().map(String::as_str)
    }

    /// Flattened `(flag name, textual value)` pairs for `scope`.
    pub fn entries(&self, scope: Scope<'_>) -> Result<Vec<(String, String)>, ConfigError> {
        let table = match scope {
            Scope::Global => Some(&self.document.flags),
            Scope::Subcommand(name) => self.document.subcommands.get(name),
        };
        let mut out = Vec::new();
        if let Some(table) = table {
            self.flatten("", table, &mut out)?;
        }
        Ok(out)
    }

    fn flatten(
        &self,
        prefix: &str,
        table: &toml::Table,
        out: &mut Vec<(String, String)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in table {
            let name = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            let raw = match value {
                toml::Value::Table(nested) => {
                    self.flatten(&name, nested, out)?;
                    continue;
                }
                toml::Value::String(text) => text.clone(),
                toml::Value::Integer(number) => number.to_string(),
                toml::Value::Float(number) => number.to_string(),
                toml::Value::Boolean(flag) => flag.to_string(),
                toml::Value::Datetime(datetime) => datetime.to_string(),
                toml::Value::Array(_) => {
                    return Err(ConfigError::UnsupportedValue {
                        origin: self.origin.clone(),
                        name,
                        found: "array",
                    })
                }
            };
            out.push((name, raw));
        }
        Ok(())
    }

    /// Assigns the values of `scope` to `set`.
    ///
    /// Flags listed in `options.skip` keep their value. The `config` and `dumpflags`
    /// entries are never taken from a file.
    #[instrument(skip(self, set, options), fields(origin = %self.origin, set = %set.name()))]
    pub fn apply(
        &self,
        scope: Scope<'_>,
        set: &mut FlagSet,
        options: &ApplyOptions,
    ) -> Result<ApplyReport, ConfigError> {
        let mut report = ApplyReport::default();

        for (name, raw) in self.entries(scope)? {
            if name == FLAG_CONFIG || name == FLAG_DUMPFLAGS {
                debug!(flag = %name, "ignoring loader flag in config file");
                continue;
            }
            if options.skip.contains(&name) {
                debug!(flag = %name, "flag set on command line, keeping it");
                report.skipped.push(name);
                continue;
            }
            if !set.contains(&name) {
                if options.allow_unknown {
                    warn!(flag = %name, "ignoring unknown flag in config file");
                    report.unknown.push(name);
                    continue;
                }
                return Err(ConfigError::UnknownFlag {
                    origin: self.origin.clone(),
                    name,
                });
            }

            set.set(&name, &raw).map_err(|source| ConfigError::Flag {
                origin: self.origin.clone(),
                source,
            })?;
            report.applied.push(name);
        }

        debug!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            unknown = report.unknown.len(),
            "applied config file"
        );
        Ok(report)
    }
}
