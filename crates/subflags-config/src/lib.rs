//! Config-file driven flag values for `subflags` programs.
//!
//! Owns the four reserved flags (`allowUnknownFlags`, `config`, `configUpdateInterval`,
//! `dumpflags`) that the subcommand registry forwards into every subcommand, loads TOML
//! files of flag values, and dumps flag sets back in the same syntax.
//!
//! # Layout
//!
//! ```toml
//! verbose = true
//!
//! [server]            # flags named `server.*`
//! port = 9090
//!
//! [subcommand.serve]  # flags of the `serve` subcommand
//! workers = 8
//! ```

pub mod dump;
pub mod file;
pub mod reserved;

pub use dump::dump_flags;
pub use file::{ApplyOptions, ApplyReport, ConfigError, ConfigFile, Scope, SUBCOMMAND_TABLE};
pub use reserved::ReservedFlags;
