//! Subcommands with private flag namespaces for multi-verb command-line tools.
//!
//! A host program defines its top-level flags in a global [`FlagSet`], creates each
//! verb through a [`SubcommandRegistry`], and imports whichever global flags a verb
//! should share. Imported flags are not copied: both sets point at the same storage
//! cell, so a value parsed or loaded through either one is visible through both.
//!
//! All definitions must be made before any parsing starts. The flag graph is built on
//! `Rc` cells and stays on the thread that built it.

pub mod command;
pub mod constants;
pub mod flag_set;
pub mod registry;
pub mod subcommand;
pub mod value;

pub use command::{build_command, parse_invocation};
pub use constants::RESERVED_FLAGS;
pub use flag_set::{Flag, FlagSet, FlagSetError};
pub use registry::{RegistryError, SubcommandRegistry};
pub use subcommand::Subcommand;
pub use value::{FlagKind, FlagType, Value, ValueError, Var};
