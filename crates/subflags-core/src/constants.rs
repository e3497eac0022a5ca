//! Flag names shared between the subcommand registry and the config loader.

/// Path of the config file to load flag values from.
pub const FLAG_CONFIG: &str = "config";

/// Interval for re-reading the config file.
pub const FLAG_CONFIG_UPDATE_INTERVAL: &str = "configUpdateInterval";

/// Print every flag in config-file syntax and exit.
pub const FLAG_DUMPFLAGS: &str = "dumpflags";

/// Tolerate config-file entries that name no defined flag.
pub const FLAG_ALLOW_UNKNOWN_FLAGS: &str = "allowUnknownFlags";

/// Names owned by the config loader and forwarded into every new subcommand.
pub const RESERVED_FLAGS: [&str; 4] = [
    FLAG_ALLOW_UNKNOWN_FLAGS,
    FLAG_CONFIG,
    FLAG_CONFIG_UPDATE_INTERVAL,
    FLAG_DUMPFLAGS,
];
