//! Command-line parsing for flag sets, delegated to clap.
//!
//! Every flag becomes a `--name` long option. Values are applied through
//! [`FlagSet::set`], so clap only tokenizes and the flag's own type does the parsing.
//! Bool flags accept `--name` and `--name=<bool>`.

use std::ffi::OsString;

use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::debug;

use crate::flag_set::{Flag, FlagSet, FlagSetError};
use crate::registry::SubcommandRegistry;
use crate::subcommand::Subcommand;

const ARGS_ID: &str = "[args]";

/// Builds one clap argument per flag, in registration order.
pub fn flag_args(set: &FlagSet) -> Vec<Arg> {
    set.iter().map(flag_arg).collect()
}

fn flag_arg(flag: &Flag) -> Arg {
    let help = if flag.default_value().is_empty() {
        flag.usage().to_string()
    } else {
        format!("{} [default: {}]", flag.usage(), flag.default_value())
    };

    let arg = Arg::new(flag.name().to_string())
        .long(flag.name().to_string())
        .help(help)
        .action(ArgAction::Set);

    if flag.value().is_bool_flag() {
        arg.num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true")
            .value_name("BOOL")
    } else {
        arg.value_name(flag.kind().as_str().to_uppercase())
            .allow_hyphen_values(true)
    }
}

fn positional_arg() -> Arg {
    Arg::new(ARGS_ID)
        .value_name("ARGS")
        .num_args(0..)
        .action(ArgAction::Append)
}

/// Copies explicitly given values from `matches` into `set`.
pub fn apply_matches(set: &mut FlagSet, matches: &ArgMatches) -> Result<(), FlagSetError> {
    let names: Vec<String> = set.iter().map(|flag| flag.name().to_string()).collect();
    for name in names {
        if let Some(raw) = matches.get_one::<String>(&name) {
            debug!(set = %set.name(), flag = %name, value = %raw, "flag set from command line");
            set.set(&name, raw)?;
        }
    }

    let args = matches
        .try_get_many::<String>(ARGS_ID)
        .ok()
        .flatten()
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    set.set_args(args);
    Ok(())
}

impl FlagSet {
    /// A clap command named after this set, with a trailing `ARGS` positional.
    pub fn command(&self) -> Command {
        Command::new(self.name().to_string())
            .args_override_self(true)
            .disable_help_flag(self.contains("help"))
            .disable_version_flag(self.contains("version"))
            .args(flag_args(self))
            .arg(positional_arg())
    }

    /// Parses `args` (program name first) into this set.
    pub fn parse<I, T>(&mut self, args: I) -> Result<(), FlagSetError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command().try_get_matches_from(args)?;
        apply_matches(self, &matches)
    }
}

impl Subcommand {
    /// Parses `args` (subcommand name first) into this subcommand's flag set.
    pub fn parse<I, T>(&mut self, args: I) -> Result<(), FlagSetError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        self.flag_set_mut().parse(args)
    }
}

/// Builds the top-level command: global flags plus one clap subcommand per
/// registered subcommand.
///
/// User-defined `help` and `version` flags and a `help` subcommand replace the ones
/// clap would generate.
pub fn build_command(bin: &str, globals: &FlagSet, registry: &SubcommandRegistry) -> Command {
    Command::new(bin.to_string())
        .args_override_self(true)
        .disable_help_flag(globals.contains("help"))
        .disable_version_flag(globals.contains("version"))
        .disable_help_subcommand(registry.contains("help"))
        .args(flag_args(globals))
        .subcommands(registry.iter().map(|sub| sub.flag_set().command()))
}

/// Parses a full invocation against `command` (usually from [`build_command`]).
///
/// Global values land in `globals`, the chosen subcommand's values in its own set.
/// Returns the chosen subcommand name.
pub fn parse_invocation<I, T>(
    command: Command,
    globals: &mut FlagSet,
    registry: &mut SubcommandRegistry,
    args: I,
) -> Result<Option<String>, FlagSetError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command.try_get_matches_from(args)?;
    apply_matches(globals, &matches)?;

    let Some((name, sub_matches)) = matches.subcommand() else {
        return Ok(None);
    };
    if let Some(sub) = registry.get_mut(name) {
        apply_matches(sub.flag_set_mut(), sub_matches)?;
    }
    debug!(subcommand = name, "parsed invocation");
    Ok(Some(name.to_string()))
}
