use std::time::Duration;

use anyhow::Result;
use subflags_core::value::format_duration;
use subflags_core::{FlagSet, SubcommandRegistry, Var};
use tracing::instrument;

use crate::GlobalFlags;

pub(crate) const NAME: &str = "serve";

/// Flags declared by `serve` itself.
#[derive(Debug)]
pub(crate) struct ServeFlags {
    pub workers: Var<isize>,
    pub grace: Var<Duration>,
}

/// Registers `serve`, sharing every `server.*` flag and `verbose` with the globals.
pub(crate) fn register(registry: &mut SubcommandRegistry, globals: &FlagSet) -> Result<ServeFlags> {
    let cmd = registry.create(NAME, globals)?;
    cmd.import_flags_with_prefix(globals, "server.")?;
    cmd.import_flag(globals, "verbose")?;

    Ok(ServeFlags {
        workers: cmd.define("workers", 4, "Number of worker threads")?,
        grace: cmd.define(
            "grace",
            Duration::from_secs(10),
            "How long to wait for in-flight requests on shutdown",
        )?,
    })
}

/// Reports the server configuration resolved from flags and config.
#[instrument(skip_all)]
pub(crate) fn run(global: &GlobalFlags, flags: &ServeFlags) -> Result<String> {
    Ok(format!(
        "serve: listening on {}:{}\nworkers: {}\ngrace: {}\n",
        global.host.get(),
        global.port.get(),
        flags.workers.get(),
        format_duration(flags.grace.get()),
    ))
}
