use anyhow::{bail, Result};
use subflags_core::value::format_duration;
use subflags_core::{FlagSet, SubcommandRegistry, Var};
use tracing::{debug, instrument};

use crate::GlobalFlags;

pub(crate) const NAME: &str = "fetch";

/// Flags declared by `fetch` itself.
#[derive(Debug)]
pub(crate) struct FetchFlags {
    pub url: Var<String>,
    pub output: Var<String>,
}

/// Registers `fetch`, sharing every `client.*` flag and `verbose` with the globals.
pub(crate) fn register(registry: &mut SubcommandRegistry, globals: &FlagSet) -> Result<FetchFlags> {
    let cmd = registry.create(NAME, globals)?;
    cmd.import_flags_with_prefix(globals, "client.")?;
    cmd.import_flag(globals, "verbose")?;

    let url = Var::default();
    cmd.define_var(&url, "url", String::new(), "URL to fetch (or pass it as the first argument)")?;
    let output = Var::default();
    cmd.define_var(&output, "output", "-".to_string(), "Where to write the body, '-' for stdout")?;

    Ok(FetchFlags { url, output })
}

/// Reports the request `fetch` would make.
#[instrument(skip(global, flags))]
pub(crate) fn run(global: &GlobalFlags, flags: &FetchFlags, positional: &[String]) -> Result<String> {
    let url = match flags.url.get() {
        url if !url.is_empty() => url,
        _ => match positional.first() {
            Some(url) => url.clone(),
            None => bail!("fetch needs a URL: pass --url or a positional argument"),
        },
    };
    if positional.len() > 1 {
        debug!("ignoring extra arguments: {:?}", &positional[1..]);
    }

    Ok(format!(
        "fetch {} -> {} (timeout={}, retries={})\n",
        url,
        flags.output.get(),
        format_duration(global.timeout.get()),
        global.retries.get(),
    ))
}
