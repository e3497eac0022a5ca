use anyhow::Result;
use subflags_core::{FlagSet, SubcommandRegistry};

pub(crate) const NAME: &str = "flags";

/// Registers `flags`, which only carries the reserved flags.
pub(crate) fn register(registry: &mut SubcommandRegistry, globals: &FlagSet) -> Result<()> {
    registry.create(NAME, globals)?;
    Ok(())
}

/// Lists the global set and every subcommand's set. Flags backed by a global
/// cell are marked `(shared)`.
pub(crate) fn run(globals: &FlagSet, registry: &SubcommandRegistry) -> String {
    let mut out = String::new();
    write_set(&mut out, globals, None);
    for sub in registry.iter() {
        out.push('\n');
        write_set(&mut out, sub.flag_set(), Some(globals));
    }
    out
}

fn write_set(out: &mut String, set: &FlagSet, globals: Option<&FlagSet>) {
    out.push_str(&format!("[{}]\n", set.name()));
    for flag in set {
        let shared = globals
            .and_then(|globals| globals.lookup(flag.name()))
            .is_some_and(|global| global.shares_storage_with(flag));
        out.push_str(&format!(
            "  --{} <{}> = {}{}\n",
            flag.name(),
            flag.kind(),
            flag.current(),
            if shared { " (shared)" } else { "" }
        ));
    }
}
