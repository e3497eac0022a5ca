use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Command;

use subflags_config::{dump_flags, ConfigFile, ReservedFlags, Scope};
use subflags_core::value::format_duration;
use subflags_core::{build_command, parse_invocation, FlagSet, FlagSetError, SubcommandRegistry, Var};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod fetch;
mod listing;
mod serve;
mod styles;

use styles as s;

const BIN_NAME: &str = "subflags";

/// Flags every subcommand can import from the global set.
#[derive(Debug)]
pub(crate) struct GlobalFlags {
    pub verbose: Var<bool>,
    pub host: Var<String>,
    pub port: Var<isize>,
    pub timeout: Var<Duration>,
    pub retries: Var<u64>,
}

/// The demo host: global flags, the loader's reserved flags and the registered verbs.
#[derive(Debug)]
pub(crate) struct App {
    globals: FlagSet,
    registry: SubcommandRegistry,
    reserved: ReservedFlags,
    global: GlobalFlags,
    serve: serve::ServeFlags,
    fetch: fetch::FetchFlags,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let mut app = App::new()?;
    match app.run(std::env::args_os()) {
        Ok(output) => {
            print!("{output}");
            Ok(())
        }
        Err(err) => {
            // Let clap print help, version and usage errors itself.
            if let Some(FlagSetError::Cli(cli_err)) = err.downcast_ref::<FlagSetError>() {
                cli_err.exit();
            }
            Err(err)
        }
    }
}

impl App {
    /// Runs the definition phase. Everything is declared here, before any parsing.
    pub(crate) fn new() -> Result<Self> {
        let mut globals = FlagSet::new(BIN_NAME);
        let reserved = ReservedFlags::declare(&mut globals)?;
        let global = GlobalFlags {
            verbose: globals.define("verbose", false, "Log every resolved flag value")?,
            host: globals.define(
                "server.host",
                "127.0.0.1".to_string(),
                "Address the server binds to",
            )?,
            port: globals.define("server.port", 8080, "Port the server listens on")?,
            timeout: globals.define(
                "client.timeout",
                Duration::from_secs(5),
                "Request timeout for the client",
            )?,
            retries: globals.define("client.retries", 3, "Retry attempts for failed requests")?,
        };

        let mut registry = SubcommandRegistry::new();
        let serve = serve::register(&mut registry, &globals)?;
        let fetch = fetch::register(&mut registry, &globals)?;
        listing::register(&mut registry, &globals)?;

        Ok(Self {
            globals,
            registry,
            reserved,
            global,
            serve,
            fetch,
        })
    }

    fn command(&self) -> Command {
        build_command(BIN_NAME, &self.globals, &self.registry)
            .version(env!("CARGO_PKG_VERSION"))
            .about("Git-style demo host for subcommand flag sets")
            .after_help("Every subcommand also accepts --config, --dumpflags, --allowUnknownFlags and --configUpdateInterval.")
            .styles(s::get_clap_styles())
    }

    /// Parses `args`, applies the config file and dispatches. Returns the text to print.
    pub(crate) fn run<I, T>(&mut self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let command = self.command();
        let chosen = parse_invocation(command, &mut self.globals, &mut self.registry, args)?;
        debug!(?chosen, "parsed command line");

        if let Some(path) = self.reserved.config_path() {
            self.apply_config(&path, chosen.as_deref())?;
        }

        if self.reserved.dumpflags.get() {
            return Ok(self.dump(chosen.as_deref()));
        }

        let interval = self.reserved.config_update_interval.get();
        if !interval.is_zero() {
            warn!(
                "config re-reading is not supported, ignoring configUpdateInterval={}",
                format_duration(interval)
            );
        }

        if self.global.verbose.get() {
            self.log_resolved(chosen.as_deref());
        }

        match chosen.as_deref() {
            Some(serve::NAME) => serve::run(&self.global, &self.serve),
            Some(fetch::NAME) => {
                let positional = self
                    .registry
                    .get(fetch::NAME)
                    .map(|sub| sub.flag_set().args().to_vec())
                    .unwrap_or_default();
                fetch::run(&self.global, &self.fetch, &positional)
            }
            Some(listing::NAME) => Ok(listing::run(&self.globals, &self.registry)),
            Some(other) => bail!("unhandled subcommand '{other}'"),
            None => Ok(format!("{}\n", self.command().render_help())),
        }
    }

    fn apply_config(&mut self, path: &Path, chosen: Option<&str>) -> Result<()> {
        let file = ConfigFile::load_from_file(path)
            .with_context(|| format!("unable to load config '{}'", path.display()))?;

        let mut explicit: Vec<String> = self
            .globals
            .iter_set()
            .map(|flag| flag.name().to_string())
            .collect();
        if let Some(sub) = chosen.and_then(|name| self.registry.get(name)) {
            explicit.extend(sub.flag_set().iter_set().map(|flag| flag.name().to_string()));
        }
        let options = self
            .reserved
            .options_for(&file, &mut self.globals, explicit)?;

        let report = file.apply(Scope::Global, &mut self.globals, &options)?;
        info!(
            config = %file.origin(),
            applied = report.applied.len(),
            "loaded global flags from config"
        );

        if let Some(name) = chosen {
            if let Some(sub) = self.registry.get_mut(name) {
                let report = file.apply(Scope::Subcommand(name), sub.flag_set_mut(), &options)?;
                info!(
                    subcommand = name,
                    applied = report.applied.len(),
                    "loaded subcommand flags from config"
                );
            }
        }
        Ok(())
    }

    fn dump(&self, chosen: Option<&str>) -> String {
        match chosen.and_then(|name| self.registry.get(name)) {
            Some(sub) => dump_flags(sub.flag_set()),
            None => dump_flags(&self.globals),
        }
    }

    fn log_resolved(&self, chosen: Option<&str>) {
        let set = chosen
            .and_then(|name| self.registry.get(name))
            .map(|sub| sub.flag_set())
            .unwrap_or(&self.globals);
        for flag in set {
            info!(set = %set.name(), flag = %flag.name(), value = %flag.current(), "resolved flag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn run(args: &[&str]) -> Result<String> {
        let mut app = App::new().expect("definition phase should succeed");
        app.run(args.iter().copied())
    }

    #[test]
    fn serve_uses_defaults() {
        let out = run(&["subflags", "serve"]).unwrap();
        assert!(out.contains("listening on 127.0.0.1:8080"));
        assert!(out.contains("workers: 4"));
        assert!(out.contains("grace: 10s"));
    }

    #[test]
    fn serve_reads_own_and_imported_flags() {
        let out = run(&["subflags", "serve", "--workers", "8", "--server.port", "9000"]).unwrap();
        assert!(out.contains("127.0.0.1:9000"));
        assert!(out.contains("workers: 8"));
    }

    #[test]
    fn global_flags_before_the_verb_reach_the_subcommand() {
        let out = run(&["subflags", "--server.host=0.0.0.0", "serve"]).unwrap();
        assert!(out.contains("listening on 0.0.0.0:8080"));
    }

    #[test]
    fn fetch_needs_a_url() {
        let err = run(&["subflags", "fetch"]).expect_err("must fail");
        assert!(err.to_string().contains("needs a URL"));

        let out = run(&["subflags", "fetch", "https://example.com/a"]).unwrap();
        assert!(out.contains("fetch https://example.com/a -> -"));
        assert!(out.contains("timeout=5s"));

        let out = run(&[
            "subflags",
            "fetch",
            "--url",
            "https://example.com/b",
            "--client.retries",
            "7",
            "--output",
            "b.html",
        ])
        .unwrap();
        assert!(out.contains("fetch https://example.com/b -> b.html"));
        assert!(out.contains("retries=7"));
    }

    #[test]
    fn serve_flags_are_not_visible_to_fetch() {
        let err = run(&["subflags", "fetch", "--workers", "2"]).expect_err("must fail");
        assert!(matches!(
            err.downcast_ref::<FlagSetError>(),
            Some(FlagSetError::Cli(_))
        ));
    }

    #[test]
    fn config_file_fills_values_and_command_line_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subflags.toml");
        std::fs::write(
            &path,
            r#"
            [server]
            host = "10.0.0.1"
            port = 7000

            [subcommand.serve]
            workers = 16
            grace = "30s"
            "#,
        )
        .unwrap();
        let config = path.to_str().unwrap();

        let out = run(&["subflags", "serve", "--config", config, "--server.port", "9999"]).unwrap();
        assert!(out.contains("listening on 10.0.0.1:9999"));
        assert!(out.contains("workers: 16"));
        assert!(out.contains("grace: 30s"));
    }

    #[test]
    fn unknown_config_entries_need_allow_unknown_flags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subflags.toml");
        std::fs::write(&path, "mystery = 1\n").unwrap();
        let config = path.to_str().unwrap();

        let err = run(&["subflags", "--config", config, "serve"]).expect_err("must fail");
        assert!(format!("{err:#}").contains("unknown flag 'mystery'"));

        let out = run(&["subflags", "--config", config, "--allowUnknownFlags", "serve"]).unwrap();
        assert!(out.contains("workers: 4"));
    }

    #[test]
    fn allow_unknown_flags_inside_the_config_file_applies_to_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subflags.toml");
        std::fs::write(&path, "allowUnknownFlags = true\nmystery = 1\n").unwrap();
        let config = path.to_str().unwrap();

        let out = run(&["subflags", "--config", config, "serve"]).unwrap();
        assert!(out.contains("workers: 4"));

        let err = run(&["subflags", "--config", config, "--allowUnknownFlags=false", "serve"])
            .expect_err("command line wins");
        assert!(format!("{err:#}").contains("unknown flag 'mystery'"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = run(&["subflags", "serve", "--config", "/nonexistent/subflags.toml"])
            .expect_err("must fail");
        assert!(err.to_string().contains("unable to load config"));
    }

    #[test]
    fn dumpflags_prints_the_chosen_set() {
        let out = run(&["subflags", "serve", "--dumpflags", "--workers", "6"]).unwrap();
        assert!(out.contains("workers = 6"));
        assert!(out.contains("\"server.port\" = 8080"));
        assert!(!out.contains("client.timeout"));
        assert!(!out.contains("dumpflags ="));

        let out = run(&["subflags", "--dumpflags"]).unwrap();
        assert!(out.contains("\"client.timeout\" = \"5s\""));
        assert!(!out.contains("workers"));
    }

    #[test]
    fn dumped_flags_load_back_as_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.toml");
        let dump = run(&["subflags", "--dumpflags", "--server.port", "6060"]).unwrap();
        std::fs::write(&path, dump).unwrap();

        let out = run(&["subflags", "--config", path.to_str().unwrap(), "serve"]).unwrap();
        assert!(out.contains("127.0.0.1:6060"));
    }

    #[test]
    fn listing_marks_shared_flags() {
        let out = run(&["subflags", "flags"]).unwrap();
        assert!(out.contains("[subflags]"));
        assert!(out.contains("[serve]"));
        assert!(out.contains("[fetch]"));
        assert!(out.contains("--workers"));
        assert!(out.contains("(shared)"));
    }

    #[test]
    fn no_subcommand_prints_help() {
        let out = run(&["subflags"]).unwrap();
        assert!(out.contains("serve"));
        assert!(out.contains("fetch"));
    }

    #[test]
    fn registering_a_verb_twice_is_fatal() {
        let mut globals = FlagSet::new(BIN_NAME);
        let mut registry = SubcommandRegistry::new();
        serve::register(&mut registry, &globals).unwrap();
        let err = serve::register(&mut registry, &globals).expect_err("must fail");
        assert!(err.to_string().contains("same name: serve"));
        assert_eq!(registry.len(), 1);

        // Globals declared after the fact do not leak into the existing subcommand.
        globals.define::<bool>("late", false, "").unwrap();
        assert!(!registry.get("serve").unwrap().flag_set().contains("late"));
    }
}
