use subflags_core::constants::{FLAG_CONFIG, FLAG_DUMPFLAGS};
use subflags_core::{Flag, FlagKind, FlagSet};

/// Renders every flag of `set` in config-file syntax, in registration order.
///
/// Each flag is preceded by its usage as a comment. The output loads back through
/// [`crate::ConfigFile`] to the same values.
pub fn dump_flags(set: &FlagSet) -> String {
    let mut out = String::new();
    for flag in set
        .iter()
        .filter(|flag| flag.name() != FLAG_CONFIG && flag.name() != FLAG_DUMPFLAGS)
    {
        for line in flag.usage().lines() {
            out.push_str(&format!("# {line}\n"));
        }
        out.push_str(&format!("{} = {}\n", toml_key(flag.name()), toml_value(flag)));
    }
    out
}

// Dotted names are quoted whole so that `a` and `a.b` can coexist in one file.
fn toml_key(name: &str) -> String {
    let bare = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        name.to_string()
    } else {
        toml::Value::String(name.to_string()).to_string()
    }
}

fn toml_value(flag: &Flag) -> String {
    let current = flag.current();
    let literal = match flag.kind() {
        FlagKind::Bool => true,
        FlagKind::Int | FlagKind::Int64 | FlagKind::Uint | FlagKind::Uint64 => {
            current.parse::<i64>().is_ok()
        }
        FlagKind::Float64 => current
            .parse::<f64>()
            .map(|value| {
                value.is_finite() && (current.contains('.') || current.parse::<i64>().is_ok())
            })
            .unwrap_or(false),
        FlagKind::String | FlagKind::Duration => false,
    };
    if literal {
        current
    } else {
        toml::Value::String(current).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApplyOptions, ConfigFile, ReservedFlags, Scope};
    use std::time::Duration;

    #[test]
    fn dumps_usage_comments_and_typed_values() {
        let mut set = FlagSet::new("app");
        ReservedFlags::declare(&mut set).unwrap();
        set.define::<isize>("server.port", 8080, "listen port").unwrap();
        set.define::<bool>("verbose", false, "").unwrap();
        set.define::<String>("greeting", "hi \"there\"".to_string(), "two\nlines")
            .unwrap();

        let out = dump_flags(&set);
        assert!(!out.contains("dumpflags ="));
        assert!(!out.contains("config ="));
        assert!(out.contains("allowUnknownFlags = false"));
        assert!(out.contains("configUpdateInterval = \"0s\""));
        assert!(out.contains("# listen port\n\"server.port\" = 8080\n"));
        assert!(out.contains("verbose = false\n"));
        assert!(out.contains("# two\n# lines\ngreeting = "));
    }

    #[test]
    fn dump_round_trips_through_config_file() {
        let mut source = FlagSet::new("app");
        source.define::<isize>("server.port", -3, "").unwrap();
        source.define::<u64>("big", u64::MAX, "").unwrap();
        source.define::<f64>("ratio", 1e300, "").unwrap();
        source.define::<f64>("half", 0.5, "").unwrap();
        source.define::<f64>("nan", f64::NAN, "").unwrap();
        source
            .define::<Duration>("timeout", Duration::from_millis(1500), "")
            .unwrap();
        source
            .define::<String>("motto", "it's \"quoted\"".to_string(), "")
            .unwrap();
        source.define::<bool>("server", true, "").unwrap();

        let file = ConfigFile::from_toml_str(&dump_flags(&source)).expect("dump should parse");

        let mut target = FlagSet::new("app");
        let port = target.define::<isize>("server.port", 0, "").unwrap();
        let big = target.define::<u64>("big", 0, "").unwrap();
        let ratio = target.define::<f64>("ratio", 0.0, "").unwrap();
        let half = target.define::<f64>("half", 0.0, "").unwrap();
        let nan = target.define::<f64>("nan", 0.0, "").unwrap();
        let timeout = target.define::<Duration>("timeout", Duration::ZERO, "").unwrap();
        let motto = target.define::<String>("motto", String::new(), "").unwrap();
        let server = target.define::<bool>("server", false, "").unwrap();

        file.apply(Scope::Global, &mut target, &ApplyOptions::default())
            .unwrap();
        assert_eq!(port.get(), -3);
        assert_eq!(big.get(), u64::MAX);
        assert_eq!(ratio.get(), 1e300);
        assert_eq!(half.get(), 0.5);
        assert!(nan.get().is_nan());
        assert_eq!(timeout.get(), Duration::from_millis(1500));
        assert_eq!(motto.get(), "it's \"quoted\"");
        assert!(server.get());
    }
}
