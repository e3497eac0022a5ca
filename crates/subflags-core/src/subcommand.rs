use tracing::{debug, instrument};

use crate::flag_set::{FlagSet, FlagSetError};
use crate::value::{FlagType, Var};

/// A named CLI verb with its own private flag set.
///
/// Created through [`crate::SubcommandRegistry::create`]. Global flags can be pulled in
/// with the `import_*` methods; imported flags share storage with the global set.
#[derive(Debug)]
pub struct Subcommand {
    name: String,
    flag_set: FlagSet,
}

impl Subcommand {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flag_set: FlagSet::new(name),
        }
    }

    /// The name the subcommand was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The subcommand's private flag set.
    pub fn flag_set(&self) -> &FlagSet {
        &self.flag_set
    }

    /// Mutable access to the private flag set.
    pub fn flag_set_mut(&mut self) -> &mut FlagSet {
        &mut self.flag_set
    }

    /// Imports the global flag `name` into this subcommand.
    ///
    /// A name that is not defined in `globals` is skipped and `Ok(false)` is returned,
    /// since hosts may declare optional globals after their subcommands.
    #[instrument(skip(self, globals), fields(subcommand = %self.name))]
    pub fn import_flag(&mut self, globals: &FlagSet, name: &str) -> Result<bool, FlagSetError> {
        match globals.lookup(name) {
            Some(flag) => self.flag_set.import(flag),
            None => {
                debug!("flag not defined globally, nothing to import");
                Ok(false)
            }
        }
    }

    /// Imports every global flag in registration order. Returns how many were added.
    pub fn import_flags(&mut self, globals: &FlagSet) -> Result<usize, FlagSetError> {
        self.import_matching(globals, |_| true)
    }

    /// Imports the global flags whose name starts with `prefix` (case-sensitive).
    pub fn import_flags_with_prefix(
        &mut self,
        globals: &FlagSet,
        prefix: &str,
    ) -> Result<usize, FlagSetError> {
        self.import_matching(globals, |name| name.starts_with(prefix))
    }

    fn import_matching(
        &mut self,
        globals: &FlagSet,
        mut keep: impl FnMut(&str) -> bool,
    ) -> Result<usize, FlagSetError> {
        let mut imported = 0;
        for flag in globals.iter().filter(|flag| keep(flag.name())) {
            if self.flag_set.import(flag)? {
                imported += 1;
            }
        }
        debug!(subcommand = %self.name, imported, "imported global flags");
        Ok(imported)
    }

    /// Declares a subcommand flag stored in the caller's cell.
    pub fn define_var<T: FlagType>(
        &mut self,
        var: &Var<T>,
        name: &str,
        default: T,
        usage: &str,
    ) -> Result<(), FlagSetError> {
        self.flag_set.define_var(var, name, default, usage)
    }

    /// Declares a subcommand flag and returns the cell holding its value.
    pub fn define<T: FlagType>(
        &mut self,
        name: &str,
        default: T,
        usage: &str,
    ) -> Result<Var<T>, FlagSetError> {
        self.flag_set.define(name, default, usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag_set::Flag;
    use std::time::Duration;

    fn globals() -> FlagSet {
        let mut set = FlagSet::new("global");
        set.define::<isize>("server.port", 8080, "listen port").unwrap();
        set.define::<String>("server.host", "localhost".to_string(), "listen host")
            .unwrap();
        set.define::<Duration>("client.timeout", Duration::from_secs(5), "request timeout")
            .unwrap();
        set
    }

    fn names(set: &FlagSet) -> Vec<&str> {
        set.iter().map(Flag::name).collect()
    }

    #[test]
    fn imported_flag_shares_storage_both_ways() {
        let mut global = FlagSet::new("global");
        let port = global.define::<isize>("port", 8080, "listen port").unwrap();
        let mut serve = Subcommand::new("serve");

        assert!(serve.import_flag(&global, "port").unwrap());
        serve.flag_set_mut().set("port", "9000").unwrap();
        assert_eq!(port.get(), 9000);
        assert_eq!(global.lookup("port").unwrap().current(), "9000");

        global.set("port", "7000").unwrap();
        assert_eq!(serve.flag_set().lookup("port").unwrap().current(), "7000");
        assert_eq!(serve.flag_set().lookup("port").unwrap().usage(), "listen port");
    }

    #[test]
    fn missing_flag_import_is_silent() {
        let global = globals();
        let mut serve = Subcommand::new("serve");
        assert!(!serve.import_flag(&global, "nonexistent-flag").unwrap());
        assert!(serve.flag_set().lookup("nonexistent-flag").is_none());
        assert!(serve.flag_set().is_empty());
    }

    #[test]
    fn prefix_import_filters_by_name() {
        let global = globals();
        let mut serve = Subcommand::new("serve");
        let imported = serve.import_flags_with_prefix(&global, "server.").unwrap();
        assert_eq!(imported, 2);
        assert_eq!(names(serve.flag_set()), vec!["server.port", "server.host"]);
        assert!(!serve.flag_set().contains("client.timeout"));
    }

    #[test]
    fn prefix_match_is_case_sensitive_and_literal() {
        let global = globals();
        let mut serve = Subcommand::new("serve");
        assert_eq!(serve.import_flags_with_prefix(&global, "Server.").unwrap(), 0);
        assert_eq!(serve.import_flags_with_prefix(&global, "server.*").unwrap(), 0);
        assert_eq!(serve.import_flags_with_prefix(&global, "port").unwrap(), 0);
        assert!(serve.flag_set().is_empty());
    }

    #[test]
    fn empty_prefix_imports_everything() {
        let global = globals();
        let mut all = Subcommand::new("all");
        let mut prefixed = Subcommand::new("prefixed");
        assert_eq!(all.import_flags(&global).unwrap(), 3);
        assert_eq!(prefixed.import_flags_with_prefix(&global, "").unwrap(), 3);
        assert_eq!(names(all.flag_set()), names(prefixed.flag_set()));
    }

    #[test]
    fn bulk_import_from_empty_registry_is_a_no_op() {
        let global = FlagSet::new("global");
        let mut serve = Subcommand::new("serve");
        assert_eq!(serve.import_flags(&global).unwrap(), 0);
        assert_eq!(serve.import_flags_with_prefix(&global, "x").unwrap(), 0);
    }

    #[test]
    fn repeated_bulk_import_skips_already_shared_flags() {
        let global = globals();
        let mut serve = Subcommand::new("serve");
        serve.import_flag(&global, "server.port").unwrap();
        assert_eq!(serve.import_flags(&global).unwrap(), 2);
        assert_eq!(serve.import_flags(&global).unwrap(), 0);
        assert_eq!(serve.flag_set().len(), 3);
    }

    #[test]
    fn bulk_import_refuses_to_shadow_a_manual_declaration() {
        let global = globals();
        let mut serve = Subcommand::new("serve");
        let own_port = serve.define::<isize>("server.port", 1, "own port").unwrap();

        let err = serve.import_flags(&global).expect_err("must fail");
        assert!(matches!(err, FlagSetError::Redefined { ref name, .. } if name == "server.port"));
        assert_eq!(own_port.get(), 1);
        assert_eq!(serve.flag_set().lookup("server.port").unwrap().usage(), "own port");
    }

    #[test]
    fn declarations_propagate_defaults() {
        let mut serve = Subcommand::new("serve");
        let workers = serve.define::<isize>("workers", 4, "worker count").unwrap();
        assert_eq!(workers.get(), 4);

        let ratio = Var::new(0.0);
        serve.define_var::<f64>(&ratio, "ratio", 0.75, "load ratio").unwrap();
        assert_eq!(ratio.get(), 0.75);

        serve.flag_set_mut().set("workers", "16").unwrap();
        assert_eq!(workers.get(), 16);
    }

    #[test]
    fn declares_every_primitive_kind() {
        let mut cmd = Subcommand::new("kinds");
        cmd.define::<bool>("b", true, "").unwrap();
        cmd.define::<isize>("i", -1, "").unwrap();
        cmd.define::<i64>("i64", -2, "").unwrap();
        cmd.define::<usize>("u", 3, "").unwrap();
        cmd.define::<u64>("u64", 4, "").unwrap();
        cmd.define::<String>("s", "x".to_string(), "").unwrap();
        cmd.define::<f64>("f", 1.5, "").unwrap();
        cmd.define::<Duration>("d", Duration::from_millis(1500), "").unwrap();

        let rendered: Vec<_> = cmd
            .flag_set()
            .iter()
            .map(|flag| format!("{}:{}={}", flag.name(), flag.kind(), flag.current()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                "b:bool=true",
                "i:int=-1",
                "i64:int64=-2",
                "u:uint=3",
                "u64:uint64=4",
                "s:string=x",
                "f:float64=1.5",
                "d:duration=1.5s",
            ]
        );
    }
}
