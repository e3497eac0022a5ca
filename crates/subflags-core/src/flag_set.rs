use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::value::{FlagKind, FlagType, Value, ValueError, Var};

/// One registration of a storage cell inside a [`FlagSet`].
///
/// Two `Flag`s in different sets may point at the same cell; see
/// [`Flag::shares_storage_with`].
#[derive(Debug, Clone)]
pub struct Flag {
    name: String,
    usage: String,
    default_value: String,
    value: Rc<dyn Value>,
}

impl Flag {
    /// Name used on the command line and in config files.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Help text shown next to the flag.
    pub fn usage(&self) -> &str {
        &self.usage
    }

    /// Textual default captured when the flag was first defined.
    pub fn default_value(&self) -> &str {
        &self.default_value
    }

    /// Kind of the underlying cell.
    pub fn kind(&self) -> FlagKind {
        self.value.kind()
    }

    /// The shared storage cell.
    pub fn value(&self) -> &Rc<dyn Value> {
        &self.value
    }

    /// Current value in textual form.
    pub fn current(&self) -> String {
        self.value.get_string()
    }

    /// Returns true when both flags are backed by the same cell.
    pub fn shares_storage_with(&self, other: &Flag) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }
}

/// Errors raised while defining, importing or assigning flags.
#[derive(Debug, Error)]
pub enum FlagSetError {
    #[error("flag redefined in '{set}': {name}")]
    Redefined { set: String, name: String },
    #[error("invalid flag name {name:?} in '{set}': {reason}")]
    InvalidName {
        set: String,
        name: String,
        reason: &'static str,
    },
    #[error("flag provided but not defined in '{set}': --{name}")]
    UnknownFlag { set: String, name: String },
    #[error("invalid value for flag --{name}: {source}")]
    InvalidValue {
        name: String,
        #[source]
        source: ValueError,
    },
    #[error(transparent)]
    Cli(#[from] clap::Error),
}

/// An ordered, name-keyed collection of flags.
///
/// Iteration follows registration order.
#[derive(Debug)]
pub struct FlagSet {
    name: String,
    flags: Vec<Flag>,
    index: HashMap<String, usize>,
    actual: HashSet<String>,
    args: Vec<String>,
}

impl FlagSet {
    /// Creates an empty set. `name` shows up in usage and error messages.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: Vec::new(),
            index: HashMap::new(),
            actual: HashSet::new(),
            args: Vec::new(),
        }
    }

    /// Name of the set: the program for globals, the verb for a subcommand.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers an existing cell under `name`. The cell's current value becomes the
    /// recorded default.
    pub fn var(&mut self, value: Rc<dyn Value>, name: &str, usage: &str) -> Result<(), FlagSetError> {
        let default_value = value.get_string();
        self.insert(Flag {
            name: name.to_string(),
            usage: usage.to_string(),
            default_value,
            value,
        })
    }

    /// Defines a flag backed by the caller's cell, resetting it to `default`.
    pub fn define_var<T: FlagType>(
        &mut self,
        var: &Var<T>,
        name: &str,
        default: T,
        usage: &str,
    ) -> Result<(), FlagSetError> {
        self.check_name(name)?;
        if self.contains(name) {
            return Err(self.redefined(name));
        }
        var.set(default);
        self.var(Rc::new(var.clone()), name, usage)
    }

    /// Defines a flag backed by a fresh cell and returns its handle.
    pub fn define<T: FlagType>(
        &mut self,
        name: &str,
        default: T,
        usage: &str,
    ) -> Result<Var<T>, FlagSetError> {
        let var = Var::new(default);
        self.var(Rc::new(var.clone()), name, usage)?;
        Ok(var)
    }

    /// Registers the cell behind `flag` under the same name, usage and default.
    ///
    /// Returns `Ok(false)` if this set already holds the very same cell under that name.
    /// A different cell under that name is a redefinition.
    pub fn import(&mut self, flag: &Flag) -> Result<bool, FlagSetError> {
        if let Some(existing) = self.lookup(flag.name()) {
            if existing.shares_storage_with(flag) {
                return Ok(false);
            }
            return Err(self.redefined(flag.name()));
        }
        self.insert(flag.clone())?;
        Ok(true)
    }

    /// Looks up a flag by name.
    pub fn lookup(&self, name: &str) -> Option<&Flag> {
        self.index.get(name).map(|&idx| &self.flags[idx])
    }

    /// Whether a flag with this name is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Flags in registration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Flag> {
        self.flags.iter()
    }

    /// Number of defined flags.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true when no flag is defined.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Parses `raw` into the named flag and marks it as explicitly set.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<(), FlagSetError> {
        let flag = self.lookup(name).ok_or_else(|| FlagSetError::UnknownFlag {
            set: self.name.clone(),
            name: name.to_string(),
        })?;
        flag.value
            .set_str(raw)
            .map_err(|source| FlagSetError::InvalidValue {
                name: name.to_string(),
                source,
            })?;
        self.actual.insert(name.to_string());
        Ok(())
    }

    /// Whether the flag was assigned through [`FlagSet::set`] on this set.
    pub fn is_set(&self, name: &str) -> bool {
        self.actual.contains(name)
    }

    /// Flags explicitly assigned on this set, in registration order.
    pub fn iter_set(&self) -> impl Iterator<Item = &Flag> {
        self.flags
            .iter()
            .filter(|flag| self.actual.contains(flag.name()))
    }

    /// Positional arguments left over by the last parse.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub(crate) fn set_args(&mut self, args: Vec<String>) {
        self.args = args;
    }

    fn insert(&mut self, flag: Flag) -> Result<(), FlagSetError> {
        self.check_name(flag.name())?;
        if self.contains(flag.name()) {
            return Err(self.redefined(flag.name()));
        }
        debug!(set = %self.name, flag = %flag.name, kind = %flag.kind(), "defined flag");
        self.index.insert(flag.name.clone(), self.flags.len());
        self.flags.push(flag);
        Ok(())
    }

    /// Names must be usable as `--name` and `--name=value`.
    fn check_name(&self, name: &str) -> Result<(), FlagSetError> {
        let reason = if name.is_empty() {
            "name is empty"
        } else if name.starts_with('-') {
            "name starts with '-'"
        } else if name.contains('=') {
            "name contains '='"
        } else if name.chars().any(char::is_whitespace) {
            "name contains whitespace"
        } else {
            return Ok(());
        };
        Err(FlagSetError::InvalidName {
            set: self.name.clone(),
            name: name.to_string(),
            reason,
        })
    }

    fn redefined(&self, name: &str) -> FlagSetError {
        FlagSetError::Redefined {
            set: self.name.clone(),
            name: name.to_string(),
        }
    }
}

impl<'a> IntoIterator for &'a FlagSet {
    type Item = &'a Flag;
    type IntoIter = std::slice::Iter<'a, Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
