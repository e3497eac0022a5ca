use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::constants::RESERVED_FLAGS;
use crate::flag_set::{FlagSet, FlagSetError};
use crate::subcommand::Subcommand;

/// Errors raised while creating subcommands.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two subcommands were registered under one name. This is a bug in the host
    /// program's setup, callers should abort rather than recover.
    #[error("cannot add two subcommands with the same name: {0}")]
    DuplicateSubcommand(String),
    #[error(transparent)]
    Flag(#[from] FlagSetError),
}

/// A registry of subcommands, unique by name.
#[derive(Debug, Default)]
pub struct SubcommandRegistry {
    subcommands: Vec<Subcommand>,
    index: HashMap<String, usize>,
}

impl SubcommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a subcommand.
    ///
    /// The reserved config-loader flags are imported from `globals` when they are
    /// defined there. A duplicate name leaves the registry untouched.
    #[instrument(skip(self, globals))]
    pub fn create(
        &mut self,
        name: &str,
        globals: &FlagSet,
    ) -> Result<&mut Subcommand, RegistryError> {
        if self.index.contains_key(name) {
            return Err(RegistryError::DuplicateSubcommand(name.to_string()));
        }

        let mut subcommand = Subcommand::new(name);
        for reserved in RESERVED_FLAGS {
            subcommand.import_flag(globals, reserved)?;
        }

        let idx = self.subcommands.len();
        self.index.insert(name.to_string(), idx);
        self.subcommands.push(subcommand);
        debug!(total = self.subcommands.len(), "registered subcommand");
        Ok(&mut self.subcommands[idx])
    }

    /// Looks up a subcommand by name.
    pub fn get(&self, name: &str) -> Option<&Subcommand> {
        self.index.get(name).map(|&idx| &self.subcommands[idx])
    }

    /// Mutable lookup, used to parse into a subcommand's set.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Subcommand> {
        self.index
            .get(name)
            .map(|&idx| &mut self.subcommands[idx])
    }

    /// Whether a subcommand with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of registered subcommands.
    pub fn len(&self) -> usize {
        self.subcommands.len()
    }

    /// Returns true when no subcommand has been created.
    pub fn is_empty(&self) -> bool {
        self.subcommands.is_empty()
    }

    /// Subcommands in creation order.
    pub fn iter(&self) -> std::slice::Iter<'_, Subcommand> {
        self.subcommands.iter()
    }

    /// Subcommand names in creation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.subcommands.iter().map(Subcommand::name)
    }
}
