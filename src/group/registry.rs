//! Name-to-group lookup shared by the local API and the peer server.

use super::{Group, GroupBuilder, Loader};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A set of groups addressable by name.
///
/// Groups are added once and live as long as the registry. Create one
/// registry per process and hand it to whatever needs lookups, such as
/// [`HttpPool`](crate::peers::HttpPool).
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a group with `capacity_bytes` of local storage and register it.
    pub fn new_group(
        &self,
        name: impl Into<String>,
        capacity_bytes: usize,
        loader: impl Loader,
    ) -> Result<Arc<Group>> {
        self.build(
            Group::builder(name)
                .capacity_bytes(capacity_bytes)
                .loader(loader),
        )
    }

    /// Build the group described by `builder` and register it.
    pub fn build(&self, builder: GroupBuilder) -> Result<Arc<Group>> {
        let group = builder.build()?;
        self.register(group.clone())?;
        Ok(group)
    }

    /// Register an already built group.
    ///
    /// Fails with [`Error::DuplicateGroup`] if the name is taken.
    pub fn register(&self, group: Arc<Group>) -> Result<()> {
        let mut groups = self.groups.write();
        if groups.contains_key(group.name()) {
            return Err(Error::DuplicateGroup(group.name().to_string()));
        }

        info!(
            group = %group.name(),
            capacity_bytes = group.config().capacity_bytes,
            "Registered group"
        );
        groups.insert(group.name().to_string(), group);
        Ok(())
    }

    /// Look up a group by name.
    pub fn get_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Names of all registered groups, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}
