//! Tag store: resources, their tags, and ordered links between them.
//!
//! The pipeline only reads from a [`TagStore`]. [`InMemoryTagStore`] also
//! exposes the administrative operations (register, link, reorder) needed to
//! populate it.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::model::{Application, Cluster, Command, ID_TAG_PREFIX, NAME_TAG_PREFIX, TagSet};
use crate::core::JobError;

/// Read-only view of resources and links used by the pipeline.
pub trait TagStore: Send + Sync {
    /// All clusters, in no particular order.
    fn clusters(&self) -> Vec<Cluster>;
    /// Commands linked to a cluster, in administrator priority order.
    fn commands_for_cluster(&self, cluster_id: &str) -> Vec<Command>;
    /// Applications linked to a command, in link order.
    fn applications_for_command(&self, command_id: &str) -> Vec<Application>;
    /// Look up one application.
    fn application(&self, id: &str) -> Option<Application>;
}

#[derive(Default)]
struct Inner {
    clusters: HashMap<String, Cluster>,
    commands: HashMap<String, Command>,
    applications: HashMap<String, Application>,
    cluster_commands: HashMap<String, Vec<String>>,
    command_applications: HashMap<String, Vec<String>>,
}

/// In-memory tag store for development/testing.
#[derive(Default)]
pub struct InMemoryTagStore {
    inner: RwLock<Inner>,
}

fn with_system_tags(tags: &mut TagSet, id: &str, name: &str) {
    tags.insert(format!("{ID_TAG_PREFIX}{id}"));
    tags.insert(format!("{NAME_TAG_PREFIX}{name}"));
}

impl InMemoryTagStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cluster. Adds the id and name tags.
    pub fn register_cluster(&self, mut cluster: Cluster) {
        with_system_tags(&mut cluster.tags, &cluster.id, &cluster.name);
        self.inner.write().clusters.insert(cluster.id.clone(), cluster);
    }

    /// Insert or replace a command. Adds the id and name tags.
    pub fn register_command(&self, mut command: Command) {
        with_system_tags(&mut command.tags, &command.id, &command.name);
        self.inner.write().commands.insert(command.id.clone(), command);
    }

    /// Insert or replace an application. Adds the id and name tags.
    pub fn register_application(&self, mut application: Application) {
        with_system_tags(&mut application.tags, &application.id, &application.name);
        self.inner
            .write()
            .applications
            .insert(application.id.clone(), application);
    }

    /// Append commands to a cluster's priority list. Already linked ids are skipped.
    ///
    /// # Errors
    ///
    /// `JobError::NotFound` if the cluster or any command is unknown.
    pub fn link_commands(&self, cluster_id: &str, command_ids: &[&str]) -> Result<(), JobError> {
        let mut inner = self.inner.write();
        if !inner.clusters.contains_key(cluster_id) {
            return Err(JobError::NotFound(format!("cluster {cluster_id}")));
        }
        if let Some(missing) = command_ids.iter().find(|id| !inner.commands.contains_key(**id)) {
            return Err(JobError::NotFound(format!("command {missing}")));
        }
        let linked = inner.cluster_commands.entry(cluster_id.to_string()).or_default();
        for id in command_ids {
            if !linked.iter().any(|existing| existing == id) {
                linked.push((*id).to_string());
            }
        }
        Ok(())
    }

    /// Replace a cluster's command priority order.
    ///
    /// # Errors
    ///
    /// `JobError::InvalidRequest` unless `ordered` is a permutation of the
    /// currently linked commands.
    pub fn reorder_commands(&self, cluster_id: &str, ordered: &[&str]) -> Result<(), JobError> {
        let mut inner = self.inner.write();
        let linked = inner
            .cluster_commands
            .get_mut(cluster_id)
            .ok_or_else(|| JobError::NotFound(format!("cluster {cluster_id}")))?;

        let mut current: Vec<&str> = linked.iter().map(String::as_str).collect();
        let mut proposed = ordered.to_vec();
        current.sort_unstable();
        proposed.sort_unstable();
        if current != proposed {
            return Err(JobError::InvalidRequest(format!(
                "reorder of cluster {cluster_id} must list exactly its linked commands"
            )));
        }
        *linked = ordered.iter().map(|s| (*s).to_string()).collect();
        Ok(())
    }

    /// Set a command's applications, in setup order.
    ///
    /// # Errors
    ///
    /// `JobError::NotFound` if the command or any application is unknown.
    pub fn link_applications(&self, command_id: &str, application_ids: &[&str]) -> Result<(), JobError> {
        let mut inner = self.inner.write();
        if !inner.commands.contains_key(command_id) {
            return Err(JobError::NotFound(format!("command {command_id}")));
        }
        if let Some(missing) = application_ids
            .iter()
            .find(|id| !inner.applications.contains_key(**id))
        {
            return Err(JobError::NotFound(format!("application {missing}")));
        }
        inner.command_applications.insert(
            command_id.to_string(),
            application_ids.iter().map(|s| (*s).to_string()).collect(),
        );
        Ok(())
    }

    /// Current command priority order of a cluster.
    #[must_use]
    pub fn command_order(&self, cluster_id: &str) -> Vec<String> {
        self.inner
            .read()
            .cluster_commands
            .get(cluster_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl TagStore for InMemoryTagStore {
    fn clusters(&self) -> Vec<Cluster> {
        self.inner.read().clusters.values().cloned().collect()
    }

    fn commands_for_cluster(&self, cluster_id: &str) -> Vec<Command> {
        let inner = self.inner.read();
        inner
            .cluster_commands
            .get(cluster_id)
            .map(|ids| ids.iter().filter_map(|id| inner.commands.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    fn applications_for_command(&self, command_id: &str) -> Vec<Application> {
        let inner = self.inner.read();
        inner
            .command_applications
            .get(command_id)
            .map(|ids| ids.iter().filter_map(|id| inner.applications.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    fn application(&self, id: &str) -> Option<Application> {
        self.inner.read().applications.get(id).cloned()
    }
}
