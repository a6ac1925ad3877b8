//! # Change events
//!
//! The LDP engine reports every committed mutation as an [`Event`]. The
//! [`Dispatcher`] fans events out to registered [`Observer`]s, one worker
//! task and one bounded queue per observer, so a slow observer never holds
//! up a request or another observer.

mod dispatcher;
mod observers;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::ResourcePath;

pub use dispatcher::{Dispatcher, DEFAULT_QUEUE_CAPACITY};
pub use observers::{CompositeObserver, FilterObserver, LogObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ResourceCreated,
    ResourceUpdated,
    ResourceDeleted,
    ContainerCreated,
    ContainerDeleted,
    AclChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::ResourceCreated,
        EventKind::ResourceUpdated,
        EventKind::ResourceDeleted,
        EventKind::ContainerCreated,
        EventKind::ContainerDeleted,
        EventKind::AclChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ResourceCreated => "ResourceCreated",
            EventKind::ResourceUpdated => "ResourceUpdated",
            EventKind::ResourceDeleted => "ResourceDeleted",
            EventKind::ContainerCreated => "ContainerCreated",
            EventKind::ContainerDeleted => "ContainerDeleted",
            EventKind::AclChanged => "ACLChanged",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed change. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub path: ResourcePath,
    pub timestamp: DateTime<Utc>,
    /// WebID of the acting agent, empty when anonymous.
    pub agent: String,
    pub extras: BTreeMap<String, String>,
}

impl Event {
    pub fn new(
        kind: EventKind,
        path: ResourcePath,
        timestamp: DateTime<Utc>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            path,
            timestamp,
            agent: agent.into(),
            extras: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

/// Receives events from a [`Dispatcher`].
///
/// Errors and panics are logged by the dispatcher and never end the
/// subscription.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn on_event(&self, event: &Event) -> anyhow::Result<()>;
}
