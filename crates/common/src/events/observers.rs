use std::sync::Arc;

use async_trait::async_trait;

use super::{Event, Observer};

type Predicate = Box<dyn Fn(&Event) -> bool + Send + Sync>;

/// Forwards the events matching a predicate to an inner observer.
pub struct FilterObserver {
    predicate: Predicate,
    inner: Arc<dyn Observer>,
}

impl FilterObserver {
    pub fn new<F>(inner: Arc<dyn Observer>, predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            inner,
        }
    }
}

impl std::fmt::Debug for FilterObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterObserver").finish_non_exhaustive()
    }
}

#[async_trait]
impl Observer for FilterObserver {
    async fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        if (self.predicate)(event) {
            self.inner.on_event(event).await
        } else {
            Ok(())
        }
    }
}

/// Delivers every event to a fixed list of observers in order. All
/// members see the event even when an earlier one fails; the first error
/// is returned.
#[derive(Default)]
pub struct CompositeObserver {
    members: Vec<Arc<dyn Observer>>,
}

impl CompositeObserver {
    pub fn new(members: Vec<Arc<dyn Observer>>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl Observer for CompositeObserver {
    async fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        let mut first_error = None;
        for member in &self.members {
            if let Err(e) = member.on_event(event).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Logs every event at DEBUG.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

#[async_trait]
impl Observer for LogObserver {
    async fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        tracing::debug!(
            kind = %event.kind,
            path = %event.path,
            agent = %event.agent,
            extras = ?event.extras,
            "pod changed"
        );
        Ok(())
    }
}
