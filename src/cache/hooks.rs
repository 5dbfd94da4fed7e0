//! Entity presentation hooks.
//!
//! Rendering code announces every entity it presents; listeners subscribed
//! at startup are invoked synchronously, in subscription order.

use std::fmt;
use std::sync::Arc;

use super::tags::{self, entity_tag};

/// An entity was rendered into the current response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPresented {
    pub entity_type: String,
    pub entity_id: i64,
}

impl EntityPresented {
    pub fn new(entity_type: impl Into<String>, entity_id: i64) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
        }
    }

    pub fn tag(&self) -> String {
        entity_tag(&self.entity_type, self.entity_id)
    }
}

pub trait PresentationListener: Send + Sync {
    fn entity_presented(&self, event: &EntityPresented);
}

impl<F> PresentationListener for F
where
    F: Fn(&EntityPresented) + Send + Sync,
{
    fn entity_presented(&self, event: &EntityPresented) {
        self(event)
    }
}

/// Records presented entities on the current request's tag collector.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordTags;

impl PresentationListener for RecordTags {
    fn entity_presented(&self, event: &EntityPresented) {
        tags::record(&event.entity_type, event.entity_id);
    }
}

#[derive(Clone, Default)]
pub struct PresentationHooks {
    listeners: Vec<Arc<dyn PresentationListener>>,
}

impl PresentationHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose first listener feeds the page cache's tag collector.
    pub fn with_tag_recording() -> Self {
        let mut hooks = Self::new();
        hooks.subscribe(RecordTags);
        hooks
    }

    pub fn subscribe<L>(&mut self, listener: L) -> &mut Self
    where
        L: PresentationListener + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn dispatch(&self, event: &EntityPresented) {
        for listener in &self.listeners {
            listener.entity_presented(event);
        }
    }

    /// Shorthand for dispatching an [`EntityPresented`] built in place.
    pub fn presented(&self, entity_type: &str, entity_id: i64) {
        self.dispatch(&EntityPresented::new(entity_type, entity_id));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for PresentationHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationHooks")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
