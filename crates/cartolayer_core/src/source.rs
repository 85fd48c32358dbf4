//! Data source handles
//!
//! A [`Source`] is the part of a data source that the layer core observes:
//! its lifecycle [`SourceState`] and a change notification stream. Concrete
//! sources (tiles, vector features, images) wrap a `Source` and call
//! [`Source::set_state`] / [`Source::changed`] as their own loading progresses.
//!
//! Sources are referenced by layers, never owned: swapping a layer's source
//! only stops listening to the old one.

use crate::events::{EventTarget, ListenerHandle};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a data source
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    /// No source, or a source that has not started loading
    #[default]
    Undefined,
    Loading,
    Ready,
    Error,
}

impl SourceState {
    /// Whether a layer with this source state takes part in frame rendering
    ///
    /// Layers without a source (`Undefined`) render; loading and failed
    /// sources are skipped.
    pub fn is_renderable(self) -> bool {
        matches!(self, SourceState::Ready | SourceState::Undefined)
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceState::Undefined => "undefined",
            SourceState::Loading => "loading",
            SourceState::Ready => "ready",
            SourceState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Events emitted by a source
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceEvent {
    /// Generic change: new data, new state, new attributions
    Change,
}

/// Unique identifier for a source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

struct SourceInner {
    id: SourceId,
    state: Cell<SourceState>,
    revision: Cell<u64>,
    attributions: RefCell<Vec<String>>,
    events: EventTarget<SourceEvent>,
}

/// Shared handle to a data source (cheap to clone)
#[derive(Clone)]
pub struct Source {
    inner: Rc<SourceInner>,
}

impl Source {
    /// Create a source in the given state
    pub fn new(state: SourceState) -> Self {
        Self {
            inner: Rc::new(SourceInner {
                id: SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)),
                state: Cell::new(state),
                revision: Cell::new(0),
                attributions: RefCell::new(Vec::new()),
                events: EventTarget::new(),
            }),
        }
    }

    pub fn with_attributions<I, S>(self, attributions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.inner.attributions.borrow_mut() = attributions.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    pub fn state(&self) -> SourceState {
        self.inner.state.get()
    }

    /// Move the source to a new lifecycle state
    ///
    /// Emits a change notification when the state actually changes.
    pub fn set_state(&self, state: SourceState) {
        if self.inner.state.replace(state) != state {
            tracing::debug!(source = %self.id(), %state, "source state changed");
            self.changed();
        }
    }

    /// Bump the revision and notify listeners
    pub fn changed(&self) {
        self.inner.revision.set(self.inner.revision.get() + 1);
        self.inner.events.notify(SourceEvent::Change);
    }

    /// Number of change notifications emitted so far
    pub fn revision(&self) -> u64 {
        self.inner.revision.get()
    }

    pub fn attributions(&self) -> Vec<String> {
        self.inner.attributions.borrow().clone()
    }

    pub fn set_attributions(&self, attributions: Vec<String>) {
        *self.inner.attributions.borrow_mut() = attributions;
        self.changed();
    }

    /// Listen to this source's change notifications
    #[must_use = "dropping the handle leaves the listener registered with no way to cancel it"]
    pub fn listen<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&SourceEvent) + 'static,
    {
        self.inner.events.listen(move |event| listener(event))
    }

    /// Number of active change listeners (one per bound layer)
    pub fn listener_count(&self) -> usize {
        self.inner.events.listener_count()
    }

    /// Whether two handles refer to the same source
    pub fn ptr_eq(&self, other: &Source) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Source {
    fn default() -> Self {
        Self::new(SourceState::Undefined)
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .field("revision", &self.inner.revision.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_state_notifies_only_on_change() {
        let source = Source::new(SourceState::Loading);
        let calls = Rc::new(Cell::new(0));

        let calls_clone = calls.clone();
        let _handle = source.listen(move |_| calls_clone.set(calls_clone.get() + 1));

        source.set_state(SourceState::Loading);
        assert_eq!(calls.get(), 0);

        source.set_state(SourceState::Ready);
        assert_eq!(calls.get(), 1);
        assert_eq!(source.state(), SourceState::Ready);
        assert_eq!(source.revision(), 1);
    }

    #[test]
    fn test_renderable_states() {
        assert!(SourceState::Ready.is_renderable());
        assert!(SourceState::Undefined.is_renderable());
        assert!(!SourceState::Loading.is_renderable());
        assert!(!SourceState::Error.is_renderable());
    }

    #[test]
    fn test_attributions_trigger_change() {
        let source = Source::new(SourceState::Ready).with_attributions(["© Contributors"]);
        assert_eq!(source.attributions(), vec!["© Contributors".to_string()]);

        source.set_attributions(vec!["Other".into()]);
        assert_eq!(source.revision(), 1);
    }

    #[test]
    fn test_identity() {
        let a = Source::default();
        let b = a.clone();
        let c = Source::default();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a.id(), c.id());
    }
}
