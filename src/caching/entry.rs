use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::caching::{CacheContents, CacheError};
use crate::download::FetchStrategy;

/// A one-shot observer of a resource load.
///
/// Subscribers attached to an entry are notified exactly once, on the next
/// [`loaded`](ResourceEntry::loaded) transition, and detached afterwards.
pub trait Subscriber<P>: Send + Sync + 'static {
    /// Called when a load completes for `identifier`.
    ///
    /// `payload` is `None` when the fetch failed or produced undecodable
    /// bytes.
    fn notify(&self, identifier: &str, payload: Option<&P>);
}

/// A [`Subscriber`] wrapping a closure, optionally filtered to a single
/// identifier.
pub struct FnSubscriber<P, F> {
    identifier: Option<String>,
    callback: F,
    _payload: PhantomData<fn(&P)>,
}

impl<P, F> FnSubscriber<P, F>
where
    F: Fn(&str, Option<&P>) + Send + Sync + 'static,
{
    /// A subscriber that only reacts to loads of the given identifier.
    pub fn new(identifier: impl Into<String>, callback: F) -> Self {
        Self {
            identifier: Some(identifier.into()),
            callback,
            _payload: PhantomData,
        }
    }

    /// A subscriber that reacts to any load it is attached to.
    pub fn for_any(callback: F) -> Self {
        Self {
            identifier: None,
            callback,
            _payload: PhantomData,
        }
    }
}

impl<P, F> Subscriber<P> for FnSubscriber<P, F>
where
    P: Send + Sync + 'static,
    F: Fn(&str, Option<&P>) + Send + Sync + 'static,
{
    fn notify(&self, identifier: &str, payload: Option<&P>) {
        if self
            .identifier
            .as_deref()
            .is_none_or(|expected| expected == identifier)
        {
            (self.callback)(identifier, payload);
        }
    }
}

/// The durable observer an entry keeps across load rounds.
///
/// Unlike transient [`Subscriber`]s the sticky observer survives
/// notification; the cache uses it to write freshly loaded entries back
/// into the eviction map.
pub(crate) trait StickySubscriber<P>: Send + Sync + 'static {
    fn resource_loaded(&self, entry: &Arc<ResourceEntry<P>>);
}

struct EntryState<P> {
    payload: Option<P>,
    current_size: u64,
    previous_size: u64,
    fetch_strategy: Option<Arc<dyn FetchStrategy>>,
    subscribers: Vec<Arc<dyn Subscriber<P>>>,
    sticky: Option<Arc<dyn StickySubscriber<P>>>,
}

/// A single cached resource: identifier, payload slot, size bookkeeping and
/// the observers waiting on it.
///
/// Entries are shared as `Arc<ResourceEntry<P>>` between the eviction map,
/// in-flight loads and callers. Equality and hashing go by identifier only,
/// so two entries for the same identifier count as the same logical
/// resource regardless of their payload state.
pub struct ResourceEntry<P> {
    identifier: String,
    state: Mutex<EntryState<P>>,
}

impl<P> PartialEq for ResourceEntry<P> {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl<P> Eq for ResourceEntry<P> {}

impl<P> Hash for ResourceEntry<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

impl<P> fmt::Debug for ResourceEntry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ResourceEntry");
        dbg.field("identifier", &self.identifier);
        if let Ok(state) = self.state.try_lock() {
            dbg.field("loaded", &state.payload.is_some())
                .field("current_size", &state.current_size)
                .field("previous_size", &state.previous_size)
                .field("subscribers", &state.subscribers.len());
        }
        dbg.finish()
    }
}

impl<P: Clone + 'static> ResourceEntry<P> {
    pub fn new(identifier: impl Into<String>) -> CacheContents<Arc<Self>> {
        let identifier = identifier.into();
        if identifier.is_empty() {
            return Err(CacheError::InvalidIdentifier);
        }
        Ok(Arc::new(Self {
            identifier,
            state: Mutex::new(EntryState {
                payload: None,
                current_size: 0,
                previous_size: 0,
                fetch_strategy: None,
                subscribers: Vec::new(),
                sticky: None,
            }),
        }))
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn payload(&self) -> Option<P> {
        self.lock_state().payload.clone()
    }

    /// The byte weight of the currently held payload, 0 when unloaded.
    pub fn current_size(&self) -> u64 {
        self.lock_state().current_size
    }

    /// The byte weight the entry had before the most recent load.
    pub fn previous_size(&self) -> u64 {
        self.lock_state().previous_size
    }

    pub fn fetch_strategy(&self) -> Option<Arc<dyn FetchStrategy>> {
        self.lock_state().fetch_strategy.clone()
    }

    /// Overrides how this entry is fetched, instead of the cache default.
    pub fn set_fetch_strategy(&self, strategy: Option<Arc<dyn FetchStrategy>>) {
        self.lock_state().fetch_strategy = strategy;
    }

    /// Attaches a transient subscriber, unless a payload is already present.
    ///
    /// Returns the payload if there is one, in which case the subscriber
    /// was *not* attached and the caller is responsible for notifying it.
    /// This closes the race between a load completing and a late
    /// registration, which would otherwise never be notified.
    pub(crate) fn subscribe_or_payload(&self, subscriber: Arc<dyn Subscriber<P>>) -> Option<P> {
        let mut state = self.lock_state();
        if let Some(payload) = state.payload.clone() {
            return Some(payload);
        }
        state.subscribers.push(subscriber);
        None
    }

    /// Installs or replaces the durable observer. Passing the already
    /// installed observer is a no-op.
    pub(crate) fn set_sticky(&self, sticky: Option<Arc<dyn StickySubscriber<P>>>) {
        let mut state = self.lock_state();
        if let (Some(current), Some(new)) = (&state.sticky, &sticky) {
            if Arc::ptr_eq(current, new) {
                return;
            }
        }
        state.sticky = sticky;
    }

    /// Completes a load round.
    ///
    /// Rolls the size generations (previous ← current ← `size`), stores the
    /// payload, then notifies and detaches all transient subscribers and
    /// finally the sticky observer. `payload` is `None` for a failed fetch;
    /// subscribers are still notified so they can react to the absence.
    ///
    /// Callbacks run outside the entry lock, so they are free to touch the
    /// cache or this entry again.
    pub(crate) fn loaded(self: &Arc<Self>, payload: Option<P>, size: u64) {
        let (subscribers, sticky, payload) = {
            let mut state = self.lock_state();
            state.previous_size = state.current_size;
            state.current_size = size;
            state.payload = payload;
            let subscribers = std::mem::take(&mut state.subscribers);
            (subscribers, state.sticky.clone(), state.payload.clone())
        };
        for subscriber in subscribers {
            subscriber.notify(&self.identifier, payload.as_ref());
        }
        if let Some(sticky) = sticky {
            sticky.resource_loaded(self);
        }
    }

    /// Releases the payload and detaches all observers, sticky included.
    ///
    /// Size bookkeeping is left untouched; a recycled entry is expected to
    /// leave the cache rather than be re-accounted.
    pub(crate) fn recycle(&self) {
        let mut state = self.lock_state();
        state.payload = None;
        state.subscribers.clear();
        state.sticky = None;
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EntryState<P>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
