//! The cache facade tying eviction, loading and persistence together.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;

use crate::caching::{
    EvictingCache, EvictionPolicy, ResourceEntry, StickySubscriber, Subscriber,
};
use crate::codec::Codec;
use crate::config::Config;
use crate::download::FetchStrategy;
use crate::loader::ResourceLoader;

/// Eviction policy over shared resource entries.
///
/// Entry weight is the current payload size; two entries are the same
/// logical resource when their identifiers match. Entries leaving the map
/// are recycled unless they are being replaced by themselves, which happens
/// on every writeback after a load.
struct EntryPolicy;

impl<P: Clone + Send + Sync + 'static> EvictionPolicy<String, Arc<ResourceEntry<P>>>
    for EntryPolicy
{
    fn size_of(&self, _key: &String, value: &Arc<ResourceEntry<P>>) -> u64 {
        value.current_size()
    }

    fn previous_size_of(&self, _key: &String, value: &Arc<ResourceEntry<P>>) -> u64 {
        value.previous_size()
    }

    fn same_value(&self, old: &Arc<ResourceEntry<P>>, new: &Arc<ResourceEntry<P>>) -> bool {
        old == new
    }

    fn entry_removed(
        &self,
        evicted: bool,
        key: &String,
        old: Arc<ResourceEntry<P>>,
        new: Option<&Arc<ResourceEntry<P>>>,
    ) {
        if new.is_none_or(|new| new != &old) {
            tracing::trace!(identifier = key, evicted, "Recycling resource entry");
            old.recycle();
        }
    }
}

type Lru<P> = EvictingCache<String, Arc<ResourceEntry<P>>, EntryPolicy>;

struct PersistJob<P> {
    payload: P,
    path: PathBuf,
}

struct CacheShared<C: Codec> {
    lru: Mutex<Lru<C::Payload>>,
    loader: ResourceLoader<C>,
    codec: Arc<C>,
    persist_tx: mpsc::Sender<PersistJob<C::Payload>>,
    writeback: Arc<dyn StickySubscriber<C::Payload>>,
}

/// The durable observer installed on every entry the cache hands out.
///
/// Re-inserts freshly loaded entries into the eviction map so their new
/// size is accounted and their recency refreshed.
struct Writeback<C: Codec> {
    shared: Weak<CacheShared<C>>,
}

impl<C: Codec> StickySubscriber<C::Payload> for Writeback<C> {
    fn resource_loaded(&self, entry: &Arc<ResourceEntry<C::Payload>>) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut lru = lock(&shared.lru);
        lru.put(entry.identifier().to_owned(), Arc::clone(entry));
    }
}

/// Point-in-time counters for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
}

/// An in-process cache for remotely fetched binary resources.
///
/// Resources are addressed by an identifier string (typically a URL),
/// fetched in the background, persisted to a disk cache and held in memory
/// under a size-bounded LRU. Callers observe loads through one-shot
/// [`Subscriber`]s; each distinct load completion notifies a given
/// subscriber at most once.
pub struct ImageCache<C: Codec> {
    shared: Arc<CacheShared<C>>,
}

impl<C: Codec> Clone for ImageCache<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Codec> std::fmt::Debug for ImageCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl<C: Codec> ImageCache<C> {
    /// Creates a cache backed by the given codec and default fetch
    /// strategy.
    ///
    /// The disk cache directory is created eagerly; background fetch units
    /// and the persistence worker run on the given runtime.
    pub fn new(
        config: &Config,
        codec: C,
        default_strategy: Arc<dyn FetchStrategy>,
        runtime: tokio::runtime::Handle,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(&config.cache_dir)?;

        let codec = Arc::new(codec);
        let (persist_tx, persist_rx) = mpsc::channel(config.persist_queue_size.max(1));
        runtime.spawn(persist_worker(Arc::clone(&codec), persist_rx));

        let loader = ResourceLoader::new(
            Arc::clone(&codec),
            default_strategy,
            config.cache_dir.clone(),
            runtime,
        );

        let shared = Arc::new_cyclic(|weak: &Weak<CacheShared<C>>| CacheShared {
            lru: Mutex::new(EvictingCache::with_budget(
                config.memory_budget,
                EntryPolicy,
            )),
            loader,
            codec,
            persist_tx,
            writeback: Arc::new(Writeback {
                shared: weak.clone(),
            }),
        });
        Ok(Self { shared })
    }

    /// The on-disk location of an identifier's bytes, whether or not they
    /// exist yet.
    pub fn resource_path(&self, identifier: &str) -> PathBuf {
        self.shared.loader.resource_path(identifier)
    }

    /// Returns the payload for an identifier if it is resident in memory.
    ///
    /// Refreshes the entry's recency; never touches the disk or the
    /// network.
    pub fn get_cached(&self, identifier: &str) -> Option<C::Payload> {
        if identifier.is_empty() {
            return None;
        }
        let entry = lock(&self.shared.lru).get(&identifier.to_owned())?;
        entry.payload()
    }

    /// Like [`get_cached`](Self::get_cached), but falls back to a
    /// synchronous decode of the disk cache on a memory miss.
    ///
    /// A disk hit is inserted into the memory cache before returning.
    pub fn get_or_load_from_disk(&self, identifier: &str) -> Option<C::Payload> {
        if let Some(payload) = self.get_cached(identifier) {
            return Some(payload);
        }
        let path = self.resource_path(identifier);
        let payload = self.shared.codec.decode(&path)?;
        self.insert_loaded(identifier, payload.clone()).ok()?;
        Some(payload)
    }

    /// Inserts a payload directly, bypassing the fetch pipeline.
    ///
    /// With `persist` the payload is also queued for an encode to the disk
    /// cache; the write is best-effort and dropped with a log line when the
    /// queue is full. Subscribers already attached to the identifier's
    /// entry are notified as for any other load completion.
    pub fn seed(&self, identifier: &str, payload: C::Payload, persist: bool) {
        if persist {
            let job = PersistJob {
                payload: payload.clone(),
                path: self.resource_path(identifier),
            };
            match self.shared.persist_tx.try_send(job) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(identifier, "Persistence queue full, dropping write");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::error!(identifier, "Persistence worker is gone");
                }
            }
        }
        if let Err(err) = self.insert_loaded(identifier, payload) {
            tracing::warn!(identifier, error = %err, "Failed to seed resource");
        }
    }

    /// Attaches a subscriber to a resource and triggers a load if needed.
    ///
    /// On a memory hit the subscriber is notified synchronously, on this
    /// thread, before the call returns. Otherwise it is attached to the
    /// entry and notified once the background load completes. Passing an
    /// empty identifier is a no-op.
    ///
    /// `strategy` overrides how this resource is fetched; `None` keeps the
    /// cache default.
    pub fn register_observer(
        &self,
        identifier: &str,
        subscriber: Arc<dyn Subscriber<C::Payload>>,
        strategy: Option<Arc<dyn FetchStrategy>>,
    ) {
        if identifier.is_empty() {
            return;
        }

        let entry = {
            let mut lru = lock(&self.shared.lru);
            match lru.get(&identifier.to_owned()) {
                Some(entry) => entry,
                None => {
                    let Ok(entry) = ResourceEntry::new(identifier) else {
                        return;
                    };
                    entry.set_sticky(Some(Arc::clone(&self.shared.writeback)));
                    lru.put(identifier.to_owned(), Arc::clone(&entry));
                    entry
                }
            }
        };
        if strategy.is_some() {
            entry.set_fetch_strategy(strategy);
        }

        match entry.subscribe_or_payload(Arc::clone(&subscriber)) {
            // the entry already completed; deliver on the spot
            Some(payload) => subscriber.notify(identifier, Some(&payload)),
            None => self.shared.loader.load(entry),
        }
    }

    /// Registers the same subscriber for a batch of identifiers.
    pub fn register_bulk<I, S>(&self, identifiers: I, subscriber: Arc<dyn Subscriber<C::Payload>>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for identifier in identifiers {
            self.register_observer(identifier.as_ref(), Arc::clone(&subscriber), None);
        }
    }

    /// Drops every resident entry, recycling each. The disk cache is left
    /// in place.
    pub fn clear(&self) {
        lock(&self.shared.lru).evict_all();
    }

    pub fn stats(&self) -> CacheStats {
        let lru = lock(&self.shared.lru);
        CacheStats {
            entries: lru.len(),
            total_bytes: lru.total_bytes(),
            max_bytes: lru.max_bytes(),
        }
    }

    /// Completes a load for `identifier` with an externally supplied
    /// payload and inserts the entry into the eviction map.
    fn insert_loaded(
        &self,
        identifier: &str,
        payload: C::Payload,
    ) -> crate::caching::CacheContents<()> {
        let entry = {
            let mut lru = lock(&self.shared.lru);
            match lru.get(&identifier.to_owned()) {
                Some(entry) => entry,
                None => {
                    // complete the load before installing the writeback, so
                    // the single put below does all the accounting
                    let entry = ResourceEntry::new(identifier)?;
                    let weight = self.shared.codec.weight(&payload);
                    entry.loaded(Some(payload), weight);
                    entry.set_sticky(Some(Arc::clone(&self.shared.writeback)));
                    lru.put(identifier.to_owned(), Arc::clone(&entry));
                    return Ok(());
                }
            }
        };
        // resident entry: the sticky writeback re-inserts it with the new
        // size once the load round completes
        let weight = self.shared.codec.weight(&payload);
        entry.loaded(Some(payload), weight);
        Ok(())
    }
}

async fn persist_worker<C: Codec>(codec: Arc<C>, mut rx: mpsc::Receiver<PersistJob<C::Payload>>) {
    while let Some(job) = rx.recv().await {
        let codec = Arc::clone(&codec);
        let result = tokio::task::spawn_blocking(move || {
            persist_payload(&*codec, &job.payload, &job.path)
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "Failed to persist resource"),
            Err(err) => tracing::error!(error = %err, "Persistence task panicked"),
        }
    }
}

/// Writes a payload to its cache path via a temporary file in the same
/// directory, so concurrent readers never observe partial contents.
fn persist_payload<C: Codec>(
    codec: &C,
    payload: &C::Payload,
    path: &std::path::Path,
) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::Other, "no parent directory to persist item")
    })?;
    std::fs::create_dir_all(parent)?;
    let temp_file = tempfile::NamedTempFile::new_in(parent)?;
    codec.encode(payload, temp_file.path())?;
    temp_file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
