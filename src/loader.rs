//! The background fetch pipeline.
//!
//! Loads are deduplicated by identifier: while a unit for an identifier is
//! in flight, further load requests for it are dropped on the floor and the
//! waiting subscribers are served by the single in-flight unit's
//! notification.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::caching::{CacheKey, ResourceEntry};
use crate::codec::Codec;
use crate::download::FetchStrategy;

/// Spawns and deduplicates fetch units for resource entries.
pub(crate) struct ResourceLoader<C: Codec> {
    codec: Arc<C>,
    default_strategy: Arc<dyn FetchStrategy>,
    cache_dir: PathBuf,
    runtime: tokio::runtime::Handle,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl<C: Codec> Clone for ResourceLoader<C> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            default_strategy: Arc::clone(&self.default_strategy),
            cache_dir: self.cache_dir.clone(),
            runtime: self.runtime.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

/// Removes the identifier from the in-flight set when the unit finishes,
/// also on panic or cancellation.
struct InFlightToken {
    identifier: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.identifier);
        }
    }
}

impl<C: Codec> ResourceLoader<C> {
    pub fn new(
        codec: Arc<C>,
        default_strategy: Arc<dyn FetchStrategy>,
        cache_dir: PathBuf,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            codec,
            default_strategy,
            cache_dir,
            runtime,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The on-disk location for an identifier's bytes.
    pub fn resource_path(&self, identifier: &str) -> PathBuf {
        self.cache_dir
            .join(CacheKey::from_identifier(identifier).cache_path())
    }

    /// Schedules a background load for the entry.
    ///
    /// No-op when the entry already holds a payload or a unit for its
    /// identifier is already in flight. The unit always completes the entry
    /// via [`ResourceEntry::loaded`], with an absent payload on failure.
    pub fn load(&self, entry: Arc<ResourceEntry<C::Payload>>) {
        if entry.payload().is_some() {
            return;
        }

        let identifier = entry.identifier().to_owned();
        {
            let mut in_flight = match self.in_flight.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !in_flight.insert(identifier.clone()) {
                tracing::trace!(identifier, "Load already in flight");
                return;
            }
        }
        let token = InFlightToken {
            identifier,
            in_flight: Arc::clone(&self.in_flight),
        };

        let this = self.clone();
        self.runtime.spawn(async move {
            let payload = this.fetch_unit(&entry).await;
            let size = payload.as_ref().map_or(0, |p| this.codec.weight(p));
            entry.loaded(payload, size);
            drop(token);
        });
    }

    /// Runs one fetch unit: disk probe, fetch on miss, decode.
    ///
    /// Fetch errors are logged and swallowed here; the caller reports them
    /// to subscribers as an absent payload.
    async fn fetch_unit(&self, entry: &ResourceEntry<C::Payload>) -> Option<C::Payload> {
        let identifier = entry.identifier();
        let path = self.resource_path(identifier);

        if path.exists() {
            if let Some(payload) = self.decode(path.clone()).await {
                tracing::trace!(identifier, "Resource served from disk");
                return Some(payload);
            }
        }

        if let Some(parent) = path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(identifier, error = %err, "Failed to create cache directory");
                return None;
            }
        }

        let strategy = entry
            .fetch_strategy()
            .unwrap_or_else(|| Arc::clone(&self.default_strategy));
        if let Err(err) = strategy.fetch(identifier, &path).await {
            tracing::warn!(identifier, error = %err, "Failed to fetch resource");
        }

        if path.exists() {
            self.decode(path).await
        } else {
            None
        }
    }

    /// Decodes a cached file off the async workers, as decoding does
    /// synchronous file I/O.
    async fn decode(&self, path: PathBuf) -> Option<C::Payload> {
        let codec = Arc::clone(&self.codec);
        match tokio::task::spawn_blocking(move || codec.decode(&path)).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "Decode task panicked");
                None
            }
        }
    }
}
