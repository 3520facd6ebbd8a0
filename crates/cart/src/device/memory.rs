//! In-memory device store shared by several browsing contexts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

use super::{DeviceStore, DeviceStoreError, StorageEvent};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// An in-memory device store modelled on one browser origin.
///
/// Each handle is a *context* (a tab). Contexts opened with
/// [`open_context`](Self::open_context) share the same entries; a write in
/// one context is announced to every other context's [`StorageEvents`]
/// stream, never to the writer's own.
#[derive(Clone)]
pub struct MemoryDeviceStore {
    origin: Arc<Origin>,
    context: u64,
}

struct Origin {
    entries: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<Envelope>,
    available: AtomicBool,
    next_context: AtomicU64,
}

#[derive(Debug, Clone)]
struct Envelope {
    from: u64,
    event: StorageEvent,
}

impl Default for MemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDeviceStore {
    /// Create a fresh origin and return its first context.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            origin: Arc::new(Origin {
                entries: Mutex::new(HashMap::new()),
                events,
                available: AtomicBool::new(true),
                next_context: AtomicU64::new(1),
            }),
            context: 0,
        }
    }

    /// Open another context (tab) on the same origin.
    #[must_use]
    pub fn open_context(&self) -> Self {
        Self {
            origin: Arc::clone(&self.origin),
            context: self.origin.next_context.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Subscribe to changes made by other contexts.
    #[must_use]
    pub fn subscribe(&self) -> StorageEvents {
        StorageEvents {
            rx: self.origin.events.subscribe(),
            context: self.context,
        }
    }

    /// Enable or disable the whole origin, simulating disabled storage.
    pub fn set_available(&self, available: bool) {
        self.origin.available.store(available, Ordering::SeqCst);
    }

    /// Remove every entry and announce a keyless event.
    ///
    /// # Errors
    ///
    /// Returns an error if storage is disabled.
    pub fn clear(&self) -> Result<(), DeviceStoreError> {
        self.check_available()?;
        self.entries().clear();
        self.announce(None);
        Ok(())
    }

    fn check_available(&self) -> Result<(), DeviceStoreError> {
        if self.origin.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DeviceStoreError::Unavailable(
                "storage disabled for this origin".to_string(),
            ))
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.origin
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, key: Option<&str>) {
        let envelope = Envelope {
            from: self.context,
            event: StorageEvent {
                key: key.map(str::to_owned),
            },
        };
        // No receivers is fine: nobody else is listening.
        if self.origin.events.send(envelope).is_err() {
            debug!(context = self.context, "No storage listeners");
        }
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn get(&self, key: &str) -> Result<Option<String>, DeviceStoreError> {
        self.check_available()?;
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DeviceStoreError> {
        self.check_available()?;
        self.entries().insert(key.to_owned(), value.to_owned());
        self.announce(Some(key));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), DeviceStoreError> {
        self.check_available()?;
        let existed = self.entries().remove(key).is_some();
        if existed {
            self.announce(Some(key));
        }
        Ok(())
    }
}

/// Stream of storage events originating in other contexts.
pub struct StorageEvents {
    rx: broadcast::Receiver<Envelope>,
    context: u64,
}

impl StorageEvents {
    /// Wait for the next event from another context.
    ///
    /// If this subscriber fell behind, a keyless event is returned so the
    /// caller invalidates everything. Returns `None` once the origin is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.from == self.context => {}
                Ok(envelope) => return Some(envelope.event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Storage event subscriber lagged");
                    return Some(StorageEvent { key: None });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Return the next pending event from another context without waiting.
    pub fn try_next(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(envelope) if envelope.from == self.context => {}
                Ok(envelope) => return Some(envelope.event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    return Some(StorageEvent { key: None });
                }
                Err(_) => return None,
            }
        }
    }
}
