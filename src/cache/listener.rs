//! Cache event listeners: synchronous (invoked inline on the mutating
//! thread) or asynchronous (queued to a dedicated dispatch thread).

use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;

use crate::errors::{CacheError, CacheResult};

/// A state transition a listener is notified of.
#[derive(Clone, Debug)]
pub enum CacheEvent<K, V> {
    Created { key: K, value: V },
    Updated { key: K, old_value: V, new_value: V },
    Removed { key: K, value: V },
    Expired { key: K, value: V },
}

/// Contract a registered listener implements.
pub trait CacheEventListener<K, V>: Send + Sync
where
    K: Eq + Hash + Clone,
{
    fn on_event(&self, event: &CacheEvent<K, V>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    Sync,
    Async,
}

pub struct ListenerConfig<K, V> {
    pub listener: Arc<dyn CacheEventListener<K, V>>,
    pub mode: DispatchMode,
}

/// Trait objects carry no derivable equality, so identity is by pointer:
/// two configs are equal iff they wrap the same listener `Arc` and mode.
impl<K, V> PartialEq for ListenerConfig<K, V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.listener, &other.listener) && self.mode == other.mode
    }
}

impl<K, V> Eq for ListenerConfig<K, V> {}

/// An opaque handle identifying a registered listener, used to deregister
/// it later. Equality is by registration order, not by listener identity,
/// since trait objects are not comparable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerRegistration(pub(crate) usize);

struct Registered<K, V> {
    id: usize,
    config: ListenerConfig<K, V>,
}

/// Owns the registered listener list and, lazily, the async dispatch
/// worker thread and its bounded queue.
pub(crate) struct ListenerRegistry<K, V> {
    listeners: Mutex<Vec<Registered<K, V>>>,
    next_id: std::sync::atomic::AtomicUsize,
    async_tx: Sender<Arc<CacheEvent<K, V>>>,
    async_rx_holder: Mutex<Option<Receiver<Arc<CacheEvent<K, V>>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    queue_capacity: usize,
}

impl<K, V> ListenerRegistry<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(queue_capacity: usize) -> Arc<Self> {
        let (tx, rx) = bounded(queue_capacity);
        Arc::new(Self {
            listeners: Mutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicUsize::new(0),
            async_tx: tx,
            async_rx_holder: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
            queue_capacity,
        })
    }

    pub(crate) fn register(
        self: &Arc<Self>,
        config: ListenerConfig<K, V>,
    ) -> CacheResult<ListenerRegistration> {
        if self.listeners.lock().iter().any(|r| r.config == config) {
            return Err(CacheError::DuplicateListener);
        }
        self.ensure_worker();
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.listeners.lock().push(Registered { id, config });
        Ok(ListenerRegistration(id))
    }

    pub(crate) fn deregister(&self, registration: ListenerRegistration) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|r| r.id != registration.0);
        listeners.len() != before
    }

    fn ensure_worker(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let Some(rx) = self.async_rx_holder.lock().take() else { return };
        let registry = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("tricache-listener".into())
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    registry.dispatch_sync_and_async_inline(&event, DispatchMode::Async);
                }
            })
            .expect("failed to spawn listener dispatch thread");
        *worker = Some(handle);
    }

    fn dispatch_sync_and_async_inline(&self, event: &CacheEvent<K, V>, mode: DispatchMode) {
        for registered in self.listeners.lock().iter() {
            if registered.config.mode != mode {
                continue;
            }
            let listener = Arc::clone(&registered.config.listener);
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if let Err(_err) = result {
                log::warn!("cache event listener panicked; continuing with remaining listeners");
            }
        }
    }

    /// Invokes sync listeners inline and enqueues the event once for async
    /// listeners. If the bounded queue is full the event is dropped for the
    /// async listeners (they are explicitly best-effort); sync listeners are
    /// unaffected.
    pub(crate) fn notify(&self, event: CacheEvent<K, V>) {
        self.dispatch_sync_and_async_inline(&event, DispatchMode::Sync);
        if self.listeners.lock().iter().any(|r| r.config.mode == DispatchMode::Async) {
            let event = Arc::new(event);
            if let Err(TrySendError::Full(_)) = self.async_tx.try_send(event) {
                log::warn!(
                    "async listener queue at capacity ({}); dropping event",
                    self.queue_capacity
                );
            }
        }
    }
}
