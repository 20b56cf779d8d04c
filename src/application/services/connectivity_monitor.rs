use crate::application::ports::ConnectivitySource;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Listener = Arc<dyn Fn(bool) + Send + Sync>;
type ReconnectHook = Arc<dyn Fn() + Send + Sync>;

/// Tracks whether the client is online and fans transitions out to
/// listeners.
pub struct ConnectivityMonitor {
    online: AtomicBool,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_listener_id: AtomicU64,
    reconnect_hook: Mutex<Option<ReconnectHook>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    /// Reads the initial state from `source` and follows its events on a
    /// background task. Without a source the monitor reports online and never
    /// transitions. Must be called inside a tokio runtime when a source is
    /// given.
    pub fn start(source: Option<Arc<dyn ConnectivitySource>>) -> Arc<Self> {
        // Subscribe before reading the flag so no transition falls in between.
        let receiver = source.as_ref().map(|source| source.subscribe());
        let initial = source.as_ref().map_or(true, |source| source.is_online());

        let monitor = Arc::new(Self {
            online: AtomicBool::new(initial),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener_id: AtomicU64::new(0),
            reconnect_hook: Mutex::new(None),
            task: Mutex::new(None),
        });

        if let (Some(source), Some(receiver)) = (source, receiver) {
            let handle = tokio::spawn(follow(Arc::downgrade(&monitor), source, receiver));
            *lock(&monitor.task) = Some(handle);
        }

        info!(
            "Connectivity monitor started ({})",
            if initial { "online" } else { "offline" }
        );
        monitor
    }

    pub fn get_status(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Registers `listener` for every future transition. Listeners run on the
    /// monitor task, in registration order, and must not block.
    pub fn on_status_change<F>(self: &Arc<Self>, listener: F) -> ListenerHandle
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).insert(id, Arc::new(listener));
        ListenerHandle {
            monitor: Arc::downgrade(self),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Installs the callback run once per offline to online transition,
    /// after the listeners. Replaces any previous hook.
    pub fn set_reconnect_hook<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *lock(&self.reconnect_hook) = Some(Arc::new(hook));
    }

    fn apply(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            debug!("Ignoring repeated connectivity event ({})", online);
            return;
        }

        info!(
            "Connectivity changed: {}",
            if online { "online" } else { "offline" }
        );

        // Cloned out so listeners may (un)subscribe while being notified.
        let listeners: Vec<Listener> = lock(&self.listeners).values().cloned().collect();
        for listener in listeners {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(online))) {
                error!(
                    "Connectivity listener panicked: {}",
                    panic_payload_to_string(payload.as_ref())
                );
            }
        }

        if online {
            let hook = lock(&self.reconnect_hook).clone();
            if let Some(hook) = hook {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook())) {
                    error!(
                        "Reconnect hook panicked: {}",
                        panic_payload_to_string(payload.as_ref())
                    );
                }
            }
        }
    }

    fn remove_listener(&self, id: u64) -> bool {
        lock(&self.listeners).remove(&id).is_some()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }
}

/// Returned by [`ConnectivityMonitor::on_status_change`].
#[derive(Debug)]
pub struct ListenerHandle {
    monitor: Weak<ConnectivityMonitor>,
    id: u64,
}

impl ListenerHandle {
    /// Stops delivery to the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.monitor
            .upgrade()
            .is_some_and(|monitor| monitor.remove_listener(self.id))
    }
}

async fn follow(
    monitor: Weak<ConnectivityMonitor>,
    source: Arc<dyn ConnectivitySource>,
    mut receiver: broadcast::Receiver<bool>,
) {
    loop {
        let online = match receiver.recv().await {
            Ok(online) => online,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} connectivity events, resynchronizing", skipped);
                source.is_online()
            }
            Err(RecvError::Closed) => {
                debug!("Connectivity source closed");
                break;
            }
        };

        match monitor.upgrade() {
            Some(monitor) => monitor.apply(online),
            None => break,
        }
    }
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
