use crate::application::ports::ConnectivitySource;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CAPACITY: usize = 16;

/// Connectivity flag fed by the host (OS network callbacks, a health probe,
/// a UI toggle). Only actual changes are broadcast.
pub struct ConnectivitySignal {
    online: AtomicBool,
    events: broadcast::Sender<bool>,
}

impl ConnectivitySignal {
    pub fn new(online: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            online: AtomicBool::new(online),
            events,
        }
    }

    /// Returns whether the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        if self.online.swap(online, Ordering::SeqCst) == online {
            return false;
        }
        if let Err(e) = self.events.send(online) {
            debug!("No connectivity subscribers for event: {}", e);
        }
        true
    }

    pub fn go_online(&self) -> bool {
        self.set_online(true)
    }

    pub fn go_offline(&self) -> bool {
        self.set_online(false)
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivitySource for ConnectivitySignal {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.events.subscribe()
    }
}
