use tokio::sync::broadcast;

/// Runtime connectivity signal: a flag readable without suspending plus a
/// stream of transition events (`true` = online).
pub trait ConnectivitySource: Send + Sync {
    fn is_online(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<bool>;
}
