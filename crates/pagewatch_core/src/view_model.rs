/// Snapshot of the watcher for host display and assertions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WatcherView {
    /// Tracked URLs in round-robin order.
    pub tracked: Vec<String>,
    /// Current round-robin position.
    pub cursor: usize,
    pub stopped: bool,
    /// Number of tracked URLs that were declared externally.
    pub external: usize,
}
