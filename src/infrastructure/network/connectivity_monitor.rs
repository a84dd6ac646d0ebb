use crate::application::ports::ReachabilityProbe;
use crate::domain::value_objects::Connectivity;
use async_trait::async_trait;
use tokio::sync::watch;

/// プラットフォームから通知されたネットワーク状態を保持する。
/// `current()` でポーリングでき、`subscribe()` で変化を待てる。
pub struct ConnectivityMonitor {
    sender: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (sender, _receiver) = watch::channel(initial);
        Self { sender }
    }

    /// 状態を更新する。値が変わらない場合は購読者を起こさない
    pub fn set(&self, connectivity: Connectivity) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == connectivity {
                false
            } else {
                *current = connectivity;
                true
            }
        });
        if changed {
            tracing::info!(
                target: "offline::connectivity",
                connected = connectivity.is_connected,
                wifi = connectivity.is_wifi,
                "Connectivity changed"
            );
        }
    }

    pub fn snapshot(&self) -> Connectivity {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.sender.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::offline())
    }
}

#[async_trait]
impl ReachabilityProbe for ConnectivityMonitor {
    async fn current(&self) -> Connectivity {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_transitions_only() {
        let monitor = ConnectivityMonitor::default();
        let mut rx = monitor.subscribe();

        monitor.set(Connectivity::offline());
        assert!(!rx.has_changed().unwrap());

        monitor.set(Connectivity::wifi());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Connectivity::wifi());
        assert_eq!(monitor.current().await, Connectivity::wifi());
    }
}
