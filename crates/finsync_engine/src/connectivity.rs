//! Network reachability and the connectivity-regained signal.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

/// Answers whether the active connection is validated as internet-capable.
///
/// An interface being up is not enough; the platform must have validated
/// that the connection actually reaches the internet.
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true when a validated internet path exists right now.
    fn has_validated_internet(&self) -> bool;
}

/// Capabilities of the active network as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkCapabilities {
    /// The network claims internet capability.
    pub internet: bool,
    /// The platform validated that the internet is reachable.
    pub validated: bool,
    /// The network is metered.
    pub metered: bool,
}

impl NetworkCapabilities {
    /// A validated internet-capable network.
    pub fn online() -> Self {
        Self {
            internet: true,
            validated: true,
            metered: false,
        }
    }

    /// True only when the network is both internet-capable and validated.
    pub fn is_validated_internet(&self) -> bool {
        self.internet && self.validated
    }
}

/// Tracks reachability and emits once per false→true edge.
///
/// Only the previous reachability boolean is remembered. Repeated reports
/// while online, and capability changes that do not cross the edge, emit
/// nothing.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    reachable: AtomicBool,
    edges: broadcast::Sender<()>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial reachability.
    pub fn new(initially_reachable: bool) -> Self {
        let (edges, _) = broadcast::channel(4);
        Self {
            reachable: AtomicBool::new(initially_reachable),
            edges,
        }
    }

    /// Records the latest reachability. Returns true if this was a
    /// false→true edge.
    pub fn report(&self, reachable: bool) -> bool {
        let previous = self.reachable.swap(reachable, Ordering::AcqRel);
        let regained = !previous && reachable;
        if regained {
            tracing::info!("validated internet regained");
            // No subscribers is fine.
            let _ = self.edges.send(());
        } else if previous && !reachable {
            tracing::info!("validated internet lost");
        }
        regained
    }

    /// Records a capability change from the platform.
    pub fn report_capabilities(&self, capabilities: NetworkCapabilities) -> bool {
        self.report(capabilities.is_validated_internet())
    }

    /// Subscribes to connectivity-regained edges.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.edges.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ConnectivityProbe for ConnectivityMonitor {
    fn has_validated_internet(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn emits_once_on_edge() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        assert!(monitor.report(true));
        assert!(!monitor.report(true));
        assert!(!monitor.report(true));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unvalidated_interface_is_not_reachable() {
        let monitor = ConnectivityMonitor::new(false);
        let captive = NetworkCapabilities {
            internet: true,
            validated: false,
            metered: false,
        };
        assert!(!monitor.report_capabilities(captive));
        assert!(!monitor.has_validated_internet());

        assert!(monitor.report_capabilities(NetworkCapabilities::online()));
        assert!(monitor.has_validated_internet());
    }

    #[test]
    fn unrelated_capability_change_does_not_fire() {
        let monitor = ConnectivityMonitor::new(true);
        let metered = NetworkCapabilities {
            metered: true,
            ..NetworkCapabilities::online()
        };
        assert!(!monitor.report_capabilities(metered));
        assert!(!monitor.report_capabilities(NetworkCapabilities::online()));
    }

    proptest! {
        #[test]
        fn edges_match_rising_transitions(initial in any::<bool>(), reports in proptest::collection::vec(any::<bool>(), 0..64)) {
            let monitor = ConnectivityMonitor::new(initial);
            let mut previous = initial;
            let mut expected = 0usize;
            let mut emitted = 0usize;
            for reachable in reports {
                if !previous && reachable {
                    expected += 1;
                }
                if monitor.report(reachable) {
                    emitted += 1;
                }
                previous = reachable;
                prop_assert_eq!(monitor.has_validated_internet(), reachable);
            }
            prop_assert_eq!(emitted, expected);
        }
    }
}
