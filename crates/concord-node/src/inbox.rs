//! Neighbor reports handed from the radio to the slow path.
//!
//! The receive side folds every decoded advertisement into a per-id snapshot
//! pending in a [`LatestCell`]. A burst from several neighbors survives until
//! the slow path drains it, and a repeat from the same neighbor replaces that
//! neighbor's older report.

use std::collections::BTreeMap;

use concord_consensus::Fixed;
use concord_protocols::Advertisement;

use crate::cell::LatestCell;

/// Decoded neighbor broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborReport {
    pub node_id: u8,
    pub value: Fixed,
    pub enabled: bool,
}

impl From<Advertisement> for NeighborReport {
    fn from(ad: Advertisement) -> Self {
        Self {
            node_id: ad.node_id,
            value: ad.value,
            enabled: ad.is_enabled(),
        }
    }
}

/// Latest report per node id. Bounded by the `u8` id space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborSnapshot {
    reports: BTreeMap<u8, NeighborReport>,
}

impl NeighborSnapshot {
    /// Insert, replacing any older report from the same node.
    pub fn insert(&mut self, report: NeighborReport) {
        self.reports.insert(report.node_id, report);
    }

    pub fn get(&self, node_id: u8) -> Option<&NeighborReport> {
        self.reports.get(&node_id)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Reports in node id order.
    pub fn iter(&self) -> impl Iterator<Item = &NeighborReport> {
        self.reports.values()
    }
}

/// Cell between the radio receiver and the slow path.
pub type NeighborInbox = LatestCell<NeighborSnapshot>;

impl LatestCell<NeighborSnapshot> {
    /// Fold one report into the pending snapshot. Never blocks.
    pub fn deliver(&self, report: NeighborReport) {
        self.update(|snapshot| snapshot.insert(report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(node_id: u8, value: Fixed) -> NeighborReport {
        NeighborReport {
            node_id,
            value,
            enabled: true,
        }
    }

    #[test]
    fn same_neighbor_latest_wins() {
        let inbox = NeighborInbox::new();
        inbox.deliver(report(2, 10));
        inbox.deliver(report(2, 20));

        let snapshot = inbox.take().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(2).unwrap().value, 20);
        assert!(inbox.take().is_none());
    }

    #[test]
    fn burst_from_distinct_neighbors_is_kept() {
        let inbox = NeighborInbox::new();
        for id in [4, 2, 3] {
            inbox.deliver(report(id, id as Fixed));
        }
        let ids: Vec<u8> = inbox.take().unwrap().iter().map(|r| r.node_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn from_advertisement() {
        let r = NeighborReport::from(Advertisement::new(7, -5, false));
        assert_eq!(
            r,
            NeighborReport {
                node_id: 7,
                value: -5,
                enabled: false
            }
        );
    }
}
