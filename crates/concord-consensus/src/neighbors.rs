//! Node identity and the quorum-gated neighbor table.
//!
//! The neighbor set is fixed by configuration: a slot index is the position of
//! the neighbor's id in [`NodeIdentity::neighbor_ids`]. Packets from ids that
//! are not configured belong to some other network and are dropped.

use crate::error::{Error, Result};
use crate::{Fixed, N_MAX};

/// This node's id and its configured neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeIdentity {
    node_id: u8,
    neighbor_ids: [u8; N_MAX],
    neighbor_count: u8,
}

impl NodeIdentity {
    /// Validate and build an identity.
    ///
    /// Neighbor ids must be distinct, must not include `node_id`, and there may
    /// be at most [`N_MAX`] of them.
    pub fn new(node_id: u8, neighbors: &[u8]) -> Result<Self> {
        if neighbors.len() > N_MAX {
            return Err(Error::InvalidNetwork(format!(
                "{} neighbors exceeds capacity {}",
                neighbors.len(),
                N_MAX
            )));
        }
        let mut neighbor_ids = [0u8; N_MAX];
        for (i, &id) in neighbors.iter().enumerate() {
            if id == node_id {
                return Err(Error::InvalidNetwork(format!(
                    "node {} lists itself as a neighbor",
                    node_id
                )));
            }
            if neighbors[..i].contains(&id) {
                return Err(Error::InvalidNetwork(format!("duplicate neighbor id {}", id)));
            }
            neighbor_ids[i] = id;
        }
        Ok(Self {
            node_id,
            neighbor_ids,
            neighbor_count: neighbors.len() as u8,
        })
    }

    /// This node's id.
    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    /// Configured neighbor ids, in slot order.
    pub fn neighbor_ids(&self) -> &[u8] {
        &self.neighbor_ids[..self.len()]
    }

    /// Number of configured neighbors (N).
    pub fn len(&self) -> usize {
        self.neighbor_count as usize
    }

    /// Whether no neighbor is configured.
    pub fn is_empty(&self) -> bool {
        self.neighbor_count == 0
    }

    /// Slot index of a neighbor id.
    pub fn index_of(&self, id: u8) -> Option<usize> {
        self.neighbor_ids().iter().position(|&n| n == id)
    }
}

/// Latest knowledge about one neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighborSlot {
    /// Last observed broadcast value (the neighbor's vstate).
    pub observed_value: Fixed,
    /// Whether the neighbor advertised itself as participating.
    pub enabled: bool,
    /// Whether the neighbor has been heard during this run.
    pub available: bool,
}

/// Fixed-capacity neighbor table.
///
/// Only the first `identity.len()` slots are meaningful. Until every
/// configured neighbor has been heard, packets only mark their slot available
/// and park the value; the slots keep their seed values and stay disabled. The
/// parked values are copied in when quorum latches, and from then on packets
/// overwrite their slot directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighborTable {
    slots: [NeighborSlot; N_MAX],
    parked: [Option<(Fixed, bool)>; N_MAX],
    all_observed: bool,
}

impl NeighborTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear availability and seed every value, for a new run.
    pub fn reset(&mut self, seed_value: Fixed) {
        self.slots = [NeighborSlot {
            observed_value: seed_value,
            enabled: false,
            available: false,
        }; N_MAX];
        self.parked = [None; N_MAX];
        self.all_observed = false;
    }

    /// Record a packet from `node_id`, returning the quorum flag.
    ///
    /// Unknown ids leave the table untouched. Before quorum the value is only
    /// parked.
    pub fn observe(
        &mut self,
        identity: &NodeIdentity,
        node_id: u8,
        value: Fixed,
        enabled: bool,
    ) -> bool {
        if let Some(index) = identity.index_of(node_id) {
            if self.all_observed {
                let slot = &mut self.slots[index];
                slot.observed_value = value;
                slot.enabled = enabled;
            } else {
                self.parked[index] = Some((value, enabled));
            }
            self.mark_available(identity, index);
        }
        self.all_observed
    }

    /// Record that `node_id` was heard without taking its value.
    pub fn mark_seen(&mut self, identity: &NodeIdentity, node_id: u8) -> bool {
        if let Some(index) = identity.index_of(node_id) {
            self.mark_available(identity, index);
        }
        self.all_observed
    }

    fn mark_available(&mut self, identity: &NodeIdentity, index: usize) {
        self.slots[index].available = true;
        // Latched until the next reset.
        if !self.all_observed && !identity.is_empty() {
            self.all_observed = self.slots[..identity.len()].iter().all(|s| s.available);
            if self.all_observed {
                self.release_parked();
            }
        }
    }

    fn release_parked(&mut self) {
        for (slot, parked) in self.slots.iter_mut().zip(self.parked.iter_mut()) {
            if let Some((value, enabled)) = parked.take() {
                slot.observed_value = value;
                slot.enabled = enabled;
            }
        }
    }

    /// Whether every configured neighbor has been heard this run.
    pub fn all_observed(&self) -> bool {
        self.all_observed
    }

    /// Slot by index.
    pub fn slot(&self, index: usize) -> Option<&NeighborSlot> {
        self.slots.get(index)
    }

    /// The meaningful slots for an identity.
    pub fn slots<'a>(&'a self, identity: &NodeIdentity) -> &'a [NeighborSlot] {
        &self.slots[..identity.len()]
    }

    /// Observed values of the slots whose neighbor is enabled.
    pub fn enabled_values<'a>(
        &'a self,
        identity: &NodeIdentity,
    ) -> impl Iterator<Item = Fixed> + 'a {
        self.slots[..identity.len()]
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.observed_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn identity(neighbors: &[u8]) -> NodeIdentity {
        NodeIdentity::new(1, neighbors).unwrap()
    }

    #[test]
    fn identity_validation() {
        assert!(NodeIdentity::new(1, &[2, 3, 4, 5]).is_ok());
        assert!(NodeIdentity::new(1, &[2, 3, 4, 5, 6]).is_err());
        assert!(NodeIdentity::new(1, &[2, 1]).is_err());
        assert!(NodeIdentity::new(1, &[2, 2]).is_err());
        assert!(NodeIdentity::new(1, &[]).unwrap().is_empty());
    }

    #[test]
    fn index_follows_configuration_order() {
        let id = identity(&[7, 3, 9]);
        assert_eq!(id.index_of(7), Some(0));
        assert_eq!(id.index_of(9), Some(2));
        assert_eq!(id.index_of(1), None);
    }

    #[test]
    fn unknown_neighbor_is_dropped() {
        let id = identity(&[2]);
        let mut table = NeighborTable::new();
        table.reset(50);

        assert!(!table.observe(&id, 42, 999, true));
        assert_eq!(table.slot(0).unwrap().observed_value, 50);
        assert!(!table.slot(0).unwrap().available);
    }

    #[test]
    fn quorum_needs_every_neighbor() {
        let id = identity(&[2, 3]);
        let mut table = NeighborTable::new();
        table.reset(0);

        assert!(!table.observe(&id, 2, 10, true));
        assert!(!table.observe(&id, 2, 11, true));
        assert!(table.observe(&id, 3, 20, false));
        assert_eq!(table.slot(0).unwrap().observed_value, 11);
        assert!(!table.slot(1).unwrap().enabled);
    }

    #[test]
    fn disabled_neighbors_are_not_enabled_values() {
        let id = identity(&[2, 3]);
        let mut table = NeighborTable::new();
        table.reset(0);
        table.observe(&id, 2, 10, false);
        table.observe(&id, 3, 20, true);

        let values: Vec<_> = table.enabled_values(&id).collect();
        assert_eq!(values, vec![20]);
    }

    #[test]
    fn values_wait_for_quorum() {
        let id = identity(&[2, 3]);
        let mut table = NeighborTable::new();
        table.reset(50);

        assert!(!table.observe(&id, 2, 5_000, true));
        let slot = table.slot(0).unwrap();
        assert!(slot.available);
        assert_eq!(slot.observed_value, 50);
        assert!(!slot.enabled);
        assert_eq!(table.enabled_values(&id).count(), 0);

        assert!(table.observe(&id, 3, 7_000, true));
        let values: Vec<_> = table.enabled_values(&id).collect();
        assert_eq!(values, vec![5_000, 7_000]);

        table.observe(&id, 2, 6_000, false);
        assert_eq!(table.slot(0).unwrap().observed_value, 6_000);
        assert!(!table.slot(0).unwrap().enabled);
    }

    #[test]
    fn reset_drops_parked_values() {
        let id = identity(&[2, 3]);
        let mut table = NeighborTable::new();
        table.reset(50);
        table.observe(&id, 2, 5_000, true);
        table.reset(50);
        table.mark_seen(&id, 2);
        assert!(table.mark_seen(&id, 3));
        assert_eq!(table.slot(0).unwrap().observed_value, 50);
        assert!(!table.slot(0).unwrap().enabled);
    }

    #[test]
    fn mark_seen_keeps_seed_value() {
        let id = identity(&[2]);
        let mut table = NeighborTable::new();
        table.reset(50);
        assert!(table.mark_seen(&id, 2));
        assert_eq!(table.slot(0).unwrap().observed_value, 50);
    }

    #[test]
    fn empty_network_never_reaches_quorum() {
        let id = identity(&[]);
        let mut table = NeighborTable::new();
        table.reset(0);
        assert!(!table.observe(&id, 2, 1, true));
    }

    proptest! {
        #[test]
        fn quorum_is_monotonic_within_a_run(
            packets in proptest::collection::vec((0u8..8, any::<i32>(), any::<bool>()), 0..64)
        ) {
            let id = identity(&[2, 3, 5]);
            let mut table = NeighborTable::new();
            table.reset(0);

            let mut transitions = 0;
            let mut previous = false;
            for (node, value, enabled) in packets {
                let now = table.observe(&id, node, value, enabled);
                prop_assert!(!(previous && !now), "quorum reverted");
                if now && !previous {
                    transitions += 1;
                }
                previous = now;
            }
            prop_assert!(transitions <= 1);

            table.reset(0);
            prop_assert!(!table.all_observed());
        }
    }
}
