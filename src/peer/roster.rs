//! Local membership view of the cluster.

use crate::wire::{PeerId, PeerInfo};

/// Membership view: peer descriptors kept sorted ascending by id. Ids are
/// never reused; entries only leave the view through crash-stop compaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster(Vec<PeerInfo>);

impl Roster {
    /// Builds a view from a registrar snapshot.
    pub fn new(mut peers: Vec<PeerInfo>) -> Self {
        peers.sort_by_key(|p| p.id);
        Roster(peers)
    }

    /// Number of peers currently in the view.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the given id is still in the view.
    #[inline]
    pub fn contains(&self, id: PeerId) -> bool {
        self.0.iter().any(|p| p.id == id)
    }

    /// Looks up the descriptor of the given id.
    pub fn get(&self, id: PeerId) -> Option<PeerInfo> {
        self.0.iter().find(|p| p.id == id).copied()
    }

    /// Compacts the view after a detected crash.
    pub fn remove(&mut self, id: PeerId) {
        self.0.retain(|p| p.id != id);
    }

    /// Largest id currently in the view.
    pub fn max_id(&self) -> Option<PeerId> {
        self.0.last().map(|p| p.id)
    }

    /// Peers with ids strictly above the given id, ascending.
    pub fn higher_than(&self, id: PeerId) -> Vec<PeerInfo> {
        self.0.iter().filter(|p| p.id > id).copied().collect()
    }

    /// All peers other than the given id, ascending.
    pub fn others(&self, id: PeerId) -> Vec<PeerInfo> {
        self.0.iter().filter(|p| p.id != id).copied().collect()
    }

    /// The peer after the given id by position on the compacted view, i.e.
    /// its current ring successor. None when the id is alone in the view.
    pub fn successor_of(&self, id: PeerId) -> Option<PeerInfo> {
        let next = self
            .0
            .iter()
            .find(|p| p.id > id)
            .or_else(|| self.0.first());
        match next {
            Some(p) if p.id != id => Some(*p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: PeerId) -> PeerInfo {
        PeerInfo {
            id,
            addr: format!("127.0.0.1:{}", 9000 + id as u16).parse().unwrap(),
        }
    }

    #[test]
    fn new_sorts_by_id() {
        let roster = Roster::new(vec![peer(2), peer(0), peer(1)]);
        assert_eq!(roster.max_id(), Some(2));
        assert_eq!(
            roster.others(1),
            vec![peer(0), peer(2)] // ascending
        );
    }

    #[test]
    fn remove_compacts() {
        let mut roster = Roster::new(vec![peer(0), peer(1), peer(2)]);
        roster.remove(1);
        assert_eq!(roster.len(), 2);
        assert!(!roster.contains(1));
        assert_eq!(roster.get(2), Some(peer(2)));

        // ids are never reused; removing twice is a no-op
        roster.remove(1);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn higher_than_ascending() {
        let roster = Roster::new(vec![peer(3), peer(1), peer(0), peer(2)]);
        assert_eq!(roster.higher_than(1), vec![peer(2), peer(3)]);
        assert_eq!(roster.higher_than(3), vec![]);
    }

    #[test]
    fn successor_wraps_around() {
        let roster = Roster::new(vec![peer(0), peer(1), peer(3)]);
        assert_eq!(roster.successor_of(0), Some(peer(1)));
        assert_eq!(roster.successor_of(1), Some(peer(3)));
        assert_eq!(roster.successor_of(3), Some(peer(0)));
    }

    #[test]
    fn successor_on_compacted_view() {
        let mut roster = Roster::new(vec![peer(0), peer(1), peer(2), peer(3)]);
        roster.remove(1);
        // successor is by position in the compacted view, not id + 1
        assert_eq!(roster.successor_of(0), Some(peer(2)));
        roster.remove(2);
        assert_eq!(roster.successor_of(0), Some(peer(3)));
    }

    #[test]
    fn successor_alone_is_none() {
        let roster = Roster::new(vec![peer(2)]);
        assert_eq!(roster.successor_of(2), None);
    }
}
