use crate::trace::RegionId;

/// Append-only sequence of snapshots, one per processed region, addressed by region id.
///
/// Snapshots are never modified once pushed, so any later region can look back at any
/// earlier prefix.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotHistory<T> {
    snapshots: Vec<T>,
}

impl<T> SnapshotHistory<T> {
    pub const fn new() -> Self {
        Self { snapshots: vec![] }
    }

    /// Record the snapshot of the next region, returning that region's id
    pub fn push(&mut self, snapshot: T) -> RegionId {
        let region = RegionId::try_from(self.snapshots.len()).unwrap_or(RegionId::MAX);
        self.snapshots.push(snapshot);
        region
    }

    pub fn get(&self, region: RegionId) -> Option<&T> {
        usize::try_from(region)
            .ok()
            .and_then(|index| self.snapshots.get(index))
    }
}

impl<T> Default for SnapshotHistory<T> {
    fn default() -> Self {
        Self::new()
    }
}
