//! Per-session tracking and fallback state.
//!
//! A session owns one [`TrackStore`] and one [`FallbackHistory`] for
//! the lifetime of a single video. Neither survives across videos.

use std::collections::HashMap;

use redact_models::{Region, RegionSource};

/// A persistently identified region with a staleness counter.
#[derive(Debug, Clone)]
pub struct Track {
    pub region: Region,
    /// Frames since the primary detector last confirmed this id
    pub lost_count: u32,
}

/// Maps primary-detector track ids to their last accepted region.
#[derive(Debug, Default)]
pub struct TrackStore {
    tracks: HashMap<u64, Track>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh primary detection for a track id.
    pub fn refresh(&mut self, id: u64, region: Region) {
        self.tracks.insert(
            id,
            Track {
                region,
                lost_count: 0,
            },
        );
    }

    /// Age every track not refreshed this frame and return the regions
    /// still within the loss window. Tracks past `max_lost` are pruned.
    pub fn age_unrefreshed(&mut self, refreshed: &[u64], max_lost: u32) -> Vec<Region> {
        let mut carried = Vec::new();

        self.tracks.retain(|id, track| {
            if refreshed.contains(id) {
                return true;
            }
            track.lost_count += 1;
            if track.lost_count > max_lost {
                return false;
            }
            carried.push(track.region.clone().with_source(RegionSource::TrackFallback));
            true
        });

        carried
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.tracks.contains_key(&id)
    }
}

/// Last non-empty canonical region set plus the consecutive-empty
/// frame counter. Persists through tracker resets.
#[derive(Debug, Default)]
pub struct FallbackHistory {
    last_regions: Vec<Region>,
    empty_streak: u32,
}

impl FallbackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a non-empty canonical set, resetting the empty streak.
    pub fn record(&mut self, regions: &[Region]) {
        self.last_regions = regions.to_vec();
        self.empty_streak = 0;
    }

    /// Note an empty frame; returns the stored set while the streak is
    /// inside the loss window, or an empty slice otherwise.
    pub fn note_empty(&mut self, max_lost: u32) -> Vec<Region> {
        self.empty_streak += 1;
        if self.empty_streak > max_lost || self.last_regions.is_empty() {
            return Vec::new();
        }
        self.last_regions
            .iter()
            .cloned()
            .map(|r| r.with_source(RegionSource::HistoryFallback))
            .collect()
    }

    pub fn empty_streak(&self) -> u32 {
        self.empty_streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redact_models::RegionClass;

    fn region() -> Region {
        Region::new(10.0, 10.0, 50.0, 50.0, RegionClass::Penis, 0.9, RegionSource::Primary)
    }

    #[test]
    fn test_track_carried_through_loss_window() {
        let mut store = TrackStore::new();
        store.refresh(7, region());

        for _ in 0..15 {
            let carried = store.age_unrefreshed(&[], 15);
            assert_eq!(carried.len(), 1);
            assert_eq!(carried[0].source, RegionSource::TrackFallback);
        }
        // 16th miss prunes
        assert!(store.age_unrefreshed(&[], 15).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_refresh_resets_lost_count() {
        let mut store = TrackStore::new();
        store.refresh(1, region());
        for _ in 0..10 {
            store.age_unrefreshed(&[], 15);
        }
        store.refresh(1, region());
        for _ in 0..15 {
            assert_eq!(store.age_unrefreshed(&[], 15).len(), 1);
        }
    }

    #[test]
    fn test_refreshed_track_not_aged() {
        let mut store = TrackStore::new();
        store.refresh(3, region());
        let carried = store.age_unrefreshed(&[3], 15);
        assert!(carried.is_empty());
        assert!(store.contains(3));
    }

    #[test]
    fn test_history_window() {
        let mut history = FallbackHistory::new();
        history.record(&[region()]);

        for _ in 0..15 {
            let fallback = history.note_empty(15);
            assert_eq!(fallback.len(), 1);
            assert_eq!(fallback[0].source, RegionSource::HistoryFallback);
        }
        assert!(history.note_empty(15).is_empty());
    }

    #[test]
    fn test_history_without_record_is_empty() {
        let mut history = FallbackHistory::new();
        assert!(history.note_empty(15).is_empty());
    }

    #[test]
    fn test_record_resets_streak() {
        let mut history = FallbackHistory::new();
        history.record(&[region()]);
        history.note_empty(15);
        history.note_empty(15);
        assert_eq!(history.empty_streak(), 2);
        history.record(&[region()]);
        assert_eq!(history.empty_streak(), 0);
    }
}
