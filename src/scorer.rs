use crate::attention::AttentionMap;
use crate::bbox::Region;
use crate::frame::Resolution;
use crate::report::{Entry, MemorabilityReport};
use crate::track::TrackRecord;

use std::collections::{HashMap, HashSet};

/// Cells of `map` covered by the record's bbox once it is taken from
/// `original` pixels onto the map grid
pub fn map_region(rec: &TrackRecord, map: &AttentionMap, original: Resolution) -> Region {
    let (sx, sy) = original.scale_to(map.width(), map.height());

    rec.bbox()
        .as_ltrb()
        .scale(sx, sy)
        .to_region(map.width(), map.height())
}

/// Mean attention inside the mapped bbox, 0 when nothing of it lands on the map
#[inline]
pub fn score(rec: &TrackRecord, map: &AttentionMap, original: Resolution) -> f64 {
    map.mean_in(&map_region(rec, map, original))
}

#[derive(Debug)]
struct Series {
    track_id: i64,
    entries: Vec<Entry>,
    frames: HashSet<i64>,
}

/// Per-track score series, tracks keep first appearance order
#[derive(Debug, Default)]
pub struct Aggregator {
    series: Vec<Series>,
    index: HashMap<i64, usize>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `score` to the track's series. A second score for a frame the
    /// track already has is rejected and `false` is returned.
    pub fn add(&mut self, frame_id: i64, track_id: i64, score: f64) -> bool {
        let idx = match self.index.get(&track_id) {
            Some(&idx) => idx,
            None => {
                self.series.push(Series {
                    track_id,
                    entries: Vec::new(),
                    frames: HashSet::new(),
                });
                self.index.insert(track_id, self.series.len() - 1);
                self.series.len() - 1
            }
        };

        let series = &mut self.series[idx];
        if !series.frames.insert(frame_id) {
            return false;
        }

        series.entries.push(Entry {
            frame: frame_id,
            score,
        });

        true
    }

    #[inline]
    pub fn num_tracks(&self) -> usize {
        self.series.len()
    }

    #[inline]
    pub fn num_entries(&self) -> usize {
        self.series.iter().map(|s| s.entries.len()).sum()
    }

    pub fn finalize(self) -> MemorabilityReport {
        MemorabilityReport::new(
            self.series
                .into_iter()
                .map(|s| (s.track_id, s.entries))
                .collect(),
        )
    }
}
