use crate::attention::{AttentionIndex, AttentionMap};
use crate::config::ExtractConfig;
use crate::error::Error;
use crate::frame::Resolution;
use crate::report::MemorabilityReport;
use crate::scorer::{self, Aggregator};
use crate::track::{MotReader, TrackRecord};

use std::path::PathBuf;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractStats {
    pub records: usize,
    /// records of frames without any attention map
    pub skipped: usize,
    pub duplicates: usize,
    pub maps_loaded: usize,
}

/// Single pass over track records scoring each one against the most refined
/// attention map of its frame
pub struct Extractor {
    index: AttentionIndex,
    original: Resolution,
    aggregator: Aggregator,
    cached: Option<(i64, AttentionMap)>,
    /// (rows, cols) every map of the run must share
    grid: Option<(usize, usize)>,
    stats: ExtractStats,
}

impl Extractor {
    pub fn new(index: AttentionIndex, original: Resolution) -> Self {
        Self {
            index,
            original,
            aggregator: Aggregator::new(),
            cached: None,
            grid: None,
            stats: ExtractStats::default(),
        }
    }

    /// Decodes the map of `frame` unless it is the one decoded last
    fn map_for(&mut self, frame: i64, path: PathBuf) -> Result<&AttentionMap, Error> {
        let map = match self.cached.take() {
            Some((cached, map)) if cached == frame => map,
            _ => {
                let map = AttentionMap::load(&path)?;
                self.stats.maps_loaded += 1;

                let found = (map.height(), map.width());
                match self.grid {
                    Some(expected) if expected != found => {
                        return Err(Error::GridMismatch {
                            path,
                            expected,
                            found,
                        })
                    }
                    Some(_) => {}
                    None => self.grid = Some(found),
                }

                map
            }
        };

        Ok(&self.cached.insert((frame, map)).1)
    }

    pub fn push(&mut self, rec: &TrackRecord) -> Result<(), Error> {
        self.stats.records += 1;

        let path = match self.index.latest(rec.frame_id) {
            Some(path) => path.to_path_buf(),
            None => {
                log::debug!(
                    "no attention map for frame {}, skipping track {}",
                    rec.frame_id,
                    rec.track_id
                );
                self.stats.skipped += 1;
                return Ok(());
            }
        };

        let original = self.original;
        let score = scorer::score(rec, self.map_for(rec.frame_id, path)?, original);

        if !self.aggregator.add(rec.frame_id, rec.track_id, score) {
            log::warn!(
                "track {} already has a score for frame {}, dropping duplicate",
                rec.track_id,
                rec.frame_id
            );
            self.stats.duplicates += 1;
        }

        Ok(())
    }

    #[inline]
    pub fn stats(&self) -> ExtractStats {
        self.stats
    }

    pub fn finish(self) -> (MemorabilityReport, ExtractStats) {
        (self.aggregator.finalize(), self.stats)
    }
}

/// Runs the whole extraction and writes both reports
pub fn run(config: &ExtractConfig) -> Result<(MemorabilityReport, ExtractStats), Error> {
    config.validate()?;

    let index = AttentionIndex::scan(&config.attention_dir)?;
    log::info!(
        "found attention maps for {} frames in {}",
        index.len(),
        config.attention_dir.display()
    );

    let mut extractor = Extractor::new(index, config.original);
    for rec in MotReader::open(&config.tracks)? {
        extractor.push(&rec?)?;
    }

    let (report, stats) = extractor.finish();
    log::info!(
        "scored {} of {} records over {} tracks ({} skipped, {} duplicates, {} maps decoded)",
        stats.records - stats.skipped - stats.duplicates,
        stats.records,
        report.series().len(),
        stats.skipped,
        stats.duplicates,
        stats.maps_loaded
    );

    report.write(&config.series_output, &config.totals_output)?;

    Ok((report, stats))
}
