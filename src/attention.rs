use crate::bbox::Region;
use crate::error::Error;
use crate::npy;

use ndarray::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Zero padded width of the frame number in map file names
pub const FRAME_DIGITS: usize = 6;

/// Splits `img{frame:06}_step{step}.npy` into (frame, step). Frame numbers
/// are padded to six digits, wider ones carry no leading zero.
pub fn parse_file_name(name: &str) -> Option<(i64, u64)> {
    let stem = name.strip_prefix("img")?.strip_suffix(".npy")?;
    let (frame, step) = stem.split_once("_step")?;

    if !frame.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if frame.len() < FRAME_DIGITS || (frame.len() > FRAME_DIGITS && frame.starts_with('0')) {
        return None;
    }
    if step.is_empty() || !step.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some((frame.parse().ok()?, step.parse().ok()?))
}

/// Most refined attention map file for each frame of a directory
#[derive(Debug, Default)]
pub struct AttentionIndex {
    latest: HashMap<i64, (u64, PathBuf)>,
}

impl AttentionIndex {
    /// Lists `dir` once. Entries not named like `img000001_step3.npy` are ignored.
    pub fn scan(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let mut index = Self::default();

        for entry in std::fs::read_dir(dir).map_err(|e| Error::open(dir, e))? {
            let entry = entry?;
            let name = entry.file_name();

            if let Some((frame, step)) = name.to_str().and_then(parse_file_name) {
                index.insert(frame, step, entry.path());
            }
        }

        log::debug!(
            "indexed {} frames with attention maps in {}",
            index.len(),
            dir.display()
        );

        Ok(index)
    }

    /// Keeps `path` if `step` is the highest seen for `frame` so far
    pub fn insert(&mut self, frame: i64, step: u64, path: PathBuf) {
        match self.latest.get_mut(&frame) {
            Some(cur) if cur.0 >= step => {}
            Some(cur) => *cur = (step, path),
            None => {
                self.latest.insert(frame, (step, path));
            }
        }
    }

    #[inline]
    pub fn latest(&self, frame: i64) -> Option<&Path> {
        self.latest.get(&frame).map(|(_, p)| p.as_path())
    }

    #[inline]
    pub fn latest_step(&self, frame: i64) -> Option<u64> {
        self.latest.get(&frame).map(|(s, _)| *s)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

/// Attention intensity grid, rows are y
#[derive(Debug, Clone)]
pub struct AttentionMap {
    grid: Array2<f32>,
}

impl AttentionMap {
    pub fn new(grid: Array2<f32>) -> Self {
        Self { grid }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self::new(npy::read(path)?))
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.grid.ncols()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.grid.nrows()
    }

    /// Arithmetic mean over the cells of `region`, 0 when it is empty
    pub fn mean_in(&self, region: &Region) -> f64 {
        if region.is_empty() {
            return 0.0;
        }

        let cells = self
            .grid
            .slice(s![region.y1..region.y2, region.x1..region.x2]);
        let sum: f64 = cells.iter().map(|&v| v as f64).sum();

        sum / cells.len() as f64
    }
}
