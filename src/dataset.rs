//! Per-object feature table the analysis runs on.
//!
//! Rows come from a CSV with a header naming at least `video`, `object_id`,
//! `memo_score`, `area`, `bbox_x`, `bbox_y`, `bbox_w`, `bbox_h` and `color`.
//! Column order is free and extra columns are ignored.

use crate::error::Error;
use crate::math;

use itertools::Itertools;
use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Video,
    ObjectId,
    MemoScore,
    Area,
    BboxX,
    BboxY,
    BboxW,
    BboxH,
    Color,
}

impl Column {
    pub const ALL: [Column; 9] = [
        Column::Video,
        Column::ObjectId,
        Column::MemoScore,
        Column::Area,
        Column::BboxX,
        Column::BboxY,
        Column::BboxW,
        Column::BboxH,
        Column::Color,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::Video => "video",
            Column::ObjectId => "object_id",
            Column::MemoScore => "memo_score",
            Column::Area => "area",
            Column::BboxX => "bbox_x",
            Column::BboxY => "bbox_y",
            Column::BboxW => "bbox_w",
            Column::BboxH => "bbox_h",
            Column::Color => "color",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Column::ALL.iter().copied().find(|c| c.name() == name)
    }

    /// Text columns, modelled as categories
    #[inline]
    pub fn is_categorical(self) -> bool {
        matches!(self, Column::Video | Column::Color)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ObjectStat {
    pub video: String,
    pub object_id: i64,
    pub memo_score: f64,
    pub area: f64,
    pub bbox_x: f64,
    pub bbox_y: f64,
    pub bbox_w: f64,
    pub bbox_h: f64,
    pub color: String,
}

impl ObjectStat {
    pub fn numeric(&self, col: Column) -> Option<f64> {
        match col {
            Column::ObjectId => Some(self.object_id as f64),
            Column::MemoScore => Some(self.memo_score),
            Column::Area => Some(self.area),
            Column::BboxX => Some(self.bbox_x),
            Column::BboxY => Some(self.bbox_y),
            Column::BboxW => Some(self.bbox_w),
            Column::BboxH => Some(self.bbox_h),
            Column::Video | Column::Color => None,
        }
    }

    pub fn text(&self, col: Column) -> Option<&str> {
        match col {
            Column::Video => Some(&self.video),
            Column::Color => Some(&self.color),
            _ => None,
        }
    }

    #[inline]
    fn key(&self) -> (&str, i64) {
        (&self.video, self.object_id)
    }
}

/// First character upper case, the rest lower case
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Splits one CSV line, double quoted fields may contain commas and `""`
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    fields.push(cur);

    fields
}

/// A video column made only of integers is keyed by their plain decimal
/// form, so `01` and `1` name the same video. Mixed columns stay as text.
fn normalize_video_ids(rows: &mut [ObjectStat]) {
    let ids: Option<Vec<i64>> = rows.iter().map(|r| r.video.parse().ok()).collect();

    if let Some(ids) = ids {
        for (row, id) in rows.iter_mut().zip(ids) {
            row.video = id.to_string();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<ObjectStat>,
}

impl From<Vec<ObjectStat>> for Dataset {
    fn from(rows: Vec<ObjectStat>) -> Self {
        Self { rows }
    }
}

impl Dataset {
    pub fn read<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut lines = reader.lines().enumerate();

        let header = match lines.next() {
            Some((_, line)) => split_csv_line(line?.trim_end_matches('\r')),
            None => return Err(Error::parse(1, "empty file, expected a header")),
        };

        let mut positions = BTreeMap::new();
        for (idx, name) in header.iter().enumerate() {
            if let Some(col) = Column::from_name(name.trim()) {
                positions.entry(col).or_insert(idx);
            }
        }

        let missing = Column::ALL
            .iter()
            .filter(|c| !positions.contains_key(*c))
            .map(|c| c.name())
            .join(", ");
        if !missing.is_empty() {
            return Err(Error::parse(1, format!("missing columns: {}", missing)));
        }

        let mut rows = Vec::new();
        for (idx, line) in lines {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let lineno = idx + 1;
            let fields = split_csv_line(line);
            let get = |col: Column| -> Result<&str, Error> {
                fields
                    .get(positions[&col])
                    .map(|s| s.trim())
                    .ok_or_else(|| Error::parse(lineno, format!("no `{}` field", col.name())))
            };
            let num = |col: Column| -> Result<f64, Error> {
                let raw = get(col)?;
                raw.parse::<f64>().map_err(|_| {
                    Error::parse(lineno, format!("`{}`: `{}` is not a number", col.name(), raw))
                })
            };

            let object_id = num(Column::ObjectId)?;
            if object_id.fract() != 0.0 {
                return Err(Error::parse(lineno, "`object_id` must be an integer"));
            }

            rows.push(ObjectStat {
                video: get(Column::Video)?.to_string(),
                object_id: object_id as i64,
                memo_score: num(Column::MemoScore)?,
                area: num(Column::Area)?,
                bbox_x: num(Column::BboxX)?,
                bbox_y: num(Column::BboxY)?,
                bbox_w: num(Column::BboxW)?,
                bbox_h: num(Column::BboxH)?,
                color: capitalize(get(Column::Color)?),
            });
        }

        normalize_video_ids(&mut rows);

        Ok(Self { rows })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::open(path, e))?;

        Self::read(std::io::BufReader::new(file))
    }

    #[inline]
    pub fn rows(&self) -> &[ObjectStat] {
        &self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn numeric(&self, col: Column) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.numeric(col)).collect()
    }

    /// Highest scoring row of every (video, object), ordered by (video, object).
    /// The earliest row wins a tie.
    pub fn top_per_object(&self) -> Dataset {
        let mut best: BTreeMap<(&str, i64), &ObjectStat> = BTreeMap::new();
        for row in &self.rows {
            best.entry(row.key())
                .and_modify(|cur| {
                    if row.memo_score > cur.memo_score {
                        *cur = row;
                    }
                })
                .or_insert(row);
        }

        best.into_values().cloned().collect::<Vec<_>>().into()
    }

    /// Keeps rows with area inside the inclusive `[q(low), q(high)]` band and
    /// a positive score
    pub fn filter_outliers(&self, low: f64, high: f64) -> Dataset {
        let areas = self.numeric(Column::Area);
        let (lo, hi) = match (math::quantile(&areas, low), math::quantile(&areas, high)) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => return Dataset::default(),
        };

        self.rows
            .iter()
            .filter(|r| r.area >= lo && r.area <= hi && r.memo_score > 0.0)
            .cloned()
            .collect::<Vec<_>>()
            .into()
    }

    /// One row per (video, object), its best scoring one, ordered by score descending
    pub fn unique_by_best_score(&self) -> Dataset {
        let mut seen = HashSet::new();

        self.rows
            .iter()
            .sorted_by(|a, b| {
                b.memo_score
                    .partial_cmp(&a.memo_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .filter(|r| seen.insert(r.key()))
            .cloned()
            .collect::<Vec<_>>()
            .into()
    }

    pub fn videos(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.video.clone())
            .sorted()
            .dedup()
            .collect()
    }

    pub fn for_video(&self, video: &str) -> Dataset {
        self.rows
            .iter()
            .filter(|r| r.video == video)
            .cloned()
            .collect::<Vec<_>>()
            .into()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ColorStat {
    pub color: String,
    pub count: usize,
    pub mean_score: f64,
    pub label: String,
}

/// Count and mean score per colour, best mean first
pub fn color_stats(data: &Dataset) -> Vec<ColorStat> {
    let mut groups: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for row in data.rows() {
        let acc = groups.entry(&row.color).or_insert((0, 0.0));
        acc.0 += 1;
        acc.1 += row.memo_score;
    }

    groups
        .into_iter()
        .map(|(color, (count, sum))| ColorStat {
            color: color.to_string(),
            count,
            mean_score: sum / count as f64,
            label: format!("{} (n={})", color, count),
        })
        .sorted_by(|a, b| {
            b.mean_score
                .partial_cmp(&a.mean_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .collect()
}
