use crate::error::Error;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_derive::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub frame: i64,
    pub score: f64,
}

/// Finished per-track series, in track first appearance order
#[derive(Debug, Clone, Default)]
pub struct MemorabilityReport {
    series: Vec<(i64, Vec<Entry>)>,
}

/// `{"<track_id>": [{"frame": .., "score": ..}, ..]}`
pub struct ObjectMemorability<'a>(&'a [(i64, Vec<Entry>)]);

/// `{"<track_id>": total}`
pub struct TotalMemorability(Vec<(i64, f64)>);

impl<'a> Serialize for ObjectMemorability<'a> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (track_id, entries) in self.0 {
            map.serialize_entry(&track_id.to_string(), entries)?;
        }
        map.end()
    }
}

impl Serialize for TotalMemorability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (track_id, total) in &self.0 {
            map.serialize_entry(&track_id.to_string(), total)?;
        }
        map.end()
    }
}

impl MemorabilityReport {
    pub fn new(series: Vec<(i64, Vec<Entry>)>) -> Self {
        Self { series }
    }

    #[inline]
    pub fn series(&self) -> &[(i64, Vec<Entry>)] {
        &self.series
    }

    /// Sum of every score of a track
    pub fn totals(&self) -> Vec<(i64, f64)> {
        self.series
            .iter()
            .map(|(id, entries)| (*id, entries.iter().map(|e| e.score).sum()))
            .collect()
    }

    #[inline]
    pub fn object_memorability(&self) -> ObjectMemorability<'_> {
        ObjectMemorability(&self.series)
    }

    #[inline]
    pub fn total_memorability(&self) -> TotalMemorability {
        TotalMemorability(self.totals())
    }

    /// Writes both documents, returns (series path, totals path)
    pub fn write(
        &self,
        series_path: impl AsRef<Path>,
        totals_path: impl AsRef<Path>,
    ) -> Result<(PathBuf, PathBuf), Error> {
        let series_path = series_path.as_ref();
        let totals_path = totals_path.as_ref();

        write_json(series_path, &self.object_memorability())?;
        log::info!("Memorability scores saved to {}", series_path.display());

        write_json(totals_path, &self.total_memorability())?;
        log::info!("Total memorability scores saved to {}", totals_path.display());

        Ok((series_path.to_path_buf(), totals_path.to_path_buf()))
    }
}

/// Pretty prints `value` with four space indentation
pub fn to_json_string<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    value.serialize(&mut ser)?;

    // serde_json only ever emits utf-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), Error> {
    let text = to_json_string(value)?;
    let mut file = std::io::BufWriter::new(
        std::fs::File::create(path).map_err(|e| Error::open(path, e))?,
    );
    file.write_all(text.as_bytes())?;
    file.flush()?;

    Ok(())
}
