use crate::bbox::{BBox, Ltwh};
use crate::error::Error;

use serde_derive::{Deserialize, Serialize};
use std::io::BufRead;

/// Number of comma separated fields in a MOT row
pub const MOT_COLUMNS: usize = 10;

/// One detection of a tracked object in one frame, in original video pixels.
/// (x,y) is the left top corner, (w,h) is the size of bbox
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TrackRecord {
    #[serde(rename = "frame")]
    pub frame_id: i64,
    #[serde(rename = "id")]
    pub track_id: i64,
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
    #[serde(rename = "p")]
    pub confidence: f32,
}

impl TrackRecord {
    #[inline(always)]
    pub fn bbox(&self) -> BBox<Ltwh> {
        BBox::ltwh(self.x as f64, self.y as f64, self.w as f64, self.h as f64)
    }

    /// Parses `frame,id,x,y,w,h,conf,_,_,_`. Integer columns may be written
    /// as floats, they are truncated toward zero.
    pub fn parse(line: &str, lineno: usize) -> Result<Self, Error> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != MOT_COLUMNS {
            return Err(Error::parse(
                lineno,
                format!("expected {} columns, got {}", MOT_COLUMNS, fields.len()),
            ));
        }

        let int = |idx: usize| -> Result<i64, Error> {
            let value = fields[idx];
            if let Ok(v) = value.parse::<i64>() {
                return Ok(v);
            }

            match value.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v.trunc() as i64),
                _ => Err(Error::parse(
                    lineno,
                    format!("column {}: `{}` is not a number", idx + 1, value),
                )),
            }
        };

        let confidence = fields[6].parse::<f32>().map_err(|_| {
            Error::parse(lineno, format!("column 7: `{}` is not a number", fields[6]))
        })?;

        Ok(Self {
            frame_id: int(0)?,
            track_id: int(1)?,
            x: int(2)?,
            y: int(3)?,
            w: int(4)?,
            h: int(5)?,
            confidence,
        })
    }
}

/// Streams records out of a headerless MOT file, blank lines are skipped
pub struct MotReader<R: BufRead> {
    lines: std::io::Lines<R>,
    lineno: usize,
}

impl<R: BufRead> MotReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            lineno: 0,
        }
    }
}

impl MotReader<std::io::BufReader<std::fs::File>> {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::open(path, e))?;

        Ok(Self::new(std::io::BufReader::new(file)))
    }
}

impl<R: BufRead> Iterator for MotReader<R> {
    type Item = Result<TrackRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            self.lineno += 1;

            if line.trim().is_empty() {
                continue;
            }

            return Some(TrackRecord::parse(&line, self.lineno));
        }
    }
}
