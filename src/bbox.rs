use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug {}

/// Left-top-width-height format, contains left top corner and width-height
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Ltwh;
impl BBoxFormat for Ltwh {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox<F: BBoxFormat>([f64; 4], PhantomData<F>);

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f64; 4] {
        &self.0
    }
}

impl BBox<Ltwh> {
    #[inline]
    pub fn ltwh(x1: f64, x2: f64, x3: f64, x4: f64) -> Self {
        BBox([x1, x2, x3, x4], PhantomData)
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(x1: f64, x2: f64, x3: f64, x4: f64) -> Self {
        BBox([x1, x2, x3, x4], PhantomData)
    }

    #[inline(always)]
    pub fn left(&self) -> f64 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f64 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f64 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f64 {
        self.0[3]
    }

    /// Multiplies every corner by the per-axis factors
    #[inline]
    pub fn scale(&self, sx: f64, sy: f64) -> Self {
        BBox::ltrb(self.0[0] * sx, self.0[1] * sy, self.0[2] * sx, self.0[3] * sy)
    }

    /// Snaps corners down to the cell grid and clamps them into `[0, width] x [0, height]`.
    pub fn to_region(&self, width: usize, height: usize) -> Region {
        let snap = |v: f64, max: usize| -> usize {
            let v = v.floor();
            if v <= 0.0 {
                0
            } else if v >= max as f64 {
                max
            } else {
                v as usize
            }
        };

        Region {
            x1: snap(self.left(), width),
            y1: snap(self.top(), height),
            x2: snap(self.right(), width),
            y2: snap(self.bottom(), height),
        }
    }
}

impl<'a> From<&'a BBox<Ltwh>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Ltwh>) -> Self {
        Self([v.0[0], v.0[1], v.0[2] + v.0[0], v.0[3] + v.0[1]], PhantomData)
    }
}

/// Half-open cell range `[y1, y2) x [x1, x2)` inside a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

impl Region {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    #[inline]
    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.x2 - self.x1) * (self.y2 - self.y1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ltwh_to_ltrb() {
        let b = BBox::ltwh(10.0, 20.0, 5.0, 8.0).as_ltrb();
        assert_eq!(b.as_slice(), &[10.0, 20.0, 15.0, 28.0]);
        assert_eq!((b.right() - b.left()) * (b.bottom() - b.top()), 40.0);
    }

    #[test]
    fn half_scale_region() {
        let region = BBox::ltwh(100.0, 100.0, 20.0, 20.0)
            .as_ltrb()
            .scale(0.5, 0.5)
            .to_region(640, 480);

        assert_eq!(
            region,
            Region {
                x1: 50,
                y1: 50,
                x2: 60,
                y2: 60
            }
        );
        assert_eq!(region.area(), 100);
    }

    #[test]
    fn region_is_clamped() {
        let region = BBox::ltrb(-15.0, -3.5, 700.0, 20.9).to_region(640, 480);
        assert_eq!(
            region,
            Region {
                x1: 0,
                y1: 0,
                x2: 640,
                y2: 20
            }
        );
    }

    #[test]
    fn outside_region_is_empty() {
        let region = BBox::ltrb(900.0, 10.0, 950.0, 40.0).to_region(640, 480);
        assert!(region.is_empty());
        assert_eq!(region.area(), 0);

        let region = BBox::ltrb(-50.0, 10.0, -10.0, 40.0).to_region(640, 480);
        assert!(region.is_empty());
    }
}
