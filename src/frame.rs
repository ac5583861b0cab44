use serde_derive::{Deserialize, Serialize};

/// Pixel dimensions of the source video
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// AIC21 cameras
    pub const AIC21: Resolution = Resolution {
        width: 1280,
        height: 960,
    };

    #[inline]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// (scale_x, scale_y) taking this resolution onto a `width x height` grid
    #[inline]
    pub fn scale_to(&self, width: usize, height: usize) -> (f64, f64) {
        (
            width as f64 / self.width as f64,
            height as f64 / self.height as f64,
        )
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::AIC21
    }
}
