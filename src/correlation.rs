use crate::dataset::{Column, Dataset};
use crate::math;

use serde_derive::{Deserialize, Serialize};

/// Features compared against `memo_score`
pub const FEATURES: [Column; 5] = [
    Column::BboxX,
    Column::BboxY,
    Column::BboxW,
    Column::BboxH,
    Column::Area,
];

/// Spearman correlation of the score with each of [`FEATURES`] over one slice of the data
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CorrelationRow {
    pub label: String,
    pub values: Vec<f64>,
}

pub fn score_correlations(label: impl Into<String>, data: &Dataset) -> CorrelationRow {
    let score = data.numeric(Column::MemoScore);

    CorrelationRow {
        label: label.into(),
        values: FEATURES
            .iter()
            .map(|&f| math::spearman(&score, &data.numeric(f)))
            .collect(),
    }
}

/// One row per video in sorted order, then one over every row labelled `all`
pub fn video_matrix(data: &Dataset) -> Vec<CorrelationRow> {
    data.videos()
        .into_iter()
        .map(|v| {
            let subset = data.for_video(&v);
            score_correlations(v, &subset)
        })
        .chain(std::iter::once(score_correlations("all", data)))
        .collect()
}
