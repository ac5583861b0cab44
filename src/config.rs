use crate::error::Error;
use crate::frame::Resolution;

use serde_derive::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub extract: ExtractConfig,
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Reads a JSON config, missing fields keep their defaults. `None` gives the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let path = match path {
            Some(path) => path,
            None => return Ok(Config::default()),
        };

        let data = std::fs::read_to_string(path).map_err(|e| Error::open(path, e))?;
        let config = serde_json::from_str(&data)?;

        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractConfig {
    /// Headerless MOT file
    pub tracks: PathBuf,
    /// Directory with `img{frame:06}_step{N}.npy` maps
    pub attention_dir: PathBuf,
    pub series_output: PathBuf,
    pub totals_output: PathBuf,
    /// Resolution the MOT boxes are expressed in
    pub original: Resolution,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            tracks: PathBuf::from("c04x/c04x_mot.txt"),
            attention_dir: PathBuf::from("c04x/c04x_att_scores"),
            series_output: PathBuf::from("c04x/object_memorability.json"),
            totals_output: PathBuf::from("c04x/total_memorability.json"),
            original: Resolution::AIC21,
        }
    }
}

impl ExtractConfig {
    /// Puts both reports under `dir` with their usual names
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.series_output = dir.join("object_memorability.json");
        self.totals_output = dir.join("total_memorability.json");
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.original.width == 0 || self.original.height == 0 {
            return Err(Error::Config(format!(
                "original resolution must be non-zero, got {}x{}",
                self.original.width, self.original.height
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Consolidated per-object stats CSV
    pub input: PathBuf,
    pub models_dir: PathBuf,
    pub tables_dir: PathBuf,
    /// Area quantile band kept by the outlier filter
    pub area_low_quantile: f64,
    pub area_high_quantile: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("datasets/all_videos_full_object_stats.csv"),
            models_dir: PathBuf::from("models"),
            tables_dir: PathBuf::from("tables"),
            area_low_quantile: 0.01,
            area_high_quantile: 0.99,
        }
    }
}

impl AnalysisConfig {
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.models_dir = dir.join("models");
        self.tables_dir = dir.join("tables");
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        let (lo, hi) = (self.area_low_quantile, self.area_high_quantile);
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
            return Err(Error::Config(format!(
                "area quantiles must satisfy 0 <= low <= high <= 1, got {} and {}",
                lo, hi
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.extract.original, Resolution::new(1280, 960));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attmem.json");
        std::fs::write(
            &path,
            r#"{"extract": {"original": {"width": 1920, "height": 1080}}}"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.extract.original, Resolution::new(1920, 1080));
        assert_eq!(config.extract.tracks, PathBuf::from("c04x/c04x_mot.txt"));
        assert_eq!(config.analysis, AnalysisConfig::default());
    }

    #[test]
    fn bad_quantiles() {
        let config = AnalysisConfig {
            area_low_quantile: 0.9,
            area_high_quantile: 0.1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_resolution() {
        let mut config = ExtractConfig::default();
        config.original.width = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn output_dir() {
        let config = ExtractConfig::default().with_output_dir("out");
        assert_eq!(config.series_output, Path::new("out/object_memorability.json"));
        assert_eq!(config.totals_output, Path::new("out/total_memorability.json"));
    }
}
