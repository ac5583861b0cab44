use crate::config::AnalysisConfig;
use crate::correlation::{self, CorrelationRow};
use crate::dataset::{self, ColorStat, Dataset};
use crate::error::Error;
use crate::regression::{self, Design, Formula, OlsFit};

use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the model whose colour coefficients get their own table
pub const INTERACTION_MODEL: &str = "Area * Color";

#[derive(Debug, Clone)]
pub struct ModelResult {
    pub name: String,
    pub formula: String,
    pub fit: OlsFit,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisSummary {
    pub rows: usize,
    pub objects: usize,
    pub filtered: usize,
    pub models: Vec<ModelResult>,
    pub skipped_models: Vec<String>,
    pub written: Vec<PathBuf>,
}

fn round_to(v: f64, digits: i32) -> f64 {
    let f = 10f64.powi(digits);
    (v * f).round() / f
}

/// Empty cell for NaN, scientific notation for tiny magnitudes
fn number(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else if v != 0.0 && v.abs() < 1e-4 {
        format!("{:e}", v)
    } else {
        format!("{}", v)
    }
}

fn csv_field(s: &str) -> String {
    if s.contains(|c| c == ',' || c == '"' || c == '\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn write_csv(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<(), Error> {
    let file = std::fs::File::create(path).map_err(|e| Error::open(path, e))?;
    let mut out = std::io::BufWriter::new(file);

    writeln!(out, "{}", header.iter().map(|h| csv_field(h)).collect::<Vec<_>>().join(","))?;
    for row in rows {
        writeln!(out, "{}", row.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(","))?;
    }
    out.flush()?;

    Ok(())
}

fn color_rows(stats: &[ColorStat]) -> Vec<Vec<String>> {
    stats
        .iter()
        .map(|s| {
            vec![
                s.color.clone(),
                s.count.to_string(),
                number(s.mean_score),
                s.label.clone(),
            ]
        })
        .collect()
}

fn correlation_rows(matrix: &[CorrelationRow]) -> Vec<Vec<String>> {
    matrix
        .iter()
        .map(|r| {
            std::iter::once(r.label.clone())
                .chain(r.values.iter().map(|&v| number(v)))
                .collect()
        })
        .collect()
}

fn comparison_rows(models: &[ModelResult]) -> Vec<Vec<String>> {
    models
        .iter()
        .map(|m| {
            vec![
                m.name.clone(),
                number(round_to(m.fit.r_squared, 3)),
                number(round_to(m.fit.adj_r_squared, 3)),
                number(round_to(m.fit.aic, 1)),
                number(round_to(m.fit.bic, 1)),
                number(round_to(m.fit.f_statistic, 2)),
                number(m.fit.f_pvalue),
            ]
        })
        .collect()
}

fn interaction_rows(fit: &OlsFit) -> Vec<Vec<String>> {
    fit.coefficients
        .iter()
        .filter(|c| c.name.contains("C(color)"))
        .map(|c| {
            vec![
                c.name.clone(),
                number(c.value),
                number(c.std_err),
                number(c.ci_low),
                number(c.ci_high),
            ]
        })
        .collect()
}

/// Fits every model of [`regression::MODELS`] on `data`. Models that cannot be
/// estimated on this data are returned by name in the second vector.
pub fn fit_models(data: &Dataset) -> Result<(Vec<ModelResult>, Vec<String>), Error> {
    let mut fitted = Vec::new();
    let mut skipped = Vec::new();

    for (name, formula) in regression::MODELS {
        let parsed = Formula::parse(formula)?;
        match OlsFit::fit(&Design::build(&parsed, data)) {
            Ok(fit) => fitted.push(ModelResult {
                name: name.to_string(),
                formula: formula.to_string(),
                fit,
            }),
            Err(Error::Analysis(reason)) => {
                log::warn!("skipping model `{}`: {}", name, reason);
                skipped.push(name.to_string());
            }
            Err(err) => return Err(err),
        }
    }

    Ok((fitted, skipped))
}

/// Runs the whole analysis over `config.input` and writes every table and model report
pub fn run(config: &AnalysisConfig) -> Result<AnalysisSummary, Error> {
    config.validate()?;

    let data = Dataset::open(&config.input)?;
    log::info!("loaded {} rows from {}", data.len(), config.input.display());

    std::fs::create_dir_all(&config.models_dir)?;
    std::fs::create_dir_all(&config.tables_dir)?;

    let top = data.top_per_object();
    let filtered = top.filter_outliers(config.area_low_quantile, config.area_high_quantile);
    log::info!(
        "{} objects, {} left after area/score filtering",
        top.len(),
        filtered.len()
    );

    let mut summary = AnalysisSummary {
        rows: data.len(),
        objects: top.len(),
        filtered: filtered.len(),
        ..Default::default()
    };

    let color_header = ["color", "count", "mean_score", "label"];

    let unique = data.unique_by_best_score();
    let path = config.tables_dir.join("color_vehicle_level.csv");
    write_csv(&path, &color_header, &color_rows(&dataset::color_stats(&unique)))?;
    summary.written.push(path);

    let mut frequency = dataset::color_stats(&data);
    frequency.sort_by(|a, b| a.color.cmp(&b.color));
    let path = config.tables_dir.join("color_frequency.csv");
    write_csv(&path, &color_header, &color_rows(&frequency))?;
    summary.written.push(path);

    let matrix = correlation::video_matrix(&data);
    let mut header = vec!["video"];
    header.extend(correlation::FEATURES.iter().map(|c| c.name()));
    let path = config.tables_dir.join("video_feature_score_correlation.csv");
    write_csv(&path, &header, &correlation_rows(&matrix))?;
    summary.written.push(path);

    let (models, skipped) = fit_models(&filtered)?;
    for m in &models {
        let path = config
            .models_dir
            .join(format!("regression_model_{}.txt", regression::model_slug(&m.name)));
        std::fs::write(&path, m.fit.summary(&m.name, &m.formula))?;
        summary.written.push(path);
    }

    let path = config.models_dir.join("regression_model_comparison_full.csv");
    write_csv(
        &path,
        &[
            "Model",
            "R_squared",
            "Adj_R_squared",
            "AIC",
            "BIC",
            "F_statistic",
            "F_pvalue",
        ],
        &comparison_rows(&models),
    )?;
    summary.written.push(path);

    if let Some(m) = models.iter().find(|m| m.name == INTERACTION_MODEL) {
        let path = config.tables_dir.join("color_interaction_coefficients.csv");
        write_csv(
            &path,
            &["term", "coef", "std_err", "ci_low", "ci_high"],
            &interaction_rows(&m.fit),
        )?;
        summary.written.push(path);
    }

    log::info!(
        "fitted {} models ({} skipped), wrote {} files",
        models.len(),
        skipped.len(),
        summary.written.len()
    );

    summary.models = models;
    summary.skipped_models = skipped;

    Ok(summary)
}
