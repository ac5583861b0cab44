use crate::dataset::{Column, Dataset, ObjectStat};
use crate::error::Error;
use crate::math;

use itertools::Itertools;
use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Product of factors, empty means the intercept
pub type Term = BTreeSet<Column>;

/// `response ~ rhs` where the right side understands `+`, `*`, `:`,
/// parentheses, bare column names and `C(column)`.
/// `a * b` expands to `a + b + a:b`.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub response: Column,
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Plus,
    Star,
    Colon,
    Open,
    Close,
}

fn tokenize(src: &str) -> Result<Vec<Token>, Error> {
    let mut out = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                out.push(Token::Plus);
            }
            '*' => {
                chars.next();
                out.push(Token::Star);
            }
            ':' => {
                chars.next();
                out.push(Token::Colon);
            }
            '(' => {
                chars.next();
                out.push(Token::Open);
            }
            ')' => {
                chars.next();
                out.push(Token::Close);
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push(Token::Ident(ident));
            }
            c => {
                return Err(Error::Analysis(format!(
                    "unexpected `{}` in formula `{}`",
                    c, src
                )))
            }
        }
    }

    Ok(out)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn err(&self, msg: &str) -> Error {
        Error::Analysis(format!("{} in formula `{}`", msg, self.src))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // expr := product ('+' product)*
    fn expr(&mut self) -> Result<Vec<Term>, Error> {
        let mut terms = self.product()?;
        while self.eat(&Token::Plus) {
            terms = union(terms, self.product()?);
        }
        Ok(terms)
    }

    // product := interaction ('*' interaction)*
    fn product(&mut self) -> Result<Vec<Term>, Error> {
        let mut terms = self.interaction()?;
        while self.eat(&Token::Star) {
            let rhs = self.interaction()?;
            let cross = interact(&terms, &rhs);
            terms = union(union(terms, rhs), cross);
        }
        Ok(terms)
    }

    // interaction := atom (':' atom)*
    fn interaction(&mut self) -> Result<Vec<Term>, Error> {
        let mut terms = self.atom()?;
        while self.eat(&Token::Colon) {
            let rhs = self.atom()?;
            terms = interact(&terms, &rhs);
        }
        Ok(terms)
    }

    // atom := '(' expr ')' | 'C' '(' name ')' | name
    fn atom(&mut self) -> Result<Vec<Term>, Error> {
        if self.eat(&Token::Open) {
            let terms = self.expr()?;
            if !self.eat(&Token::Close) {
                return Err(self.err("expected `)`"));
            }
            return Ok(terms);
        }

        let name = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            _ => return Err(self.err("expected a column")),
        };
        self.pos += 1;

        let col = if name == "C" && self.eat(&Token::Open) {
            let inner = match self.peek() {
                Some(Token::Ident(inner)) => inner.clone(),
                _ => return Err(self.err("expected a column inside `C()`")),
            };
            self.pos += 1;
            if !self.eat(&Token::Close) {
                return Err(self.err("expected `)`"));
            }

            let col = self.column(&inner)?;
            if !col.is_categorical() {
                return Err(self.err(&format!("`{}` is not a text column", inner)));
            }
            col
        } else {
            self.column(&name)?
        };

        Ok(vec![std::iter::once(col).collect()])
    }

    fn column(&self, name: &str) -> Result<Column, Error> {
        Column::from_name(name).ok_or_else(|| self.err(&format!("unknown column `{}`", name)))
    }
}

fn union(mut lhs: Vec<Term>, rhs: Vec<Term>) -> Vec<Term> {
    for t in rhs {
        if !lhs.contains(&t) {
            lhs.push(t);
        }
    }
    lhs
}

fn interact(lhs: &[Term], rhs: &[Term]) -> Vec<Term> {
    let mut out = Vec::new();
    for a in lhs {
        for b in rhs {
            let t: Term = a.union(b).copied().collect();
            if !out.contains(&t) {
                out.push(t);
            }
        }
    }
    out
}

impl Formula {
    pub fn parse(src: &str) -> Result<Self, Error> {
        let (lhs, rhs) = src
            .split_once('~')
            .ok_or_else(|| Error::Analysis(format!("formula `{}` has no `~`", src)))?;

        let response = Column::from_name(lhs.trim())
            .filter(|c| !c.is_categorical())
            .ok_or_else(|| {
                Error::Analysis(format!("`{}` is not a numeric response", lhs.trim()))
            })?;

        let mut parser = Parser {
            src,
            tokens: tokenize(rhs)?,
            pos: 0,
        };
        let terms = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.err("trailing input"));
        }

        // intercept first, then lower order terms before their interactions
        let terms = std::iter::once(Term::new())
            .chain(terms.into_iter().sorted_by_key(|t| t.len()))
            .collect();

        Ok(Self { response, terms })
    }
}

/// Regressor matrix with one named column per coefficient
#[derive(Debug, Clone)]
pub struct Design {
    pub names: Vec<String>,
    pub x: na::DMatrix<f64>,
    pub y: na::DVector<f64>,
}

fn factor_name(col: Column) -> String {
    match col {
        Column::Color => format!("C({})", col.name()),
        _ => col.name().to_string(),
    }
}

/// Treatment coded levels of `col`, the first sorted level is the reference
fn levels(rows: &[ObjectStat], col: Column) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.text(col))
        .map(str::to_string)
        .sorted()
        .dedup()
        .skip(1)
        .collect()
}

impl Design {
    pub fn build(formula: &Formula, data: &Dataset) -> Self {
        let rows = data.rows();

        // (name, value per row) for every regressor
        let mut columns: Vec<(String, Vec<f64>)> = Vec::new();

        for term in &formula.terms {
            let mut parts: Vec<(String, Vec<f64>)> = vec![(String::new(), vec![1.0; rows.len()])];

            for &col in term {
                let expanded: Vec<(String, Vec<f64>)> = if col.is_categorical() {
                    levels(rows, col)
                        .into_iter()
                        .map(|lvl| {
                            let values = rows
                                .iter()
                                .map(|r| if r.text(col) == Some(lvl.as_str()) { 1.0 } else { 0.0 })
                                .collect();
                            (format!("{}[T.{}]", factor_name(col), lvl), values)
                        })
                        .collect()
                } else {
                    vec![(
                        factor_name(col),
                        rows.iter().map(|r| r.numeric(col).unwrap_or(f64::NAN)).collect(),
                    )]
                };

                parts = parts
                    .iter()
                    .cartesian_product(expanded.iter())
                    .map(|((pn, pv), (en, ev))| {
                        let name = if pn.is_empty() {
                            en.clone()
                        } else {
                            format!("{}:{}", pn, en)
                        };
                        (name, pv.iter().zip(ev).map(|(a, b)| a * b).collect())
                    })
                    .collect();
            }

            for (name, values) in parts {
                let name = if name.is_empty() {
                    "Intercept".to_string()
                } else {
                    name
                };
                columns.push((name, values));
            }
        }

        let x = na::DMatrix::from_fn(rows.len(), columns.len(), |i, j| columns[j].1[i]);
        let y = na::DVector::from_iterator(
            rows.len(),
            rows.iter()
                .map(|r| r.numeric(formula.response).unwrap_or(f64::NAN)),
        );

        Self {
            names: columns.into_iter().map(|(n, _)| n).collect(),
            x,
            y,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Coefficient {
    pub name: String,
    pub value: f64,
    pub std_err: f64,
    pub t: f64,
    pub p_value: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub nobs: usize,
    pub df_model: f64,
    pub df_resid: f64,
    pub coefficients: Vec<Coefficient>,
    pub ssr: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub f_statistic: f64,
    pub f_pvalue: f64,
}

impl OlsFit {
    /// Least squares through the SVD of the column equilibrated design, rank
    /// deficient designs get the minimum norm solution
    pub fn fit(design: &Design) -> Result<Self, Error> {
        let (n, p) = design.x.shape();
        if n == 0 || p == 0 {
            return Err(Error::Analysis("empty design".into()));
        }
        if design.x.iter().chain(design.y.iter()).any(|v| !v.is_finite()) {
            return Err(Error::Analysis("design contains non finite values".into()));
        }

        let norms: Vec<f64> = design
            .x
            .column_iter()
            .map(|c| {
                let m = c.amax();
                if m > 0.0 {
                    m
                } else {
                    1.0
                }
            })
            .collect();

        let mut xs = design.x.clone();
        for (j, norm) in norms.iter().enumerate() {
            for v in xs.column_mut(j).iter_mut() {
                *v /= norm;
            }
        }

        let svd = xs.clone().svd(true, true);
        let max_sv = svd.singular_values.max();
        let tol = max_sv * n.max(p) as f64 * f64::EPSILON;
        let rank = svd.rank(tol);

        if rank == 0 {
            return Err(Error::Analysis("design has no independent regressor".into()));
        }
        if n <= rank {
            return Err(Error::Analysis(format!(
                "{} observations cannot fit {} independent regressors",
                n, rank
            )));
        }

        let pinv = svd
            .pseudo_inverse(tol)
            .map_err(|e| Error::Analysis(e.to_string()))?;

        let beta_s = &pinv * &design.y;
        let cov_s = &pinv * pinv.transpose();

        let fitted = &xs * &beta_s;
        let resid = &design.y - fitted;
        let ssr = resid.norm_squared();

        let nf = n as f64;
        let df_model = (rank - 1) as f64;
        let df_resid = (n - rank) as f64;

        let y_mean = design.y.mean();
        let tss = design.y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>();
        let ess = tss - ssr;

        let r_squared = 1.0 - ssr / tss;
        let adj_r_squared = 1.0 - (nf - 1.0) / df_resid * (1.0 - r_squared);

        let log_likelihood =
            -nf / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (ssr / nf).ln() + 1.0);
        let k = df_model + 1.0;
        let aic = -2.0 * log_likelihood + 2.0 * k;
        let bic = -2.0 * log_likelihood + nf.ln() * k;

        let (f_statistic, f_pvalue) = if df_model > 0.0 {
            let f = (ess / df_model) / (ssr / df_resid);
            (f, math::f_sf(f, df_model, df_resid))
        } else {
            (f64::NAN, f64::NAN)
        };

        let scale = ssr / df_resid;
        let t_crit = math::student_t_ppf(0.975, df_resid);

        let coefficients = design
            .names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let value = beta_s[j] / norms[j];
                let std_err = (cov_s[(j, j)] * scale).sqrt() / norms[j];
                let t = value / std_err;

                Coefficient {
                    name: name.clone(),
                    value,
                    std_err,
                    t,
                    p_value: math::student_t_two_sided(t, df_resid),
                    ci_low: value - t_crit * std_err,
                    ci_high: value + t_crit * std_err,
                }
            })
            .collect();

        Ok(Self {
            nobs: n,
            df_model,
            df_resid,
            coefficients,
            ssr,
            r_squared,
            adj_r_squared,
            log_likelihood,
            aic,
            bic,
            f_statistic,
            f_pvalue,
        })
    }

    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }

    /// Plain text report of the fit
    pub fn summary(&self, model: &str, formula: &str) -> String {
        let rule = "=".repeat(78);
        let thin = "-".repeat(78);

        let mut out = format!("{:^78}\n{}\n", "OLS Regression Results", rule);
        let fields = [
            ("Model:", model.to_string()),
            ("Formula:", formula.to_string()),
            ("No. Observations:", self.nobs.to_string()),
            ("Df Residuals:", self.df_resid.to_string()),
            ("Df Model:", self.df_model.to_string()),
            ("R-squared:", format!("{:.3}", self.r_squared)),
            ("Adj. R-squared:", format!("{:.3}", self.adj_r_squared)),
            ("F-statistic:", format!("{:.4}", self.f_statistic)),
            ("Prob (F-statistic):", format!("{:.4e}", self.f_pvalue)),
            ("Log-Likelihood:", format!("{:.4}", self.log_likelihood)),
            ("AIC:", format!("{:.1}", self.aic)),
            ("BIC:", format!("{:.1}", self.bic)),
        ];
        for (label, value) in fields {
            out.push_str(&format!("{:<26}{}\n", label, value));
        }
        out.push_str(&rule);
        out.push('\n');

        let width = self
            .coefficients
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0)
            .max(9);

        out.push_str(&format!(
            "{:<w$} {:>12} {:>12} {:>9} {:>9} {:>12} {:>12}\n{}\n",
            "",
            "coef",
            "std err",
            "t",
            "P>|t|",
            "[0.025",
            "0.975]",
            thin,
            w = width
        ));
        for c in &self.coefficients {
            out.push_str(&format!(
                "{:<w$} {:>12.4} {:>12.4} {:>9.3} {:>9.3} {:>12.4} {:>12.4}\n",
                c.name,
                c.value,
                c.std_err,
                c.t,
                c.p_value,
                c.ci_low,
                c.ci_high,
                w = width
            ));
        }
        out.push_str(&rule);
        out.push('\n');

        out
    }
}

/// The models compared by the analysis, (name, formula)
pub const MODELS: [(&str, &str); 15] = [
    ("Area only", "memo_score ~ area"),
    ("Color only", "memo_score ~ C(color)"),
    ("Position only", "memo_score ~ bbox_x + bbox_y"),
    ("Area + Color", "memo_score ~ area + C(color)"),
    ("Area + Position", "memo_score ~ area + bbox_x + bbox_y"),
    ("Color + Position", "memo_score ~ C(color) + bbox_x + bbox_y"),
    (
        "Area + Color + Position",
        "memo_score ~ area + C(color) + bbox_x + bbox_y",
    ),
    ("Area * Color", "memo_score ~ area * C(color)"),
    ("Area * Position", "memo_score ~ area * (bbox_x + bbox_y)"),
    ("Color * Position", "memo_score ~ C(color) * (bbox_x + bbox_y)"),
    (
        "Area * Color + Position",
        "memo_score ~ area * C(color) + bbox_x + bbox_y",
    ),
    (
        "Area * Position + Color",
        "memo_score ~ area * (bbox_x + bbox_y) + C(color)",
    ),
    (
        "Color * Position + Area",
        "memo_score ~ C(color) * (bbox_x + bbox_y) + area",
    ),
    ("Area * bbox_y + Color", "memo_score ~ area * bbox_y + C(color)"),
    (
        "Area * Color * Position",
        "memo_score ~ area * C(color) * bbox_x * bbox_y",
    ),
];

/// File name fragment for a model name, e.g. `Area * Color` -> `area_interaction_color`
pub fn model_slug(name: &str) -> String {
    name.to_lowercase()
        .replace(' ', "_")
        .replace('*', "interaction")
        .replace('+', "plus")
        .replace(['(', ')'], "")
        .replace(':', "X")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(cols: &[Column]) -> Term {
        cols.iter().copied().collect()
    }

    fn row(area: f64, x: f64, y: f64, color: &str, score: f64) -> ObjectStat {
        ObjectStat {
            video: "1".into(),
            object_id: 0,
            memo_score: score,
            area,
            bbox_x: x,
            bbox_y: y,
            bbox_w: 1.0,
            bbox_h: 1.0,
            color: color.into(),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6 * (1.0 + b.abs())
    }

    #[test]
    fn parse_products() {
        use Column::*;

        let f = Formula::parse("memo_score ~ area * C(color)").unwrap();
        assert_eq!(f.response, MemoScore);
        assert_eq!(
            f.terms,
            vec![term(&[]), term(&[Area]), term(&[Color]), term(&[Area, Color])]
        );

        let f = Formula::parse("memo_score ~ area * (bbox_x + bbox_y)").unwrap();
        assert_eq!(f.terms.len(), 6);
        assert!(f.terms.contains(&term(&[Area, BboxY])));

        let f = Formula::parse("memo_score ~ area * C(color) * bbox_x * bbox_y").unwrap();
        // every non-empty subset of four factors plus the intercept
        assert_eq!(f.terms.len(), 16);
        assert_eq!(f.terms.last().unwrap().len(), 4);
    }

    #[test]
    fn parse_errors() {
        assert!(Formula::parse("memo_score area").is_err());
        assert!(Formula::parse("color ~ area").is_err());
        assert!(Formula::parse("memo_score ~ nope").is_err());
        assert!(Formula::parse("memo_score ~ C(area)").is_err());
        assert!(Formula::parse("memo_score ~ (area").is_err());
        assert!(Formula::parse("memo_score ~ area )").is_err());
        assert!(Formula::parse("memo_score ~ area - bbox_x").is_err());
    }

    #[test]
    fn every_model_parses() {
        for (_, formula) in MODELS {
            Formula::parse(formula).unwrap();
        }
    }

    #[test]
    fn design_columns() {
        let data: Dataset = vec![
            row(1.0, 0.0, 0.0, "Red", 1.0),
            row(2.0, 0.0, 0.0, "Blue", 2.0),
            row(3.0, 0.0, 0.0, "White", 3.0),
        ]
        .into();

        let f = Formula::parse("memo_score ~ area * C(color)").unwrap();
        let d = Design::build(&f, &data);
        assert_eq!(
            d.names,
            vec![
                "Intercept",
                "area",
                "C(color)[T.Red]",
                "C(color)[T.White]",
                "area:C(color)[T.Red]",
                "area:C(color)[T.White]",
            ]
        );
        assert_eq!(d.x.shape(), (3, 6));
        assert_eq!(d.x.column(4).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 0.0]);
        assert_eq!(d.x.column(5).iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0, 3.0]);
    }

    #[test]
    fn recovers_exact_plane() {
        let rows: Vec<ObjectStat> = (0..20)
            .map(|i| {
                let (a, x, y) = (i as f64 * 10.0, (i % 7) as f64, (i * i % 11) as f64);
                row(a, x, y, "Red", 3.0 + 0.5 * a - 2.0 * x + 0.25 * y)
            })
            .collect();
        let data: Dataset = rows.into();

        let f = Formula::parse("memo_score ~ area + bbox_x + bbox_y").unwrap();
        let fit = OlsFit::fit(&Design::build(&f, &data)).unwrap();

        assert!(close(fit.coefficient("Intercept").unwrap().value, 3.0));
        assert!(close(fit.coefficient("area").unwrap().value, 0.5));
        assert!(close(fit.coefficient("bbox_x").unwrap().value, -2.0));
        assert!(close(fit.coefficient("bbox_y").unwrap().value, 0.25));
        assert!(close(fit.r_squared, 1.0));
        assert_eq!(fit.df_model, 3.0);
        assert_eq!(fit.df_resid, 16.0);
    }

    #[test]
    fn simple_regression_statistics() {
        // y = x + e with e = [1, -1, -1, 1, 0]
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let es = [1.0, -1.0, -1.0, 1.0, 0.0];
        let data: Dataset = xs
            .iter()
            .zip(es)
            .map(|(&x, e)| row(x, 0.0, 0.0, "Red", x + e))
            .collect::<Vec<_>>()
            .into();

        let f = Formula::parse("memo_score ~ area").unwrap();
        let fit = OlsFit::fit(&Design::build(&f, &data)).unwrap();

        let slope = fit.coefficient("area").unwrap();
        assert!(close(slope.value, 1.0));
        assert!(close(fit.coefficient("Intercept").unwrap().value, 0.0));
        // ssr = 4, s^2 = 4/3, Sxx = 10
        assert!(close(fit.ssr, 4.0));
        assert!(close(slope.std_err, (4.0f64 / 3.0 / 10.0).sqrt()));
        // tss = 14, R^2 = 1 - 4/14
        assert!(close(fit.r_squared, 10.0 / 14.0));
        assert!(close(fit.f_statistic, 10.0 / (4.0 / 3.0)));
        assert!(close(fit.f_pvalue, slope.p_value));
        assert!(slope.ci_low < 1.0 && slope.ci_high > 1.0);

        let llf = -2.5 * ((2.0 * std::f64::consts::PI).ln() + (0.8f64).ln() + 1.0);
        assert!(close(fit.log_likelihood, llf));
        assert!(close(fit.aic, -2.0 * llf + 4.0));
    }

    #[test]
    fn rank_deficient_design_drops_a_degree() {
        // single colour level means C(color) adds no column, area duplicated as bbox_x
        let data: Dataset = (0..6)
            .map(|i| row(i as f64, i as f64, 0.0, "Red", 2.0 * i as f64 + 1.0))
            .collect::<Vec<_>>()
            .into();

        let f = Formula::parse("memo_score ~ area + bbox_x + C(color)").unwrap();
        let fit = OlsFit::fit(&Design::build(&f, &data)).unwrap();

        assert_eq!(fit.df_model, 1.0);
        let a = fit.coefficient("area").unwrap().value;
        let b = fit.coefficient("bbox_x").unwrap().value;
        assert!(close(a + b, 2.0));
        assert!(close(a, b));
    }

    #[test]
    fn too_few_rows() {
        let data: Dataset = vec![row(1.0, 0.0, 0.0, "Red", 1.0), row(2.0, 0.0, 0.0, "Red", 3.0)].into();
        let f = Formula::parse("memo_score ~ area").unwrap();

        assert!(matches!(
            OlsFit::fit(&Design::build(&f, &data)),
            Err(Error::Analysis(_))
        ));
    }

    #[test]
    fn slugs() {
        assert_eq!(model_slug("Area only"), "area_only");
        assert_eq!(model_slug("Area * Color + Position"), "area_interaction_color_plus_position");
        assert_eq!(model_slug("Area * bbox_y + Color"), "area_interaction_bbox_y_plus_color");
    }

    #[test]
    fn summary_lists_coefficients() {
        let data: Dataset = (0..5)
            .map(|i| row(i as f64, 0.0, 0.0, "Red", (i * i) as f64))
            .collect::<Vec<_>>()
            .into();
        let f = Formula::parse("memo_score ~ area").unwrap();
        let fit = OlsFit::fit(&Design::build(&f, &data)).unwrap();
        let text = fit.summary("Area only", "memo_score ~ area");

        assert!(text.contains("OLS Regression Results"));
        assert!(text.contains("Area only"));
        assert!(text.contains("No. Observations:         5"));
        assert!(text.lines().any(|l| l.starts_with("Intercept")));
        assert!(text.lines().any(|l| l.starts_with("area ")));

        let rule = "=".repeat(78);
        assert_eq!(text.lines().filter(|l| *l == rule).count(), 3);
        assert!(text.ends_with(&format!("{}\n", rule)));
    }
}
