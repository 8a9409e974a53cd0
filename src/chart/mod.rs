//! Chart column-role inference for query results.
//!
//! Looks at the first row (or the first non-null value per column) and sorts
//! columns into date, numeric and categorical roles, then picks x and y axes.
//! Nothing is rendered here.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::db::{Row, Value};

const DATE_NAME_HINTS: &[&str] = &["date", "time", "created", "updated", "transaction"];

const CATEGORY_NAME_HINTS: &[&str] = &["category", "type", "brand", "group", "code", "name", "desc"];

const VALUE_NAME_HINTS: &[&str] = &[
    "landed_cost",
    "landed cost",
    "selling_price",
    "selling price",
    "cost",
    "price",
    "amount",
    "fob",
];

const CHART_PHRASES: &[&str] = &["visual", "graph", "chart", "plot", "diagram"];

/// How the chart should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    /// Date x-axis.
    Line,
    /// Categorical x-axis.
    Bar,
}

/// Column roles and axis choice for a result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub x_column: Option<String>,
    pub y_column: String,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub date_column: Option<String>,
    pub title: String,
}

/// Infers chart metadata from rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultShaper;

impl ResultShaper {
    pub fn new() -> Self {
        Self
    }

    /// Returns a chart spec, or None when the rows have nothing to plot.
    ///
    /// Requested columns are matched loosely against the result columns and
    /// take precedence over inference.
    pub fn infer(
        &self,
        rows: &[Row],
        requested_x: Option<&str>,
        requested_y: Option<&str>,
    ) -> Option<ChartSpec> {
        let first = rows.first()?;
        let columns: Vec<&str> = first.columns().collect();
        let roles = ColumnRoles::classify(rows, &columns);

        let matched_x = requested_x.and_then(|r| find_matching_column(r, &columns));
        let matched_y = requested_y.and_then(|r| find_matching_column(r, &columns));

        let (mut x, mut y) = match (matched_x, matched_y) {
            (Some(x), Some(y)) if roles.is_numeric(x) && !roles.is_numeric(y) => {
                (Some(y), Some(x))
            }
            (x, y) => (x, y),
        };

        if x.is_none() {
            x = roles.default_x(&columns, y);
        }
        if y.is_none() {
            y = roles.default_y();
        }

        let Some(y) = y else {
            debug!(columns = columns.len(), "No numeric column to chart");
            return None;
        };

        let chart_type = match (x, roles.date.as_deref()) {
            (Some(x), Some(date)) if x == date => ChartType::Line,
            _ => ChartType::Bar,
        };

        let title = match x {
            Some(x) => format!("{} by {}", humanize(y), humanize(x)),
            None => humanize(y),
        };

        Some(ChartSpec {
            chart_type,
            x_column: x.map(str::to_string),
            y_column: y.to_string(),
            numeric_columns: roles.numeric.clone(),
            categorical_columns: roles.categorical.clone(),
            date_column: roles.date.clone(),
            title,
        })
    }
}

/// Convenience wrapper around [`ResultShaper::infer`].
pub fn infer(
    rows: &[Row],
    requested_x: Option<&str>,
    requested_y: Option<&str>,
) -> Option<ChartSpec> {
    ResultShaper::new().infer(rows, requested_x, requested_y)
}

/// Returns true if the question asks for a graph, chart, plot or visual.
pub fn wants_chart(question: &str) -> bool {
    let lower = question.to_lowercase();
    CHART_PHRASES.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Default)]
struct ColumnRoles {
    date: Option<String>,
    numeric: Vec<String>,
    categorical: Vec<String>,
}

impl ColumnRoles {
    fn classify(rows: &[Row], columns: &[&str]) -> Self {
        let mut roles = Self::default();

        for &column in columns {
            let sample = sample_value(rows, column);
            let is_date = matches!(sample, Some(v) if looks_like_date(column, v));

            if is_date {
                if roles.date.is_none() {
                    roles.date = Some(column.to_string());
                }
            } else if sample.and_then(Value::as_f64).is_some() {
                roles.numeric.push(column.to_string());
            } else {
                roles.categorical.push(column.to_string());
            }
        }
        roles
    }

    fn is_numeric(&self, column: &str) -> bool {
        self.numeric.iter().any(|c| c == column)
    }

    fn default_x<'a>(&self, columns: &[&'a str], y: Option<&str>) -> Option<&'a str> {
        let lookup = |name: &str| columns.iter().copied().find(|c| *c == name);

        if let Some(date) = self.date.as_deref() {
            return lookup(date);
        }

        let candidates: Vec<&str> = self
            .categorical
            .iter()
            .map(String::as_str)
            .filter(|c| Some(*c) != y)
            .collect();

        candidates
            .iter()
            .find(|c| has_hint(c, CATEGORY_NAME_HINTS))
            .or_else(|| candidates.first())
            .and_then(|c| lookup(*c))
    }

    fn default_y(&self) -> Option<&str> {
        self.numeric
            .iter()
            .find(|c| has_hint(c, VALUE_NAME_HINTS))
            .or_else(|| self.numeric.first())
            .map(String::as_str)
    }
}

/// First row's value for the column, or the first non-null one below it.
fn sample_value<'a>(rows: &'a [Row], column: &str) -> Option<&'a Value> {
    rows.iter()
        .filter_map(|row| row.get(column))
        .find(|v| !v.is_null())
}

fn looks_like_date(column: &str, value: &Value) -> bool {
    if value.is_temporal() {
        return true;
    }
    match value {
        Value::Text(text) => {
            has_hint(column, DATE_NAME_HINTS)
                && date_prefix().is_some_and(|re| re.is_match(text.trim()))
        }
        _ => false,
    }
}

fn date_prefix() -> Option<&'static Regex> {
    static DATE: OnceLock<Option<Regex>> = OnceLock::new();
    DATE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").ok())
        .as_ref()
}

fn word_pattern() -> Option<&'static Regex> {
    static WORD: OnceLock<Option<Regex>> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[a-z0-9]+").ok()).as_ref()
}

fn has_hint(column: &str, hints: &[&str]) -> bool {
    let lower = column.to_lowercase();
    hints.iter().any(|h| lower.contains(h))
}

/// Finds the result column that best matches a user-supplied name.
///
/// Tries exact matches on case, space and underscore variants, then
/// substring containment either way, then the largest word overlap.
pub fn find_matching_column<'a>(requested: &str, columns: &[&'a str]) -> Option<&'a str> {
    let requested = requested.trim().to_lowercase();
    if requested.is_empty() {
        return None;
    }

    let variants = [
        requested.clone(),
        requested.replace(' ', "_"),
        requested.replace(' ', ""),
        requested.replace('_', " "),
    ];

    let exact = columns.iter().copied().find(|col| {
        let col = col.to_lowercase();
        variants.iter().any(|v| *v == col)
    });
    if exact.is_some() {
        return exact;
    }

    let substring = columns.iter().copied().find(|col| {
        let col = col.to_lowercase();
        variants
            .iter()
            .any(|v| col.contains(v.as_str()) || v.contains(col.as_str()))
    });
    if substring.is_some() {
        return substring;
    }

    let requested_words = words(&requested);
    let mut best: Option<(&'a str, usize)> = None;
    for &col in columns {
        let score = words(&col.to_lowercase())
            .intersection(&requested_words)
            .count();
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((col, score));
        }
    }
    best.map(|(col, _)| col)
}

fn words(text: &str) -> HashSet<String> {
    // underscores separate words: SELLING_PRICE matches "selling price"
    word_pattern()
        .map(|re| re.find_iter(text).map(|m| m.as_str().to_string()).collect())
        .unwrap_or_default()
}

fn humanize(column: &str) -> String {
    column.replace('_', " ")
}
