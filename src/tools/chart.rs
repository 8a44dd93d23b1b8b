//! Chart statistics for the data-literacy tool
//!
//! Tables, series and stem-and-leaf displays are computed here; plotting is
//! left to the client. Suggestions and hints go through the completion
//! service.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::completion::CompletionOptions;
use crate::conversation::ConversationRelay;
use crate::prompt::CHART_COACH;
use crate::{Error, Result};

/// Default class width when none is given
pub const DEFAULT_BIN_WIDTH: f64 = 5.0;

/// Upper bound on classes in one table
const MAX_BINS: usize = 1000;

/// Reply budget for suggestions and hints
const ADVICE_MAX_TOKENS: u32 = 500;

/// Chart the student is working on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChartKind {
    StemAndLeaf,
    Histogram,
    #[default]
    FrequencyTable,
    FrequencyPolygon,
}

impl ChartKind {
    /// Name used in Korean prompts
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::StemAndLeaf => "줄기와 잎 그림",
            Self::Histogram => "히스토그램",
            Self::FrequencyTable => "도수분포표",
            Self::FrequencyPolygon => "도수분포다각형",
        }
    }
}

/// CSV with a header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Parse comma-separated text; quoted fields may contain commas and `""`
    ///
    /// # Errors
    ///
    /// Returns `FileFormat` if there is no header row
    pub fn parse_csv(text: &str) -> Result<Self> {
        let mut lines = text
            .trim_start_matches('\u{feff}')
            .lines()
            .filter(|l| !l.trim().is_empty());

        let headers = lines
            .next()
            .map(parse_csv_line)
            .ok_or_else(|| Error::FileFormat("CSV has no header row".to_string()))?;
        let rows = lines.map(parse_csv_line).collect();

        Ok(Self { headers, rows })
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Columns whose non-empty cells all parse as numbers
    #[must_use]
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(index, _)| {
                let mut cells = self.cells(*index).peekable();
                cells.peek().is_some() && cells.all(|c| parse_number(c).is_some())
            })
            .map(|(_, name)| name.as_str())
            .collect()
    }

    /// Values of a numeric column, empty cells dropped
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` for an unknown or non-numeric column
    pub fn column_values(&self, name: &str) -> Result<Vec<f64>> {
        let index = self
            .headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::invalid(format!("no column named '{name}'")))?;

        let values = self
            .cells(index)
            .map(|cell| {
                parse_number(cell)
                    .ok_or_else(|| Error::invalid(format!("column '{name}' is not numeric: '{cell}'")))
            })
            .collect::<Result<Vec<f64>>>()?;

        if values.is_empty() {
            return Err(Error::invalid(format!("column '{name}' has no values")));
        }
        Ok(values)
    }

    fn cells(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(index))
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
    }
}

fn parse_number(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field).trim().to_string()),
            c => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

/// One class of a frequency table, covering `[lower, upper)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    /// Share of counted values
    pub relative: f64,
}

impl FrequencyBin {
    #[must_use]
    pub fn midpoint(&self) -> f64 {
        f64::midpoint(self.lower, self.upper)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyTable {
    pub bin_width: f64,
    pub bin_start: f64,
    pub bins: Vec<FrequencyBin>,
    /// Values that fell into a class
    pub counted: usize,
    /// Values below `bin_start`
    pub excluded: usize,
}

impl FrequencyTable {
    /// Classes `[start + k·w, start + (k+1)·w)` up to the largest value
    ///
    /// `bin_start` defaults to the smallest value.
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` for a non-positive width, no values, a start
    /// above every value, or too many classes
    pub fn build(values: &[f64], bin_width: f64, bin_start: Option<f64>) -> Result<Self> {
        if !(bin_width.is_finite() && bin_width > 0.0) {
            return Err(Error::invalid("bin width must be greater than 0"));
        }
        let (min, max) = min_max(values).ok_or_else(|| Error::invalid("no values to tabulate"))?;
        let start = bin_start.unwrap_or(min);
        if !start.is_finite() || start > max {
            return Err(Error::invalid("bin start must not exceed the largest value"));
        }

        let span = ((max - start) / bin_width).floor();
        #[allow(clippy::cast_precision_loss)]
        let max_span = MAX_BINS as f64;
        if !span.is_finite() || span >= max_span {
            return Err(Error::invalid(format!(
                "bin width is too small for this range (max {MAX_BINS} classes)"
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bin_count = span as usize + 1;

        let mut counts = vec![0_usize; bin_count];
        let mut excluded = 0;
        for &value in values {
            if value < start {
                excluded += 1;
                continue;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let index = (((value - start) / bin_width).floor() as usize).min(bin_count - 1);
            counts[index] += 1;
        }

        let counted = values.len() - excluded;
        #[allow(clippy::cast_precision_loss)]
        let bins = counts
            .into_iter()
            .enumerate()
            .map(|(k, count)| FrequencyBin {
                lower: start + k as f64 * bin_width,
                upper: start + (k + 1) as f64 * bin_width,
                count,
                relative: if counted == 0 {
                    0.0
                } else {
                    count as f64 / counted as f64
                },
            })
            .collect();

        Ok(Self {
            bin_width,
            bin_start: start,
            bins,
            counted,
            excluded,
        })
    }

    /// Histogram bars: class bounds and counts
    #[must_use]
    pub fn histogram(&self) -> Vec<HistogramBar> {
        self.bins
            .iter()
            .map(|b| HistogramBar {
                lower: b.lower,
                upper: b.upper,
                count: b.count,
            })
            .collect()
    }

    /// Polygon vertices at class midpoints, closed with an empty class on each side
    #[must_use]
    pub fn polygon(&self) -> Vec<PolygonPoint> {
        let half = self.bin_width / 2.0;
        let first = self.bin_start - half;
        let last = self.bins.last().map_or(self.bin_start, |b| b.upper) + half;

        std::iter::once(PolygonPoint { x: first, count: 0 })
            .chain(self.bins.iter().map(|b| PolygonPoint {
                x: b.midpoint(),
                count: b.count,
            }))
            .chain(std::iter::once(PolygonPoint { x: last, count: 0 }))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBar {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolygonPoint {
    pub x: f64,
    pub count: usize,
}

/// Stem-and-leaf display
///
/// Values are divided by `stem_unit` and rounded; the last digit is the leaf
/// and the rest is the stem. With unit 1, 23 is stem 2 leaf 3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StemAndLeaf {
    pub stem_unit: u32,
    pub rows: Vec<StemRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StemRow {
    pub stem: u64,
    pub leaves: Vec<u8>,
}

impl StemAndLeaf {
    /// # Errors
    ///
    /// Returns `InputValidation` for a zero unit, negative values, no values,
    /// or a spread needing more than `MAX_BINS` stems
    pub fn build(values: &[f64], stem_unit: u32) -> Result<Self> {
        if stem_unit == 0 {
            return Err(Error::invalid("stem unit must be at least 1"));
        }
        if values.is_empty() {
            return Err(Error::invalid("no values to display"));
        }
        if values.iter().any(|v| *v < 0.0) {
            return Err(Error::invalid("stem-and-leaf displays need non-negative values"));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut scaled: Vec<u64> = values
            .iter()
            .map(|v| (v / f64::from(stem_unit)).round() as u64)
            .collect();
        scaled.sort_unstable();

        let (Some(&low), Some(&high)) = (scaled.first(), scaled.last()) else {
            return Err(Error::invalid("no values to display"));
        };
        let stems = high / 10 - low / 10 + 1;
        if stems > MAX_BINS as u64 {
            return Err(Error::invalid(format!(
                "values are too far apart: {stems} stems (max {MAX_BINS}); raise the stem unit"
            )));
        }
        let mut rows: Vec<StemRow> = (low / 10..=high / 10)
            .map(|stem| StemRow {
                stem,
                leaves: Vec::new(),
            })
            .collect();
        for n in scaled {
            #[allow(clippy::cast_possible_truncation)]
            let leaf = (n % 10) as u8;
            let row = usize::try_from(n / 10 - low / 10).unwrap_or(0);
            rows[row].leaves.push(leaf);
        }

        Ok(Self { stem_unit, rows })
    }
}

impl fmt::Display for StemAndLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.stem.to_string().len())
            .max()
            .unwrap_or(1);
        for row in &self.rows {
            let leaves = row
                .leaves
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(f, "{:>width$} | {leaves}", row.stem)?;
        }
        Ok(())
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Chart request built from the tool form
#[derive(Debug, Clone, Deserialize)]
pub struct ChartRequest {
    /// CSV text with a header row
    pub csv: String,
    pub column: String,
    #[serde(default)]
    pub kind: ChartKind,
    pub bin_width: Option<f64>,
    pub bin_start: Option<f64>,
    pub stem_unit: Option<u32>,
}

impl ChartRequest {
    fn values(&self) -> Result<Vec<f64>> {
        DataTable::parse_csv(&self.csv)?.column_values(&self.column)
    }

    fn settings(&self) -> String {
        let or_na = |v: Option<String>| v.unwrap_or_else(|| "N/A".to_string());
        match self.kind {
            ChartKind::StemAndLeaf => format!("줄기의 자릿수={}", self.stem_unit.unwrap_or(1)),
            _ => format!(
                "계급 간격={}, 시작 값={}",
                self.bin_width.unwrap_or(DEFAULT_BIN_WIDTH),
                or_na(self.bin_start.map(|v| v.to_string()))
            ),
        }
    }
}

/// Everything the client needs to draw the chart
#[derive(Debug, Clone, Serialize)]
pub struct ChartSummary {
    pub column: String,
    pub kind: ChartKind,
    /// Columns the CSV offers for charting
    pub numeric_columns: Vec<String>,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<FrequencyTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histogram: Option<Vec<HistogramBar>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<PolygonPoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stem_and_leaf: Option<StemAndLeaf>,
}

/// Compute the statistics for `request.kind`
///
/// # Errors
///
/// Returns `FileFormat` for a CSV without header, `InputValidation` for a bad
/// column or settings
pub fn summarize(request: &ChartRequest) -> Result<ChartSummary> {
    let data = DataTable::parse_csv(&request.csv)?;
    let values = data.column_values(&request.column)?;
    let (min, max) = min_max(&values).ok_or_else(|| Error::invalid("no values"))?;
    #[allow(clippy::cast_precision_loss)]
    let mean = values.iter().sum::<f64>() / values.len() as f64;

    let mut summary = ChartSummary {
        column: request.column.clone(),
        kind: request.kind,
        numeric_columns: data.numeric_columns().into_iter().map(str::to_string).collect(),
        count: values.len(),
        min,
        max,
        mean,
        table: None,
        histogram: None,
        polygon: None,
        stem_and_leaf: None,
    };

    if request.kind == ChartKind::StemAndLeaf {
        summary.stem_and_leaf = Some(StemAndLeaf::build(&values, request.stem_unit.unwrap_or(1))?);
        return Ok(summary);
    }

    let table = FrequencyTable::build(
        &values,
        request.bin_width.unwrap_or(DEFAULT_BIN_WIDTH),
        request.bin_start,
    )?;
    match request.kind {
        ChartKind::Histogram => summary.histogram = Some(table.histogram()),
        ChartKind::FrequencyPolygon => summary.polygon = Some(table.polygon()),
        _ => {}
    }
    summary.table = Some(table);
    Ok(summary)
}

/// Prompt asking for improvements to the chart
///
/// # Errors
///
/// Same as [`summarize`]
pub fn suggestions_prompt(request: &ChartRequest) -> Result<String> {
    let values = request.values()?;
    Ok(format!(
        "현재 생성된 {}에 대한 개선 사항을 제안해 주세요. 데이터 분석 및 시각화 측면에서 유용한 아이디어를 제공합니다.\n데이터: {values:?}\n차트 설정: {}",
        request.kind.label(),
        request.settings()
    ))
}

/// Prompt asking for question-style hints for students
///
/// # Errors
///
/// Same as [`summarize`]
pub fn hints_prompt(request: &ChartRequest) -> Result<String> {
    let values = request.values()?;
    Ok(format!(
        "학생들이 {}을(를) 분석할 때 도움이 되는 간접적인 힌트를 발문의 형태로 제공해 주세요.\n데이터: {values:?}",
        request.kind.label()
    ))
}

/// Completion-backed improvement suggestions
///
/// # Errors
///
/// Returns `InputValidation` for bad input, `Upstream` if the completion fails
pub async fn suggest(
    relay: &ConversationRelay,
    request: &ChartRequest,
    options: &CompletionOptions,
) -> Result<String> {
    let prompt = suggestions_prompt(request)?;
    relay.ask(CHART_COACH, &prompt, &advice_options(options)).await
}

/// Completion-backed hints
///
/// # Errors
///
/// Returns `InputValidation` for bad input, `Upstream` if the completion fails
pub async fn hints(
    relay: &ConversationRelay,
    request: &ChartRequest,
    options: &CompletionOptions,
) -> Result<String> {
    let prompt = hints_prompt(request)?;
    relay.ask(CHART_COACH, &prompt, &advice_options(options)).await
}

fn advice_options(options: &CompletionOptions) -> CompletionOptions {
    CompletionOptions {
        max_output_tokens: options.max_output_tokens.or(Some(ADVICE_MAX_TOKENS)),
        ..options.clone()
    }
}
