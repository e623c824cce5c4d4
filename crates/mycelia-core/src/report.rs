//! Benchmark report text format.
//!
//! Layout:
//! - `# <title>` followed by `Date`, `Version`, `Runtime`, `OS` fields.
//! - Sections separated by `---` lines, each with a `## <name>` header and
//!   `<Label>: <value> <unit>` metric lines.
//! - A closing status block with exactly four fields.
//!
//! The parser accepts thousands separators (`50,234`) and units glued to the
//! value (`2.5ms`) so hand-edited baselines still load.

use std::fmt::Write;

use crate::error::{MyceliaError, Result};

const SEPARATOR: &str = "---";

const FIELD_DATE: &str = "Date";
const FIELD_VERSION: &str = "Version";
const FIELD_RUNTIME: &str = "Runtime";
const FIELD_OS: &str = "OS";

const FIELD_DOC_STATUS: &str = "Document Status";
const FIELD_PRIORITY: &str = "Priority";
const FIELD_EFFORT: &str = "Estimated Effort";
const FIELD_ROI: &str = "Expected ROI";

/// Report header (title line plus four fixed fields).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHeader {
    pub title: String,
    pub date: String,
    pub version: String,
    pub runtime: String,
    pub os: String,
}

/// One `<Label>: <value> <unit>` line.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub label: String,
    pub value: f64,
    pub unit: String,
    /// Digits after the decimal point when rendered.
    pub precision: usize,
}

impl Metric {
    pub fn new(label: impl Into<String>, value: f64, unit: impl Into<String>, precision: usize) -> Self {
        Self {
            label: label.into(),
            value,
            unit: unit.into(),
            precision,
        }
    }

    /// Whether larger values are better, worse, or neither for this unit.
    pub fn direction(&self) -> Direction {
        Direction::for_unit(&self.unit)
    }
}

/// A `## <name>` block of metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSection {
    pub name: String,
    pub metrics: Vec<Metric>,
}

impl ReportSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: Vec::new(),
        }
    }

    pub fn push(&mut self, metric: Metric) -> &mut Self {
        self.metrics.push(metric);
        self
    }

    pub fn metric(&self, label: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.label == label)
    }
}

/// Closing status block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBlock {
    pub document_status: String,
    pub priority: String,
    pub estimated_effort: String,
    pub expected_roi: String,
}

/// Full benchmark report.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchReport {
    pub header: ReportHeader,
    pub sections: Vec<ReportSection>,
    pub status: StatusBlock,
}

impl BenchReport {
    pub fn section(&self, name: &str) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn metric(&self, section: &str, label: &str) -> Option<&Metric> {
        self.section(section).and_then(|s| s.metric(label))
    }

    /// Render to the report text format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let h = &self.header;
        let _ = writeln!(out, "# {}", h.title);
        let _ = writeln!(out);
        let _ = writeln!(out, "{FIELD_DATE}: {}", h.date);
        let _ = writeln!(out, "{FIELD_VERSION}: {}", h.version);
        let _ = writeln!(out, "{FIELD_RUNTIME}: {}", h.runtime);
        let _ = writeln!(out, "{FIELD_OS}: {}", h.os);
        let _ = writeln!(out);

        for section in &self.sections {
            let _ = writeln!(out, "{SEPARATOR}");
            let _ = writeln!(out);
            let _ = writeln!(out, "## {}", section.name);
            let _ = writeln!(out);
            for m in &section.metrics {
                let value = format_value(m.value, m.precision);
                if m.unit.is_empty() {
                    let _ = writeln!(out, "{}: {}", m.label, value);
                } else {
                    let _ = writeln!(out, "{}: {} {}", m.label, value, m.unit);
                }
            }
            let _ = writeln!(out);
        }

        let s = &self.status;
        let _ = writeln!(out, "{SEPARATOR}");
        let _ = writeln!(out);
        let _ = writeln!(out, "{FIELD_DOC_STATUS}: {}", s.document_status);
        let _ = writeln!(out, "{FIELD_PRIORITY}: {}", s.priority);
        let _ = writeln!(out, "{FIELD_EFFORT}: {}", s.estimated_effort);
        let _ = writeln!(out, "{FIELD_ROI}: {}", s.expected_roi);
        out
    }

    /// Parse the report text format.
    pub fn parse(text: &str) -> Result<Self> {
        let mut blocks: Vec<Vec<&str>> = vec![Vec::new()];
        for line in text.lines() {
            let line = line.trim();
            if line == SEPARATOR {
                blocks.push(Vec::new());
            } else if !line.is_empty() {
                if let Some(cur) = blocks.last_mut() {
                    cur.push(line);
                }
            }
        }

        if blocks.len() < 2 {
            return Err(bad("report has no `---` separators"));
        }

        let status_lines = blocks.pop().unwrap_or_default();
        let mut rest = blocks.into_iter();
        let header_lines = rest.next().unwrap_or_default();

        let header = parse_header(&header_lines)?;
        let sections = rest
            .filter(|b| !b.is_empty())
            .map(|b| parse_section(&b))
            .collect::<Result<Vec<_>>>()?;
        let status = parse_status(&status_lines)?;

        Ok(Self {
            header,
            sections,
            status,
        })
    }
}

fn bad(msg: impl Into<String>) -> MyceliaError {
    MyceliaError::BadRequest(msg.into())
}

fn split_field(line: &str) -> Result<(&str, &str)> {
    line.split_once(':')
        .map(|(k, v)| (k.trim(), v.trim()))
        .ok_or_else(|| bad(format!("expected `<Label>: <value>` line, got: {line}")))
}

/// Collect `Key: value` lines and return the values for `keys`, in order.
fn take_fields<'a>(lines: &[&'a str], keys: &[&str], block: &str) -> Result<Vec<&'a str>> {
    let mut found: Vec<Option<&'a str>> = vec![None; keys.len()];
    for line in lines {
        let (k, v) = split_field(line)?;
        let idx = keys
            .iter()
            .position(|key| *key == k)
            .ok_or_else(|| bad(format!("unexpected {block} field: {k}")))?;
        if found[idx].replace(v).is_some() {
            return Err(bad(format!("duplicate {block} field: {k}")));
        }
    }
    keys.iter()
        .zip(found)
        .map(|(k, v)| v.ok_or_else(|| bad(format!("missing {block} field: {k}"))))
        .collect()
}

fn parse_header(lines: &[&str]) -> Result<ReportHeader> {
    let (first, fields) = lines
        .split_first()
        .ok_or_else(|| bad("report header is empty"))?;
    let title = first
        .strip_prefix("# ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| bad("report must start with `# <title>`"))?;

    let v = take_fields(
        fields,
        &[FIELD_DATE, FIELD_VERSION, FIELD_RUNTIME, FIELD_OS],
        "header",
    )?;
    Ok(ReportHeader {
        title: title.to_string(),
        date: v[0].to_string(),
        version: v[1].to_string(),
        runtime: v[2].to_string(),
        os: v[3].to_string(),
    })
}

fn parse_section(lines: &[&str]) -> Result<ReportSection> {
    let (first, body) = lines
        .split_first()
        .ok_or_else(|| bad("empty section"))?;
    let name = first
        .strip_prefix("## ")
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| bad(format!("section must start with `## <name>`, got: {first}")))?;

    let mut section = ReportSection::new(name);
    for line in body {
        let (label, rest) = split_field(line)?;
        if label.is_empty() {
            return Err(bad(format!("metric label is empty: {line}")));
        }
        let (value, unit, precision) = parse_value_unit(rest)?;
        section.push(Metric::new(label, value, unit, precision));
    }
    Ok(section)
}

fn parse_status(lines: &[&str]) -> Result<StatusBlock> {
    let v = take_fields(
        lines,
        &[FIELD_DOC_STATUS, FIELD_PRIORITY, FIELD_EFFORT, FIELD_ROI],
        "status",
    )?;
    Ok(StatusBlock {
        document_status: v[0].to_string(),
        priority: v[1].to_string(),
        estimated_effort: v[2].to_string(),
        expected_roi: v[3].to_string(),
    })
}

/// Split `"50,234 ops/sec"` / `"2.5ms"` into value, unit, and precision.
pub fn parse_value_unit(s: &str) -> Result<(f64, String, usize)> {
    let s = s.trim();
    let split = s
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == ',' || *c == '.' || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);

    let digits: String = num.chars().filter(|c| *c != ',').collect();
    if digits.is_empty() || digits == "-" {
        return Err(bad(format!("metric value is not a number: {s}")));
    }
    let value: f64 = digits
        .parse()
        .map_err(|_| bad(format!("metric value is not a number: {s}")))?;
    let precision = digits.split_once('.').map(|(_, f)| f.len()).unwrap_or(0);

    Ok((value, unit.trim().to_string(), precision))
}

/// Render a value with fixed precision and thousands separators.
pub fn format_value(value: f64, precision: usize) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    let fixed = format!("{:.*}", precision, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let negative = value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(f) = frac_part {
        out.push('.');
        out.push_str(f);
    }
    out
}

/// Which way a metric should move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
    Neutral,
}

impl Direction {
    pub fn for_unit(unit: &str) -> Self {
        let u = unit.trim();
        if u.ends_with("/sec") || u.ends_with("/s") {
            return Direction::HigherIsBetter;
        }
        match u {
            "ns" | "us" | "µs" | "ms" | "s" | "B" | "bytes" | "KB" | "MB" | "GB" => {
                Direction::LowerIsBetter
            }
            _ => Direction::Neutral,
        }
    }
}

/// A metric that moved the wrong way by more than the tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct Regression {
    pub section: String,
    pub label: String,
    pub unit: String,
    pub baseline: f64,
    pub current: f64,
    /// Signed change relative to baseline, in percent.
    pub change_pct: f64,
}

/// Compare `current` against `baseline`. Metrics present on only one side,
/// neutral units, and zero baselines are skipped.
pub fn compare(baseline: &BenchReport, current: &BenchReport, tolerance_pct: f64) -> Vec<Regression> {
    let mut out = Vec::new();
    for section in &current.sections {
        for m in &section.metrics {
            let Some(base) = baseline.metric(&section.name, &m.label) else { continue; };
            if base.value == 0.0 {
                continue;
            }
            let change_pct = (m.value - base.value) / base.value * 100.0;
            let regressed = match m.direction() {
                Direction::HigherIsBetter => change_pct < -tolerance_pct,
                Direction::LowerIsBetter => change_pct > tolerance_pct,
                Direction::Neutral => false,
            };
            if regressed {
                out.push(Regression {
                    section: section.name.clone(),
                    label: m.label.clone(),
                    unit: m.unit.clone(),
                    baseline: base.value,
                    current: m.value,
                    change_pct,
                });
            }
        }
    }
    out
}
