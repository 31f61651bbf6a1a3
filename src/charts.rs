//! Chart payload construction.
//!
//! Every builder is a pure function of the loaded tables and returns a
//! Plotly-compatible figure (`{"data": [...], "layout": {...}}`) as a
//! `serde_json::Value`. A builder whose table is absent returns the empty
//! sentinel `{}` instead of failing. The `ChartSource` trait is the seam
//! between the data-backed variant and the placeholder variant; the server
//! only sees the trait.

use std::collections::BTreeMap;

use rand::seq::index::sample;
use serde_json::{json, Map, Value};

use crate::data::{ApplicationTable, PreviousTable, Tables};
use crate::logging::{log, obj, v_u64, Domain, Level};

/// Slot keys, in page order. The template contract is exactly these six.
pub const CHART_SLOTS: [&str; 6] = [
    "risk_dist",
    "kpi_trend",
    "edu_bar",
    "gender_pie",
    "income_box",
    "credit_hist",
];

const COLOR_REPAYER: &str = "#00b894";
const COLOR_DEFAULTER: &str = "#d63031";
const COLOR_UNKNOWN: &str = "#636e72";
const COLOR_VOLUME: &str = "#0984e3";

/// Fixed qualitative palette for categorical pies.
const PASTEL: [&str; 10] = [
    "#66C5CC", "#F6CF71", "#F89C74", "#DCB0F2", "#87C55F", "#9EB9F3", "#FE88B1", "#C9DB74",
    "#8BE0A4", "#B497E7",
];

/// The six figures the page renders, one per slot.
#[derive(Debug, Clone)]
pub struct ChartSet {
    pub risk_dist: Value,
    pub kpi_trend: Value,
    pub edu_bar: Value,
    pub gender_pie: Value,
    pub income_box: Value,
    pub credit_hist: Value,
}

impl ChartSet {
    pub fn all_empty() -> Self {
        Self {
            risk_dist: empty_figure(),
            kpi_trend: empty_figure(),
            edu_bar: empty_figure(),
            gender_pie: empty_figure(),
            income_box: empty_figure(),
            credit_hist: empty_figure(),
        }
    }

    pub fn slots(&self) -> [(&'static str, &Value); 6] {
        [
            ("risk_dist", &self.risk_dist),
            ("kpi_trend", &self.kpi_trend),
            ("edu_bar", &self.edu_bar),
            ("gender_pie", &self.gender_pie),
            ("income_box", &self.income_box),
            ("credit_hist", &self.credit_hist),
        ]
    }

    /// Object keyed by slot name, for embedding in the page.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (key, figure) in self.slots() {
            map.insert(key.to_string(), figure.clone());
        }
        Value::Object(map)
    }
}

/// The "no data" sentinel: structurally valid, carries no series.
pub fn empty_figure() -> Value {
    json!({})
}

pub fn is_empty_figure(figure: &Value) -> bool {
    figure.as_object().map(|o| o.is_empty()).unwrap_or(false)
}

/// Seam between the data-backed and placeholder chart pipelines.
pub trait ChartSource {
    /// Whether the application table is resident in memory.
    fn has_data(&self) -> bool;
    /// Build all six figures from scratch. Total: never fails.
    fn build(&self) -> ChartSet;
}

/// Real pipeline: aggregates the loaded tables on every call.
pub struct DataBackedCharts {
    tables: Tables,
    sample_cap: usize,
}

impl DataBackedCharts {
    pub fn new(tables: Tables, sample_cap: usize) -> Self {
        Self { tables, sample_cap }
    }
}

impl ChartSource for DataBackedCharts {
    fn has_data(&self) -> bool {
        self.tables.has_application_table()
    }

    fn build(&self) -> ChartSet {
        ChartSet {
            risk_dist: risk_distribution(self.tables.app.as_ref()),
            kpi_trend: application_volume(self.tables.prev.as_ref()),
            edu_bar: education_risk(self.tables.app.as_ref()),
            gender_pie: gender_split(self.tables.app.as_ref()),
            income_box: income_scatter(self.tables.app.as_ref(), self.sample_cap),
            // Reserved slot, never computed; kept for front-end symmetry.
            credit_hist: empty_figure(),
        }
    }
}

/// Shell pipeline: serves annotated empty frames so the page renders
/// before any analysis exists. Loads nothing, so `has_data` is false.
pub struct PlaceholderCharts;

impl ChartSource for PlaceholderCharts {
    fn has_data(&self) -> bool {
        false
    }

    fn build(&self) -> ChartSet {
        ChartSet {
            risk_dist: placeholder_figure("Portfolio Risk Distribution", "donut"),
            kpi_trend: placeholder_figure("Application Volume History", "area"),
            edu_bar: placeholder_figure("Default Rate by Education", "horizontal bar"),
            gender_pie: placeholder_figure("Gender Split", "pie"),
            income_box: placeholder_figure("Income vs Loan Amount", "scatter"),
            credit_hist: placeholder_figure("Credit History", "histogram"),
        }
    }
}

fn target_label(target: i64) -> String {
    match target {
        0 => "Repayer".to_string(),
        1 => "Defaulter".to_string(),
        other => format!("Unknown ({})", other),
    }
}

fn target_color(target: i64) -> &'static str {
    match target {
        0 => COLOR_REPAYER,
        1 => COLOR_DEFAULTER,
        _ => COLOR_UNKNOWN,
    }
}

/// Donut of repayers vs defaulters. Rows with a missing outcome are
/// excluded from the count; outcome values outside {0,1} land in an
/// explicit unknown bucket instead of passing through unlabeled.
pub fn risk_distribution(app: Option<&ApplicationTable>) -> Value {
    let Some(app) = app else {
        return empty_figure();
    };

    let mut counts: BTreeMap<i64, u64> = BTreeMap::new();
    for row in &app.rows {
        if let Some(target) = row.target {
            *counts.entry(target).or_insert(0) += 1;
        }
    }

    // Two categories for healthy data; more means unexpected outcome values.
    log(
        Level::Debug,
        Domain::Chart,
        "risk_dist.categories",
        obj(&[("count", v_u64(counts.len() as u64))]),
    );

    let labels: Vec<String> = counts.keys().map(|t| target_label(*t)).collect();
    let values: Vec<u64> = counts.values().copied().collect();
    let colors: Vec<&str> = counts.keys().map(|t| target_color(*t)).collect();

    json!({
        "data": [{
            "type": "pie",
            "labels": labels,
            "values": values,
            "hole": 0.5,
            "marker": {"colors": colors},
        }],
        "layout": {
            "title": {"text": "Portfolio Risk Distribution"},
            "height": 350,
            "margin": {"t": 40, "b": 0, "l": 0, "r": 0},
        }
    })
}

/// Whole months before the application date: floor(abs(days) / 30).
pub fn months_ago_counts(days_decision: &[f64]) -> BTreeMap<i64, u64> {
    let mut counts = BTreeMap::new();
    for d in days_decision {
        let months = (d.abs() / 30.0).floor() as i64;
        *counts.entry(months).or_insert(0) += 1;
    }
    counts
}

/// Filled area of decision volume per month, most historical first,
/// x-axis reversed so the most recent month sits on the right. All
/// history is plotted; no recency cutoff.
pub fn application_volume(prev: Option<&PreviousTable>) -> Value {
    let Some(prev) = prev else {
        return empty_figure();
    };

    let counts = months_ago_counts(&prev.days_decision);
    log(
        Level::Debug,
        Domain::Chart,
        "kpi_trend.months",
        obj(&[("count", v_u64(counts.len() as u64))]),
    );

    let months: Vec<i64> = counts.keys().rev().copied().collect();
    let volumes: Vec<u64> = counts.values().rev().copied().collect();

    json!({
        "data": [{
            "type": "scatter",
            "mode": "lines",
            "fill": "tozeroy",
            "x": months,
            "y": volumes,
            "line": {"color": COLOR_VOLUME},
        }],
        "layout": {
            "title": {"text": "Application Volume History (All Time)"},
            "xaxis": {"autorange": "reversed", "title": {"text": "Months Ago"}},
            "yaxis": {"title": {"text": "Volume"}},
            "height": 350,
            "margin": {"t": 40, "b": 0, "l": 0, "r": 0},
            "paper_bgcolor": "rgba(0,0,0,0)",
            "plot_bgcolor": "rgba(0,0,0,0)",
        }
    })
}

/// Percentage default rate per education level, ascending. Rows with a
/// missing outcome do not enter the mean; a level with no known outcomes
/// is omitted rather than reported as 0%.
pub fn education_rates(app: &ApplicationTable) -> Vec<(String, f64)> {
    let mut groups: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for row in &app.rows {
        if let Some(target) = row.target {
            let entry = groups.entry(row.education_type.as_str()).or_insert((0, 0));
            entry.0 += target.max(0) as u64;
            entry.1 += 1;
        }
    }

    let mut rates: Vec<(String, f64)> = groups
        .into_iter()
        .filter(|(_, (_, n))| *n > 0)
        .map(|(name, (defaults, n))| (name.to_string(), defaults as f64 / n as f64 * 100.0))
        .collect();
    rates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    rates
}

/// Horizontal bar of default rate by education, shaded by rate.
pub fn education_risk(app: Option<&ApplicationTable>) -> Value {
    let Some(app) = app else {
        return empty_figure();
    };

    let rates = education_rates(app);
    let names: Vec<&str> = rates.iter().map(|(name, _)| name.as_str()).collect();
    let values: Vec<f64> = rates.iter().map(|(_, rate)| *rate).collect();

    json!({
        "data": [{
            "type": "bar",
            "orientation": "h",
            "x": values,
            "y": names,
            "marker": {"color": values, "colorscale": "Reds", "showscale": false},
        }],
        "layout": {
            "title": {"text": "Default Rate by Education"},
            "xaxis": {"title": {"text": "Default %"}},
            "height": 350,
            "margin": {"t": 40, "b": 0, "l": 0, "r": 0},
        }
    })
}

/// Pie of applications per gender code. Whatever categories the source
/// carries (including the XNA unknown code) appear as their own slices.
pub fn gender_split(app: Option<&ApplicationTable>) -> Value {
    let Some(app) = app else {
        return empty_figure();
    };

    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for row in &app.rows {
        *counts.entry(row.gender.as_str()).or_insert(0) += 1;
    }

    let labels: Vec<&str> = counts.keys().copied().collect();
    let values: Vec<u64> = counts.values().copied().collect();
    let colors: Vec<&str> = (0..labels.len()).map(|i| PASTEL[i % PASTEL.len()]).collect();

    json!({
        "data": [{
            "type": "pie",
            "labels": labels,
            "values": values,
            "marker": {"colors": colors},
        }],
        "layout": {
            "title": {"text": "Gender Split"},
            "height": 350,
            "margin": {"t": 40, "b": 0, "l": 0, "r": 0},
        }
    })
}

/// Scatter of income vs credit over a uniform random sample of at most
/// `sample_cap` rows, drawn without replacement. Missing outcomes fill
/// with 0 before labeling. No outlier filtering: extreme incomes plot
/// as-is.
pub fn income_scatter(app: Option<&ApplicationTable>, sample_cap: usize) -> Value {
    let Some(app) = app else {
        return empty_figure();
    };

    let n = app.rows.len();
    let k = n.min(sample_cap);
    log(
        Level::Debug,
        Domain::Chart,
        "income_box.points",
        obj(&[("count", v_u64(k as u64))]),
    );
    let mut indices = sample(&mut rand::thread_rng(), n, k).into_vec();
    // Table order within the sample, so repeated builds over a full
    // sample render identically.
    indices.sort_unstable();

    // One trace per outcome label so the legend gets fixed colors.
    let mut by_target: BTreeMap<i64, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for i in indices {
        let row = &app.rows[i];
        let target = row.target.unwrap_or(0);
        let series = by_target.entry(target).or_default();
        series.0.push(row.income_total);
        series.1.push(row.credit_amount);
    }

    let traces: Vec<Value> = by_target
        .iter()
        .map(|(target, (incomes, credits))| {
            json!({
                "type": "scatter",
                "mode": "markers",
                "name": target_label(*target),
                "x": incomes,
                "y": credits,
                "opacity": 0.6,
                "marker": {"color": target_color(*target)},
            })
        })
        .collect();

    json!({
        "data": traces,
        "layout": {
            "title": {"text": "Income vs Loan Amount"},
            "xaxis": {"title": {"text": "Income"}},
            "yaxis": {"title": {"text": "Loan Amount"}},
            "height": 400,
            "margin": {"t": 40, "b": 0, "l": 0, "r": 0},
        }
    })
}

/// One annotated empty frame: title, hidden axes, centered note naming
/// the intended chart kind, transparent background, fixed height.
pub fn placeholder_figure(title: &str, kind: &str) -> Value {
    json!({
        "data": [],
        "layout": {
            "title": {"text": title},
            "height": 350,
            "xaxis": {"visible": false},
            "yaxis": {"visible": false},
            "paper_bgcolor": "rgba(0,0,0,0)",
            "plot_bgcolor": "rgba(0,0,0,0)",
            "annotations": [{
                "text": format!("{} - awaiting data", kind),
                "xref": "paper",
                "yref": "paper",
                "x": 0.5,
                "y": 0.5,
                "showarrow": false,
                "font": {"size": 14, "color": "#94a3b8"},
            }],
        }
    })
}
