use serde::Serialize;

use crate::api::types::{ExperimentMetrics, VariantMetrics, WarmupStats};

/// Click-through rate; 0 when there were no impressions.
pub fn ctr(impressions: u64, clicks: u64) -> f64 {
    if impressions == 0 {
        0.0
    } else {
        clicks as f64 / impressions as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantStats {
    pub creative_id: u64,
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
}

impl From<&VariantMetrics> for VariantStats {
    fn from(m: &VariantMetrics) -> Self {
        let ctr = m
            .ctr
            .filter(|c| c.is_finite())
            .unwrap_or_else(|| ctr(m.impressions, m.clicks));
        Self { creative_id: m.creative_id, impressions: m.impressions, clicks: m.clicks, ctr }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub impressions: u64,
    pub clicks: u64,
    /// Pooled: total clicks over total impressions
    pub avg_ctr: f64,
    pub best: VariantStats,
}

/// Totals, pooled CTR and the best variant. The first variant with the
/// highest CTR wins ties. `None` for an empty list.
pub fn summarize(variants: &[VariantStats]) -> Option<MetricsSummary> {
    let mut best = variants.first()?;
    for v in &variants[1..] {
        if v.ctr > best.ctr {
            best = v;
        }
    }
    let impressions: u64 = variants.iter().map(|v| v.impressions).sum();
    let clicks: u64 = variants.iter().map(|v| v.clicks).sum();
    Some(MetricsSummary {
        impressions,
        clicks,
        avg_ctr: ctr(impressions, clicks),
        best: best.clone(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationSign {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Deviation {
    pub sign: DeviationSign,
    pub magnitude: f64,
}

/// A CTR equal to the average counts as above.
pub fn deviation(variant: &VariantStats, avg_ctr: f64) -> Deviation {
    let sign = if variant.ctr >= avg_ctr { DeviationSign::Above } else { DeviationSign::Below };
    Deviation { sign, magnitude: (variant.ctr - avg_ctr).abs() }
}

/// `0.1333` -> `"13.33%"`
pub fn format_percent(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantRow {
    pub stats: VariantStats,
    pub deviation: Deviation,
    pub is_best: bool,
    pub ctr_label: String,
    pub deviation_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub experiment_id: String,
    pub summary: Option<MetricsSummary>,
    pub rows: Vec<VariantRow>,
}

pub fn annotate(snapshot: &ExperimentMetrics) -> MetricsReport {
    let stats: Vec<VariantStats> = snapshot.variants.iter().map(VariantStats::from).collect();
    let summary = summarize(&stats);
    let avg = summary.as_ref().map(|s| s.avg_ctr).unwrap_or(0.0);
    let best_id = summary.as_ref().map(|s| s.best.creative_id);

    let mut best_seen = false;
    let rows = stats
        .into_iter()
        .map(|s| {
            let deviation = deviation(&s, avg);
            // Only the first row carrying the best id is flagged.
            let is_best = !best_seen && Some(s.creative_id) == best_id;
            best_seen |= is_best;
            let word = match deviation.sign {
                DeviationSign::Above => "above",
                DeviationSign::Below => "below",
            };
            VariantRow {
                ctr_label: format_percent(s.ctr),
                deviation_label: format!("{} average by {}", word, format_percent(deviation.magnitude)),
                stats: s,
                deviation,
                is_best,
            }
        })
        .collect();

    MetricsReport { experiment_id: snapshot.experiment_id.clone(), summary, rows }
}

/// Share of warmup runs that succeeded; 0 before the first run.
pub fn warmup_success_rate(stats: &WarmupStats) -> f64 {
    if stats.runs == 0 {
        0.0
    } else {
        stats.successes as f64 / stats.runs as f64
    }
}
