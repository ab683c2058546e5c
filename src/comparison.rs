use crate::{errors::DashboardError, models::*, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value read from a summary row when comparing two row sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Count,
    Percentage,
    /// Mean record rate of the group, in percent.
    Rate,
}

impl Metric {
    fn read(&self, row: &SummaryRow) -> Option<f64> {
        match self {
            Metric::Count => Some(row.count as f64),
            Metric::Percentage => Some(row.percentage),
            Metric::Rate => row.mean_rate.map(|r| r * 100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaStatus {
    Defined,
    UndefinedDelta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub key: AggregationKey,
    pub baseline_value: f64,
    pub comparison_value: f64,
    pub absolute_difference: f64,
    /// `(comparison - baseline) / baseline`; `None` when the baseline is zero.
    pub percent_delta: Option<f64>,
    /// A side had no value for this key and was read as zero.
    pub partial: bool,
    pub delta_status: DeltaStatus,
}

pub struct ComparisonCalculator;

impl ComparisonCalculator {
    /// Outer-joins two row sets of the same key shape and computes the
    /// relative change from baseline to comparison for every key.
    pub fn compare(
        baseline: &[SummaryRow],
        comparison: &[SummaryRow],
        metric: Metric,
    ) -> Result<Vec<ComparisonRow>> {
        Self::compare_metrics(baseline, metric, comparison, metric)
    }

    /// Like `compare`, reading a different metric on each side (e.g. trial
    /// incidence rate against real-world report share).
    pub fn compare_metrics(
        baseline: &[SummaryRow],
        baseline_metric: Metric,
        comparison: &[SummaryRow],
        comparison_metric: Metric,
    ) -> Result<Vec<ComparisonRow>> {
        Self::check_key_shape(baseline, comparison)?;

        // Outer option: the side has a row for the key. Inner: the row provides the metric.
        let mut joined: BTreeMap<&AggregationKey, (Option<Option<f64>>, Option<Option<f64>>)> =
            BTreeMap::new();
        for row in baseline {
            let slot = joined.entry(&row.key).or_insert((None, None));
            if slot.0.is_some() {
                log::warn!("Duplicate baseline key {}, keeping first", row.key);
                continue;
            }
            slot.0 = Some(baseline_metric.read(row));
        }
        for row in comparison {
            let slot = joined.entry(&row.key).or_insert((None, None));
            if slot.1.is_some() {
                log::warn!("Duplicate comparison key {}, keeping first", row.key);
                continue;
            }
            slot.1 = Some(comparison_metric.read(row));
        }

        let rows: Vec<ComparisonRow> = joined
            .into_iter()
            .map(|(key, (baseline_value, comparison_value))| {
                Self::compare_values(key.clone(), baseline_value.flatten(), comparison_value.flatten())
            })
            .collect();

        let undefined = rows
            .iter()
            .filter(|r| r.delta_status == DeltaStatus::UndefinedDelta)
            .count();
        if undefined > 0 {
            log::warn!("{} of {} comparison rows have a zero baseline", undefined, rows.len());
        }

        Ok(rows)
    }

    fn compare_values(key: AggregationKey, baseline: Option<f64>, comparison: Option<f64>) -> ComparisonRow {
        let partial = baseline.is_none() || comparison.is_none();

        let baseline_value = baseline.unwrap_or(0.0);
        let comparison_value = comparison.unwrap_or(0.0);

        let (percent_delta, delta_status) = if baseline_value == 0.0 {
            (None, DeltaStatus::UndefinedDelta)
        } else {
            (
                Some((comparison_value - baseline_value) / baseline_value),
                DeltaStatus::Defined,
            )
        };

        ComparisonRow {
            key,
            baseline_value,
            comparison_value,
            absolute_difference: comparison_value - baseline_value,
            percent_delta,
            partial,
            delta_status,
        }
    }

    fn check_key_shape(baseline: &[SummaryRow], comparison: &[SummaryRow]) -> Result<()> {
        let mut shapes = baseline.iter().chain(comparison).map(|r| &r.key.dimensions);
        let Some(expected) = shapes.next() else {
            return Ok(());
        };

        if shapes.all(|shape| shape == expected) {
            return Ok(());
        }

        let describe = |rows: &[SummaryRow]| {
            rows.first()
                .map(|r| r.key.shape())
                .unwrap_or_default()
        };
        Err(DashboardError::KeyShapeMismatch {
            baseline: describe(baseline),
            comparison: describe(comparison),
        })
    }
}
