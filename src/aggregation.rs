use crate::{errors::DashboardError, models::*, Result};
use itertools::Itertools;
use statrs::statistics::Statistics;
use std::collections::{BTreeSet, HashMap};

/// Grouped counts and shares over an in-memory record table.
///
/// Every query is a pure function of its inputs: records are only read, and
/// the returned rows are freshly built per call.
pub struct AggregationEngine;

#[derive(Default)]
struct GroupAccumulator {
    count: u64,
    rates: Vec<f64>,
}

impl AggregationEngine {
    /// Selects the records matching `filters`, groups them by the Cartesian key
    /// of `group_by` and sums their counts.
    ///
    /// Percentages are relative to the sum over all groups of this query (the
    /// filter context). Rows come back by descending count, ties broken by key.
    pub fn aggregate(
        records: &[Record],
        group_by: &[Dimension],
        filters: &FilterSet,
    ) -> Result<Vec<SummaryRow>> {
        let dimensions = Self::validate_grouping(group_by)?;

        let mut groups: HashMap<AggregationKey, GroupAccumulator> = HashMap::new();
        for record in records.iter().filter(|r| filters.matches(r)) {
            let group = groups
                .entry(AggregationKey::for_record(record, &dimensions))
                .or_default();
            group.count += record.count;
            if let Some(rate) = record.rate {
                group.rates.push(rate);
            }
        }

        let total: u64 = groups.values().map(|g| g.count).sum();

        let mut rows: Vec<SummaryRow> = groups
            .into_iter()
            .map(|(key, group)| SummaryRow {
                key,
                count: group.count,
                percentage: Self::percentage(group.count, total),
                rank: 0,
                mean_rate: if group.rates.is_empty() {
                    None
                } else {
                    Some((&group.rates).mean())
                },
            })
            .collect();

        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        for (i, row) in rows.iter_mut().enumerate() {
            row.rank = i + 1;
        }

        log::debug!(
            "Aggregated by [{}]: {} groups, {} total count",
            dimensions.iter().join(","),
            rows.len(),
            total
        );
        Ok(rows)
    }

    /// String boundary for `aggregate`: dimension names are validated here.
    pub fn aggregate_by_names<S: AsRef<str>>(
        records: &[Record],
        group_by: &[S],
        filters: &[(S, Vec<S>)],
    ) -> Result<Vec<SummaryRow>> {
        let dimensions = group_by
            .iter()
            .map(|name| parse_dimension(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let filter_set = filter_set_from_names(filters)?;
        Self::aggregate(records, &dimensions, &filter_set)
    }

    /// Runs `aggregate` once per distinct value of `partition_by`, so that
    /// percentages are shares within each partition (e.g. a side effect's
    /// share of one medication's reports). Partition dimensions lead the
    /// returned keys; partitions come in key order.
    pub fn aggregate_partitioned(
        records: &[Record],
        partition_by: &[Dimension],
        group_by: &[Dimension],
        filters: &FilterSet,
    ) -> Result<Vec<SummaryRow>> {
        let partition_dims = Self::validate_grouping(partition_by)?;
        let group_dims = Self::validate_grouping(group_by)?;
        let inner_dims: Vec<Dimension> = group_dims
            .iter()
            .copied()
            .filter(|d| !partition_dims.contains(d))
            .collect();

        let partitions: BTreeSet<AggregationKey> = records
            .iter()
            .filter(|r| filters.matches(r))
            .map(|r| AggregationKey::for_record(r, &partition_dims))
            .collect();

        let mut rows = Vec::new();
        for partition in partitions {
            let mut scoped = filters.clone();
            for (dimension, value) in partition.dimensions.iter().zip(&partition.values) {
                scoped.replace(*dimension, value);
            }

            for row in Self::aggregate(records, &group_dims, &scoped)? {
                let mut dimensions = partition.dimensions.clone();
                let mut values = partition.values.clone();
                for dimension in &inner_dims {
                    dimensions.push(*dimension);
                    values.push(row.key.value(*dimension).unwrap_or_default().to_string());
                }
                rows.push(SummaryRow {
                    key: AggregationKey { dimensions, values },
                    ..row
                });
            }
        }

        Ok(rows)
    }

    /// Labels of `dimension` with the highest summed count, best first.
    pub fn top_values(
        records: &[Record],
        dimension: Dimension,
        filters: &FilterSet,
        n: usize,
    ) -> Result<Vec<String>> {
        Ok(Self::aggregate(records, &[dimension], filters)?
            .into_iter()
            .take(n)
            .filter_map(|row| row.key.values.into_iter().next())
            .collect())
    }

    fn validate_grouping(group_by: &[Dimension]) -> Result<Vec<Dimension>> {
        if group_by.is_empty() {
            return Err(DashboardError::InvalidDimension(
                "at least one grouping dimension is required".to_string(),
            ));
        }
        Ok(group_by.iter().copied().unique().collect())
    }

    fn percentage(count: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / total as f64
        }
    }
}

pub fn parse_dimension(name: &str) -> Result<Dimension> {
    Dimension::parse_label(name).ok_or_else(|| DashboardError::InvalidDimension(name.to_string()))
}

pub fn filter_set_from_names<S: AsRef<str>>(filters: &[(S, Vec<S>)]) -> Result<FilterSet> {
    let mut filter_set = FilterSet::new();
    for (name, values) in filters {
        let dimension = parse_dimension(name.as_ref())?;
        filter_set.restrict(dimension, values.iter().map(|v| v.as_ref()));
    }
    Ok(filter_set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organ_map::OrganSystemMap;
    use pretty_assertions::assert_eq;

    fn record(medication: Medication, side_effect: &str, sex: Sex, count: u64) -> Record {
        let organ_map = OrganSystemMap::glp1_default();
        Record {
            medication,
            side_effect: side_effect.to_string(),
            organ_system: organ_map.classify(side_effect).unwrap(),
            sex,
            age_band: AgeBand::MiddleAged,
            region: Region::Usa,
            source: DataSource::Faers,
            count,
            rate: None,
            report_date: None,
            outcome: None,
        }
    }

    fn fixture() -> Vec<Record> {
        vec![
            record(Medication::Ozempic, "NAUSEA", Sex::Female, 50),
            record(Medication::Mounjaro, "VOMITING", Sex::Male, 30),
            record(Medication::Ozempic, "HEADACHE", Sex::Male, 20),
        ]
    }

    fn key_values(rows: &[SummaryRow]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.key.values.clone()).collect()
    }

    #[test]
    fn test_group_by_medication_scenario() {
        let rows = AggregationEngine::aggregate(&fixture(), &[Dimension::Medication], &FilterSet::new()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key.values, vec!["SEMAGLUTIDE (OZEMPIC)".to_string()]);
        assert_eq!(rows[0].count, 70);
        assert!((rows[0].percentage - 70.0).abs() < 1e-9);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[1].count, 30);
        assert!((rows[1].percentage - 30.0).abs() < 1e-9);
        assert_eq!(rows[1].rank, 2);
    }

    #[test]
    fn test_percentage_base_is_filter_context() {
        let filters = FilterSet::new().with(Dimension::Medication, ["OZEMPIC"]);
        let rows = AggregationEngine::aggregate(&fixture(), &[Dimension::OrganSystem], &filters).unwrap();

        assert_eq!(
            key_values(&rows),
            vec![vec!["Gastrointestinal".to_string()], vec!["Neurological".to_string()]]
        );
        assert!((rows[0].percentage - 50.0 / 70.0 * 100.0).abs() < 1e-9);
        assert!((rows[1].percentage - 20.0 / 70.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_conservation_and_percent_sum() {
        let records = fixture();
        let filters = FilterSet::new().with(Dimension::Sex, ["Male"]);
        let rows = AggregationEngine::aggregate(
            &records,
            &[Dimension::Medication, Dimension::SideEffect],
            &filters,
        )
        .unwrap();

        let matched: u64 = records.iter().filter(|r| filters.matches(r)).map(|r| r.count).sum();
        let summed: u64 = rows.iter().map(|r| r.count).sum();
        let percent: f64 = rows.iter().map(|r| r.percentage).sum();

        assert_eq!(summed, matched);
        assert_eq!(summed, 50);
        assert!((percent - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_or_within_and_across_dimensions() {
        let filters = FilterSet::new()
            .with(Dimension::SideEffect, ["nausea", "vomiting"])
            .with(Dimension::Sex, ["F"]);
        let rows = AggregationEngine::aggregate(&fixture(), &[Dimension::SideEffect], &filters).unwrap();

        assert_eq!(key_values(&rows), vec![vec!["NAUSEA".to_string()]]);
        assert_eq!(rows[0].count, 50);
    }

    #[test]
    fn test_empty_filter_context_is_not_an_error() {
        let filters = FilterSet::new().with(Dimension::Region, ["Japan"]);
        let rows = AggregationEngine::aggregate(&fixture(), &[Dimension::Medication], &filters).unwrap();
        assert!(rows.is_empty());

        let rows = AggregationEngine::aggregate(&[], &[Dimension::Medication], &FilterSet::new()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_ties_break_by_key() {
        let records = vec![
            record(Medication::Wegovy, "NAUSEA", Sex::Female, 10),
            record(Medication::Byetta, "NAUSEA", Sex::Female, 10),
            record(Medication::Ozempic, "NAUSEA", Sex::Female, 25),
        ];
        let rows = AggregationEngine::aggregate(&records, &[Dimension::Medication], &FilterSet::new()).unwrap();

        assert_eq!(
            key_values(&rows),
            vec![
                vec!["SEMAGLUTIDE (OZEMPIC)".to_string()],
                vec!["EXENATIDE (BYETTA)".to_string()],
                vec!["SEMAGLUTIDE (WEGOVY)".to_string()],
            ]
        );
        assert_eq!(rows.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_invalid_dimension() {
        let result = AggregationEngine::aggregate_by_names(&fixture(), &["medication", "dosage"], &[]);
        assert!(matches!(result, Err(DashboardError::InvalidDimension(ref d)) if d == "dosage"));

        let result = AggregationEngine::aggregate_by_names(&fixture(), &["medication"], &[("colour", vec!["red"])]);
        assert!(matches!(result, Err(DashboardError::InvalidDimension(_))));

        let result = AggregationEngine::aggregate(&fixture(), &[], &FilterSet::new());
        assert!(matches!(result, Err(DashboardError::InvalidDimension(_))));
    }

    #[test]
    fn test_names_boundary_accepts_aliases() {
        let rows = AggregationEngine::aggregate_by_names(
            &fixture(),
            &["gender"],
            &[("medication", vec!["ozempic"])],
        )
        .unwrap();

        assert_eq!(key_values(&rows), vec![vec!["Female".to_string()], vec!["Male".to_string()]]);
    }

    #[test]
    fn test_duplicate_grouping_dimensions_collapse() {
        let rows = AggregationEngine::aggregate(
            &fixture(),
            &[Dimension::Medication, Dimension::Medication],
            &FilterSet::new(),
        )
        .unwrap();
        assert_eq!(rows[0].key.dimensions, vec![Dimension::Medication]);
    }

    #[test]
    fn test_mean_rate() {
        let mut records = fixture();
        records[0].rate = Some(0.2);
        records.push(Record { rate: Some(0.4), ..record(Medication::Ozempic, "NAUSEA", Sex::Male, 0) });

        let filters = FilterSet::new().with(Dimension::SideEffect, ["NAUSEA"]);
        let rows = AggregationEngine::aggregate(&records, &[Dimension::Medication], &filters).unwrap();
        assert!((rows[0].mean_rate.unwrap() - 0.3).abs() < 1e-9);

        let rows = AggregationEngine::aggregate(&records, &[Dimension::SideEffect], &FilterSet::new()).unwrap();
        let vomiting = rows.iter().find(|r| r.key.values[0] == "VOMITING").unwrap();
        assert_eq!(vomiting.mean_rate, None);
    }

    #[test]
    fn test_partitioned_percentages_are_per_partition() {
        let rows = AggregationEngine::aggregate_partitioned(
            &fixture(),
            &[Dimension::Medication],
            &[Dimension::SideEffect],
            &FilterSet::new(),
        )
        .unwrap();

        assert_eq!(
            key_values(&rows),
            vec![
                vec!["SEMAGLUTIDE (OZEMPIC)".to_string(), "NAUSEA".to_string()],
                vec!["SEMAGLUTIDE (OZEMPIC)".to_string(), "HEADACHE".to_string()],
                vec!["TIRZEPATIDE (MOUNJARO)".to_string(), "VOMITING".to_string()],
            ]
        );
        assert_eq!(rows[0].key.dimensions, vec![Dimension::Medication, Dimension::SideEffect]);

        let ozempic: f64 = rows[..2].iter().map(|r| r.percentage).sum();
        assert!((ozempic - 100.0).abs() < 0.01);
        assert!((rows[2].percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_partition_respects_existing_filters() {
        let filters = FilterSet::new().with(Dimension::Sex, ["Male"]);
        let rows = AggregationEngine::aggregate_partitioned(
            &fixture(),
            &[Dimension::Medication],
            &[Dimension::SideEffect],
            &filters,
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| (r.percentage - 100.0).abs() < 1e-9));
    }

    #[test]
    fn test_top_values() {
        let top = AggregationEngine::top_values(&fixture(), Dimension::SideEffect, &FilterSet::new(), 2).unwrap();
        assert_eq!(top, vec!["NAUSEA".to_string(), "VOMITING".to_string()]);
    }
}
