use crate::aggregation::AggregationEngine;
use crate::comparison::{ComparisonCalculator, ComparisonRow, Metric};
use crate::{errors::DashboardError, models::*, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardView {
    Overview,
    MedicationComparison,
    Demographics,
    OrganSystemImpact,
    RealWorldVsTrial,
    Geography,
}

impl Label for DashboardView {
    fn all() -> &'static [Self] {
        &[
            DashboardView::Overview,
            DashboardView::MedicationComparison,
            DashboardView::Demographics,
            DashboardView::OrganSystemImpact,
            DashboardView::RealWorldVsTrial,
            DashboardView::Geography,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            DashboardView::Overview => "overview",
            DashboardView::MedicationComparison => "medication_comparison",
            DashboardView::Demographics => "demographics",
            DashboardView::OrganSystemImpact => "organ_system_impact",
            DashboardView::RealWorldVsTrial => "real_world_vs_trial",
            DashboardView::Geography => "geography",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            DashboardView::Overview => &["Main Overview"],
            DashboardView::MedicationComparison => &["comparison", "Medication Comparison"],
            DashboardView::Demographics => &["Demographic Analysis"],
            DashboardView::OrganSystemImpact => &["organ_systems", "Organ System Impact"],
            DashboardView::RealWorldVsTrial => &["rwe", "Real-World vs Clinical Trials"],
            DashboardView::Geography => &["Geographic Analysis"],
        }
    }
}

/// Selections made in the dashboard that parameterize a view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRequest {
    pub medications: Vec<Medication>,
    pub organ_system: Option<OrganSystem>,
    pub region_group: Option<RegionGroup>,
    pub top_n: usize,
    /// Extra restrictions applied underneath every query of the view.
    pub filters: FilterSet,
}

impl Default for ViewRequest {
    fn default() -> Self {
        Self {
            medications: Vec::new(),
            organ_system: None,
            region_group: None,
            top_n: 5,
            filters: FilterSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledValue {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlineMetrics {
    pub most_common_side_effect: Option<String>,
    pub most_affected_organ_system: Option<String>,
    pub sex_with_higher_reporting: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewData {
    pub frequency_by_medication: Vec<SummaryRow>,
    pub top_side_effects: Vec<LabeledValue>,
    pub headline: HeadlineMetrics,
    /// Newest published studies first.
    pub recent_studies: Vec<Study>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismRow {
    pub medication: String,
    pub molecule: String,
    pub brand: String,
    pub mechanism: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationComparisonData {
    pub side_effect_frequency: Vec<SummaryRow>,
    /// First selected medication as baseline, second as comparison.
    pub profile_comparison: Option<Vec<ComparisonRow>>,
    pub mechanisms: Vec<MechanismRow>,
    pub reporting_trend: Vec<SummaryRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicsData {
    pub by_sex: Vec<SummaryRow>,
    /// Male as baseline, female as comparison, keyed by medication.
    pub sex_difference: Vec<ComparisonRow>,
    pub by_age_band: Vec<SummaryRow>,
    pub heatmap_medication: Option<String>,
    pub sex_age_heatmap: Vec<SummaryRow>,
    pub serious_outcomes_by_sex: Vec<LabeledValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganSystemImpactData {
    pub impact_scores: Vec<SummaryRow>,
    pub ranked_organ_systems: Vec<LabeledValue>,
    pub selected_organ_system: Option<String>,
    pub side_effects_in_system: Vec<LabeledValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealWorldVsTrialData {
    pub medication: String,
    pub top_side_effects: Vec<String>,
    pub trial_rates: Vec<SummaryRow>,
    pub real_world_rates: Vec<SummaryRow>,
    /// Trial rate as baseline, real-world share as comparison.
    pub comparison: Vec<ComparisonRow>,
    /// Class-wide studies plus those on the same molecule, newest first.
    pub supporting_studies: Vec<Study>,
}

/// Reports per 10 in one region group for one medication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationRow {
    pub region_group: String,
    pub medication: String,
    pub count: u64,
    pub utilization_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographyData {
    pub by_region_group: Vec<SummaryRow>,
    pub selected_region_group: Option<String>,
    pub distribution_in_region: Vec<SummaryRow>,
    pub side_effects_by_region: Vec<SummaryRow>,
    pub utilization: Vec<UtilizationRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewData {
    Overview(OverviewData),
    MedicationComparison(MedicationComparisonData),
    Demographics(DemographicsData),
    OrganSystemImpact(OrganSystemImpactData),
    RealWorldVsTrial(RealWorldVsTrialData),
    Geography(GeographyData),
}

impl ViewData {
    pub fn view(&self) -> DashboardView {
        match self {
            ViewData::Overview(_) => DashboardView::Overview,
            ViewData::MedicationComparison(_) => DashboardView::MedicationComparison,
            ViewData::Demographics(_) => DashboardView::Demographics,
            ViewData::OrganSystemImpact(_) => DashboardView::OrganSystemImpact,
            ViewData::RealWorldVsTrial(_) => DashboardView::RealWorldVsTrial,
            ViewData::Geography(_) => DashboardView::Geography,
        }
    }

    /// The comparison table the view carries, if it has one.
    pub fn comparison_rows(&self) -> Option<&[ComparisonRow]> {
        match self {
            ViewData::MedicationComparison(data) => data.profile_comparison.as_deref(),
            ViewData::Demographics(data) => Some(&data.sex_difference),
            ViewData::RealWorldVsTrial(data) => Some(&data.comparison),
            _ => None,
        }
    }
}

/// Filter dimensions that trial incidence rows actually carry. Trials report
/// no demographics, region, date or outcome.
const TRIAL_DIMENSIONS: [Dimension; 4] = [
    Dimension::Medication,
    Dimension::Molecule,
    Dimension::SideEffect,
    Dimension::OrganSystem,
];

const RECENT_STUDIES: usize = 3;
const SUPPORTING_STUDIES: usize = 2;

const UTILIZATION_SCALE: f64 = 10.0;

pub struct ViewBuilder;

impl ViewBuilder {
    pub fn build(view: DashboardView, records: &[Record], studies: &[Study], request: &ViewRequest) -> Result<ViewData> {
        log::info!("Building {} view over {} records", view.label(), records.len());
        Ok(match view {
            DashboardView::Overview => ViewData::Overview(Self::overview(records, studies, request)?),
            DashboardView::MedicationComparison => {
                ViewData::MedicationComparison(Self::medication_comparison(records, request)?)
            }
            DashboardView::Demographics => ViewData::Demographics(Self::demographics(records, request)?),
            DashboardView::OrganSystemImpact => {
                ViewData::OrganSystemImpact(Self::organ_system_impact(records, request)?)
            }
            DashboardView::RealWorldVsTrial => {
                ViewData::RealWorldVsTrial(Self::real_world_vs_trial(records, studies, request)?)
            }
            DashboardView::Geography => ViewData::Geography(Self::geography(records, request)?),
        })
    }

    pub fn overview(records: &[Record], studies: &[Study], request: &ViewRequest) -> Result<OverviewData> {
        let context = Self::faers_context(request);

        let frequency_by_medication = AggregationEngine::aggregate_partitioned(
            records,
            &[Dimension::Medication],
            &[Dimension::SideEffect],
            &context,
        )?;
        let side_effect_averages = Self::average_by(&frequency_by_medication, Dimension::SideEffect);

        let organ_impact = AggregationEngine::aggregate_partitioned(
            records,
            &[Dimension::Medication],
            &[Dimension::OrganSystem],
            &context,
        )?;
        let organ_averages = Self::average_by(&organ_impact, Dimension::OrganSystem);

        let binary_sex = context.clone().narrow(Dimension::Sex, [Sex::Male.label(), Sex::Female.label()]);
        let sex_rows = AggregationEngine::aggregate(records, &[Dimension::Sex], &binary_sex)?;

        let headline = HeadlineMetrics {
            most_common_side_effect: side_effect_averages.first().map(|v| v.label.clone()),
            most_affected_organ_system: organ_averages.first().map(|v| v.label.clone()),
            sex_with_higher_reporting: sex_rows.first().and_then(|r| r.key.values.first().cloned()),
        };

        Ok(OverviewData {
            frequency_by_medication,
            top_side_effects: side_effect_averages.into_iter().take(request.top_n).collect(),
            headline,
            recent_studies: Self::newest(studies.iter(), RECENT_STUDIES),
        })
    }

    pub fn medication_comparison(records: &[Record], request: &ViewRequest) -> Result<MedicationComparisonData> {
        if request.medications.is_empty() {
            return Err(DashboardError::EmptySelection(
                "select at least one medication to compare".to_string(),
            ));
        }

        let context = Self::faers_context(request);
        let selected = context
            .clone()
            .narrow(Dimension::Medication, request.medications.iter().map(|m| m.label()));

        let side_effect_frequency = AggregationEngine::aggregate_partitioned(
            records,
            &[Dimension::Medication],
            &[Dimension::SideEffect],
            &selected,
        )?;

        let profile_comparison = match request.medications.as_slice() {
            [first, second, ..] => {
                let profile = |medication: &Medication| {
                    let scoped = context.clone().narrow(Dimension::Medication, [medication.label()]);
                    AggregationEngine::aggregate(records, &[Dimension::SideEffect], &scoped)
                };
                Some(ComparisonCalculator::compare(
                    &profile(first)?,
                    &profile(second)?,
                    Metric::Percentage,
                )?)
            }
            _ => None,
        };

        let mechanisms = request
            .medications
            .iter()
            .map(|m| MechanismRow {
                medication: m.label().to_string(),
                molecule: m.molecule().to_string(),
                brand: m.brand().to_string(),
                mechanism: m.mechanism_of_action().to_string(),
            })
            .collect();

        let mut reporting_trend = AggregationEngine::aggregate(
            records,
            &[Dimension::ReportYear, Dimension::Medication],
            &selected,
        )?;
        reporting_trend.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(MedicationComparisonData {
            side_effect_frequency,
            profile_comparison,
            mechanisms,
            reporting_trend,
        })
    }

    pub fn demographics(records: &[Record], request: &ViewRequest) -> Result<DemographicsData> {
        let context = Self::faers_context(request);
        let binary_sex = context.clone().narrow(Dimension::Sex, [Sex::Male.label(), Sex::Female.label()]);

        let by_sex = AggregationEngine::aggregate_partitioned(
            records,
            &[Dimension::Medication],
            &[Dimension::Sex],
            &binary_sex,
        )?;
        let sex_slice = |sex: Sex| -> Vec<SummaryRow> {
            let rows: Vec<SummaryRow> = by_sex
                .iter()
                .filter(|r| r.key.value(Dimension::Sex) == Some(sex.label()))
                .cloned()
                .collect();
            Self::project(&rows, &[Dimension::Medication])
        };
        let sex_difference =
            ComparisonCalculator::compare(&sex_slice(Sex::Male), &sex_slice(Sex::Female), Metric::Percentage)?;

        let known_ages = AgeBand::all()
            .iter()
            .filter(|band| **band != AgeBand::Unknown)
            .map(|band| band.label());
        let mut by_age_band = AggregationEngine::aggregate_partitioned(
            records,
            &[Dimension::Medication],
            &[Dimension::AgeBand],
            &context.clone().narrow(Dimension::AgeBand, known_ages),
        )?;
        by_age_band.sort_by(|a, b| a.key.cmp(&b.key));

        let heatmap_medication = match request.medications.first() {
            Some(m) => Some(m.label().to_string()),
            None => AggregationEngine::top_values(records, Dimension::Medication, &context, 1)?
                .into_iter()
                .next(),
        };
        let sex_age_heatmap = match &heatmap_medication {
            Some(medication) => {
                let scoped = context.clone().narrow(Dimension::Medication, [medication]);
                let mut rows = AggregationEngine::aggregate(records, &[Dimension::Sex, Dimension::AgeBand], &scoped)?;
                rows.sort_by(|a, b| a.key.cmp(&b.key));
                rows
            }
            None => Vec::new(),
        };

        let outcomes = AggregationEngine::aggregate_partitioned(
            records,
            &[Dimension::Sex],
            &[Dimension::Outcome],
            &binary_sex,
        )?;
        let serious_outcomes_by_sex = outcomes
            .iter()
            .filter(|r| {
                r.key
                    .value(Dimension::Outcome)
                    .and_then(Outcome::parse_label)
                    .map_or(false, |o| o.is_serious())
            })
            .filter_map(|r| r.key.value(Dimension::Sex).map(|sex| (sex.to_string(), r.percentage)))
            .into_group_map()
            .into_iter()
            .map(|(label, shares)| LabeledValue { label, value: shares.iter().sum() })
            .sorted_by(|a, b| a.label.cmp(&b.label))
            .collect();

        Ok(DemographicsData {
            by_sex,
            sex_difference,
            by_age_band,
            heatmap_medication,
            sex_age_heatmap,
            serious_outcomes_by_sex,
        })
    }

    pub fn organ_system_impact(records: &[Record], request: &ViewRequest) -> Result<OrganSystemImpactData> {
        let context = Self::faers_context(request);

        let impact_scores = AggregationEngine::aggregate_partitioned(
            records,
            &[Dimension::Medication],
            &[Dimension::OrganSystem],
            &context,
        )?;
        let ranked_organ_systems = Self::average_by(&impact_scores, Dimension::OrganSystem);

        let selected_organ_system = request
            .organ_system
            .map(|o| o.label().to_string())
            .or_else(|| ranked_organ_systems.first().map(|v| v.label.clone()));

        let side_effects_in_system = match &selected_organ_system {
            Some(system) => {
                let frequencies = AggregationEngine::aggregate_partitioned(
                    records,
                    &[Dimension::Medication],
                    &[Dimension::SideEffect, Dimension::OrganSystem],
                    &context,
                )?;
                let in_system: Vec<SummaryRow> = frequencies
                    .into_iter()
                    .filter(|r| r.key.value(Dimension::OrganSystem) == Some(system.as_str()))
                    .collect();
                Self::average_by(&in_system, Dimension::SideEffect)
            }
            None => Vec::new(),
        };

        Ok(OrganSystemImpactData {
            impact_scores,
            ranked_organ_systems,
            selected_organ_system,
            side_effects_in_system,
        })
    }

    pub fn real_world_vs_trial(
        records: &[Record],
        studies: &[Study],
        request: &ViewRequest,
    ) -> Result<RealWorldVsTrialData> {
        let medication = request.medications.first().ok_or_else(|| {
            DashboardError::EmptySelection("select a medication to compare against its trials".to_string())
        })?;

        let real_world_context = Self::faers_context(request);
        let top_side_effects =
            AggregationEngine::top_values(records, Dimension::SideEffect, &real_world_context, request.top_n)?;
        let in_top = |row: &SummaryRow| {
            row.key
                .value(Dimension::SideEffect)
                .map_or(false, |effect| top_side_effects.iter().any(|t| t == effect))
        };

        let real_world = real_world_context.narrow(Dimension::Medication, [medication.label()]);
        let real_world_rates: Vec<SummaryRow> =
            AggregationEngine::aggregate(records, &[Dimension::SideEffect], &real_world)?
                .into_iter()
                .filter(|r| in_top(r))
                .collect();

        let trial = Self::trial_context(request).narrow(Dimension::Medication, [medication.label()]);
        let trial_rates: Vec<SummaryRow> = AggregationEngine::aggregate(records, &[Dimension::SideEffect], &trial)?
            .into_iter()
            .filter(|r| in_top(r))
            .collect();

        let comparison =
            ComparisonCalculator::compare_metrics(&trial_rates, Metric::Rate, &real_world_rates, Metric::Percentage)?;

        Ok(RealWorldVsTrialData {
            medication: medication.label().to_string(),
            top_side_effects,
            trial_rates,
            real_world_rates,
            comparison,
            supporting_studies: Self::newest(studies.iter().filter(|s| s.concerns(*medication)), SUPPORTING_STUDIES),
        })
    }

    pub fn geography(records: &[Record], request: &ViewRequest) -> Result<GeographyData> {
        let context = Self::faers_context(request);

        let mut by_region_group =
            AggregationEngine::aggregate(records, &[Dimension::RegionGroup, Dimension::Medication], &context)?;
        by_region_group.sort_by(|a, b| a.key.cmp(&b.key));

        let selected_region_group = match request.region_group {
            Some(group) => Some(group.label().to_string()),
            None => AggregationEngine::top_values(records, Dimension::RegionGroup, &context, 1)?
                .into_iter()
                .next(),
        };
        let distribution_in_region = match &selected_region_group {
            Some(group) => {
                let scoped = context.clone().narrow(Dimension::RegionGroup, [group]);
                AggregationEngine::aggregate(records, &[Dimension::Medication], &scoped)?
            }
            None => Vec::new(),
        };

        let top_effects = AggregationEngine::top_values(records, Dimension::SideEffect, &context, request.top_n)?;
        let major = context
            .clone()
            .narrow(Dimension::Region, Region::major().iter().map(|r| r.label()));
        let side_effects_by_region = AggregationEngine::aggregate_partitioned(
            records,
            &[Dimension::Region],
            &[Dimension::SideEffect],
            &major,
        )?
        .into_iter()
        .filter(|r| {
            r.key
                .value(Dimension::SideEffect)
                .map_or(false, |effect| top_effects.iter().any(|t| t == effect))
        })
        .collect();

        let utilization = by_region_group
            .iter()
            .map(|r| UtilizationRow {
                region_group: r.key.value(Dimension::RegionGroup).unwrap_or_default().to_string(),
                medication: r.key.value(Dimension::Medication).unwrap_or_default().to_string(),
                count: r.count,
                utilization_rate: r.count as f64 / UTILIZATION_SCALE,
            })
            .collect();

        Ok(GeographyData {
            by_region_group,
            selected_region_group,
            distribution_in_region,
            side_effects_by_region,
            utilization,
        })
    }

    /// Real-world frequency views read spontaneous reports only.
    fn faers_context(request: &ViewRequest) -> FilterSet {
        request
            .filters
            .clone()
            .narrow(Dimension::Source, [DataSource::Faers.label()])
    }

    /// Trial side of a view. Selections on dimensions trials do not carry
    /// would match no trial row, so they are dropped here.
    fn trial_context(request: &ViewRequest) -> FilterSet {
        let (kept, dropped): (Vec<_>, Vec<_>) = request
            .filters
            .selections
            .iter()
            .partition(|(dimension, _)| TRIAL_DIMENSIONS.contains(*dimension));
        if !dropped.is_empty() {
            log::warn!(
                "Trial rates ignore filters on {}",
                dropped.iter().map(|(dimension, _)| dimension.label()).join(", ")
            );
        }

        FilterSet {
            selections: kept.into_iter().map(|(d, v)| (*d, v.clone())).collect(),
        }
        .narrow(Dimension::Source, [DataSource::ClinicalTrial.label()])
    }

    fn newest<'a>(studies: impl Iterator<Item = &'a Study>, n: usize) -> Vec<Study> {
        studies
            .sorted_by(|a, b| b.year.cmp(&a.year))
            .take(n)
            .cloned()
            .collect()
    }

    /// Mean share per value of `dimension` across the rows that carry it, best first.
    fn average_by(rows: &[SummaryRow], dimension: Dimension) -> Vec<LabeledValue> {
        rows.iter()
            .filter_map(|r| r.key.value(dimension).map(|v| (v.to_string(), r.percentage)))
            .into_group_map()
            .into_iter()
            .map(|(label, shares)| LabeledValue { label, value: (&shares).mean() })
            .sorted_by(|a, b| {
                b.value
                    .partial_cmp(&a.value)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.label.cmp(&b.label))
            })
            .collect()
    }

    /// Re-keys rows onto a subset of their dimensions, keeping counts and shares.
    fn project(rows: &[SummaryRow], dimensions: &[Dimension]) -> Vec<SummaryRow> {
        rows.iter()
            .map(|r| SummaryRow {
                key: AggregationKey {
                    dimensions: dimensions.to_vec(),
                    values: dimensions
                        .iter()
                        .map(|d| r.key.value(*d).unwrap_or_default().to_string())
                        .collect(),
                },
                ..r.clone()
            })
            .collect()
    }
}
