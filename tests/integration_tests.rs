use glp1_dashboard::{
    aggregation::AggregationEngine,
    comparison::{ComparisonCalculator, DeltaStatus, Metric},
    example_data::ExampleDataGenerator,
    models::*,
    organ_map::OrganSystemMap,
    output::{DashboardResults, OutputManager},
    parser::DatasetLoader,
    views::{DashboardView, ViewBuilder, ViewData, ViewRequest},
    DashboardError,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

fn load_example(dir: &Path, n_reports: usize) -> Vec<Record> {
    let faers_path = dir.join("faers.csv");
    let trials_path = dir.join("trials.csv");
    ExampleDataGenerator::generate_faers_dataset(&faers_path, n_reports).unwrap();
    ExampleDataGenerator::generate_trial_dataset(&trials_path).unwrap();

    let organ_map = OrganSystemMap::glp1_default();
    let mut records = DatasetLoader::load_faers_reports(&faers_path, &organ_map).unwrap();
    records.extend(DatasetLoader::load_clinical_trials(&trials_path, &organ_map).unwrap());
    records
}

fn load_example_studies(dir: &Path) -> Vec<Study> {
    let studies_path = dir.join("studies.csv");
    ExampleDataGenerator::generate_study_dataset(&studies_path).unwrap();
    DatasetLoader::load_studies(&studies_path).unwrap()
}

fn assert_percentages_sum_to_100(rows: &[SummaryRow]) {
    let total: f64 = rows.iter().map(|r| r.percentage).sum();
    assert!((total - 100.0).abs() < 0.01, "percentages sum to {}", total);
}

#[test]
fn test_complete_dashboard_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let records = load_example(temp_dir.path(), 1000);
    assert_eq!(records.len(), 1045);

    // Grouping over everything conserves the total count
    let faers = FilterSet::new().with(Dimension::Source, ["FAERS"]);
    let by_medication = AggregationEngine::aggregate(&records, &[Dimension::Medication], &faers).unwrap();
    let total: u64 = by_medication.iter().map(|r| r.count).sum();
    assert_eq!(total, 1000);
    assert_percentages_sum_to_100(&by_medication);
    assert_eq!(by_medication[0].key.values, vec!["SEMAGLUTIDE (OZEMPIC)".to_string()]);
    assert_eq!(by_medication[0].count, 300);

    // Filtered, multi-dimension grouping
    let filters = faers
        .clone()
        .with(Dimension::Sex, ["Female"])
        .with(Dimension::OrganSystem, ["GI"]);
    let expected = records.iter().filter(|r| filters.matches(r)).map(|r| r.count).sum::<u64>();
    let rows = AggregationEngine::aggregate(&records, &[Dimension::Medication, Dimension::SideEffect], &filters).unwrap();
    assert_eq!(rows.iter().map(|r| r.count).sum::<u64>(), expected);
    assert_percentages_sum_to_100(&rows);
    for pair in rows.windows(2) {
        assert!(pair[0].count >= pair[1].count);
        assert_eq!(pair[1].rank, pair[0].rank + 1);
    }

    // Every partition is normalized on its own
    let partitioned = AggregationEngine::aggregate_partitioned(
        &records,
        &[Dimension::Medication],
        &[Dimension::OrganSystem],
        &faers,
    )
    .unwrap();
    for medication in Medication::all() {
        let slice: Vec<SummaryRow> = partitioned
            .iter()
            .filter(|r| r.key.value(Dimension::Medication) == Some(medication.label()))
            .cloned()
            .collect();
        if !slice.is_empty() {
            assert_percentages_sum_to_100(&slice);
        }
    }

    // Save outputs
    let output_dir = temp_dir.path().join("results");
    let studies = load_example_studies(temp_dir.path());
    let view = ViewBuilder::build(
        DashboardView::RealWorldVsTrial,
        &records,
        &studies,
        &ViewRequest {
            medications: vec![Medication::Wegovy],
            ..ViewRequest::default()
        },
    )
    .unwrap();
    let results = DashboardResults {
        record_count: records.len(),
        source_counts: vec![(DataSource::Faers, 1000), (DataSource::ClinicalTrial, 45)],
        study_count: studies.len(),
        grouping: vec![Dimension::Medication],
        filters: faers,
        summary: by_medication,
        comparison: None,
        view: Some(view),
    };
    OutputManager::save_results(&results, &output_dir).unwrap();

    assert!(output_dir.join("summary.csv").exists());
    assert!(output_dir.join("summary.json").exists());
    assert!(output_dir.join("real_world_vs_trial_comparison.csv").exists());
    assert!(!output_dir.join("comparison.csv").exists());
    assert!(output_dir.join("real_world_vs_trial.json").exists());
    let report = std::fs::read_to_string(output_dir.join("report.txt")).unwrap();
    assert!(report.contains("Total records loaded: 1045"));
    assert!(report.contains("clinical_trial: 45"));
    assert!(report.contains("Published studies: 10"));
}

#[test]
fn test_mixed_organ_system_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("records.csv");
    std::fs::write(
        &path,
        "\
medication,side_effect,sex,age_band,region,source,count
OZEMPIC,NAUSEA,Female,45-64,USA,FAERS,50
MOUNJARO,VOMITING,Male,45-64,USA,FAERS,30
OZEMPIC,HEADACHE,Female,45-64,USA,FAERS,20
",
    )
    .unwrap();

    let organ_map = OrganSystemMap::from_pairs([
        ("NAUSEA", OrganSystem::Gastrointestinal),
        ("VOMITING", OrganSystem::Gastrointestinal),
        ("HEADACHE", OrganSystem::Neurological),
    ]);
    let records = DatasetLoader::load_records(&path, &organ_map).unwrap();

    let rows = AggregationEngine::aggregate_by_names(&records, &["medication"], &[]).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key.values, vec!["SEMAGLUTIDE (OZEMPIC)".to_string()]);
    assert_eq!(rows[0].count, 70);
    assert!((rows[0].percentage - 70.0).abs() < 1e-9);
    assert_eq!(rows[1].count, 30);
    assert!((rows[1].percentage - 30.0).abs() < 1e-9);

    // Filtered to GI only the base shrinks to 80
    let gi = AggregationEngine::aggregate_by_names(&records, &["medication"], &[("organ_system", vec!["GI"])]).unwrap();
    assert!((gi[0].percentage - 62.5).abs() < 1e-9);

    let err = AggregationEngine::aggregate_by_names(&records, &["dosage"], &[]).unwrap_err();
    assert!(matches!(err, DashboardError::InvalidDimension(_)));

    let none = AggregationEngine::aggregate_by_names(&records, &["medication"], &[("region", vec!["Japan"])]).unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_unmapped_side_effect_fails_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("faers.csv");
    ExampleDataGenerator::generate_faers_dataset(&path, 50).unwrap();

    let partial_map = OrganSystemMap::from_pairs([("NAUSEA", OrganSystem::Gastrointestinal)]);
    let err = DatasetLoader::load_faers_reports(&path, &partial_map).unwrap_err();
    assert!(matches!(err, DashboardError::UnmappedSideEffect(_)));
}

#[test]
fn test_organ_map_from_json_file() {
    let temp_dir = TempDir::new().unwrap();
    let map_path = temp_dir.path().join("organ_map.json");
    std::fs::write(&map_path, r#"{"nausea": "GI", "Headache": "Neurological"}"#).unwrap();

    let organ_map = OrganSystemMap::from_json_path(&map_path).unwrap();
    let records = DatasetLoader::faers_from_reader(
        "medication,side_effect,gender\nWEGOVY,HEADACHE,Female\n".as_bytes(),
        &organ_map,
    )
    .unwrap();
    assert_eq!(records[0].organ_system, OrganSystem::Neurological);
}

#[test]
fn test_comparison_is_antisymmetric_on_example_data() {
    let temp_dir = TempDir::new().unwrap();
    let records = load_example(temp_dir.path(), 800);

    let profile = |medication: Medication| {
        let filters = FilterSet::new()
            .with(Dimension::Source, ["FAERS"])
            .with(Dimension::Medication, [medication.label()]);
        AggregationEngine::aggregate(&records, &[Dimension::SideEffect], &filters).unwrap()
    };
    let ozempic = profile(Medication::Ozempic);
    let mounjaro = profile(Medication::Mounjaro);

    let forward = ComparisonCalculator::compare(&ozempic, &mounjaro, Metric::Percentage).unwrap();
    let backward = ComparisonCalculator::compare(&mounjaro, &ozempic, Metric::Percentage).unwrap();
    assert_eq!(forward.len(), backward.len());

    for (f, b) in forward.iter().zip(&backward) {
        assert_eq!(f.key, b.key);
        if let (Some(fd), Some(bd)) = (f.percent_delta, b.percent_delta) {
            if fd == 0.0 {
                assert_eq!(bd, 0.0);
            } else {
                assert_eq!(fd.signum(), -bd.signum());
            }
        }
    }
}

#[test]
fn test_every_view_builds_on_example_data() {
    let temp_dir = TempDir::new().unwrap();
    let records = load_example(temp_dir.path(), 600);
    let studies = load_example_studies(temp_dir.path());

    let request = ViewRequest {
        medications: vec![Medication::Ozempic, Medication::Mounjaro],
        organ_system: Some(OrganSystem::Gastrointestinal),
        region_group: Some(RegionGroup::Europe),
        top_n: 3,
        filters: FilterSet::new(),
    };

    for view in DashboardView::all() {
        let data = ViewBuilder::build(*view, &records, &studies, &request).unwrap();
        assert_eq!(data.view(), *view);

        match data {
            ViewData::Overview(overview) => {
                assert_eq!(overview.top_side_effects.len(), 3);
                assert!(overview.headline.most_common_side_effect.is_some());
                assert_eq!(overview.recent_studies.len(), 3);
                assert!(overview.recent_studies.iter().all(|s| s.year == 2023));
            }
            ViewData::MedicationComparison(comparison) => {
                assert!(comparison.profile_comparison.is_some());
                assert_eq!(comparison.mechanisms.len(), 2);
                assert_eq!(comparison.mechanisms[1].brand, "MOUNJARO");
            }
            ViewData::Demographics(demographics) => {
                assert!(demographics
                    .by_age_band
                    .iter()
                    .all(|r| r.key.value(Dimension::AgeBand) != Some("Unknown")));
                assert_eq!(demographics.heatmap_medication.as_deref(), Some("SEMAGLUTIDE (OZEMPIC)"));
            }
            ViewData::OrganSystemImpact(impact) => {
                assert_eq!(impact.selected_organ_system.as_deref(), Some("Gastrointestinal"));
                assert!(!impact.side_effects_in_system.is_empty());
            }
            ViewData::RealWorldVsTrial(rwe) => {
                assert_eq!(rwe.top_side_effects.len(), 3);
                assert!(rwe
                    .comparison
                    .iter()
                    .filter(|r| r.partial)
                    .all(|r| r.delta_status == DeltaStatus::UndefinedDelta || r.comparison_value == 0.0));
                assert_eq!(rwe.supporting_studies.len(), 2);
                assert!(rwe.supporting_studies.iter().all(|s| s.concerns(Medication::Ozempic)));
            }
            ViewData::Geography(geography) => {
                assert_eq!(geography.selected_region_group.as_deref(), Some("Europe"));
                assert_percentages_sum_to_100(&geography.distribution_in_region);
                let utilized: u64 = geography.utilization.iter().map(|u| u.count).sum();
                assert_eq!(utilized, 600);
            }
        }
    }
}

#[test]
fn test_trial_comparison_survives_demographic_filters() {
    let temp_dir = TempDir::new().unwrap();
    let records = load_example(temp_dir.path(), 1000);

    // Wide enough to keep every side effect
    let unfiltered = ViewRequest {
        medications: vec![Medication::Ozempic],
        top_n: 20,
        ..ViewRequest::default()
    };
    let filtered = ViewRequest {
        filters: FilterSet::new()
            .with(Dimension::Sex, ["Female"])
            .with(Dimension::AgeBand, ["45-64"]),
        ..unfiltered.clone()
    };

    let all = ViewBuilder::real_world_vs_trial(&records, &[], &unfiltered).unwrap();
    let narrowed = ViewBuilder::real_world_vs_trial(&records, &[], &filtered).unwrap();

    assert!(!narrowed.trial_rates.is_empty());
    assert!(narrowed
        .comparison
        .iter()
        .filter(|r| narrowed.trial_rates.iter().any(|t| t.key == r.key))
        .all(|r| r.baseline_value > 0.0));
    let narrowed_faers: u64 = narrowed.real_world_rates.iter().map(|r| r.count).sum();
    let all_faers: u64 = all.real_world_rates.iter().map(|r| r.count).sum();
    assert!(narrowed_faers < all_faers);
}
