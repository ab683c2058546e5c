use anyhow::{anyhow, bail, Context};
use clap::{Arg, ArgMatches, Command};
use glp1_dashboard::{
    aggregation::{parse_dimension, AggregationEngine},
    comparison::{ComparisonCalculator, Metric},
    example_data::ExampleDataGenerator,
    models::*,
    organ_map::OrganSystemMap,
    output::{DashboardResults, OutputManager},
    parser::DatasetLoader,
    views::{DashboardView, ViewBuilder, ViewRequest},
};
use std::path::PathBuf;

/// Run settings assembled from the command line.
#[derive(Debug, Clone)]
struct DashboardConfig {
    faers_path: Option<PathBuf>,
    records_path: Option<PathBuf>,
    trials_path: Option<PathBuf>,
    studies_path: Option<PathBuf>,
    organ_map_path: Option<PathBuf>,
    output_dir: PathBuf,
    generate_example: bool,
    n_reports: usize,
    group_by: Vec<Dimension>,
    compare: Option<ComparisonSelection>,
    view: Option<DashboardView>,
    request: ViewRequest,
}

/// Two values of one dimension whose groupings are compared, baseline first.
#[derive(Debug, Clone, PartialEq)]
struct ComparisonSelection {
    dimension: Dimension,
    baseline: String,
    comparison: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = cli().get_matches();
    let mut config = create_dashboard_config(&matches)?;

    // Generate example dataset if requested
    if config.generate_example {
        std::fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

        let faers_file = config.output_dir.join("example_faers_reports.csv");
        let trials_file = config.output_dir.join("example_clinical_trials.csv");
        let studies_file = config.output_dir.join("example_studies.csv");
        ExampleDataGenerator::generate_faers_dataset(&faers_file, config.n_reports)
            .context("Failed to generate example FAERS dataset")?;
        ExampleDataGenerator::generate_trial_dataset(&trials_file)
            .context("Failed to generate example trial dataset")?;
        ExampleDataGenerator::generate_study_dataset(&studies_file)
            .context("Failed to generate example study dataset")?;
        println!(
            "Generated example datasets: {}, {}, {}",
            faers_file.display(),
            trials_file.display(),
            studies_file.display()
        );

        // If only generating examples, run the dashboard on them
        if config.faers_path.is_none() && config.records_path.is_none() {
            config.faers_path = Some(faers_file);
            if config.trials_path.is_none() {
                config.trials_path = Some(trials_file);
            }
            if config.studies_path.is_none() {
                config.studies_path = Some(studies_file);
            }
        }
    }

    if config.faers_path.is_none() && config.records_path.is_none() && config.trials_path.is_none() {
        println!("No input file specified. Use --generate-example to create sample data.");
        return Ok(());
    }

    run_dashboard(&config)
}

fn cli() -> Command {
    Command::new("GLP-1 Adverse Event Dashboard")
        .version("1.0")
        .about("Grouped frequency and comparison queries over GLP-1 adverse event reports")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("FAERS export CSV"),
        )
        .arg(
            Arg::new("records")
                .long("records")
                .value_name("FILE")
                .help("Canonical record table CSV"),
        )
        .arg(
            Arg::new("trials")
                .long("trials")
                .value_name("FILE")
                .help("Clinical trial incidence CSV"),
        )
        .arg(
            Arg::new("studies")
                .long("studies")
                .value_name("FILE")
                .help("Published study list CSV"),
        )
        .arg(
            Arg::new("organ-map")
                .long("organ-map")
                .value_name("FILE")
                .help("JSON object mapping side effects to organ systems (default: built-in GLP-1 map)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory for results")
                .default_value("./dashboard_results"),
        )
        .arg(
            Arg::new("generate-example")
                .long("generate-example")
                .help("Generate example FAERS, trial and study datasets")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("reports")
                .short('n')
                .long("reports")
                .value_name("NUMBER")
                .help("Number of reports for the example dataset")
                .value_parser(clap::value_parser!(usize))
                .default_value("5000"),
        )
        .arg(
            Arg::new("group-by")
                .short('g')
                .long("group-by")
                .value_name("DIMENSION")
                .help("Group counts by the given dimension (repeatable)")
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("filter")
                .short('f')
                .long("filter")
                .value_name("DIMENSION=V1,V2")
                .help("Keep records whose dimension takes one of the values (repeatable)")
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("compare")
                .short('c')
                .long("compare")
                .value_name("DIMENSION=BASELINE:COMPARISON")
                .help("Compare the grouped percentages of two values of a dimension"),
        )
        .arg(
            Arg::new("view")
                .long("view")
                .value_name("NAME")
                .help("Dashboard view: overview, medication_comparison, demographics, organ_system_impact, real_world_vs_trial, geography"),
        )
        .arg(
            Arg::new("medication")
                .short('m')
                .long("medication")
                .value_name("NAME")
                .help("Selected medication for views (repeatable)")
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("organ-system")
                .long("organ-system")
                .value_name("NAME")
                .help("Selected organ system for the organ system view"),
        )
        .arg(
            Arg::new("region")
                .long("region")
                .value_name("NAME")
                .help("Selected region group for the geography view"),
        )
        .arg(
            Arg::new("top")
                .long("top")
                .value_name("N")
                .help("Number of top side effects shown in views")
                .value_parser(clap::value_parser!(usize))
                .default_value("5"),
        )
}

fn run_dashboard(config: &DashboardConfig) -> anyhow::Result<()> {
    println!("Starting dashboard queries...");
    println!("Output directory: {}", config.output_dir.display());

    let organ_map = match &config.organ_map_path {
        Some(path) => OrganSystemMap::from_json_path(path)
            .with_context(|| format!("Failed to load organ system map {}", path.display()))?,
        None => OrganSystemMap::glp1_default(),
    };
    log::info!("Organ system map covers {} side effects", organ_map.len());

    let mut records = Vec::new();
    if let Some(path) = &config.faers_path {
        println!("Loading FAERS reports: {}", path.display());
        records.extend(
            DatasetLoader::load_faers_reports(path, &organ_map)
                .with_context(|| format!("Failed to load {}", path.display()))?,
        );
    }
    if let Some(path) = &config.records_path {
        println!("Loading records: {}", path.display());
        records.extend(
            DatasetLoader::load_records(path, &organ_map)
                .with_context(|| format!("Failed to load {}", path.display()))?,
        );
    }
    if let Some(path) = &config.trials_path {
        println!("Loading clinical trials: {}", path.display());
        records.extend(
            DatasetLoader::load_clinical_trials(path, &organ_map)
                .with_context(|| format!("Failed to load {}", path.display()))?,
        );
    }
    println!("Loaded {} records", records.len());

    let studies = match &config.studies_path {
        Some(path) => {
            println!("Loading studies: {}", path.display());
            DatasetLoader::load_studies(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => Vec::new(),
    };

    let source_counts: Vec<(DataSource, usize)> = DataSource::all()
        .iter()
        .map(|source| (*source, records.iter().filter(|r| r.source == *source).count()))
        .filter(|(_, n)| *n > 0)
        .collect();

    let start_time = std::time::Instant::now();

    let summary = if config.group_by.is_empty() {
        Vec::new()
    } else {
        AggregationEngine::aggregate(&records, &config.group_by, &config.request.filters)?
    };

    let comparison = match &config.compare {
        Some(selection) => {
            let side = |value: &str| {
                let filters = config
                    .request
                    .filters
                    .clone()
                    .narrow(selection.dimension, [value]);
                AggregationEngine::aggregate(&records, &config.group_by, &filters)
            };
            Some(ComparisonCalculator::compare(
                &side(&selection.baseline)?,
                &side(&selection.comparison)?,
                Metric::Percentage,
            )?)
        }
        None => None,
    };

    let view = match config.view {
        Some(view) => Some(ViewBuilder::build(view, &records, &studies, &config.request)?),
        None => None,
    };

    let duration = start_time.elapsed();
    println!("Queries completed in {:.3} seconds", duration.as_secs_f64());

    let results = DashboardResults {
        record_count: records.len(),
        source_counts,
        study_count: studies.len(),
        grouping: config.group_by.clone(),
        filters: config.request.filters.clone(),
        summary,
        comparison,
        view,
    };

    println!("Saving results...");
    OutputManager::save_results(&results, &config.output_dir)
        .with_context(|| format!("Failed to write results to {}", config.output_dir.display()))?;

    print_dashboard_summary(&results);

    Ok(())
}

fn create_dashboard_config(matches: &ArgMatches) -> anyhow::Result<DashboardConfig> {
    let path = |id: &str| matches.get_one::<String>(id).map(PathBuf::from);

    let output_dir = path("output").context("Missing output directory")?;

    let mut group_by = match matches.get_many::<String>("group-by") {
        Some(names) => names
            .map(|name| parse_dimension(name))
            .collect::<glp1_dashboard::Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let mut filters = FilterSet::new();
    if let Some(args) = matches.get_many::<String>("filter") {
        for arg in args {
            let (dimension, values) = parse_filter(arg)?;
            filters.restrict(dimension, values);
        }
    }

    let view = matches
        .get_one::<String>("view")
        .map(|name| DashboardView::parse_label(name).ok_or_else(|| anyhow!("Unknown view: {}", name)))
        .transpose()?;

    let compare = matches
        .get_one::<String>("compare")
        .map(|arg| parse_comparison(arg))
        .transpose()?;

    // Without an explicit grouping, comparisons run over side effects and
    // plain runs count per medication
    if group_by.is_empty() {
        if compare.is_some() {
            group_by.push(Dimension::SideEffect);
        } else if view.is_none() {
            group_by.push(Dimension::Medication);
        }
    }

    let medications = match matches.get_many::<String>("medication") {
        Some(names) => names
            .map(|name| Medication::parse_label(name).ok_or_else(|| anyhow!("Unknown medication: {}", name)))
            .collect::<anyhow::Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let organ_system = matches
        .get_one::<String>("organ-system")
        .map(|name| OrganSystem::parse_label(name).ok_or_else(|| anyhow!("Unknown organ system: {}", name)))
        .transpose()?;

    let region_group = matches
        .get_one::<String>("region")
        .map(|name| {
            RegionGroup::parse_label(name)
                .or_else(|| Region::parse_label(name).map(|r| r.group()))
                .ok_or_else(|| anyhow!("Unknown region: {}", name))
        })
        .transpose()?;

    Ok(DashboardConfig {
        faers_path: path("input"),
        records_path: path("records"),
        trials_path: path("trials"),
        studies_path: path("studies"),
        organ_map_path: path("organ-map"),
        output_dir,
        generate_example: matches.get_flag("generate-example"),
        n_reports: matches.get_one::<usize>("reports").copied().unwrap_or(5000),
        group_by,
        compare,
        view,
        request: ViewRequest {
            medications,
            organ_system,
            region_group,
            top_n: matches.get_one::<usize>("top").copied().unwrap_or(5),
            filters,
        },
    })
}

/// Parses `DIMENSION=V1,V2` into a dimension and its accepted values.
fn parse_filter(arg: &str) -> anyhow::Result<(Dimension, Vec<String>)> {
    let Some((name, values)) = arg.split_once('=') else {
        bail!("Filter must look like DIMENSION=V1,V2, got: {}", arg);
    };

    let dimension = parse_dimension(name)?;
    let values: Vec<String> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();
    if values.is_empty() {
        bail!("Filter on {} has no values", dimension);
    }
    Ok((dimension, values))
}

/// Parses `DIMENSION=BASELINE:COMPARISON`.
fn parse_comparison(arg: &str) -> anyhow::Result<ComparisonSelection> {
    let (dimension, values) = parse_filter(arg)?;
    let [pair] = values.as_slice() else {
        bail!("Comparison takes one BASELINE:COMPARISON pair, got: {}", arg);
    };
    let Some((baseline, comparison)) = pair.split_once(':') else {
        bail!("Comparison must look like DIMENSION=BASELINE:COMPARISON, got: {}", arg);
    };
    Ok(ComparisonSelection {
        dimension,
        baseline: baseline.trim().to_string(),
        comparison: comparison.trim().to_string(),
    })
}

fn print_dashboard_summary(results: &DashboardResults) {
    println!("\n=== DASHBOARD SUMMARY ===");
    println!("Records loaded: {}", results.record_count);
    for (source, n) in &results.source_counts {
        println!("  {}: {}", source.label(), n);
    }
    if results.study_count > 0 {
        println!("Studies loaded: {}", results.study_count);
    }

    if !results.grouping.is_empty() {
        let grouping: Vec<&str> = results.grouping.iter().map(|d| d.label()).collect();
        println!("\nTop groups by {}:", grouping.join(" x "));
        if results.summary.is_empty() {
            println!("  No records matched the filters");
        }
        for row in results.summary.iter().take(10) {
            println!("  {:>3}. {}: {} ({:.2}%)", row.rank, row.key.values.join(" / "), row.count, row.percentage);
        }
    }

    if let Some(rows) = &results.comparison {
        println!("\nLargest shifts (percentage points):");
        let mut shifts: Vec<_> = rows.iter().collect();
        shifts.sort_by(|a, b| {
            b.absolute_difference
                .abs()
                .partial_cmp(&a.absolute_difference.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for row in shifts.iter().take(5) {
            println!(
                "  {}: {:.2} -> {:.2} ({})",
                row.key.values.join(" / "),
                row.baseline_value,
                row.comparison_value,
                row.percent_delta
                    .map_or("undefined".to_string(), |d| format!("{:+.1}%", d * 100.0))
            );
        }
    }

    if let Some(view) = &results.view {
        println!("\nView written: {}.json", view.view().label());
    }

    println!("\nResults saved to output directory.");
}
