use crate::comparison::{ComparisonRow, DeltaStatus};
use crate::views::ViewData;
use crate::{models::*, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Everything one dashboard run produced, ready to be written out.
#[derive(Debug, Clone, Default)]
pub struct DashboardResults {
    pub record_count: usize,
    pub source_counts: Vec<(DataSource, usize)>,
    pub study_count: usize,
    pub grouping: Vec<Dimension>,
    pub filters: FilterSet,
    pub summary: Vec<SummaryRow>,
    /// Ad-hoc comparison of two filter selections over `grouping`.
    pub comparison: Option<Vec<ComparisonRow>>,
    pub view: Option<ViewData>,
}

pub struct OutputManager;

impl OutputManager {
    pub fn save_results<P: AsRef<Path>>(results: &DashboardResults, output_path: P) -> Result<()> {
        let output_dir = output_path.as_ref();
        fs::create_dir_all(output_dir)?;

        if !results.grouping.is_empty() {
            Self::save_summary(&results.summary, &results.grouping, output_dir)?;
        }

        if let Some(rows) = &results.comparison {
            Self::save_comparison(rows, &output_dir.join("comparison.csv"))?;
        }

        if let Some(view) = &results.view {
            Self::save_view(view, output_dir)?;
            if let Some(rows) = view.comparison_rows() {
                let file_name = format!("{}_comparison.csv", view.view().label());
                Self::save_comparison(rows, &output_dir.join(file_name))?;
            }
        }

        Self::generate_report(results, output_dir)?;

        log::info!("Results saved to: {}", output_dir.display());
        Ok(())
    }

    /// Writes `summary.csv` (one column per grouping dimension) and `summary.json`.
    pub fn save_summary(rows: &[SummaryRow], grouping: &[Dimension], output_dir: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(output_dir.join("summary.csv"))?;

        let mut header: Vec<String> = grouping.iter().map(|d| d.label().to_uppercase()).collect();
        header.extend(["COUNT", "PERCENTAGE", "RANK", "MEAN_RATE"].map(String::from));
        writer.write_record(&header)?;

        for row in rows {
            let mut record = row.key.values.clone();
            record.push(row.count.to_string());
            record.push(format!("{:.4}", row.percentage));
            record.push(row.rank.to_string());
            record.push(row.mean_rate.map_or("NA".to_string(), |v| format!("{:.6}", v)));
            writer.write_record(&record)?;
        }
        writer.flush()?;

        let json_string = serde_json::to_string_pretty(rows)?;
        fs::write(output_dir.join("summary.json"), json_string)?;
        Ok(())
    }

    pub fn save_comparison(rows: &[ComparisonRow], file_path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(file_path)?;

        let dimensions = rows.first().map(|r| r.key.dimensions.clone()).unwrap_or_default();
        let mut header: Vec<String> = dimensions.iter().map(|d| d.label().to_uppercase()).collect();
        header.extend(
            ["BASELINE", "COMPARISON", "ABSOLUTE_DIFFERENCE", "PERCENT_DELTA", "PARTIAL", "DELTA_STATUS"]
                .map(String::from),
        );
        writer.write_record(&header)?;

        for row in rows {
            let mut record = row.key.values.clone();
            record.push(format!("{:.4}", row.baseline_value));
            record.push(format!("{:.4}", row.comparison_value));
            record.push(format!("{:.4}", row.absolute_difference));
            record.push(row.percent_delta.map_or("NA".to_string(), |v| format!("{:.6}", v)));
            record.push(row.partial.to_string());
            record.push(
                match row.delta_status {
                    DeltaStatus::Defined => "defined",
                    DeltaStatus::UndefinedDelta => "undefined_delta",
                }
                .to_string(),
            );
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes the view payload as `<view>.json`.
    pub fn save_view(view: &ViewData, output_dir: &Path) -> Result<()> {
        let file_path = output_dir.join(format!("{}.json", view.view().label()));
        let json_string = serde_json::to_string_pretty(view)?;
        fs::write(file_path, json_string)?;
        Ok(())
    }

    fn generate_report(results: &DashboardResults, output_dir: &Path) -> Result<()> {
        let file_path = output_dir.join("report.txt");
        let mut file = File::create(file_path)?;

        writeln!(file, "GLP-1 ADVERSE EVENT DASHBOARD REPORT")?;
        writeln!(file, "====================================")?;
        writeln!(file)?;

        writeln!(file, "Data Summary:")?;
        writeln!(file, "- Total records loaded: {}", results.record_count)?;
        for (source, n) in &results.source_counts {
            writeln!(file, "- {}: {}", source.label(), n)?;
        }
        if results.study_count > 0 {
            writeln!(file, "- Published studies: {}", results.study_count)?;
        }
        writeln!(file)?;

        if !results.filters.is_empty() {
            writeln!(file, "Filters:")?;
            for (dimension, values) in &results.filters.selections {
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                writeln!(file, "- {}: {}", dimension, values.join(" | "))?;
            }
            writeln!(file)?;
        }

        if !results.grouping.is_empty() {
            let grouping: Vec<&str> = results.grouping.iter().map(|d| d.label()).collect();
            writeln!(file, "Grouped by {}:", grouping.join(" x "))?;
            if results.summary.is_empty() {
                writeln!(file, "- No records matched the filters")?;
            }
            for row in results.summary.iter().take(20) {
                writeln!(
                    file,
                    "{:>3}. {} : {} ({:.2}%)",
                    row.rank,
                    row.key.values.join(" / "),
                    row.count,
                    row.percentage
                )?;
            }
            if results.summary.len() > 20 {
                writeln!(file, "... {} more groups in summary.csv", results.summary.len() - 20)?;
            }
            writeln!(file)?;
        }

        if let Some(rows) = &results.comparison {
            writeln!(file, "Comparison:")?;
            Self::write_comparison_counts(&mut file, rows)?;
            writeln!(file)?;
        }

        if let Some(view) = &results.view {
            writeln!(file, "View: {}", view.view().label())?;
            if let Some(rows) = view.comparison_rows() {
                Self::write_comparison_counts(&mut file, rows)?;
            }
        }

        Ok(())
    }

    fn write_comparison_counts(file: &mut File, rows: &[ComparisonRow]) -> Result<()> {
        let undefined = rows
            .iter()
            .filter(|r| r.delta_status == DeltaStatus::UndefinedDelta)
            .count();
        let partial = rows.iter().filter(|r| r.partial).count();
        writeln!(file, "- Comparison rows: {}", rows.len())?;
        writeln!(file, "- Partial rows: {}", partial)?;
        writeln!(file, "- Undefined deltas: {}", undefined)?;
        Ok(())
    }
}
