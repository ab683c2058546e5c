use crate::{errors::DashboardError, models::*, organ_map::OrganSystemMap, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Reads flat CSV exports into immutable records. Organ systems are derived
/// from the supplied map, never trusted from the file.
pub struct DatasetLoader;

#[derive(Debug, Deserialize)]
struct RecordRow {
    #[serde(deserialize_with = "label")]
    medication: Medication,
    side_effect: String,
    #[serde(default)]
    organ_system: Option<String>,
    #[serde(deserialize_with = "label")]
    sex: Sex,
    #[serde(deserialize_with = "label")]
    age_band: AgeBand,
    #[serde(deserialize_with = "label")]
    region: Region,
    #[serde(deserialize_with = "label")]
    source: DataSource,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    rate: Option<f64>,
    #[serde(default)]
    report_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "optional_label")]
    outcome: Option<Outcome>,
}

/// Decodes a column through `Label::parse_label`, so canonical tables accept
/// the same spellings as the export loaders.
fn label<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Label,
{
    let raw = String::deserialize(deserializer)?;
    T::parse_label(&raw).ok_or_else(|| serde::de::Error::custom(format!("unknown value '{}'", raw)))
}

fn optional_label<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Label,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => T::parse_label(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown value '{}'", raw))),
        _ => Ok(None),
    }
}

impl DatasetLoader {
    /// Canonical table with one column per record attribute.
    pub fn load_records<P: AsRef<Path>>(file_path: P, organ_map: &OrganSystemMap) -> Result<Vec<Record>> {
        let records = Self::records_from_reader(File::open(file_path.as_ref())?, organ_map)?;
        log::info!("Loaded {} records from {}", records.len(), file_path.as_ref().display());
        Ok(records)
    }

    pub fn records_from_reader<R: Read>(reader: R, organ_map: &OrganSystemMap) -> Result<Vec<Record>> {
        let mut reader = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader);
        let mut records = Vec::new();

        for (line, result) in reader.deserialize::<RecordRow>().enumerate() {
            let row = result?;
            records.push(Self::record_from_row(row, organ_map, line + 2)?);
        }

        Ok(records)
    }

    fn record_from_row(row: RecordRow, organ_map: &OrganSystemMap, line: usize) -> Result<Record> {
        let side_effect = OrganSystemMap::normalize(&row.side_effect);
        let organ_system = organ_map.classify(&side_effect)?;

        if let Some(declared) = row.organ_system.as_deref().filter(|s| !s.is_empty()) {
            if OrganSystem::parse_label(declared) != Some(organ_system) {
                return Err(DashboardError::ParseError(format!(
                    "Line {}: organ system '{}' contradicts mapping {} -> {}",
                    line,
                    declared,
                    side_effect,
                    organ_system.label()
                )));
            }
        }

        if let Some(rate) = row.rate {
            Self::check_rate(rate, line)?;
        }

        let count = match (row.count, row.rate) {
            (Some(count), _) => count,
            (None, Some(_)) => 0,
            (None, None) => {
                return Err(DashboardError::ParseError(format!(
                    "Line {}: record needs a count or a rate",
                    line
                )))
            }
        };

        Ok(Record {
            medication: row.medication,
            side_effect,
            organ_system,
            sex: row.sex,
            age_band: row.age_band,
            region: row.region,
            source: row.source,
            count,
            rate: row.rate,
            report_date: row.report_date,
            outcome: row.outcome,
        })
    }

    /// FAERS-style export, one spontaneous report per row.
    pub fn load_faers_reports<P: AsRef<Path>>(file_path: P, organ_map: &OrganSystemMap) -> Result<Vec<Record>> {
        let records = Self::faers_from_reader(File::open(file_path.as_ref())?, organ_map)?;
        log::info!("Loaded {} FAERS reports from {}", records.len(), file_path.as_ref().display());
        Ok(records)
    }

    pub fn faers_from_reader<R: Read>(reader: R, organ_map: &OrganSystemMap) -> Result<Vec<Record>> {
        let mut reader = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader);
        let headers = reader.headers()?.clone();
        let mut records = Vec::new();

        for (line, result) in reader.records().enumerate() {
            let record = result?;
            let row = Self::parse_record(&headers, &record);
            records.push(Self::faers_record(&row, organ_map, line + 2)?);
        }

        Ok(records)
    }

    fn faers_record(row: &HashMap<String, String>, organ_map: &OrganSystemMap, line: usize) -> Result<Record> {
        let medication = Self::parse_required::<Medication>(row, "medication", line)?;
        let side_effect = OrganSystemMap::normalize(Self::required(row, "side_effect", line)?);
        let organ_system = organ_map.classify(&side_effect)?;

        let report_date = match row.get("report_date").filter(|s| !s.is_empty()) {
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    log::warn!("Line {}: ignoring unparseable report date '{}'", line, raw);
                    None
                }
            },
            None => None,
        };

        Ok(Record {
            medication,
            side_effect,
            organ_system,
            sex: Self::parse_optional(row, &["gender", "sex"]).unwrap_or(Sex::Unknown),
            age_band: Self::parse_optional(row, &["age_group", "age_band"])
                .or_else(|| row.get("age").map(|age| AgeBand::from_age(age.parse().ok())))
                .unwrap_or(AgeBand::Unknown),
            region: Self::parse_optional(row, &["region"]).unwrap_or(Region::Unknown),
            source: DataSource::Faers,
            count: 1,
            rate: None,
            report_date,
            outcome: Self::parse_optional(row, &["outcome"]),
        })
    }

    /// Clinical-trial summary export: per medication and side effect, the
    /// incidence in percent among trial participants.
    pub fn load_clinical_trials<P: AsRef<Path>>(file_path: P, organ_map: &OrganSystemMap) -> Result<Vec<Record>> {
        let records = Self::trials_from_reader(File::open(file_path.as_ref())?, organ_map)?;
        log::info!("Loaded {} clinical trial rows from {}", records.len(), file_path.as_ref().display());
        Ok(records)
    }

    pub fn trials_from_reader<R: Read>(reader: R, organ_map: &OrganSystemMap) -> Result<Vec<Record>> {
        let mut reader = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader);
        let headers = reader.headers()?.clone();
        let mut records = Vec::new();

        for (line, result) in reader.records().enumerate() {
            let record = result?;
            let row = Self::parse_record(&headers, &record);
            records.push(Self::trial_record(&row, organ_map, line + 2)?);
        }

        Ok(records)
    }

    fn trial_record(row: &HashMap<String, String>, organ_map: &OrganSystemMap, line: usize) -> Result<Record> {
        let medication = Self::parse_required::<Medication>(row, "medication", line)?;
        let side_effect = OrganSystemMap::normalize(Self::required(row, "side_effect", line)?);
        let organ_system = organ_map.classify(&side_effect)?;

        let participants = Self::parse_int(row, "participants", line)?;
        let frequency = Self::parse_float(row, "frequency", line)?;
        let rate = frequency / 100.0;
        Self::check_rate(rate, line)?;

        Ok(Record {
            medication,
            side_effect,
            organ_system,
            sex: Sex::Unknown,
            age_band: AgeBand::Unknown,
            region: Region::Unknown,
            source: DataSource::ClinicalTrial,
            count: (rate * participants as f64).round() as u64,
            rate: Some(rate),
            report_date: None,
            outcome: None,
        })
    }

    /// Published study list: `pmid, title, journal, year, medication,
    /// study_type, participants, finding, side_effect_notes`. A medication of
    /// `GLP-1 CLASS` marks a class-wide study.
    pub fn load_studies<P: AsRef<Path>>(file_path: P) -> Result<Vec<Study>> {
        let studies = Self::studies_from_reader(File::open(file_path.as_ref())?)?;
        log::info!("Loaded {} studies from {}", studies.len(), file_path.as_ref().display());
        Ok(studies)
    }

    pub fn studies_from_reader<R: Read>(reader: R) -> Result<Vec<Study>> {
        let mut reader = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader);
        let headers = reader.headers()?.clone();
        let mut studies = Vec::new();

        for (line, result) in reader.records().enumerate() {
            let record = result?;
            let row = Self::parse_record(&headers, &record);
            studies.push(Self::study(&row, line + 2)?);
        }

        Ok(studies)
    }

    fn study(row: &HashMap<String, String>, line: usize) -> Result<Study> {
        let text = |key: &str| row.get(key).cloned().unwrap_or_default();

        let medication = match row.get("medication").map(|m| m.trim()).filter(|m| !m.is_empty()) {
            None => None,
            Some(raw) if raw.eq_ignore_ascii_case(Study::CLASS_LABEL) => None,
            Some(_) => Some(Self::parse_required::<Medication>(row, "medication", line)?),
        };

        let year = Self::required(row, "year", line)?
            .parse::<i32>()
            .map_err(|_| DashboardError::ParseError(format!("Line {}: invalid year", line)))?;

        // Database analyses carry a description instead of a head count
        let participants = row.get("participants").and_then(|p| p.parse::<u64>().ok());

        Ok(Study {
            pmid: Self::required(row, "pmid", line)?.to_string(),
            title: Self::required(row, "title", line)?.to_string(),
            journal: text("journal"),
            year,
            medication,
            study_type: text("study_type"),
            participants,
            finding: text("finding"),
            side_effect_notes: text("side_effect_notes"),
        })
    }

    fn parse_record(headers: &csv::StringRecord, record: &csv::StringRecord) -> HashMap<String, String> {
        headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.trim().to_lowercase(), value.to_string()))
            .collect()
    }

    fn required<'a>(row: &'a HashMap<String, String>, key: &str, line: usize) -> Result<&'a str> {
        row.get(key)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DashboardError::ParseError(format!("Line {}: missing column {}", line, key)))
    }

    fn parse_required<T: Label>(row: &HashMap<String, String>, key: &str, line: usize) -> Result<T> {
        let raw = Self::required(row, key, line)?;
        T::parse_label(raw)
            .ok_or_else(|| DashboardError::ParseError(format!("Line {}: invalid {} '{}'", line, key, raw)))
    }

    fn parse_optional<T: Label>(row: &HashMap<String, String>, keys: &[&str]) -> Option<T> {
        keys.iter().find_map(|key| row.get(*key)).and_then(|raw| T::parse_label(raw))
    }

    fn parse_float(row: &HashMap<String, String>, key: &str, line: usize) -> Result<f64> {
        Self::required(row, key, line)?
            .parse::<f64>()
            .map_err(|_| DashboardError::ParseError(format!("Line {}: invalid float value for {}", line, key)))
    }

    fn parse_int(row: &HashMap<String, String>, key: &str, line: usize) -> Result<u64> {
        Self::required(row, key, line)?
            .parse::<u64>()
            .map_err(|_| DashboardError::ParseError(format!("Line {}: invalid count value for {}", line, key)))
    }

    fn check_rate(rate: f64, line: usize) -> Result<()> {
        if (0.0..=1.0).contains(&rate) {
            Ok(())
        } else {
            Err(DashboardError::ParseError(format!("Line {}: rate {} outside [0, 1]", line, rate)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAERS: &str = "\
report_id,medication,side_effect,report_date,age_group,gender,region,outcome
FAERS-10000,SEMAGLUTIDE (OZEMPIC),NAUSEA,2023-04-12,45-64,Female,USA,Other
FAERS-10001,MOUNJARO,Vomiting,2022-01-03,65-74,Male,Japan,Hospitalization
FAERS-10002,EXENATIDE (BYETTA),PANCREATITIS,not-a-date,Unknown,Unknown,Other,Not specified
";

    #[test]
    fn test_faers_parsing() {
        let records = DatasetLoader::faers_from_reader(FAERS.as_bytes(), &OrganSystemMap::glp1_default()).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].medication, Medication::Ozempic);
        assert_eq!(records[0].sex, Sex::Female);
        assert_eq!(records[0].age_band, AgeBand::MiddleAged);
        assert_eq!(records[0].count, 1);
        assert_eq!(records[0].source, DataSource::Faers);
        assert_eq!(records[0].report_date, NaiveDate::from_ymd_opt(2023, 4, 12));

        assert_eq!(records[1].medication, Medication::Mounjaro);
        assert_eq!(records[1].side_effect, "VOMITING");
        assert_eq!(records[1].organ_system, OrganSystem::Gastrointestinal);
        assert_eq!(records[1].outcome, Some(Outcome::Hospitalization));

        assert_eq!(records[2].report_date, None);
        assert_eq!(records[2].outcome, Some(Outcome::NotSpecified));
    }

    #[test]
    fn test_faers_unknown_medication() {
        let data = "medication,side_effect\nMETFORMIN,NAUSEA\n";
        let err = DatasetLoader::faers_from_reader(data.as_bytes(), &OrganSystemMap::glp1_default()).unwrap_err();
        assert!(matches!(err, DashboardError::ParseError(_)));
    }

    #[test]
    fn test_faers_unmapped_side_effect() {
        let data = "medication,side_effect\nOZEMPIC,TINNITUS\n";
        let err = DatasetLoader::faers_from_reader(data.as_bytes(), &OrganSystemMap::glp1_default()).unwrap_err();
        assert!(matches!(err, DashboardError::UnmappedSideEffect(_)));
    }

    #[test]
    fn test_trial_parsing() {
        let data = "\
medication,trial_id,phase,participants,side_effect,frequency,placebo_frequency
SEMAGLUTIDE (WEGOVY),NCT03548935,3,1961,NAUSEA,44.2,16.5
";
        let records = DatasetLoader::trials_from_reader(data.as_bytes(), &OrganSystemMap::glp1_default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, DataSource::ClinicalTrial);
        assert_eq!(records[0].count, 867);
        assert!((records[0].rate.unwrap() - 0.442).abs() < 1e-9);
    }

    #[test]
    fn test_trial_rate_out_of_range() {
        let data = "medication,participants,side_effect,frequency\nWEGOVY,100,NAUSEA,140\n";
        let err = DatasetLoader::trials_from_reader(data.as_bytes(), &OrganSystemMap::glp1_default()).unwrap_err();
        assert!(matches!(err, DashboardError::ParseError(_)));
    }

    #[test]
    fn test_canonical_records() {
        let data = "\
medication,side_effect,organ_system,sex,age_band,region,source,count,rate,report_date,outcome
SEMAGLUTIDE (OZEMPIC),nausea,Gastrointestinal,Female,18-44,Europe,FAERS,12,,2021-06-01,Other
TIRZEPATIDE (MOUNJARO),HEADACHE,,Male,85+,Canada,literature,,0.05,,
";
        let records = DatasetLoader::records_from_reader(data.as_bytes(), &OrganSystemMap::glp1_default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].side_effect, "NAUSEA");
        assert_eq!(records[0].count, 12);
        assert_eq!(records[0].outcome, Some(Outcome::Other));
        assert_eq!(records[1].organ_system, OrganSystem::Neurological);
        assert_eq!(records[1].count, 0);
        assert_eq!(records[1].rate, Some(0.05));
        assert_eq!(records[1].age_band, AgeBand::VeryElderly);
    }

    #[test]
    fn test_canonical_labels_ignore_case() {
        let data = "\
medication,side_effect,sex,age_band,region,source,count,outcome
ozempic,NAUSEA,FEMALE,45-64,usa,faers,4,life-threatening
";
        let records = DatasetLoader::records_from_reader(data.as_bytes(), &OrganSystemMap::glp1_default()).unwrap();
        assert_eq!(records[0].medication, Medication::Ozempic);
        assert_eq!(records[0].sex, Sex::Female);
        assert_eq!(records[0].region, Region::Usa);
        assert_eq!(records[0].source, DataSource::Faers);
        assert_eq!(records[0].outcome, Some(Outcome::LifeThreatening));

        let faers = "medication,side_effect,gender,region\nozempic,NAUSEA,FEMALE,usa\n";
        let from_export = DatasetLoader::faers_from_reader(faers.as_bytes(), &OrganSystemMap::glp1_default()).unwrap();
        assert_eq!(from_export[0].sex, records[0].sex);
        assert_eq!(from_export[0].region, records[0].region);
    }

    #[test]
    fn test_canonical_rejects_unknown_label() {
        let data = "\
medication,side_effect,sex,age_band,region,source,count
METFORMIN,NAUSEA,Female,45-64,USA,FAERS,4
";
        let result = DatasetLoader::records_from_reader(data.as_bytes(), &OrganSystemMap::glp1_default());
        assert!(matches!(result, Err(DashboardError::CsvError(_))));
    }

    #[test]
    fn test_faers_numeric_age() {
        let data = "medication,side_effect,age\nWEGOVY,NAUSEA,71\nWEGOVY,NAUSEA,\n";
        let records = DatasetLoader::faers_from_reader(data.as_bytes(), &OrganSystemMap::glp1_default()).unwrap();
        assert_eq!(records[0].age_band, AgeBand::Senior);
        assert_eq!(records[1].age_band, AgeBand::Unknown);
    }

    #[test]
    fn test_study_parsing() {
        let data = "\
pmid,title,journal,year,medication,study_type,participants,finding,side_effect_notes
34170647,Once-Weekly Semaglutide,NEJM,2021,SEMAGLUTIDE (WEGOVY),Randomized Controlled Trial,1961,Weight loss,\"Nausea, vomiting\"
37180551,Psychiatric adverse events,Front Endocrinol,2023,GLP-1 CLASS,Pharmacovigilance Study,N/A (FAERS Database Analysis),Association,Depression
";
        let studies = DatasetLoader::studies_from_reader(data.as_bytes()).unwrap();
        assert_eq!(studies.len(), 2);
        assert_eq!(studies[0].medication, Some(Medication::Wegovy));
        assert_eq!(studies[0].participants, Some(1961));
        assert_eq!(studies[0].side_effect_notes, "Nausea, vomiting");
        assert_eq!(studies[1].medication, None);
        assert_eq!(studies[1].participants, None);
        assert_eq!(studies[1].year, 2023);
    }

    #[test]
    fn test_study_requires_year() {
        let data = "pmid,title,year\n1,Untitled,recent\n";
        let err = DatasetLoader::studies_from_reader(data.as_bytes()).unwrap_err();
        assert!(matches!(err, DashboardError::ParseError(_)));
    }

    #[test]
    fn test_canonical_rejects_contradicting_organ_system() {
        let data = "\
medication,side_effect,organ_system,sex,age_band,region,source,count
WEGOVY,NAUSEA,Respiratory,Female,18-44,Europe,FAERS,3
";
        let err = DatasetLoader::records_from_reader(data.as_bytes(), &OrganSystemMap::glp1_default()).unwrap_err();
        assert!(matches!(err, DashboardError::ParseError(_)));
    }

    #[test]
    fn test_canonical_rejects_negative_count() {
        let data = "\
medication,side_effect,sex,age_band,region,source,count
WEGOVY,NAUSEA,Female,18-44,Europe,FAERS,-3
";
        let result = DatasetLoader::records_from_reader(data.as_bytes(), &OrganSystemMap::glp1_default());
        assert!(matches!(result, Err(DashboardError::CsvError(_))));
    }
}
