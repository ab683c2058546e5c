use crate::{errors::DashboardError, models::*, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const SIDE_EFFECTS: [&str; 17] = [
    "NAUSEA",
    "VOMITING",
    "DIARRHEA",
    "CONSTIPATION",
    "ABDOMINAL PAIN",
    "PANCREATITIS",
    "GALLBLADDER DISEASE",
    "HYPOGLYCEMIA",
    "FATIGUE",
    "HEADACHE",
    "DIZZINESS",
    "DECREASED APPETITE",
    "INJECTION SITE REACTION",
    "ALOPECIA",
    "SUICIDAL IDEATION",
    "ASPIRATION",
    "THYROID NEOPLASM",
];

const AGE_WEIGHTS: [(AgeBand, f64); 7] = [
    (AgeBand::Pediatric, 0.01),
    (AgeBand::YoungAdult, 0.25),
    (AgeBand::MiddleAged, 0.45),
    (AgeBand::Senior, 0.20),
    (AgeBand::Elderly, 0.05),
    (AgeBand::VeryElderly, 0.01),
    (AgeBand::Unknown, 0.03),
];

const SEX_WEIGHTS: [(Sex, f64); 3] = [(Sex::Male, 0.35), (Sex::Female, 0.62), (Sex::Unknown, 0.03)];

const REGION_WEIGHTS: [(Region, f64); 6] = [
    (Region::Usa, 0.65),
    (Region::Europe, 0.20),
    (Region::Canada, 0.05),
    (Region::Japan, 0.03),
    (Region::Australia, 0.02),
    (Region::Other, 0.05),
];

const YEAR_WEIGHTS: [(i32, f64); 6] = [
    (2018, 0.05),
    (2019, 0.08),
    (2020, 0.12),
    (2021, 0.20),
    (2022, 0.25),
    (2023, 0.30),
];

const OUTCOME_WEIGHTS: [(Outcome, f64); 6] = [
    (Outcome::Hospitalization, 0.15),
    (Outcome::LifeThreatening, 0.03),
    (Outcome::Death, 0.01),
    (Outcome::Disability, 0.05),
    (Outcome::Other, 0.56),
    (Outcome::NotSpecified, 0.20),
];

/// Published phase 3 incidence (percent) per medication, with trial id and size.
const TRIALS: [(Medication, &str, u64, [(&str, f64, f64); 5]); 9] = [
    (Medication::Ozempic, "NCT02054897", 3297, [
        ("NAUSEA", 20.3, 5.2),
        ("VOMITING", 9.2, 2.1),
        ("DIARRHEA", 12.8, 6.1),
        ("CONSTIPATION", 8.5, 3.1),
        ("ABDOMINAL PAIN", 7.4, 4.9),
    ]),
    (Medication::Wegovy, "NCT03548935", 1961, [
        ("NAUSEA", 44.2, 16.5),
        ("VOMITING", 24.8, 6.8),
        ("DIARRHEA", 29.7, 15.9),
        ("CONSTIPATION", 24.2, 11.1),
        ("ABDOMINAL PAIN", 18.6, 10.3),
    ]),
    (Medication::Mounjaro, "NCT03987919", 2539, [
        ("NAUSEA", 22.1, 6.0),
        ("VOMITING", 10.5, 2.3),
        ("DIARRHEA", 16.2, 7.8),
        ("DECREASED APPETITE", 10.8, 2.2),
        ("CONSTIPATION", 9.4, 3.7),
    ]),
    (Medication::Zepbound, "NCT04184622", 2539, [
        ("NAUSEA", 31.0, 8.1),
        ("VOMITING", 15.2, 3.1),
        ("DIARRHEA", 23.0, 9.2),
        ("DECREASED APPETITE", 15.3, 3.5),
        ("CONSTIPATION", 17.1, 6.2),
    ]),
    (Medication::Victoza, "NCT00318461", 1087, [
        ("NAUSEA", 28.4, 8.5),
        ("VOMITING", 10.9, 3.8),
        ("DIARRHEA", 15.8, 8.9),
        ("CONSTIPATION", 9.9, 4.8),
        ("PANCREATITIS", 0.3, 0.1),
    ]),
    (Medication::Saxenda, "NCT01272219", 3731, [
        ("NAUSEA", 39.3, 13.8),
        ("VOMITING", 15.7, 3.9),
        ("DIARRHEA", 20.9, 9.9),
        ("CONSTIPATION", 19.4, 8.5),
        ("GALLBLADDER DISEASE", 2.5, 1.0),
    ]),
    (Medication::Trulicity, "NCT01064687", 2342, [
        ("NAUSEA", 21.1, 5.3),
        ("VOMITING", 12.4, 2.1),
        ("DIARRHEA", 13.5, 6.0),
        ("ABDOMINAL PAIN", 9.4, 4.2),
        ("DECREASED APPETITE", 8.6, 2.3),
    ]),
    (Medication::Byetta, "NCT00039013", 1446, [
        ("NAUSEA", 43.5, 18.1),
        ("VOMITING", 12.8, 3.5),
        ("DIARRHEA", 12.1, 6.2),
        ("HYPOGLYCEMIA", 5.3, 1.2),
        ("PANCREATITIS", 0.9, 0.2),
    ]),
    (Medication::Bydureon, "NCT00877890", 1825, [
        ("NAUSEA", 20.0, 6.8),
        ("VOMITING", 8.9, 3.5),
        ("DIARRHEA", 10.8, 6.2),
        ("INJECTION SITE REACTION", 14.5, 3.2),
        ("HEADACHE", 9.3, 7.1),
    ]),
];

/// Published studies: pmid, title, journal, year, medication (`None` for
/// class-wide), study type, participants, key finding, side-effect notes.
#[rustfmt::skip]
const STUDIES: [(&str, &str, &str, i32, Option<Medication>, &str, &str, &str, &str); 10] = [
    ("34170647", "Once-Weekly Semaglutide in Adults with Overweight or Obesity",
        "New England Journal of Medicine", 2021, Some(Medication::Wegovy), "Randomized Controlled Trial", "1961",
        "Mean weight loss of 14.9% in the semaglutide group vs 2.4% in the placebo group",
        "Gastrointestinal events were more common with semaglutide than with placebo and were primarily mild-to-moderate in severity"),
    ("34614329", "Tirzepatide versus Semaglutide Once Weekly in Patients with Type 2 Diabetes",
        "New England Journal of Medicine", 2021, Some(Medication::Mounjaro), "Randomized Controlled Trial", "1879",
        "Tirzepatide showed superior efficacy in reducing HbA1c and body weight compared to semaglutide",
        "Gastrointestinal adverse events were more common with tirzepatide than with semaglutide"),
    ("36001726", "Tirzepatide Once Weekly for the Treatment of Obesity",
        "New England Journal of Medicine", 2022, Some(Medication::Zepbound), "Randomized Controlled Trial", "2539",
        "Mean weight reduction of 15.0% to 20.9% with tirzepatide vs 3.1% with placebo",
        "Nausea, diarrhea, and constipation were the most common adverse events with tirzepatide"),
    ("37180551", "Psychiatric adverse events associated with glucagon-like peptide-1 receptor agonists: A disproportionality analysis of the FDA adverse event reporting system database",
        "Frontiers in Endocrinology", 2023, None, "Pharmacovigilance Study", "N/A (FAERS Database Analysis)",
        "Significant association between GLP-1 RAs and several psychiatric adverse events",
        "Depression, anxiety, suicidal ideation, and insomnia were reported at higher rates than expected"),
    ("36152571", "Gastrointestinal Safety Assessment of GLP-1 Receptor Agonists in the US: A Real-World Adverse Events Analysis from the FAERS Database",
        "Diagnostics", 2023, None, "Pharmacovigilance Study", "N/A (FAERS Database Analysis)",
        "Semaglutide was linked to higher odds of nausea, vomiting, and delayed gastric emptying",
        "Exenatide was associated with pancreatitis and higher mortality rates"),
    ("35235636", "Cardiovascular and Mortality Outcomes with GLP-1 Receptor Agonists in Patients with Type 2 Diabetes",
        "Journal of the American College of Cardiology", 2022, None, "Meta-analysis", "76242",
        "GLP-1 RAs reduced major adverse cardiovascular events by 14% and all-cause mortality by 12%",
        "Cardiovascular benefits outweighed gastrointestinal side effects in high-risk populations"),
    ("36567165", "Real-world persistence and adherence to glucagon-like peptide-1 receptor agonists for weight management",
        "Journal of Managed Care & Specialty Pharmacy", 2023, None, "Retrospective Cohort Study", "5842",
        "12-month persistence rates were 27% for semaglutide and 19% for liraglutide",
        "Discontinuation often related to gastrointestinal side effects and insurance coverage issues"),
    ("37345982", "Alopecia associated with glucagon-like peptide-1 receptor agonists: A disproportionality analysis using the FDA Adverse Event Reporting System",
        "Journal of the American Academy of Dermatology", 2023, None, "Pharmacovigilance Study", "N/A (FAERS Database Analysis)",
        "Significant association between GLP-1 RAs and alopecia reports",
        "Semaglutide had the strongest association with alopecia among GLP-1 RAs"),
    ("37456123", "Aspiration pneumonia risk with glucagon-like peptide-1 receptor agonists: A population-based cohort study",
        "Annals of Internal Medicine", 2023, None, "Cohort Study", "8745",
        "Increased risk of aspiration pneumonia in patients using GLP-1 RAs",
        "Risk was highest during the first 3 months of treatment and in elderly patients"),
    ("37123456", "Gender differences in adverse events associated with GLP-1 receptor agonists: Analysis of post-marketing data",
        "Diabetes Care", 2023, None, "Pharmacovigilance Study", "N/A (Post-marketing data)",
        "Women reported more gastrointestinal adverse events than men",
        "Men reported more cardiovascular adverse events than women"),
];

pub struct ExampleDataGenerator;

impl ExampleDataGenerator {
    /// Writes `n_reports` simulated FAERS reports in the export layout the
    /// loader reads.
    pub fn generate_faers_dataset<P: AsRef<Path>>(output_path: P, n_reports: usize) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(42); // Reproducible results
        let mut file = BufWriter::new(File::create(output_path)?);

        writeln!(file, "report_id,medication,side_effect,report_date,age_group,gender,region,outcome")?;

        let ages = Self::weighted(&AGE_WEIGHTS)?;
        let sexes = Self::weighted(&SEX_WEIGHTS)?;
        let regions = Self::weighted(&REGION_WEIGHTS)?;
        let years = Self::weighted(&YEAR_WEIGHTS)?;
        let outcomes = Self::weighted(&OUTCOME_WEIGHTS)?;

        for i in 0..n_reports {
            let medication = Self::pick_medication(&mut rng, i);
            let side_effect = SIDE_EFFECTS[rng.gen_range(0..SIDE_EFFECTS.len())];
            let age_band = AGE_WEIGHTS[ages.sample(&mut rng)].0;
            let sex = SEX_WEIGHTS[sexes.sample(&mut rng)].0;
            let region = REGION_WEIGHTS[regions.sample(&mut rng)].0;
            let year = YEAR_WEIGHTS[years.sample(&mut rng)].0;
            // Day capped at 28 so every month is valid
            let month = rng.gen_range(1..=12);
            let day = rng.gen_range(1..=28);
            let outcome = OUTCOME_WEIGHTS[outcomes.sample(&mut rng)].0;

            writeln!(
                file,
                "FAERS-{},{},{},{}-{:02}-{:02},{},{},{},{}",
                i + 10000,
                medication.label(),
                side_effect,
                year,
                month,
                day,
                age_band.label(),
                sex.label(),
                region.label(),
                outcome.label(),
            )?;
        }

        file.flush()?;
        log::info!("Generated example FAERS dataset with {} reports", n_reports);
        Ok(())
    }

    pub fn generate_trial_dataset<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let mut file = BufWriter::new(File::create(output_path)?);

        writeln!(file, "medication,trial_id,phase,participants,side_effect,frequency,placebo_frequency")?;
        for (medication, trial_id, participants, effects) in TRIALS.iter() {
            for (side_effect, frequency, placebo) in effects.iter() {
                writeln!(
                    file,
                    "{},{},3,{},{},{},{}",
                    medication.label(),
                    trial_id,
                    participants,
                    side_effect,
                    frequency,
                    placebo
                )?;
            }
        }

        file.flush()?;
        log::info!("Generated clinical trial dataset for {} medications", TRIALS.len());
        Ok(())
    }

    /// Writes the published study list. Titles and findings contain commas,
    /// so rows go through the CSV writer for quoting.
    pub fn generate_study_dataset<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(output_path)?;

        writer.write_record([
            "pmid",
            "title",
            "journal",
            "year",
            "medication",
            "study_type",
            "participants",
            "finding",
            "side_effect_notes",
        ])?;
        for (pmid, title, journal, year, medication, study_type, participants, finding, notes) in STUDIES.iter() {
            let scope = medication.map_or(Study::CLASS_LABEL, |m| m.label());
            let year = year.to_string();
            writer.write_record([
                *pmid,
                *title,
                *journal,
                year.as_str(),
                scope,
                *study_type,
                *participants,
                *finding,
                *notes,
            ])?;
        }

        writer.flush()?;
        log::info!("Generated study dataset with {} studies", STUDIES.len());
        Ok(())
    }

    /// Ozempic 30%, Wegovy 20%, Mounjaro 20%, the rest uniform over the others.
    fn pick_medication(rng: &mut StdRng, index: usize) -> Medication {
        match index % 10 {
            0..=2 => Medication::Ozempic,
            3..=4 => Medication::Wegovy,
            5..=6 => Medication::Mounjaro,
            _ => {
                let others = &Medication::all()[3..];
                others[rng.gen_range(0..others.len())]
            }
        }
    }

    fn weighted<T>(table: &[(T, f64)]) -> Result<WeightedIndex<f64>> {
        WeightedIndex::new(table.iter().map(|(_, w)| *w))
            .map_err(|e| DashboardError::ParseError(format!("Invalid weight table: {}", e)))
    }
}
