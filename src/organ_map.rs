use crate::{errors::DashboardError, models::*, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Static side_effect -> organ_system lookup. Immutable once built; passed to
/// the loader so every record's organ system is derived from the same table.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganSystemMap {
    entries: BTreeMap<String, OrganSystem>,
}

impl OrganSystemMap {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, OrganSystem)>,
        S: AsRef<str>,
    {
        let entries = pairs
            .into_iter()
            .map(|(effect, system)| (Self::normalize(effect.as_ref()), system))
            .collect();
        Self { entries }
    }

    /// Reads a JSON object of the form `{"NAUSEA": "Gastrointestinal", ...}`.
    pub fn from_json_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let raw: BTreeMap<String, String> = serde_json::from_reader(reader)?;

        let mut entries = BTreeMap::new();
        for (effect, system) in raw {
            let organ_system = OrganSystem::parse_label(&system).ok_or_else(|| {
                DashboardError::ParseError(format!(
                    "Unknown organ system '{}' for side effect '{}'",
                    system, effect
                ))
            })?;
            entries.insert(Self::normalize(&effect), organ_system);
        }

        log::info!(
            "Loaded organ system map with {} side effects from {}",
            entries.len(),
            path.as_ref().display()
        );
        Ok(Self { entries })
    }

    /// Vocabulary of the GLP-1 class adverse-event reports.
    pub fn glp1_default() -> Self {
        Self::from_pairs([
            ("NAUSEA", OrganSystem::Gastrointestinal),
            ("VOMITING", OrganSystem::Gastrointestinal),
            ("DIARRHEA", OrganSystem::Gastrointestinal),
            ("CONSTIPATION", OrganSystem::Gastrointestinal),
            ("ABDOMINAL PAIN", OrganSystem::Gastrointestinal),
            ("PANCREATITIS", OrganSystem::Gastrointestinal),
            ("GALLBLADDER DISEASE", OrganSystem::Gastrointestinal),
            ("HYPOGLYCEMIA", OrganSystem::Endocrine),
            ("THYROID NEOPLASM", OrganSystem::Endocrine),
            ("HEADACHE", OrganSystem::Neurological),
            ("DIZZINESS", OrganSystem::Neurological),
            ("SUICIDAL IDEATION", OrganSystem::Neurological),
            ("FATIGUE", OrganSystem::General),
            ("DECREASED APPETITE", OrganSystem::General),
            ("INJECTION SITE REACTION", OrganSystem::Dermatological),
            ("ALOPECIA", OrganSystem::Dermatological),
            ("ASPIRATION", OrganSystem::Respiratory),
        ])
    }

    pub fn classify(&self, side_effect: &str) -> Result<OrganSystem> {
        self.entries
            .get(&Self::normalize(side_effect))
            .copied()
            .ok_or_else(|| DashboardError::UnmappedSideEffect(side_effect.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn normalize(side_effect: &str) -> String {
        side_effect.trim().to_uppercase()
    }
}

impl Default for OrganSystemMap {
    fn default() -> Self {
        Self::glp1_default()
    }
}
