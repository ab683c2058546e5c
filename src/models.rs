use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Closed vocabularies that have a display label and can be parsed back from one.
pub trait Label: Sized + Copy + 'static {
    fn all() -> &'static [Self];
    fn label(&self) -> &'static str;

    /// Extra spellings accepted on input besides the label.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn parse_label(input: &str) -> Option<Self> {
        let input = input.trim();
        Self::all().iter().copied().find(|value| {
            value.label().eq_ignore_ascii_case(input)
                || value.aliases().iter().any(|a| a.eq_ignore_ascii_case(input))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Medication {
    #[serde(rename = "SEMAGLUTIDE (OZEMPIC)", alias = "OZEMPIC")]
    Ozempic,
    #[serde(rename = "SEMAGLUTIDE (WEGOVY)", alias = "WEGOVY")]
    Wegovy,
    #[serde(rename = "TIRZEPATIDE (MOUNJARO)", alias = "MOUNJARO")]
    Mounjaro,
    #[serde(rename = "TIRZEPATIDE (ZEPBOUND)", alias = "ZEPBOUND")]
    Zepbound,
    #[serde(rename = "LIRAGLUTIDE (VICTOZA)", alias = "VICTOZA")]
    Victoza,
    #[serde(rename = "LIRAGLUTIDE (SAXENDA)", alias = "SAXENDA")]
    Saxenda,
    #[serde(rename = "DULAGLUTIDE (TRULICITY)", alias = "TRULICITY")]
    Trulicity,
    #[serde(rename = "EXENATIDE (BYETTA)", alias = "BYETTA")]
    Byetta,
    #[serde(rename = "EXENATIDE (BYDUREON)", alias = "BYDUREON")]
    Bydureon,
}

impl Medication {
    /// Active ingredient, i.e. the medication label without its brand.
    pub fn molecule(&self) -> &'static str {
        match self {
            Medication::Ozempic | Medication::Wegovy => "SEMAGLUTIDE",
            Medication::Mounjaro | Medication::Zepbound => "TIRZEPATIDE",
            Medication::Victoza | Medication::Saxenda => "LIRAGLUTIDE",
            Medication::Trulicity => "DULAGLUTIDE",
            Medication::Byetta | Medication::Bydureon => "EXENATIDE",
        }
    }

    pub fn brand(&self) -> &'static str {
        match self {
            Medication::Ozempic => "OZEMPIC",
            Medication::Wegovy => "WEGOVY",
            Medication::Mounjaro => "MOUNJARO",
            Medication::Zepbound => "ZEPBOUND",
            Medication::Victoza => "VICTOZA",
            Medication::Saxenda => "SAXENDA",
            Medication::Trulicity => "TRULICITY",
            Medication::Byetta => "BYETTA",
            Medication::Bydureon => "BYDUREON",
        }
    }

    pub fn mechanism_of_action(&self) -> &'static str {
        match self.molecule() {
            "TIRZEPATIDE" => "Dual GLP-1 and GIP receptor agonist",
            _ => "GLP-1 receptor agonist",
        }
    }
}

impl Label for Medication {
    fn all() -> &'static [Self] {
        &[
            Medication::Ozempic,
            Medication::Wegovy,
            Medication::Mounjaro,
            Medication::Zepbound,
            Medication::Victoza,
            Medication::Saxenda,
            Medication::Trulicity,
            Medication::Byetta,
            Medication::Bydureon,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            Medication::Ozempic => "SEMAGLUTIDE (OZEMPIC)",
            Medication::Wegovy => "SEMAGLUTIDE (WEGOVY)",
            Medication::Mounjaro => "TIRZEPATIDE (MOUNJARO)",
            Medication::Zepbound => "TIRZEPATIDE (ZEPBOUND)",
            Medication::Victoza => "LIRAGLUTIDE (VICTOZA)",
            Medication::Saxenda => "LIRAGLUTIDE (SAXENDA)",
            Medication::Trulicity => "DULAGLUTIDE (TRULICITY)",
            Medication::Byetta => "EXENATIDE (BYETTA)",
            Medication::Bydureon => "EXENATIDE (BYDUREON)",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Medication::Ozempic => &["OZEMPIC"],
            Medication::Wegovy => &["WEGOVY"],
            Medication::Mounjaro => &["MOUNJARO"],
            Medication::Zepbound => &["ZEPBOUND"],
            Medication::Victoza => &["VICTOZA"],
            Medication::Saxenda => &["SAXENDA"],
            Medication::Trulicity => &["TRULICITY"],
            Medication::Byetta => &["BYETTA"],
            Medication::Bydureon => &["BYDUREON"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrganSystem {
    Gastrointestinal,
    Endocrine,
    Neurological,
    General,
    Dermatological,
    Respiratory,
}

impl Label for OrganSystem {
    fn all() -> &'static [Self] {
        &[
            OrganSystem::Gastrointestinal,
            OrganSystem::Endocrine,
            OrganSystem::Neurological,
            OrganSystem::General,
            OrganSystem::Dermatological,
            OrganSystem::Respiratory,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            OrganSystem::Gastrointestinal => "Gastrointestinal",
            OrganSystem::Endocrine => "Endocrine",
            OrganSystem::Neurological => "Neurological",
            OrganSystem::General => "General",
            OrganSystem::Dermatological => "Dermatological",
            OrganSystem::Respiratory => "Respiratory",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            OrganSystem::Gastrointestinal => &["GI"],
            OrganSystem::Neurological => &["CNS"],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(alias = "male", alias = "M")]
    Male,
    #[serde(alias = "female", alias = "F")]
    Female,
    #[serde(alias = "unknown", alias = "")]
    Unknown,
}

impl Label for Sex {
    fn all() -> &'static [Self] {
        &[Sex::Male, Sex::Female, Sex::Unknown]
    }

    fn label(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
            Sex::Unknown => "Unknown",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Sex::Male => &["M"],
            Sex::Female => &["F"],
            Sex::Unknown => &[""],
        }
    }
}

/// Reporting age buckets; declaration order is the natural order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    #[serde(rename = "0-17")]
    Pediatric,
    #[serde(rename = "18-44")]
    YoungAdult,
    #[serde(rename = "45-64")]
    MiddleAged,
    #[serde(rename = "65-74")]
    Senior,
    #[serde(rename = "75-84")]
    Elderly,
    #[serde(rename = "85+")]
    VeryElderly,
    #[serde(alias = "")]
    Unknown,
}

impl AgeBand {
    pub fn from_age(age: Option<f64>) -> AgeBand {
        match age {
            Some(a) if a < 0.0 => AgeBand::Unknown,
            Some(a) if a < 18.0 => AgeBand::Pediatric,
            Some(a) if a < 45.0 => AgeBand::YoungAdult,
            Some(a) if a < 65.0 => AgeBand::MiddleAged,
            Some(a) if a < 75.0 => AgeBand::Senior,
            Some(a) if a < 85.0 => AgeBand::Elderly,
            Some(_) => AgeBand::VeryElderly,
            None => AgeBand::Unknown,
        }
    }
}

impl Label for AgeBand {
    fn all() -> &'static [Self] {
        &[
            AgeBand::Pediatric,
            AgeBand::YoungAdult,
            AgeBand::MiddleAged,
            AgeBand::Senior,
            AgeBand::Elderly,
            AgeBand::VeryElderly,
            AgeBand::Unknown,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            AgeBand::Pediatric => "0-17",
            AgeBand::YoungAdult => "18-44",
            AgeBand::MiddleAged => "45-64",
            AgeBand::Senior => "65-74",
            AgeBand::Elderly => "75-84",
            AgeBand::VeryElderly => "85+",
            AgeBand::Unknown => "Unknown",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            AgeBand::Unknown => &[""],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "USA")]
    Usa,
    Europe,
    Canada,
    Japan,
    Australia,
    Other,
    #[serde(alias = "")]
    Unknown,
}

impl Region {
    pub fn group(&self) -> RegionGroup {
        match self {
            Region::Usa | Region::Canada => RegionGroup::NorthAmerica,
            Region::Europe => RegionGroup::Europe,
            Region::Japan => RegionGroup::Asia,
            Region::Australia => RegionGroup::Australia,
            Region::Other | Region::Unknown => RegionGroup::Other,
        }
    }

    /// Regions with an established pharmacovigilance system.
    pub fn major() -> &'static [Region] {
        &[Region::Usa, Region::Europe, Region::Canada, Region::Japan, Region::Australia]
    }
}

impl Label for Region {
    fn all() -> &'static [Self] {
        &[
            Region::Usa,
            Region::Europe,
            Region::Canada,
            Region::Japan,
            Region::Australia,
            Region::Other,
            Region::Unknown,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            Region::Usa => "USA",
            Region::Europe => "Europe",
            Region::Canada => "Canada",
            Region::Japan => "Japan",
            Region::Australia => "Australia",
            Region::Other => "Other",
            Region::Unknown => "Unknown",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Region::Usa => &["US", "United States"],
            Region::Unknown => &[""],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegionGroup {
    NorthAmerica,
    Europe,
    Asia,
    Australia,
    Other,
}

impl Label for RegionGroup {
    fn all() -> &'static [Self] {
        &[
            RegionGroup::NorthAmerica,
            RegionGroup::Europe,
            RegionGroup::Asia,
            RegionGroup::Australia,
            RegionGroup::Other,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            RegionGroup::NorthAmerica => "North America",
            RegionGroup::Europe => "Europe",
            RegionGroup::Asia => "Asia",
            RegionGroup::Australia => "Australia",
            RegionGroup::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataSource {
    #[serde(rename = "FAERS")]
    Faers,
    #[serde(rename = "clinical_trial")]
    ClinicalTrial,
    #[serde(rename = "literature")]
    Literature,
}

impl Label for DataSource {
    fn all() -> &'static [Self] {
        &[DataSource::Faers, DataSource::ClinicalTrial, DataSource::Literature]
    }

    fn label(&self) -> &'static str {
        match self {
            DataSource::Faers => "FAERS",
            DataSource::ClinicalTrial => "clinical_trial",
            DataSource::Literature => "literature",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            DataSource::Faers => &["real_world", "rwe"],
            DataSource::ClinicalTrial => &["trial", "clinical trial"],
            DataSource::Literature => &["pubmed"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Hospitalization,
    #[serde(rename = "Life-threatening")]
    LifeThreatening,
    Death,
    Disability,
    Other,
    #[serde(rename = "Not specified", alias = "")]
    NotSpecified,
}

impl Outcome {
    pub fn is_serious(&self) -> bool {
        matches!(
            self,
            Outcome::Hospitalization | Outcome::LifeThreatening | Outcome::Death | Outcome::Disability
        )
    }
}

impl Label for Outcome {
    fn all() -> &'static [Self] {
        &[
            Outcome::Hospitalization,
            Outcome::LifeThreatening,
            Outcome::Death,
            Outcome::Disability,
            Outcome::Other,
            Outcome::NotSpecified,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            Outcome::Hospitalization => "Hospitalization",
            Outcome::LifeThreatening => "Life-threatening",
            Outcome::Death => "Death",
            Outcome::Disability => "Disability",
            Outcome::Other => "Other",
            Outcome::NotSpecified => "Not specified",
        }
    }
}

/// Attributes a record can be grouped or filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Medication,
    Molecule,
    SideEffect,
    OrganSystem,
    Sex,
    AgeBand,
    Region,
    RegionGroup,
    Source,
    ReportYear,
    Outcome,
}

impl Dimension {
    /// Maps a user-supplied filter value onto the label records carry for this dimension.
    pub fn canonical_value(&self, input: &str) -> String {
        let input = input.trim();
        let parsed = match self {
            Dimension::Medication => Medication::parse_label(input).map(|v| v.label()),
            Dimension::OrganSystem => OrganSystem::parse_label(input).map(|v| v.label()),
            Dimension::Sex => Sex::parse_label(input).map(|v| v.label()),
            Dimension::AgeBand => AgeBand::parse_label(input).map(|v| v.label()),
            Dimension::Region => Region::parse_label(input).map(|v| v.label()),
            Dimension::RegionGroup => RegionGroup::parse_label(input).map(|v| v.label()),
            Dimension::Source => DataSource::parse_label(input).map(|v| v.label()),
            Dimension::Outcome => Outcome::parse_label(input).map(|v| v.label()),
            Dimension::Molecule | Dimension::SideEffect => return input.to_uppercase(),
            Dimension::ReportYear => None,
        };
        parsed.map(str::to_string).unwrap_or_else(|| input.to_string())
    }
}

impl Label for Dimension {
    fn all() -> &'static [Self] {
        &[
            Dimension::Medication,
            Dimension::Molecule,
            Dimension::SideEffect,
            Dimension::OrganSystem,
            Dimension::Sex,
            Dimension::AgeBand,
            Dimension::Region,
            Dimension::RegionGroup,
            Dimension::Source,
            Dimension::ReportYear,
            Dimension::Outcome,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            Dimension::Medication => "medication",
            Dimension::Molecule => "molecule",
            Dimension::SideEffect => "side_effect",
            Dimension::OrganSystem => "organ_system",
            Dimension::Sex => "sex",
            Dimension::AgeBand => "age_band",
            Dimension::Region => "region",
            Dimension::RegionGroup => "region_group",
            Dimension::Source => "source",
            Dimension::ReportYear => "report_year",
            Dimension::Outcome => "outcome",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Dimension::Sex => &["gender"],
            Dimension::AgeBand => &["age_group", "age"],
            Dimension::Source => &["data_source"],
            Dimension::ReportYear => &["year"],
            _ => &[],
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One observed or simulated adverse-event entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub medication: Medication,
    pub side_effect: String,
    pub organ_system: OrganSystem,
    pub sex: Sex,
    pub age_band: AgeBand,
    pub region: Region,
    pub source: DataSource,
    pub count: u64,
    pub rate: Option<f64>,
    pub report_date: Option<NaiveDate>,
    pub outcome: Option<Outcome>,
}

impl Record {
    pub fn dimension_value(&self, dimension: Dimension) -> String {
        match dimension {
            Dimension::Medication => self.medication.label().to_string(),
            Dimension::Molecule => self.medication.molecule().to_string(),
            Dimension::SideEffect => self.side_effect.clone(),
            Dimension::OrganSystem => self.organ_system.label().to_string(),
            Dimension::Sex => self.sex.label().to_string(),
            Dimension::AgeBand => self.age_band.label().to_string(),
            Dimension::Region => self.region.label().to_string(),
            Dimension::RegionGroup => self.region.group().label().to_string(),
            Dimension::Source => self.source.label().to_string(),
            Dimension::ReportYear => self
                .report_date
                .map(|d| d.year().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            Dimension::Outcome => self
                .outcome
                .map(|o| o.label().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

/// A published study, either about one medication or about the whole class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub pmid: String,
    pub title: String,
    pub journal: String,
    pub year: i32,
    /// `None` for class-wide studies.
    pub medication: Option<Medication>,
    pub study_type: String,
    /// `None` for database analyses without an enrolled population.
    pub participants: Option<u64>,
    pub finding: String,
    pub side_effect_notes: String,
}

impl Study {
    pub const CLASS_LABEL: &'static str = "GLP-1 CLASS";

    /// Class-wide studies concern every medication; others concern every
    /// brand of the same molecule.
    pub fn concerns(&self, medication: Medication) -> bool {
        self.medication
            .map_or(true, |m| m.molecule() == medication.molecule())
    }
}

/// Dimension-value tuple identifying one summary group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregationKey {
    pub dimensions: Vec<Dimension>,
    pub values: Vec<String>,
}

impl AggregationKey {
    pub fn for_record(record: &Record, dimensions: &[Dimension]) -> Self {
        Self {
            dimensions: dimensions.to_vec(),
            values: dimensions.iter().map(|d| record.dimension_value(*d)).collect(),
        }
    }

    pub fn value(&self, dimension: Dimension) -> Option<&str> {
        self.dimensions
            .iter()
            .position(|d| *d == dimension)
            .map(|i| self.values[i].as_str())
    }

    pub fn shape(&self) -> String {
        self.dimensions.iter().map(|d| d.label()).collect::<Vec<_>>().join(",")
    }
}

impl fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .dimensions
            .iter()
            .zip(&self.values)
            .map(|(d, v)| format!("{}={}", d, v))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub key: AggregationKey,
    pub count: u64,
    pub percentage: f64,
    pub rank: usize,
    pub mean_rate: Option<f64>,
}

/// Accepted values per dimension. A dimension without an entry is unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    pub selections: BTreeMap<Dimension, BTreeSet<String>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, dimension: Dimension, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.restrict(dimension, values);
        self
    }

    /// Adds accepted values for a dimension; an empty value list leaves it unrestricted.
    pub fn restrict<I, S>(&mut self, dimension: Dimension, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: BTreeSet<String> = values
            .into_iter()
            .map(|v| dimension.canonical_value(v.as_ref()))
            .collect();
        if values.is_empty() {
            return;
        }
        self.selections.entry(dimension).or_default().extend(values);
    }

    /// Intersects a dimension's selection with `values`. Unlike `restrict`, this
    /// never widens: narrowing to values outside an existing selection leaves
    /// an empty selection that matches nothing.
    pub fn narrow<I, S>(mut self, dimension: Dimension, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: BTreeSet<String> = values
            .into_iter()
            .map(|v| dimension.canonical_value(v.as_ref()))
            .collect();
        let narrowed = match self.selections.get(&dimension) {
            Some(existing) => existing.intersection(&values).cloned().collect(),
            None => values,
        };
        self.selections.insert(dimension, narrowed);
        self
    }

    /// Narrows a dimension to exactly one value, dropping any earlier selection.
    pub fn replace(&mut self, dimension: Dimension, value: &str) {
        let mut values = BTreeSet::new();
        values.insert(dimension.canonical_value(value));
        self.selections.insert(dimension, values);
    }

    pub fn accepts(&self, dimension: Dimension) -> Option<&BTreeSet<String>> {
        self.selections.get(&dimension)
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.selections
            .iter()
            .all(|(dimension, accepted)| accepted.contains(&record.dimension_value(*dimension)))
    }
}
