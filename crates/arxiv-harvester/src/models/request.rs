//! Harvest request parameters and their validation.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, Local, NaiveDate};

use crate::config::fields;
use crate::error::{HarvestError, HarvestResult};

/// arXiv OAI set selecting a subject area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClassificationSet {
    /// Computer Science
    Cs,
    /// Economics
    Econ,
    /// Electrical Engineering and Systems Science
    Eess,
    /// Mathematics
    Math,
    /// All of physics
    Physics,
    /// Astrophysics
    #[default]
    AstroPh,
    /// Condensed Matter
    CondMat,
    /// General Relativity and Quantum Cosmology
    GrQc,
    /// High Energy Physics - Experiment
    HepEx,
    /// High Energy Physics - Lattice
    HepLat,
    /// High Energy Physics - Phenomenology
    HepPh,
    /// High Energy Physics - Theory
    HepTh,
    /// Mathematical Physics
    MathPh,
    /// Nonlinear Sciences
    Nlin,
    /// Nuclear Experiment
    NuclEx,
    /// Nuclear Theory
    NuclTh,
    /// Physics (other)
    PhysicsOther,
    /// Quantum Physics
    QuantPh,
    /// Quantitative Biology
    QBio,
    /// Quantitative Finance
    QFin,
    /// Statistics
    Stat,
}

impl ClassificationSet {
    /// Every known set.
    pub const ALL: [Self; 21] = [
        Self::Cs,
        Self::Econ,
        Self::Eess,
        Self::Math,
        Self::Physics,
        Self::AstroPh,
        Self::CondMat,
        Self::GrQc,
        Self::HepEx,
        Self::HepLat,
        Self::HepPh,
        Self::HepTh,
        Self::MathPh,
        Self::Nlin,
        Self::NuclEx,
        Self::NuclTh,
        Self::PhysicsOther,
        Self::QuantPh,
        Self::QBio,
        Self::QFin,
        Self::Stat,
    ];

    /// The `setSpec` value sent to the endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cs => "cs",
            Self::Econ => "econ",
            Self::Eess => "eess",
            Self::Math => "math",
            Self::Physics => "physics",
            Self::AstroPh => "physics:astro-ph",
            Self::CondMat => "physics:cond-mat",
            Self::GrQc => "physics:gr-qc",
            Self::HepEx => "physics:hep-ex",
            Self::HepLat => "physics:hep-lat",
            Self::HepPh => "physics:hep-ph",
            Self::HepTh => "physics:hep-th",
            Self::MathPh => "physics:math-ph",
            Self::Nlin => "physics:nlin",
            Self::NuclEx => "physics:nucl-ex",
            Self::NuclTh => "physics:nucl-th",
            Self::PhysicsOther => "physics:physics",
            Self::QuantPh => "physics:quant-ph",
            Self::QBio => "q-bio",
            Self::QFin => "q-fin",
            Self::Stat => "stat",
        }
    }
}

impl FromStr for ClassificationSet {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|set| set.as_str() == s.trim())
            .ok_or_else(|| HarvestError::invalid_set(s))
    }
}

impl fmt::Display for ClassificationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of fields to extract; determines the table columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    names: Vec<String>,
}

impl FieldSchema {
    /// The full template of standard fields.
    #[must_use]
    pub fn everything() -> Self {
        Self { names: fields::TEMPLATE.iter().map(|f| (*f).to_string()).collect() }
    }

    /// An explicit list of field names.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::InvalidFieldSchema`] for an empty list, a blank
    /// name or a repeated name.
    pub fn from_names<I, S>(names: I) -> HarvestResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.into().trim().to_string();
            if name.is_empty() {
                return Err(HarvestError::invalid_schema("field names cannot be blank"));
            }
            if out.contains(&name) {
                return Err(HarvestError::invalid_schema(format!("field '{name}' listed twice")));
            }
            out.push(name);
        }

        if out.is_empty() {
            return Err(HarvestError::invalid_schema(format!(
                "expected '{}' or at least one field name",
                fields::EVERYTHING
            )));
        }

        Ok(Self { names: out })
    }

    /// Field names in column order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Check if a field is requested.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false for a validated schema.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::everything()
    }
}

/// Parses `everything` or a comma-separated list of names.
impl FromStr for FieldSchema {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == fields::EVERYTHING {
            return Ok(Self::everything());
        }
        if s.trim().is_empty() {
            return Err(HarvestError::invalid_schema("empty field list"));
        }
        Self::from_names(s.split(','))
    }
}

/// Immutable parameters of one harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestRequest {
    from: NaiveDate,
    until: NaiveDate,
    set: ClassificationSet,
    schema: FieldSchema,
}

impl HarvestRequest {
    /// Create a request from already validated parts.
    ///
    /// `from <= until` is not checked; the endpoint answers an inverted range
    /// with an empty result.
    #[must_use]
    pub fn new(from: NaiveDate, until: NaiveDate, set: ClassificationSet, schema: FieldSchema) -> Self {
        Self { from, until, set, schema }
    }

    /// Validate raw user input. Omitted dates default to yesterday and today.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad date or an unknown set.
    pub fn parse(
        from: Option<&str>,
        until: Option<&str>,
        set: &str,
        schema: FieldSchema,
    ) -> HarvestResult<Self> {
        let from = from.map_or_else(|| Ok(days_back(1)), parse_date)?;
        let until = until.map_or_else(|| Ok(days_back(0)), parse_date)?;
        let set = set.parse()?;
        Ok(Self::new(from, until, set, schema))
    }

    /// Inclusive start date.
    #[must_use]
    pub const fn from(&self) -> NaiveDate {
        self.from
    }

    /// Inclusive end date.
    #[must_use]
    pub const fn until(&self) -> NaiveDate {
        self.until
    }

    /// Requested set.
    #[must_use]
    pub const fn set(&self) -> ClassificationSet {
        self.set
    }

    /// Requested fields.
    #[must_use]
    pub const fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// File name used when the caller does not choose one.
    #[must_use]
    pub fn default_file_name(&self) -> String {
        format!("set={}-from={}-to={}.csv", self.set, self.from, self.until)
    }
}

/// Parse a calendar date. Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYYMMDD` and
/// RFC 3339 timestamps (time of day discarded).
///
/// # Errors
///
/// Returns [`HarvestError::InvalidDateFormat`] if no format matches.
pub fn parse_date(input: &str) -> HarvestResult<NaiveDate> {
    let s = input.trim();
    ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
        .ok_or_else(|| HarvestError::invalid_date(input))
}

/// The local calendar date `days` days ago.
#[must_use]
pub fn days_back(days: u64) -> NaiveDate {
    let today = Local::now().date_naive();
    today.checked_sub_days(Days::new(days)).unwrap_or(today)
}
