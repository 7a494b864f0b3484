use serde::{Deserialize, Serialize};

/// Label used wherever a grouping column is empty.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceDatabase {
    /// National regulatory recall site.
    #[serde(rename = "SOURCE_A")]
    SourceA,
    /// Regional notification database.
    #[serde(rename = "SOURCE_B")]
    SourceB,
}

impl SourceDatabase {
    /// Prefix used when synthesizing `alert_id` values.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            SourceDatabase::SourceA => "A",
            SourceDatabase::SourceB => "B",
        }
    }
}

impl std::fmt::Display for SourceDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceDatabase::SourceA => write!(f, "SOURCE_A"),
            SourceDatabase::SourceB => write!(f, "SOURCE_B"),
        }
    }
}

/// Product group an alert is filed under. Every variant except `Other` is a
/// target category; declaration order is the keyword scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Bakery,
    Dairy,
    Eggs,
    Chocolate,
    Sugar,
    Grains,
    Other,
}

impl Category {
    pub const TARGETS: [Category; 6] = [
        Category::Bakery,
        Category::Dairy,
        Category::Eggs,
        Category::Chocolate,
        Category::Sugar,
        Category::Grains,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Bakery => "bakery",
            Category::Dairy => "dairy",
            Category::Eggs => "eggs",
            Category::Chocolate => "chocolate",
            Category::Sugar => "sugar",
            Category::Grains => "grains",
            Category::Other => "other",
        }
    }

    pub fn is_target(&self) -> bool {
        Category::TARGETS.contains(self)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "bakery" => Ok(Category::Bakery),
            "dairy" => Ok(Category::Dairy),
            "eggs" => Ok(Category::Eggs),
            "chocolate" => Ok(Category::Chocolate),
            "sugar" => Ok(Category::Sugar),
            "grains" => Ok(Category::Grains),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

/// One alert in the unified schema. Field order is the persisted column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAlert {
    pub alert_id: String,
    pub date: String,
    pub product_name: String,
    pub product_type: String,
    pub hazard_type: String,
    pub company: String,
    pub country_origin: String,
    pub country_notification: String,
    pub source_database: SourceDatabase,
    pub source_id: String,
    pub details: String,
    pub original_data: String,
    pub category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Minor = 1,
    Moderate = 2,
    Serious = 3,
    VerySerious = 4,
}

impl Severity {
    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Minor => "Minor",
            Severity::Moderate => "Moderate",
            Severity::Serious => "Serious",
            Severity::VerySerious => "Very serious",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Probability {
    Remote = 1,
    Occasional = 2,
    Probable = 3,
    Frequent = 4,
}

impl Probability {
    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            Probability::Remote => "Remote",
            Probability::Occasional => "Occasional",
            Probability::Probable => "Probable",
            Probability::Frequent => "Frequent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::Low => write!(f, "Low"),
            RiskTier::Moderate => write!(f, "Moderate"),
            RiskTier::High => write!(f, "High"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskScore {
    pub severity: Severity,
    pub probability: Probability,
    /// `severity * probability`, 1..=16.
    pub level: u8,
    pub tier: RiskTier,
}

#[derive(Debug, Clone)]
pub struct ScoredAlert {
    pub alert: CanonicalAlert,
    pub score: RiskScore,
    pub year: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DateRange {
    pub min: Option<String>,
    pub max: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetStats {
    pub total: usize,
    pub by_source: Vec<(String, usize)>,
    pub by_category: Vec<(String, usize)>,
    pub by_country: Vec<(String, usize)>,
    pub date_range: DateRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
