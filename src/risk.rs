use std::collections::HashMap;

use crate::dates::extract_year;
use crate::models::{
    CanonicalAlert, Probability, RiskScore, RiskTier, ScoredAlert, Severity, UNKNOWN_LABEL,
};

/// Hazard keyword classes, most severe first.
const SEVERITY_CLASSES: &[(Severity, &[&str])] = &[
    (
        Severity::VerySerious,
        &[
            "listeria",
            "salmonella",
            "e. coli",
            "escherichia coli",
            "botulinum",
            "aflatoxin",
            "mercury",
            "lead",
            "cadmium",
            "foreign body",
            "metal",
            "pieces",
            "glass",
            "cronobacter",
        ],
    ),
    (
        Severity::Serious,
        &[
            "undeclared allergen",
            "undeclared milk",
            "undeclared peanut",
            "undeclared soy",
            "undeclared wheat",
            "undeclared egg",
            "undeclared nut",
            "undeclared tree",
            "pesticide",
            "unauthorised substance",
            "unauthorized substance",
            "mould",
            "mold",
            "high content",
            "ethylene oxide",
        ],
    ),
    (
        Severity::Moderate,
        &[
            "labelling",
            "labeling",
            "organoleptic",
            "traces",
            "too high count",
            "presence",
            "migration",
        ],
    ),
];

const ORIGIN_WEIGHT: f64 = 0.6;
const PRODUCT_WEIGHT: f64 = 0.4;

pub fn classify_severity(hazard_type: &str) -> Severity {
    let hazard = hazard_type.to_lowercase();
    SEVERITY_CLASSES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| hazard.contains(keyword)))
        .map(|(severity, _)| *severity)
        .unwrap_or(Severity::Minor)
}

/// Empty values are grouped under a literal "Unknown" bucket.
fn bucket(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() {
        UNKNOWN_LABEL
    } else {
        value
    }
}

/// Country-of-origin and product-type counts over the corpus being scored.
#[derive(Debug, Clone, Default)]
pub struct FrequencyTables {
    origin: HashMap<String, usize>,
    product: HashMap<String, usize>,
    max_origin: usize,
    max_product: usize,
}

impl FrequencyTables {
    pub fn from_alerts(alerts: &[CanonicalAlert]) -> Self {
        let mut origin: HashMap<String, usize> = HashMap::new();
        let mut product: HashMap<String, usize> = HashMap::new();

        for alert in alerts {
            *origin.entry(bucket(&alert.country_origin).to_string()).or_insert(0) += 1;
            *product.entry(bucket(&alert.product_type).to_string()).or_insert(0) += 1;
        }

        let max_origin = origin.values().copied().max().unwrap_or(0);
        let max_product = product.values().copied().max().unwrap_or(0);

        Self {
            origin,
            product,
            max_origin,
            max_product,
        }
    }

    pub fn origin_score(&self, country_origin: &str) -> f64 {
        normalized(self.origin.get(bucket(country_origin)), self.max_origin)
    }

    pub fn product_score(&self, product_type: &str) -> f64 {
        normalized(self.product.get(bucket(product_type)), self.max_product)
    }
}

fn normalized(count: Option<&usize>, max: usize) -> f64 {
    if max == 0 {
        return 0.0;
    }
    count.copied().unwrap_or(0) as f64 / max as f64
}

pub fn probability_from_score(combined: f64) -> Probability {
    if combined > 0.75 {
        Probability::Frequent
    } else if combined > 0.5 {
        Probability::Probable
    } else if combined > 0.25 {
        Probability::Occasional
    } else {
        Probability::Remote
    }
}

pub fn classify_probability(alert: &CanonicalAlert, tables: &FrequencyTables) -> Probability {
    let combined = ORIGIN_WEIGHT * tables.origin_score(&alert.country_origin)
        + PRODUCT_WEIGHT * tables.product_score(&alert.product_type);
    probability_from_score(combined)
}

pub fn risk_tier(level: u8) -> RiskTier {
    match level {
        0..=4 => RiskTier::Low,
        5..=8 => RiskTier::Moderate,
        _ => RiskTier::High,
    }
}

pub fn combine(severity: Severity, probability: Probability) -> RiskScore {
    let level = severity.value() * probability.value();
    RiskScore {
        severity,
        probability,
        level,
        tier: risk_tier(level),
    }
}

pub fn score(alert: &CanonicalAlert, tables: &FrequencyTables) -> RiskScore {
    combine(
        classify_severity(&alert.hazard_type),
        classify_probability(alert, tables),
    )
}

/// Score every alert against frequency tables built from the same slice.
pub fn score_alerts(alerts: &[CanonicalAlert]) -> Vec<ScoredAlert> {
    let tables = FrequencyTables::from_alerts(alerts);
    alerts
        .iter()
        .map(|alert| ScoredAlert {
            alert: alert.clone(),
            score: score(alert, &tables),
            year: extract_year(&alert.date),
        })
        .collect()
}
