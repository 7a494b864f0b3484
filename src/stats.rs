use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::dates::parse_date;
use crate::models::{CanonicalAlert, DatasetStats, DateRange, UNKNOWN_LABEL};
use crate::store::read_alerts;

/// Group-and-count, largest group first, ties by label.
pub fn count_by<'a, F>(alerts: &'a [CanonicalAlert], key: F) -> Vec<(String, usize)>
where
    F: Fn(&'a CanonicalAlert) -> String,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for alert in alerts {
        let label = key(alert);
        let label = if label.trim().is_empty() {
            UNKNOWN_LABEL.to_string()
        } else {
            label
        };
        *counts.entry(label).or_insert(0) += 1;
    }

    let mut values: Vec<(String, usize)> = counts.into_iter().collect();
    values.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    values
}

/// Earliest and latest date, returned in their stored text form.
///
/// Parseable dates are compared as dates; if none parse, the non-empty values
/// are compared as text.
pub fn date_range(alerts: &[CanonicalAlert]) -> DateRange {
    let parsed: Vec<(chrono::NaiveDate, &str)> = alerts
        .iter()
        .filter_map(|alert| parse_date(&alert.date).map(|date| (date, alert.date.as_str())))
        .collect();

    if !parsed.is_empty() {
        let min = parsed.iter().min_by_key(|(date, _)| *date).map(|(_, raw)| raw.to_string());
        let max = parsed.iter().max_by_key(|(date, _)| *date).map(|(_, raw)| raw.to_string());
        return DateRange { min, max };
    }

    let texts = alerts
        .iter()
        .map(|alert| alert.date.trim())
        .filter(|date| !date.is_empty());
    DateRange {
        min: texts.clone().min().map(str::to_string),
        max: texts.max().map(str::to_string),
    }
}

pub fn summarize(alerts: &[CanonicalAlert]) -> DatasetStats {
    DatasetStats {
        total: alerts.len(),
        by_source: count_by(alerts, |alert| alert.source_database.to_string()),
        by_category: count_by(alerts, |alert| alert.category.to_string()),
        by_country: count_by(alerts, |alert| alert.country_origin.clone()),
        date_range: date_range(alerts),
        error: None,
    }
}

/// Summarize a persisted dataset. Read failures come back as zeroed stats
/// carrying the error message rather than as an `Err`.
pub fn summarize_file(path: &Path) -> DatasetStats {
    if !path.exists() {
        return DatasetStats {
            error: Some(format!("dataset not found: {}", path.display())),
            ..DatasetStats::default()
        };
    }

    match read_alerts(path) {
        Ok(alerts) => {
            let mut stats = summarize(&alerts);
            if alerts.is_empty() {
                stats.error = Some("dataset is empty".to_string());
            }
            stats
        }
        Err(err) => {
            warn!(error = %err, "cannot summarize dataset");
            DatasetStats {
                error: Some(err.to_string()),
                ..DatasetStats::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, SourceDatabase};
    use crate::store::write_alerts;

    fn sample_alert(
        id: &str,
        date: &str,
        source: SourceDatabase,
        category: Category,
        origin: &str,
    ) -> CanonicalAlert {
        CanonicalAlert {
            alert_id: id.to_string(),
            date: date.to_string(),
            product_name: "sample".to_string(),
            product_type: "sample type".to_string(),
            hazard_type: String::new(),
            company: String::new(),
            country_origin: origin.to_string(),
            country_notification: String::new(),
            source_database: source,
            source_id: id.to_string(),
            details: String::new(),
            original_data: "{}".to_string(),
            category,
        }
    }

    fn sample_dataset() -> Vec<CanonicalAlert> {
        vec![
            sample_alert(
                "A-0",
                "12/01/2023",
                SourceDatabase::SourceA,
                Category::Bakery,
                "United States",
            ),
            sample_alert("B-1", "02/15/2024", SourceDatabase::SourceB, Category::Dairy, "France"),
            sample_alert("B-2", "01/03/2024", SourceDatabase::SourceB, Category::Dairy, ""),
            sample_alert("B-3", "garbled", SourceDatabase::SourceB, Category::Other, "France"),
        ]
    }

    #[test]
    fn counts_are_grouped_and_ordered() {
        let stats = summarize(&sample_dataset());
        assert_eq!(stats.total, 4);
        assert_eq!(
            stats.by_source,
            vec![("SOURCE_B".to_string(), 3), ("SOURCE_A".to_string(), 1)]
        );
        assert_eq!(stats.by_category[0], ("dairy".to_string(), 2));
        assert_eq!(stats.by_country[0], ("France".to_string(), 2));
        assert!(stats.by_country.contains(&(UNKNOWN_LABEL.to_string(), 1)));
    }

    #[test]
    fn date_range_is_parse_based() {
        let range = date_range(&sample_dataset());
        // Lexicographically "01/03/2024" is smallest, but December 2023 is earlier.
        assert_eq!(range.min.as_deref(), Some("12/01/2023"));
        assert_eq!(range.max.as_deref(), Some("02/15/2024"));
    }

    #[test]
    fn date_range_falls_back_to_text() {
        let alerts = vec![
            sample_alert("B-1", "week 7", SourceDatabase::SourceB, Category::Dairy, "France"),
            sample_alert("B-2", "", SourceDatabase::SourceB, Category::Dairy, "France"),
            sample_alert("B-3", "week 12", SourceDatabase::SourceB, Category::Dairy, "France"),
        ];
        let range = date_range(&alerts);
        assert_eq!(range.min.as_deref(), Some("week 12"));
        assert_eq!(range.max.as_deref(), Some("week 7"));
    }

    #[test]
    fn missing_dataset_yields_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let stats = summarize_file(&dir.path().join("missing.csv"));
        assert_eq!(stats.total, 0);
        assert!(stats.by_source.is_empty());
        assert!(stats.error.is_some());
    }

    #[test]
    fn summarizes_persisted_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.csv");
        write_alerts(&path, &sample_dataset()).unwrap();

        let stats = summarize_file(&path);
        assert_eq!(stats.total, 4);
        assert!(stats.error.is_none());
    }
}
