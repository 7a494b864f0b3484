use tracing::{debug, info};

use crate::category::CategoryClassifier;
use crate::dates::convert_source_b_date;
use crate::models::{CanonicalAlert, SourceDatabase};
use crate::sources::{source_a, source_b, FilteredTable, RawRow};

/// Origin and notifying country of every national recall.
pub const SOURCE_A_COUNTRY: &str = "United States";

/// `"{brand} - {description}"` when a brand is present, else the description.
pub fn compose_product_name(brand: &str, description: &str) -> String {
    if brand.trim().is_empty() {
        description.to_string()
    } else {
        format!("{brand} - {description}")
    }
}

pub fn source_b_details(classification: &str, for_attention: &str, for_follow_up: &str) -> String {
    format!(
        "Classification: {classification} | For Attention: {for_attention} | For Follow-Up: {for_follow_up}"
    )
}

fn alert_id(source: SourceDatabase, native: &str) -> String {
    format!("{}-{}", source.id_prefix(), native)
}

fn map_source_a(row: RawRow<'_>, classifier: &CategoryClassifier<'_>) -> CanonicalAlert {
    let id = alert_id(SourceDatabase::SourceA, &row.ordinal().to_string());
    let product_name =
        compose_product_name(row.get(source_a::BRAND), row.get(source_a::DESCRIPTION));
    let product_type = row.get(source_a::PRODUCT_TYPE).to_string();
    let category = classifier.categorize(&product_type, &product_name, SourceDatabase::SourceA);

    CanonicalAlert {
        alert_id: id.clone(),
        date: row.get(source_a::DATE).to_string(),
        product_name,
        product_type,
        hazard_type: row.get(source_a::REASON).to_string(),
        company: row.get(source_a::COMPANY).to_string(),
        country_origin: SOURCE_A_COUNTRY.to_string(),
        country_notification: SOURCE_A_COUNTRY.to_string(),
        source_database: SourceDatabase::SourceA,
        source_id: id,
        details: row.get(source_a::EXCERPT).to_string(),
        original_data: row.snapshot(),
        category,
    }
}

fn map_source_b(row: RawRow<'_>, classifier: &CategoryClassifier<'_>) -> CanonicalAlert {
    let reference = row.get(source_b::REFERENCE);
    let product_name = row.get(source_b::SUBJECT).to_string();
    let product_type = row.get(source_b::CATEGORY).to_string();
    let category = classifier.categorize(&product_type, &product_name, SourceDatabase::SourceB);

    CanonicalAlert {
        alert_id: alert_id(SourceDatabase::SourceB, reference),
        date: convert_source_b_date(row.get(source_b::DATE)),
        product_name,
        product_type,
        hazard_type: row.get(source_b::HAZARDS).to_string(),
        company: row.get(source_b::OPERATOR).to_string(),
        country_origin: row.get(source_b::ORIGIN).to_string(),
        country_notification: row.get(source_b::NOTIFYING_COUNTRY).to_string(),
        source_database: SourceDatabase::SourceB,
        source_id: reference.to_string(),
        details: source_b_details(
            row.get(source_b::CLASSIFICATION),
            row.get(source_b::FOR_ATTENTION),
            row.get(source_b::FOR_FOLLOW_UP),
        ),
        original_data: row.snapshot(),
        category,
    }
}

fn map_table(table: &FilteredTable, classifier: &CategoryClassifier<'_>) -> Vec<CanonicalAlert> {
    match table.source {
        SourceDatabase::SourceA => table.rows().map(|row| map_source_a(row, classifier)).collect(),
        SourceDatabase::SourceB => {
            let missing: Vec<&str> = source_b::ALL
                .iter()
                .copied()
                .filter(|column| !table.is_empty() && !table.has_column(column))
                .collect();
            if !missing.is_empty() {
                debug!(?missing, "notification extract lacks columns, filling with empty values");
            }
            table.rows().map(|row| map_source_b(row, classifier)).collect()
        }
    }
}

/// Map filtered source tables onto the canonical schema.
///
/// Source A rows come first, then source B, each in original row order. An
/// empty result means there is nothing to process downstream.
pub fn unify(tables: &[FilteredTable], classifier: &CategoryClassifier<'_>) -> Vec<CanonicalAlert> {
    let mut ordered: Vec<&FilteredTable> = tables.iter().collect();
    ordered.sort_by_key(|table| table.source);

    let alerts: Vec<CanonicalAlert> = ordered
        .into_iter()
        .flat_map(|table| map_table(table, classifier))
        .collect();

    info!(alerts = alerts.len(), "unified alerts");
    alerts
}
