use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::Config;
use crate::dates::parse_date;
use crate::models::{Category, RiskTier, ScoredAlert, UNKNOWN_LABEL};
use crate::stats::count_by;

const HAZARD_LABEL_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct TierSummary {
    pub tier: RiskTier,
    pub count: usize,
    pub share: f64,
}

pub fn summarize_by_tier(scored: &[ScoredAlert]) -> Vec<TierSummary> {
    let mut map: HashMap<RiskTier, usize> = HashMap::new();
    for alert in scored {
        *map.entry(alert.score.tier).or_insert(0) += 1;
    }

    let mut summaries: Vec<TierSummary> = map
        .into_iter()
        .map(|(tier, count)| TierSummary {
            tier,
            count,
            share: if scored.is_empty() {
                0.0
            } else {
                count as f64 * 100.0 / scored.len() as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| b.tier.cmp(&a.tier)));
    summaries
}

/// Highest risk first; equal levels by most recent date.
pub fn rank_by_risk(scored: &[ScoredAlert]) -> Vec<&ScoredAlert> {
    let mut ranked: Vec<&ScoredAlert> = scored.iter().collect();
    ranked.sort_by(|a, b| {
        b.score
            .level
            .cmp(&a.score.level)
            .then_with(|| parse_date(&b.alert.date).cmp(&parse_date(&a.alert.date)))
    });
    ranked
}

fn truncate_label(text: &str) -> String {
    if text.chars().count() > HAZARD_LABEL_LIMIT {
        let head: String = text.chars().take(HAZARD_LABEL_LIMIT - 3).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn distinct_non_empty<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    let mut seen: Vec<&str> = values.map(str::trim).filter(|v| !v.is_empty()).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

fn top_non_empty<'a, F>(scored: &[&'a ScoredAlert], key: F) -> Option<String>
where
    F: Fn(&'a ScoredAlert) -> &'a str,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for alert in scored {
        let value = key(*alert).trim();
        if !value.is_empty() {
            *counts.entry(value).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(value, _)| value.to_string())
}

pub fn build_report(config: &Config, generated_on: NaiveDate, scored: &[ScoredAlert]) -> String {
    let alerts: Vec<_> = scored.iter().map(|s| s.alert.clone()).collect();
    let tiers = summarize_by_tier(scored);

    let mut output = String::new();

    let _ = writeln!(output, "# Food Safety Alert Risk Report");
    let _ = writeln!(output, "Generated on {}", generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");

    if scored.is_empty() {
        let _ = writeln!(output, "No alerts recorded in the consolidated dataset.");
        return output;
    }

    let _ = writeln!(output, "- Alerts: {}", scored.len());
    let _ = writeln!(
        output,
        "- Product categories: {}",
        distinct_non_empty(scored.iter().map(|s| s.alert.category.as_str()))
    );
    let _ = writeln!(
        output,
        "- Origin countries: {}",
        distinct_non_empty(scored.iter().map(|s| s.alert.country_origin.as_str()))
    );
    let _ = writeln!(
        output,
        "- Hazard types: {}",
        distinct_non_empty(scored.iter().map(|s| s.alert.hazard_type.as_str()))
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Distribution");
    for summary in tiers.iter() {
        let _ = writeln!(
            output,
            "- {}: {} alerts ({:.1}%)",
            summary.tier, summary.count, summary.share
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Origin Countries");
    for (country, count) in count_by(&alerts, |alert| alert.country_origin.clone())
        .iter()
        .take(5)
    {
        let _ = writeln!(output, "- {}: {} alerts", country, count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Hazards");
    let with_hazard: Vec<_> = alerts
        .iter()
        .filter(|alert| !alert.hazard_type.trim().is_empty())
        .cloned()
        .collect();
    if with_hazard.is_empty() {
        let _ = writeln!(output, "No hazard descriptions recorded.");
    } else {
        for (hazard, count) in count_by(&with_hazard, |alert| alert.hazard_type.clone())
            .iter()
            .take(5)
        {
            let _ = writeln!(output, "- {}: {} alerts", truncate_label(hazard), count);
        }
    }

    let high: Vec<_> = alerts
        .iter()
        .zip(scored.iter())
        .filter(|(_, s)| s.score.tier == RiskTier::High)
        .map(|(alert, _)| alert.clone())
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Categories With Most High-Risk Alerts");
    if high.is_empty() {
        let _ = writeln!(output, "No high-risk alerts.");
    } else {
        for (category, count) in count_by(&high, |alert| alert.category.to_string())
            .iter()
            .take(3)
        {
            let _ = writeln!(output, "- {}: {} alerts", category, count);
        }
    }

    let mut categories: Vec<Category> = scored.iter().map(|s| s.alert.category).collect();
    categories.sort();
    categories.dedup();

    for category in categories {
        let in_category: Vec<&ScoredAlert> = scored
            .iter()
            .filter(|s| s.alert.category == category)
            .collect();
        let high_count = in_category
            .iter()
            .filter(|s| s.score.tier == RiskTier::High)
            .count();

        let _ = writeln!(output);
        let _ = writeln!(output, "## {} ({})", config.display_name(category), category);
        let _ = writeln!(output, "- Alerts: {}", in_category.len());
        let _ = writeln!(
            output,
            "- High-risk alerts: {} ({:.1}%)",
            high_count,
            high_count as f64 * 100.0 / in_category.len() as f64
        );
        let _ = writeln!(
            output,
            "- Main hazard: {}",
            top_non_empty(&in_category, |s| s.alert.hazard_type.as_str())
                .map(|hazard| truncate_label(&hazard))
                .unwrap_or_else(|| "N/A".to_string())
        );
        let _ = writeln!(
            output,
            "- Main origin country: {}",
            top_non_empty(&in_category, |s| s.alert.country_origin.as_str())
                .unwrap_or_else(|| "N/A".to_string())
        );

        let owned: Vec<ScoredAlert> = in_category.iter().map(|s| (*s).clone()).collect();
        for summary in summarize_by_tier(&owned) {
            let _ = writeln!(
                output,
                "  - {}: {} ({:.1}%)",
                summary.tier, summary.count, summary.share
            );
        }
    }

    let mut recent: Vec<&ScoredAlert> = scored.iter().collect();
    recent.sort_by(|a, b| parse_date(&b.alert.date).cmp(&parse_date(&a.alert.date)));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Alerts");
    for alert in recent.iter().take(5) {
        let hazard = alert.alert.hazard_type.trim();
        let _ = writeln!(
            output,
            "- {} ({}) on {}: {} [{} risk]",
            alert.alert.product_name,
            alert.alert.alert_id,
            alert.alert.date,
            if hazard.is_empty() { UNKNOWN_LABEL } else { hazard },
            alert.score.tier
        );
    }

    output
}

/// Row of the tabular report: canonical fields plus derived risk columns.
#[derive(Debug, Serialize)]
struct ScoredRow<'a> {
    alert_id: &'a str,
    date: &'a str,
    year: &'a str,
    product_name: &'a str,
    product_type: &'a str,
    hazard_type: &'a str,
    company: &'a str,
    country_origin: &'a str,
    country_notification: &'a str,
    source_database: String,
    source_id: &'a str,
    category: &'a str,
    severity: u8,
    severity_label: &'a str,
    probability: u8,
    probability_label: &'a str,
    risk_level: u8,
    risk_tier: String,
}

pub fn write_scored_csv(path: &Path, scored: &[ScoredAlert]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for entry in scored {
        let alert = &entry.alert;
        writer.serialize(ScoredRow {
            alert_id: &alert.alert_id,
            date: &alert.date,
            year: entry.year.as_deref().unwrap_or(""),
            product_name: &alert.product_name,
            product_type: &alert.product_type,
            hazard_type: &alert.hazard_type,
            company: &alert.company,
            country_origin: &alert.country_origin,
            country_notification: &alert.country_notification,
            source_database: alert.source_database.to_string(),
            source_id: &alert.source_id,
            category: alert.category.as_str(),
            severity: entry.score.severity.value(),
            severity_label: entry.score.severity.label(),
            probability: entry.score.probability.value(),
            probability_label: entry.score.probability.label(),
            risk_level: entry.score.level,
            risk_tier: entry.score.tier.to_string(),
        })?;
    }
    writer.flush()?;
    Ok(())
}
