use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::PipelineError;
use crate::models::{Category, SourceDatabase};

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "food-alerts.toml";

/// Validated, immutable configuration handed to every pipeline component.
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    /// Target categories in declaration order.
    pub categories: Vec<CategoryDefinition>,
    pub mappings: CategoryMappings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub consolidated_file: String,
    pub processed_prefix: String,
    /// Lower-case file name fragment identifying raw source A extracts.
    pub source_a_pattern: String,
    /// Lower-case file name fragment identifying raw source B extracts.
    pub source_b_pattern: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            data_dir: PathBuf::from("data"),
            consolidated_file: "consolidated_bakery_dairy_alerts.csv".to_string(),
            processed_prefix: "bakery_dairy_alerts_".to_string(),
            source_a_pattern: "fda_alerts".to_string(),
            source_b_pattern: "rasff_window".to_string(),
        }
    }
}

impl PathsConfig {
    pub fn scraps_dir(&self) -> PathBuf {
        self.data_dir.join("scraps")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    pub fn final_dir(&self) -> PathBuf {
        self.data_dir.join("final")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    pub fn consolidated_path(&self) -> PathBuf {
        self.final_dir().join(&self.consolidated_file)
    }

    /// Per-run canonical table, one file per calendar day.
    pub fn processed_path(&self, run_date: NaiveDate) -> PathBuf {
        self.processed_dir().join(format!(
            "{}{}.csv",
            self.processed_prefix,
            run_date.format("%Y%m%d")
        ))
    }

    pub fn source_pattern(&self, source: SourceDatabase) -> &str {
        match source {
            SourceDatabase::SourceA => &self.source_a_pattern,
            SourceDatabase::SourceB => &self.source_b_pattern,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDefinition {
    pub id: Category,
    pub name: String,
    pub keywords: Vec<String>,
}

/// Source-native category labels that map straight onto a target category.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategoryMappings {
    pub source_a: HashMap<String, Category>,
    pub source_b: HashMap<String, Category>,
}

impl CategoryMappings {
    pub fn for_source(&self, source: SourceDatabase) -> &HashMap<String, Category> {
        match source {
            SourceDatabase::SourceA => &self.source_a,
            SourceDatabase::SourceB => &self.source_b,
        }
    }
}

/// On-disk shape; every section is optional and falls back to the built-in tables.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    paths: PathsConfig,
    categories: Option<Vec<CategoryDefinition>>,
    mappings: Option<CategoryMappings>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            paths: PathsConfig::default(),
            categories: default_categories(),
            mappings: default_mappings(),
        }
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Config, PipelineError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))?;
        Config::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Config, PipelineError> {
        let categories = match file.categories {
            Some(categories) => validate_categories(categories)?,
            None => default_categories(),
        };
        let mappings = match file.mappings {
            Some(mappings) => validate_mappings(mappings)?,
            None => default_mappings(),
        };

        Ok(Config {
            paths: file.paths,
            categories,
            mappings,
        })
    }

    pub fn category(&self, id: Category) -> Option<&CategoryDefinition> {
        self.categories.iter().find(|definition| definition.id == id)
    }

    /// Display name for a category, falling back to its id.
    pub fn display_name(&self, id: Category) -> String {
        self.category(id)
            .map(|definition| definition.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`, the path passed via `--config`
/// 2. `./food-alerts.toml`
/// 3. Built-in [`Config::default`]
pub fn load_config(config_override: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = config_override {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        return Ok(Config::from_toml(&content)?);
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        let content = std::fs::read_to_string(&local)
            .with_context(|| format!("failed to read config {}", local.display()))?;
        return Ok(Config::from_toml(&content)?);
    }

    Ok(Config::default())
}

fn validate_categories(
    categories: Vec<CategoryDefinition>,
) -> Result<Vec<CategoryDefinition>, PipelineError> {
    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(categories.len());

    for mut definition in categories {
        if !definition.id.is_target() {
            return Err(PipelineError::Config(format!(
                "'{}' is not a target category",
                definition.id
            )));
        }
        if !seen.insert(definition.id) {
            return Err(PipelineError::Config(format!(
                "category '{}' is defined twice",
                definition.id
            )));
        }
        // An empty keyword would match every product.
        definition.keywords = definition
            .keywords
            .iter()
            .map(|keyword| keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        validated.push(definition);
    }

    validated.sort_by_key(|definition| definition.id);
    Ok(validated)
}

fn validate_mappings(mappings: CategoryMappings) -> Result<CategoryMappings, PipelineError> {
    for (label, category) in mappings.source_a.iter().chain(mappings.source_b.iter()) {
        if !category.is_target() {
            return Err(PipelineError::Config(format!(
                "mapping for '{label}' must name a target category"
            )));
        }
    }
    Ok(mappings)
}

fn definition(id: Category, name: &str, keywords: &[&str]) -> CategoryDefinition {
    CategoryDefinition {
        id,
        name: name.to_string(),
        keywords: keywords.iter().map(|keyword| keyword.to_string()).collect(),
    }
}

fn default_categories() -> Vec<CategoryDefinition> {
    vec![
        definition(
            Category::Bakery,
            "Bakery and cereal products",
            &[
                "bakery", "panadería", "bread", "pan", "pastry", "pastel", "cake", "cookie",
                "galleta", "flour", "harina", "wheat", "trigo", "cereal", "snack", "biscuit",
                "pasta", "macaroni", "noodle", "fideo", "pizza", "dough", "masa", "toast",
                "tostada", "croissant", "bagel", "muffin", "roll", "bun", "bollos", "brioche",
            ],
        ),
        definition(
            Category::Dairy,
            "Dairy products",
            &[
                "dairy", "lácteo", "milk", "leche", "cheese", "queso", "yogurt", "yoghourt",
                "cream", "crema", "butter", "mantequilla", "margarine", "whey", "suero",
                "lactose", "lactosa", "curd", "cuajada", "kefir", "ghee",
            ],
        ),
        definition(
            Category::Eggs,
            "Eggs and egg products",
            &["egg", "huevo", "albumin", "albúmina", "yolk", "yema"],
        ),
        definition(
            Category::Chocolate,
            "Chocolate and cocoa",
            &[
                "chocolate", "cocoa", "cacao", "praline", "truffle", "trufa", "brownie",
                "fudge", "confectionery", "confitería",
            ],
        ),
        definition(
            Category::Sugar,
            "Sugars and sweeteners",
            &[
                "sugar", "azúcar", "sweetener", "edulcorante", "honey", "miel", "syrup",
                "sirope", "molasses", "melaza", "saccharin", "sacarina", "maltose", "maltosa",
                "fructose", "fructosa", "glucose", "glucosa", "dextrose", "dextrosa",
            ],
        ),
        definition(
            Category::Grains,
            "Grains and seeds",
            &[
                "grain", "grano", "seed", "semilla", "corn", "maíz", "rice", "arroz", "oat",
                "avena", "barley", "cebada", "rye", "centeno", "millet", "mijo", "quinoa",
                "amaranth", "amaranto", "buckwheat", "alforfón", "spelt", "espelta",
            ],
        ),
    ]
}

fn default_mappings() -> CategoryMappings {
    let source_a = [
        ("Food & Beverages, Allergens, Bakery", Category::Bakery),
        ("Food & Beverages, Allergens, Cereal", Category::Bakery),
        ("Food & Beverages, Allergens, Confectionery", Category::Chocolate),
        ("Food & Beverages, Allergens, Dairy", Category::Dairy),
        ("Food & Beverages, Allergens, Snack Food", Category::Bakery),
        ("Food & Beverages, Grain Based Products", Category::Bakery),
    ];
    let source_b = [
        ("cereals and bakery products", Category::Bakery),
        ("milk and milk products", Category::Dairy),
        ("eggs and egg products", Category::Eggs),
        ("cocoa and cocoa preparations, coffee and tea", Category::Chocolate),
        ("nuts, nut products and seeds", Category::Grains),
        ("confectionery", Category::Chocolate),
    ];

    CategoryMappings {
        source_a: source_a
            .into_iter()
            .map(|(label, category)| (label.to_string(), category))
            .collect(),
        source_b: source_b
            .into_iter()
            .map(|(label, category)| (label.to_string(), category))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_covers_every_target_in_order() {
        let config = Config::default();
        let ids: Vec<Category> = config.categories.iter().map(|c| c.id).collect();
        assert_eq!(ids, Category::TARGETS.to_vec());
        assert_eq!(
            config.mappings.source_b.get("milk and milk products"),
            Some(&Category::Dairy)
        );
    }

    #[test]
    fn partial_toml_keeps_builtin_tables() {
        let config = Config::from_toml(
            r#"
            [paths]
            data_dir = "/tmp/alerts"
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.data_dir, PathBuf::from("/tmp/alerts"));
        assert_eq!(config.paths.consolidated_file, "consolidated_bakery_dairy_alerts.csv");
        assert_eq!(config.categories.len(), 6);
        assert!(!config.mappings.source_a.is_empty());
    }

    #[test]
    fn custom_categories_are_sorted_and_lowercased() {
        let config = Config::from_toml(
            r#"
            [[categories]]
            id = "sugar"
            name = "Sweet things"
            keywords = ["HONEY", "  "]

            [[categories]]
            id = "bakery"
            name = "Bread"
            keywords = ["Bread"]
            "#,
        )
        .unwrap();

        assert_eq!(config.categories[0].id, Category::Bakery);
        assert_eq!(config.categories[1].keywords, vec!["honey".to_string()]);
    }

    #[test]
    fn rejects_other_and_duplicates() {
        let other = Config::from_toml(
            r#"
            [[categories]]
            id = "other"
            name = "Other"
            keywords = []
            "#,
        );
        assert!(matches!(other, Err(PipelineError::Config(_))));

        let duplicate = Config::from_toml(
            r#"
            [[categories]]
            id = "dairy"
            name = "Dairy"
            keywords = ["milk"]

            [[categories]]
            id = "dairy"
            name = "Dairy again"
            keywords = ["cheese"]
            "#,
        );
        assert!(matches!(duplicate, Err(PipelineError::Config(_))));
    }

    #[test]
    fn processed_path_is_dated() {
        let paths = PathsConfig::default();
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            paths.processed_path(date),
            PathBuf::from("data/processed/bakery_dairy_alerts_20240305.csv")
        );
    }
}
