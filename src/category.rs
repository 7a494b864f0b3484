use crate::config::Config;
use crate::models::{Category, SourceDatabase};

/// Keyword and mapping-table lookup over the configured target categories.
pub struct CategoryClassifier<'a> {
    config: &'a Config,
}

impl<'a> CategoryClassifier<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Membership test used when filtering raw rows.
    ///
    /// A direct mapping hit on `product_type` is checked first, then every
    /// keyword against both texts.
    pub fn classify(
        &self,
        product_type: &str,
        product_description: &str,
        source: SourceDatabase,
    ) -> bool {
        if self.mapped(product_type, source).is_some() {
            return true;
        }
        self.keyword_match(product_type, product_description).is_some()
    }

    /// Category assignment for a unified record: keywords first (declaration
    /// order, first hit wins), then the source mapping table, else `Other`.
    pub fn categorize(
        &self,
        product_type: &str,
        product_name: &str,
        source: SourceDatabase,
    ) -> Category {
        self.keyword_match(product_type, product_name)
            .or_else(|| self.mapped(product_type, source))
            .unwrap_or(Category::Other)
    }

    fn mapped(&self, product_type: &str, source: SourceDatabase) -> Option<Category> {
        self.config
            .mappings
            .for_source(source)
            .get(product_type)
            .copied()
    }

    fn keyword_match(&self, first: &str, second: &str) -> Option<Category> {
        let first = first.to_lowercase();
        let second = second.to_lowercase();

        self.config
            .categories
            .iter()
            .find(|definition| {
                definition.keywords.iter().any(|keyword| {
                    !keyword.is_empty()
                        && (first.contains(keyword.as_str()) || second.contains(keyword.as_str()))
                })
            })
            .map(|definition| definition.id)
    }
}
