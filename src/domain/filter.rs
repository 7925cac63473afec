//! Product filter panel: brand, category, price range and free text.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::entities::Product;

/// Filter options for the product picker. Empty sets mean "any".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFilter {
    #[serde(default)]
    pub brands: BTreeSet<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub search: String,
    /// Also list inactive and logically deleted products.
    #[serde(default)]
    pub show_inactive: bool,
}

impl ProductFilter {
    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
            && self.categories.is_empty()
            && self.min_price.is_none()
            && self.max_price.is_none()
            && self.search.trim().is_empty()
    }

    pub fn matches(&self, product: &Product) -> bool {
        if !self.show_inactive && !product.is_available() {
            return false;
        }
        if !self.brands.is_empty() && !self.brands.contains(&product.brand) {
            return false;
        }
        if !self.categories.is_empty()
            && product.categories.is_disjoint(&self.categories)
        {
            return false;
        }
        if self.min_price.is_some() || self.max_price.is_some() {
            // Products without a known price cannot satisfy a price range.
            let Some(price) = product.reference_price else {
                return false;
            };
            if let Some(min) = self.min_price {
                if price < min {
                    return false;
                }
            }
            if let Some(max) = self.max_price {
                if price > max {
                    return false;
                }
            }
        }

        let needle = self.search.trim().to_lowercase();
        if !needle.is_empty() {
            let haystacks = [&product.sku, &product.name, &product.brand];
            if !haystacks
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            {
                return false;
            }
        }

        true
    }

    /// Products that pass the filter, in their original order.
    pub fn apply<'a>(&self, products: &'a [Product]) -> Vec<&'a Product> {
        products.iter().filter(|p| self.matches(p)).collect()
    }

    /// Brands offered by the facet list: every other filter applies, the
    /// brand filter itself does not.
    pub fn available_brands(&self, products: &[Product]) -> BTreeSet<String> {
        let without_brand = Self {
            brands: BTreeSet::new(),
            ..self.clone()
        };
        without_brand
            .apply(products)
            .into_iter()
            .map(|p| p.brand.clone())
            .filter(|brand| !brand.is_empty())
            .collect()
    }

    /// Categories offered by the facet list, ignoring the category filter.
    pub fn available_categories(&self, products: &[Product]) -> BTreeSet<String> {
        let without_category = Self {
            categories: BTreeSet::new(),
            ..self.clone()
        };
        without_category
            .apply(products)
            .into_iter()
            .flat_map(|p| p.categories.iter().cloned())
            .collect()
    }
}
