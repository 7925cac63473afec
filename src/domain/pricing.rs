//! Price items: formula-derived prices and "the price" of a presentation
//! inside a list.

use std::collections::HashMap;

use tracing::warn;

use super::entities::{PriceItem, Product, Sku};
use super::formula::{evaluate_formula, round_cents};
use crate::util::generate_id;

/// Outcome of looking up the price of one presentation in one list.
#[derive(Clone, Debug, PartialEq)]
pub enum PriceLookup<'a> {
    Missing,
    Found(&'a PriceItem),
    /// More than one active item shares the (list, presentation) pair; the
    /// first one is still used.
    Duplicated { first: &'a PriceItem, count: usize },
}

impl<'a> PriceLookup<'a> {
    pub fn item(&self) -> Option<&'a PriceItem> {
        match self {
            PriceLookup::Missing => None,
            PriceLookup::Found(item) => Some(*item),
            PriceLookup::Duplicated { first, .. } => Some(*first),
        }
    }

    pub fn sale_price(&self) -> Option<f64> {
        self.item().and_then(|item| item.sale_price)
    }
}

pub fn find_price<'a>(
    items: &'a [PriceItem],
    list_id: &str,
    presentation_id: &str,
) -> PriceLookup<'a> {
    let mut matches = items.iter().filter(|item| {
        item.active && item.list_id == list_id && item.presentation_id == presentation_id
    });

    let Some(first) = matches.next() else {
        return PriceLookup::Missing;
    };
    let extra = matches.count();
    if extra == 0 {
        return PriceLookup::Found(first);
    }

    warn!(
        list_id,
        presentation_id,
        count = extra + 1,
        chosen = %first.id,
        "duplicate active price items for presentation"
    );
    PriceLookup::Duplicated {
        first,
        count: extra + 1,
    }
}

/// Recomputes the sale price and final cost of an item from its formula.
///
/// A formula that yields a price (non-zero) sets both fields. When the
/// formula cannot be applied the final cost falls back to the base cost and
/// the stored sale price is left untouched.
pub fn derive_price_item(item: &PriceItem) -> PriceItem {
    let mut derived = item.clone();
    let computed = evaluate_formula(item.base_cost, &item.formula);
    if computed != 0.0 {
        derived.sale_price = Some(computed);
        derived.final_cost = Some(computed);
    } else {
        derived.final_cost = item.base_cost.map(round_cents);
    }
    derived
}

/// Builds a fresh active item for `presentation_id` in `list_id`, with its
/// prices already derived from the formula.
pub fn new_price_item(
    list_id: &str,
    presentation_id: &str,
    sku: &str,
    base_cost: f64,
    formula: &str,
) -> PriceItem {
    let item = PriceItem {
        id: generate_id("PRECIO"),
        list_id: list_id.to_string(),
        presentation_id: presentation_id.to_string(),
        sku: sku.to_string(),
        base_cost: Some(base_cost),
        formula: formula.to_string(),
        sale_price: None,
        final_cost: None,
        active: true,
    };
    derive_price_item(&item)
}

/// A stored price that disagrees with its formula.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceDrift {
    pub price_id: String,
    pub presentation_id: String,
    pub stored: Option<f64>,
    pub computed: f64,
}

impl PriceDrift {
    pub fn delta(&self) -> f64 {
        round_cents(self.computed - self.stored.unwrap_or(0.0))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecalculationReport {
    pub checked: usize,
    pub drifted: Vec<PriceDrift>,
    /// Items whose formula could not be applied.
    pub unusable: Vec<String>,
}

/// Compares every active item of `list_id` with its formula result.
pub fn recalculate_list(items: &[PriceItem], list_id: &str) -> RecalculationReport {
    let mut report = RecalculationReport::default();

    for item in items.iter().filter(|i| i.active && i.list_id == list_id) {
        report.checked += 1;
        let computed = evaluate_formula(item.base_cost, &item.formula);
        if computed == 0.0 {
            report.unusable.push(item.id.clone());
            continue;
        }

        let stored = item.sale_price.map(round_cents);
        if stored != Some(computed) {
            report.drifted.push(PriceDrift {
                price_id: item.id.clone(),
                presentation_id: item.presentation_id.clone(),
                stored: item.sale_price,
                computed,
            });
        }
    }

    report
}

/// Lowest active sale price per SKU across all lists.
pub fn reference_prices(items: &[PriceItem]) -> HashMap<Sku, f64> {
    let mut lowest: HashMap<Sku, f64> = HashMap::new();
    for item in items.iter().filter(|i| i.active) {
        let Some(price) = item.sale_price.filter(|p| p.is_finite() && *p > 0.0) else {
            continue;
        };
        lowest
            .entry(item.sku.clone())
            .and_modify(|current| *current = current.min(price))
            .or_insert(price);
    }
    lowest
}

/// Writes [`reference_prices`] into the products so the price-range filter
/// can use them.
pub fn annotate_reference_prices(products: &mut [Product], items: &[PriceItem]) {
    let prices = reference_prices(items);
    for product in products {
        product.reference_price = prices.get(&product.sku).copied();
    }
}
