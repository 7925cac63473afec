use std::collections::HashMap;

use super::entities::{ListId, PresentationId, PriceItem, PriceList, Product};
use super::filter::ProductFilter;
use super::pricing::annotate_reference_prices;
use serde::{Deserialize, Serialize};

/// Local, non-authoritative view of the back office. Every collection is
/// replaced wholesale after a fetch; nothing is patched optimistically.
#[derive(Clone, Debug, Default)]
pub struct CatalogState {
    pub products: Vec<Product>,
    pub price_lists: Vec<PriceList>,
    pub price_items: HashMap<ListId, Vec<PriceItem>>,
    pub filter: ProductFilter,
    /// Message shown in the dismissible error banner.
    pub banner: Option<String>,
    pub lookups: RequestTracker,
    /// Latest accepted price per (list, presentation) lookup.
    pub looked_up_prices: HashMap<LookupKey, Vec<PriceItem>>,
}

impl CatalogState {
    pub fn replace_products(&mut self, products: Vec<Product>) {
        self.products = products;
        self.refresh_reference_prices();
    }

    pub fn replace_price_lists(&mut self, lists: Vec<PriceList>) {
        self.price_lists = lists;
    }

    pub fn replace_price_items(&mut self, list_id: &str, items: Vec<PriceItem>) {
        self.price_items.insert(list_id.to_string(), items);
        self.refresh_reference_prices();
    }

    pub fn price_items(&self, list_id: &str) -> &[PriceItem] {
        self.price_items
            .get(list_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn refresh_reference_prices(&mut self) {
        let all_items: Vec<PriceItem> = self.price_items.values().flatten().cloned().collect();
        annotate_reference_prices(&mut self.products, &all_items);
    }

    pub fn visible_products(&self) -> Vec<&Product> {
        self.filter.apply(&self.products)
    }

    pub fn report_error(&mut self, message: impl Into<String>) {
        self.banner = Some(message.into());
    }

    pub fn dismiss_error(&mut self) {
        self.banner = None;
    }

    /// Starts a price lookup; any earlier lookup for the same key becomes
    /// stale.
    pub fn begin_price_lookup(&mut self, list_id: &str, presentation_id: &str) -> Ticket {
        self.lookups.begin(LookupKey::new(list_id, presentation_id))
    }

    /// Stores the result if `ticket` is still the latest for its key.
    /// Returns `false` when the response was discarded.
    pub fn complete_price_lookup(&mut self, ticket: Ticket, items: Vec<PriceItem>) -> bool {
        if !self.lookups.is_current(&ticket) {
            return false;
        }
        self.looked_up_prices.insert(ticket.key, items);
        true
    }

    pub fn looked_up_price(&self, list_id: &str, presentation_id: &str) -> Option<&[PriceItem]> {
        self.looked_up_prices
            .get(&LookupKey::new(list_id, presentation_id))
            .map(Vec::as_slice)
    }

    pub fn apply_persisted(&mut self, persisted: PersistedState) {
        self.filter = persisted.filter;
    }

    pub fn to_persisted(&self, last_price_list: Option<ListId>) -> PersistedState {
        PersistedState {
            filter: self.filter.clone(),
            last_price_list,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub list_id: ListId,
    pub presentation_id: PresentationId,
}

impl LookupKey {
    pub fn new(list_id: &str, presentation_id: &str) -> Self {
        Self {
            list_id: list_id.to_string(),
            presentation_id: presentation_id.to_string(),
        }
    }
}

/// Handle for one in-flight request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub key: LookupKey,
    pub version: u64,
}

/// Per-key request versions; only the newest request's response is kept.
#[derive(Clone, Debug, Default)]
pub struct RequestTracker {
    latest: HashMap<LookupKey, u64>,
}

impl RequestTracker {
    pub fn begin(&mut self, key: LookupKey) -> Ticket {
        let version = self.latest.entry(key.clone()).or_insert(0);
        *version += 1;
        Ticket {
            key,
            version: *version,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest.get(&ticket.key) == Some(&ticket.version)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub filter: ProductFilter,
    #[serde(default)]
    pub last_price_list: Option<ListId>,
}
