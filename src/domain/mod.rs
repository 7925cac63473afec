//! Pricing domain: entities, formulas, selection and filtering.

pub mod app_state;
pub mod entities;
pub mod filter;
pub mod formula;
pub mod pricing;
pub mod promotion;
pub mod selection;

pub use app_state::{CatalogState, LookupKey, PersistedState, RequestTracker, Ticket};
pub use entities::{
    ActingUser, ApplicablePresentation, DiscountType, ListId, Presentation, PresentationId,
    PriceItem, PriceList, Product, Promotion, Sku,
};
pub use filter::ProductFilter;
pub use formula::{evaluate_formula, try_evaluate_formula, validate_formula, Formula, FormulaError};
pub use pricing::{
    annotate_reference_prices, derive_price_item, find_price, new_price_item, recalculate_list,
    PriceDrift, PriceLookup, RecalculationReport,
};
pub use promotion::{
    applicable_from_selection, discounted_price, validate_promotion, PromotionIssue,
};
pub use selection::{SelectionAction, SelectionState, Transition};
