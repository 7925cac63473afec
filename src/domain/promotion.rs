//! Promotion drafts: validation, discount maths and the applicable
//! presentation snapshot.

use std::collections::HashMap;
use std::fmt;

use super::entities::{
    ApplicablePresentation, DiscountType, PresentationId, PriceItem, Promotion,
};
use super::formula::round_cents;
use super::pricing::find_price;
use super::selection::SelectionState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromotionIssue {
    MissingTitle,
    MissingStartDate,
    MissingEndDate,
    EndBeforeStart,
    NonPositiveDiscount,
    PercentageAboveHundred,
    NoApplicablePresentations,
}

impl fmt::Display for PromotionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::MissingTitle => "title is required",
            Self::MissingStartDate => "start date is required",
            Self::MissingEndDate => "end date is required",
            Self::EndBeforeStart => "end date must not be before start date",
            Self::NonPositiveDiscount => "discount must be greater than zero",
            Self::PercentageAboveHundred => "percentage discount cannot exceed 100",
            Self::NoApplicablePresentations => "select at least one presentation",
        };
        f.write_str(message)
    }
}

/// Collects every problem with a draft before anything is sent.
pub fn validate_promotion(draft: &Promotion) -> Result<(), Vec<PromotionIssue>> {
    let mut issues = Vec::new();

    if draft.title.trim().is_empty() {
        issues.push(PromotionIssue::MissingTitle);
    }
    match (draft.valid_from, draft.valid_until) {
        (None, None) => {
            issues.push(PromotionIssue::MissingStartDate);
            issues.push(PromotionIssue::MissingEndDate);
        }
        (None, Some(_)) => issues.push(PromotionIssue::MissingStartDate),
        (Some(_), None) => issues.push(PromotionIssue::MissingEndDate),
        (Some(from), Some(until)) if until < from => issues.push(PromotionIssue::EndBeforeStart),
        _ => {}
    }
    if !(draft.discount.is_finite() && draft.discount > 0.0) {
        issues.push(PromotionIssue::NonPositiveDiscount);
    } else if draft.discount_type == DiscountType::Percentage && draft.discount > 100.0 {
        issues.push(PromotionIssue::PercentageAboveHundred);
    }
    if draft.applicable.is_empty() {
        issues.push(PromotionIssue::NoApplicablePresentations);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Price after applying a discount, never below zero.
pub fn discounted_price(original: f64, discount_type: DiscountType, discount: f64) -> f64 {
    let reduced = match discount_type {
        DiscountType::Percentage => original * (1.0 - discount / 100.0),
        DiscountType::FixedAmount => original - discount,
    };
    round_cents(reduced.max(0.0))
}

impl Promotion {
    /// Promotional price of every attached presentation.
    pub fn promotional_prices(&self) -> Vec<(PresentationId, f64)> {
        self.applicable
            .iter()
            .map(|entry| {
                (
                    entry.presentation_id.clone(),
                    discounted_price(entry.original_price, self.discount_type, self.discount),
                )
            })
            .collect()
    }
}

/// Builds the denormalised snapshot for every selected presentation, taking
/// original prices from `list_id` (0 when the list has no price for it).
pub fn applicable_from_selection(
    selection: &SelectionState,
    names: &HashMap<PresentationId, String>,
    prices: &[PriceItem],
    list_id: &str,
) -> Vec<ApplicablePresentation> {
    selection
        .selected_presentations()
        .map(|(id, sku)| ApplicablePresentation {
            presentation_id: id.clone(),
            sku: sku.clone(),
            name: names.get(id).cloned().unwrap_or_else(|| id.clone()),
            original_price: find_price(prices, list_id, id)
                .sale_price()
                .unwrap_or(0.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::selection::SelectionAction;
    use time::macros::date;

    fn draft() -> Promotion {
        Promotion {
            id: "PROMO-1".into(),
            title: "Regreso a clases".into(),
            description: String::new(),
            valid_from: Some(date!(2024 - 08 - 01)),
            valid_until: Some(date!(2024 - 08 - 31)),
            discount_type: DiscountType::Percentage,
            discount: 15.0,
            applicable: vec![ApplicablePresentation {
                presentation_id: "A1".into(),
                sku: "A".into(),
                name: "Cuaderno".into(),
                original_price: 40.0,
            }],
            active: true,
        }
    }

    #[test]
    fn valid_draft_passes() {
        assert_eq!(validate_promotion(&draft()), Ok(()));
    }

    #[test]
    fn all_issues_are_reported_together() {
        let mut promo = draft();
        promo.title = "  ".into();
        promo.valid_until = Some(date!(2024 - 07 - 01));
        promo.discount = 0.0;
        promo.applicable.clear();

        let issues = validate_promotion(&promo).unwrap_err();
        assert_eq!(
            issues,
            vec![
                PromotionIssue::MissingTitle,
                PromotionIssue::EndBeforeStart,
                PromotionIssue::NonPositiveDiscount,
                PromotionIssue::NoApplicablePresentations,
            ]
        );
    }

    #[test]
    fn percentage_is_capped_at_hundred() {
        let mut promo = draft();
        promo.discount = 100.0;
        assert!(validate_promotion(&promo).is_ok());
        promo.discount = 100.5;
        assert_eq!(
            validate_promotion(&promo),
            Err(vec![PromotionIssue::PercentageAboveHundred])
        );
        promo.discount_type = DiscountType::FixedAmount;
        assert!(validate_promotion(&promo).is_ok());
    }

    #[test]
    fn discounts_never_go_negative() {
        assert_eq!(discounted_price(40.0, DiscountType::Percentage, 15.0), 34.0);
        assert_eq!(discounted_price(40.0, DiscountType::FixedAmount, 5.5), 34.5);
        assert_eq!(discounted_price(4.0, DiscountType::FixedAmount, 5.0), 0.0);
        assert_eq!(
            draft().promotional_prices(),
            vec![("A1".to_string(), 34.0)]
        );
    }

    #[test]
    fn snapshot_uses_selected_presentations_and_list_prices() {
        let selection = SelectionState::new()
            .reduce(SelectionAction::TogglePresentation {
                id: "A1".into(),
                sku: "A".into(),
            })
            .state
            .reduce(SelectionAction::TogglePresentation {
                id: "B1".into(),
                sku: "B".into(),
            })
            .state;
        let names = HashMap::from([("A1".to_string(), "Cuaderno".to_string())]);
        let prices = vec![PriceItem {
            id: "P1".into(),
            list_id: "L1".into(),
            presentation_id: "A1".into(),
            sku: "A".into(),
            base_cost: Some(30.0),
            formula: "COSTO * 1.2".into(),
            sale_price: Some(36.0),
            final_cost: Some(36.0),
            active: true,
        }];

        let snapshot = applicable_from_selection(&selection, &names, &prices, "L1");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "Cuaderno");
        assert_eq!(snapshot[0].original_price, 36.0);
        assert_eq!(snapshot[1].name, "B1");
        assert_eq!(snapshot[1].original_price, 0.0);
    }
}
