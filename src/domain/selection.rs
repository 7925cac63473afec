//! Product → presentation selection used by the price-list and promotion
//! builders.
//!
//! [`SelectionState::reduce`] is the only way the state changes. It consumes
//! the previous snapshot and returns the next one together with the SKUs
//! whose presentations still have to be fetched; the caller performs those
//! loads and feeds the results back as [`SelectionAction::PresentationsLoaded`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::entities::{Presentation, PresentationId, Sku};

#[derive(Clone, Debug, PartialEq)]
pub enum SelectionAction {
    ToggleProduct(Sku),
    TogglePresentation { id: PresentationId, sku: Sku },
    /// Selects every product in the slice (the currently filtered ones).
    SelectAll(Vec<Sku>),
    DeselectAll,
    PresentationsLoaded { sku: Sku, presentations: Vec<Presentation> },
    /// Marks entries already attached to the list/promotion being edited.
    Lock {
        products: Vec<Sku>,
        presentations: Vec<(PresentationId, Sku)>,
    },
    /// Explicit removal of a locked presentation; its product is released
    /// once no locked presentation remains for it.
    RemoveLocked { id: PresentationId, sku: Sku },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionState {
    selected_products: BTreeSet<Sku>,
    /// Selected presentation id → owning SKU.
    selected_presentations: BTreeMap<PresentationId, Sku>,
    presentations_by_sku: HashMap<Sku, Vec<Presentation>>,
    locked_products: BTreeSet<Sku>,
    locked_presentations: BTreeMap<PresentationId, Sku>,
    /// Products selected before their presentations were loaded.
    pending: BTreeSet<Sku>,
}

/// Result of one reducer step.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: SelectionState,
    /// SKUs whose presentations must be loaded, in request order.
    pub loads: Vec<Sku>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_products(&self) -> &BTreeSet<Sku> {
        &self.selected_products
    }

    pub fn selected_presentation_ids(&self) -> BTreeSet<PresentationId> {
        self.selected_presentations.keys().cloned().collect()
    }

    pub fn selected_presentations(&self) -> impl Iterator<Item = (&PresentationId, &Sku)> {
        self.selected_presentations.iter()
    }

    pub fn locked_products(&self) -> &BTreeSet<Sku> {
        &self.locked_products
    }

    pub fn locked_presentation_ids(&self) -> BTreeSet<PresentationId> {
        self.locked_presentations.keys().cloned().collect()
    }

    pub fn presentations_for(&self, sku: &str) -> Option<&[Presentation]> {
        self.presentations_by_sku.get(sku).map(Vec::as_slice)
    }

    pub fn is_product_selected(&self, sku: &str) -> bool {
        self.selected_products.contains(sku)
    }

    pub fn is_presentation_selected(&self, id: &str) -> bool {
        self.selected_presentations.contains_key(id)
    }

    pub fn is_locked_product(&self, sku: &str) -> bool {
        self.locked_products.contains(sku)
    }

    pub fn is_locked_presentation(&self, id: &str) -> bool {
        self.locked_presentations.contains_key(id)
    }

    pub fn is_pending(&self, sku: &str) -> bool {
        self.pending.contains(sku)
    }

    /// Number of selected presentations belonging to `sku`.
    pub fn selected_count_for(&self, sku: &str) -> usize {
        self.selected_presentations
            .values()
            .filter(|owner| owner.as_str() == sku)
            .count()
    }

    pub fn reduce(mut self, action: SelectionAction) -> Transition {
        let mut loads = Vec::new();
        match action {
            SelectionAction::ToggleProduct(sku) => self.toggle_product(sku, &mut loads),
            SelectionAction::TogglePresentation { id, sku } => self.toggle_presentation(id, sku),
            SelectionAction::SelectAll(skus) => {
                for sku in skus {
                    if self.locked_products.contains(&sku) {
                        continue;
                    }
                    self.select_product(sku, &mut loads);
                }
            }
            SelectionAction::DeselectAll => {
                self.selected_products = self.locked_products.clone();
                self.selected_presentations = self.locked_presentations.clone();
                self.pending.clear();
            }
            SelectionAction::PresentationsLoaded { sku, presentations } => {
                let was_pending = self.pending.remove(&sku);
                if was_pending && self.selected_products.contains(&sku) {
                    for presentation in presentations.iter().filter(|p| p.active) {
                        self.selected_presentations
                            .insert(presentation.id.clone(), sku.clone());
                    }
                }
                self.presentations_by_sku.insert(sku, presentations);
            }
            SelectionAction::Lock {
                products,
                presentations,
            } => {
                for sku in products {
                    self.selected_products.insert(sku.clone());
                    self.locked_products.insert(sku);
                }
                for (id, sku) in presentations {
                    self.selected_products.insert(sku.clone());
                    self.locked_products.insert(sku.clone());
                    self.selected_presentations.insert(id.clone(), sku.clone());
                    self.locked_presentations.insert(id, sku);
                }
            }
            SelectionAction::RemoveLocked { id, sku } => {
                if self.locked_presentations.remove(&id).is_some() {
                    self.selected_presentations.remove(&id);
                }
                let still_locked = self
                    .locked_presentations
                    .values()
                    .any(|owner| *owner == sku);
                if !still_locked {
                    self.locked_products.remove(&sku);
                    if self.selected_count_for(&sku) == 0 {
                        self.selected_products.remove(&sku);
                    }
                }
            }
        }

        Transition { state: self, loads }
    }

    fn toggle_product(&mut self, sku: Sku, loads: &mut Vec<Sku>) {
        if self.locked_products.contains(&sku) {
            return;
        }

        if self.selected_products.contains(&sku) {
            self.selected_products.remove(&sku);
            self.pending.remove(&sku);
            let locked = &self.locked_presentations;
            self.selected_presentations
                .retain(|id, owner| *owner != sku || locked.contains_key(id));
        } else {
            self.select_product(sku, loads);
        }
    }

    fn select_product(&mut self, sku: Sku, loads: &mut Vec<Sku>) {
        self.selected_products.insert(sku.clone());
        match self.presentations_by_sku.get(&sku) {
            Some(presentations) => {
                for presentation in presentations.iter().filter(|p| p.active) {
                    self.selected_presentations
                        .insert(presentation.id.clone(), sku.clone());
                }
            }
            None => {
                if self.pending.insert(sku.clone()) {
                    loads.push(sku);
                }
            }
        }
    }

    fn toggle_presentation(&mut self, id: PresentationId, sku: Sku) {
        if self.locked_presentations.contains_key(&id) {
            return;
        }

        if self.selected_presentations.remove(&id).is_some() {
            if self.selected_count_for(&sku) == 0 && !self.locked_products.contains(&sku) {
                self.selected_products.remove(&sku);
                self.pending.remove(&sku);
            }
        } else {
            self.selected_presentations.insert(id, sku.clone());
            self.selected_products.insert(sku);
        }
    }
}
