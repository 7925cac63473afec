//! Drives the selection reducer against the backend: lazy presentation
//! loads and batched price fetches. Failures degrade to empty results.

use std::{collections::HashMap, fmt::Display, future::Future, mem};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::domain::{
    CatalogState, Presentation, PresentationId, PriceItem, SelectionAction, SelectionState,
    Transition,
};
use crate::infra::client::{AdminClient, AdminClientError};

/// Where the picker fetches presentations and prices from.
pub trait CatalogSource {
    type Error: Display;

    fn presentations_for(
        &self,
        sku: &str,
    ) -> impl Future<Output = Result<Vec<Presentation>, Self::Error>> + Send;

    fn prices_for_presentation(
        &self,
        presentation_id: &str,
    ) -> impl Future<Output = Result<Vec<PriceItem>, Self::Error>> + Send;
}

impl CatalogSource for AdminClient {
    type Error = AdminClientError;

    fn presentations_for(
        &self,
        sku: &str,
    ) -> impl Future<Output = Result<Vec<Presentation>, Self::Error>> + Send {
        self.get_presentations_by_sku(sku)
    }

    fn prices_for_presentation(
        &self,
        presentation_id: &str,
    ) -> impl Future<Output = Result<Vec<PriceItem>, Self::Error>> + Send {
        self.get_prices_by_presentation(presentation_id)
    }
}

pub struct Picker<S> {
    source: S,
    state: SelectionState,
}

impl<S: CatalogSource> Picker<S> {
    pub fn new(source: S) -> Self {
        Self::with_state(source, SelectionState::new())
    }

    pub fn with_state(source: S, state: SelectionState) -> Self {
        Self { source, state }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn into_state(self) -> SelectionState {
        self.state
    }

    /// Applies one action and completes any presentation loads it requested.
    pub async fn dispatch(&mut self, action: SelectionAction) {
        let Transition { state, loads } = mem::take(&mut self.state).reduce(action);
        self.state = state;
        if loads.is_empty() {
            return;
        }

        debug!(count = loads.len(), "loading presentations");
        let results = join_all(loads.iter().map(|sku| self.load_presentations(sku))).await;
        for (sku, presentations) in loads.into_iter().zip(results) {
            let next = mem::take(&mut self.state)
                .reduce(SelectionAction::PresentationsLoaded { sku, presentations });
            self.state = next.state;
        }
    }

    async fn load_presentations(&self, sku: &str) -> Vec<Presentation> {
        match self.source.presentations_for(sku).await {
            Ok(presentations) => presentations,
            Err(error) => {
                warn!(sku, %error, "failed to load presentations; treating as none");
                Vec::new()
            }
        }
    }

    /// Fetches prices for many presentations concurrently. A failed fetch
    /// yields an empty list for that presentation only.
    pub async fn load_prices(
        &self,
        presentation_ids: &[PresentationId],
    ) -> HashMap<PresentationId, Vec<PriceItem>> {
        let fetches = presentation_ids.iter().map(|id| async move {
            let prices = match self.source.prices_for_presentation(id).await {
                Ok(prices) => prices,
                Err(error) => {
                    warn!(presentation_id = %id, %error, "failed to load prices; treating as none");
                    Vec::new()
                }
            };
            (id.clone(), prices)
        });
        join_all(fetches).await.into_iter().collect()
    }

    /// Looks up the prices of one presentation for `list_id`, storing the
    /// result only if no newer lookup for the same pair was started.
    pub async fn lookup_price(
        &self,
        catalog: &mut CatalogState,
        list_id: &str,
        presentation_id: &str,
    ) -> bool {
        let ticket = catalog.begin_price_lookup(list_id, presentation_id);
        let prices = match self.source.prices_for_presentation(presentation_id).await {
            Ok(prices) => prices
                .into_iter()
                .filter(|item| item.list_id == list_id)
                .collect(),
            Err(error) => {
                warn!(list_id, presentation_id, %error, "price lookup failed");
                Vec::new()
            }
        };
        catalog.complete_price_lookup(ticket, prices)
    }
}
