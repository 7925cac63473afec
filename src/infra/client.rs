//! Asynchronous client for the back-office CRUD API.
//!
//! - Every call is a `POST {base}/{family}/crud?ProcessType=...`.
//! - Responses go through the single envelope adapter before decoding.
//! - Products and price lists are cached in memory with stale fallbacks;
//!   any mutation of a family drops that family's cache.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{
    derive_price_item, ActingUser, Presentation, PriceDrift, PriceItem, PriceList, Product,
    Promotion,
};
use crate::infra::envelope::{decode_records, error_message, unwrap_envelope, Records};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3033/api/";
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
const USER_AGENT: &str = concat!("precios-admin/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum AdminClientError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode {family} response: {source}")]
    Decode {
        family: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("api error: {0}")]
    Api(String),
    #[error("{family} response carried no record")]
    Empty { family: &'static str },
}

/// CRUD operation selected through the `ProcessType` query parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessType {
    GetAll,
    GetOne,
    AddOne,
    UpdateOne,
    DeleteLogic,
    DeleteHard,
    ActivateOne,
    GetBySkuId,
    GetByIdPresentaOk,
}

impl ProcessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetAll => "GetAll",
            Self::GetOne => "GetOne",
            Self::AddOne => "AddOne",
            Self::UpdateOne => "UpdateOne",
            Self::DeleteLogic => "DeleteLogic",
            Self::DeleteHard => "DeleteHard",
            Self::ActivateOne => "ActivateOne",
            Self::GetBySkuId => "GetBySKUID",
            Self::GetByIdPresentaOk => "GetByIdPresentaOK",
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::AddOne | Self::UpdateOne | Self::DeleteLogic | Self::DeleteHard | Self::ActivateOne
        )
    }
}

/// An entity family exposed by the CRUD backend.
pub trait Resource: Serialize + DeserializeOwned + Clone {
    /// Path segment of the family's endpoint.
    const FAMILY: &'static str;
    /// Query parameter naming the record key.
    const KEY_PARAM: &'static str;

    fn key(&self) -> &str;
}

impl Resource for Product {
    const FAMILY: &'static str = "ztproducts";
    const KEY_PARAM: &'static str = "skuid";

    fn key(&self) -> &str {
        &self.sku
    }
}

impl Resource for Presentation {
    const FAMILY: &'static str = "ztproducts-presentaciones";
    const KEY_PARAM: &'static str = "IdPresentaOK";

    fn key(&self) -> &str {
        &self.id
    }
}

impl Resource for PriceList {
    const FAMILY: &'static str = "ztprecios-listas";
    const KEY_PARAM: &'static str = "IdListaOK";

    fn key(&self) -> &str {
        &self.id
    }
}

impl Resource for PriceItem {
    const FAMILY: &'static str = "ztprecios-items";
    const KEY_PARAM: &'static str = "IdPrecioOK";

    fn key(&self) -> &str {
        &self.id
    }
}

impl Resource for Promotion {
    const FAMILY: &'static str = "ztpromociones";
    const KEY_PARAM: &'static str = "IdPromoOK";

    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Fresh,
    Cached,
    Stale,
}

#[derive(Clone, Debug)]
pub struct CachedPayload<T> {
    pub data: T,
    pub fetched_at: SystemTime,
    pub status: CacheStatus,
}

impl<T> CachedPayload<T> {
    fn new(data: T, fetched_at: SystemTime, status: CacheStatus) -> Self {
        Self {
            data,
            fetched_at,
            status,
        }
    }
}

/// What happened when corrected prices were pushed back.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub updated: Vec<String>,
    pub failed: Vec<(String, AdminClientError)>,
}

impl ApplyOutcome {
    pub fn total(&self) -> usize {
        self.updated.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
struct CatalogCache {
    products: Option<Cached<Vec<Product>>>,
    price_lists: Option<Cached<Vec<PriceList>>>,
}

impl CatalogCache {
    fn invalidate(&mut self, family: &str) {
        if family == Product::FAMILY {
            self.products = None;
        } else if family == PriceList::FAMILY {
            self.price_lists = None;
        }
    }

    fn clear(&mut self) {
        self.products = None;
        self.price_lists = None;
    }
}

#[derive(Clone)]
pub struct AdminClient {
    http: Client,
    base_url: Url,
    cache: Arc<Mutex<CatalogCache>>,
    ttl: Duration,
}

impl AdminClient {
    pub fn new() -> Result<Self, AdminClientError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base: &str) -> Result<Self, AdminClientError> {
        // `Url::join` drops the last segment unless the base ends with '/'.
        let base_url = if base.ends_with('/') {
            Url::parse(base)?
        } else {
            Url::parse(&format!("{base}/"))?
        };
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url,
            cache: Arc::new(Mutex::new(CatalogCache::default())),
            ttl: DEFAULT_TTL,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get_products(&self) -> Result<CachedPayload<Vec<Product>>, AdminClientError> {
        if let Some(payload) = self.cached(|cache| cache.products.as_ref()).await {
            return Ok(payload);
        }

        match self.get_all::<Product>().await {
            Ok(products) => {
                let fetched_at = SystemTime::now();
                self.cache.lock().await.products = Some(Cached::new(products.clone(), fetched_at));
                Ok(CachedPayload::new(products, fetched_at, CacheStatus::Fresh))
            }
            Err(error) => {
                if let Some(stale) = self.stale(|cache| cache.products.as_ref()).await {
                    warn!(%error, "serving stale products after fetch failure");
                    return Ok(stale);
                }
                Err(error)
            }
        }
    }

    pub async fn get_price_lists(&self) -> Result<CachedPayload<Vec<PriceList>>, AdminClientError> {
        if let Some(payload) = self.cached(|cache| cache.price_lists.as_ref()).await {
            return Ok(payload);
        }

        match self.get_all::<PriceList>().await {
            Ok(lists) => {
                let fetched_at = SystemTime::now();
                self.cache.lock().await.price_lists = Some(Cached::new(lists.clone(), fetched_at));
                Ok(CachedPayload::new(lists, fetched_at, CacheStatus::Fresh))
            }
            Err(error) => {
                if let Some(stale) = self.stale(|cache| cache.price_lists.as_ref()).await {
                    warn!(%error, "serving stale price lists after fetch failure");
                    return Ok(stale);
                }
                Err(error)
            }
        }
    }

    /// Presentations of one product (`GetBySKUID`).
    pub async fn get_presentations_by_sku(
        &self,
        sku: &str,
    ) -> Result<Vec<Presentation>, AdminClientError> {
        let body = self
            .call(
                Presentation::FAMILY,
                ProcessType::GetBySkuId,
                &[("skuid", sku)],
                None,
                None,
            )
            .await?;
        decode::<Presentation>(body)
    }

    /// Every price item of one presentation across lists (`GetByIdPresentaOK`).
    pub async fn get_prices_by_presentation(
        &self,
        presentation_id: &str,
    ) -> Result<Vec<PriceItem>, AdminClientError> {
        let body = self
            .call(
                PriceItem::FAMILY,
                ProcessType::GetByIdPresentaOk,
                &[("IdPresentaOK", presentation_id)],
                None,
                None,
            )
            .await?;
        decode::<PriceItem>(body)
    }

    /// Price items belonging to one list.
    pub async fn get_prices_by_list(
        &self,
        list_id: &str,
    ) -> Result<Vec<PriceItem>, AdminClientError> {
        let items = self.get_all::<PriceItem>().await?;
        Ok(items.into_iter().filter(|item| item.list_id == list_id).collect())
    }

    pub async fn get_all<R: Resource>(&self) -> Result<Vec<R>, AdminClientError> {
        let body = self
            .call(R::FAMILY, ProcessType::GetAll, &[], None, None)
            .await?;
        let records = decode::<R>(body)?;
        debug!(family = R::FAMILY, count = records.len(), "fetched records");
        Ok(records)
    }

    pub async fn get_one<R: Resource>(&self, key: &str) -> Result<Option<R>, AdminClientError> {
        let body = self
            .call(R::FAMILY, ProcessType::GetOne, &[(R::KEY_PARAM, key)], None, None)
            .await?;
        Ok(decode::<R>(body)?.into_iter().next())
    }

    /// Creates a record and returns the backend's echo of it.
    pub async fn add_one<R: Resource>(
        &self,
        user: &ActingUser,
        record: &R,
    ) -> Result<R, AdminClientError> {
        let payload = serde_json::to_value(record).map_err(|source| AdminClientError::Decode {
            family: R::FAMILY,
            source,
        })?;
        let body = self
            .call(R::FAMILY, ProcessType::AddOne, &[], Some(user), Some(&payload))
            .await?;
        echoed::<R>(body)
    }

    pub async fn update_one<R: Resource>(
        &self,
        user: &ActingUser,
        record: &R,
    ) -> Result<R, AdminClientError> {
        let payload = serde_json::to_value(record).map_err(|source| AdminClientError::Decode {
            family: R::FAMILY,
            source,
        })?;
        let body = self
            .call(
                R::FAMILY,
                ProcessType::UpdateOne,
                &[(R::KEY_PARAM, record.key())],
                Some(user),
                Some(&payload),
            )
            .await?;
        echoed::<R>(body)
    }

    /// Logical delete: flips the record's deleted/active flags server-side.
    pub async fn delete_logic<R: Resource>(
        &self,
        user: &ActingUser,
        key: &str,
    ) -> Result<(), AdminClientError> {
        self.call(
            R::FAMILY,
            ProcessType::DeleteLogic,
            &[(R::KEY_PARAM, key)],
            Some(user),
            None,
        )
        .await
        .map(|_| ())
    }

    pub async fn delete_hard<R: Resource>(
        &self,
        user: &ActingUser,
        key: &str,
    ) -> Result<(), AdminClientError> {
        self.call(
            R::FAMILY,
            ProcessType::DeleteHard,
            &[(R::KEY_PARAM, key)],
            Some(user),
            None,
        )
        .await
        .map(|_| ())
    }

    pub async fn activate_one<R: Resource>(
        &self,
        user: &ActingUser,
        key: &str,
    ) -> Result<(), AdminClientError> {
        self.call(
            R::FAMILY,
            ProcessType::ActivateOne,
            &[(R::KEY_PARAM, key)],
            Some(user),
            None,
        )
        .await
        .map(|_| ())
    }

    /// Re-derives every drifted item from its formula and sends it with
    /// `UpdateOne`. One failed update does not stop the others.
    pub async fn apply_drift(
        &self,
        user: &ActingUser,
        items: &[PriceItem],
        drifted: &[PriceDrift],
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        for drift in drifted {
            let Some(item) = items.iter().find(|item| item.id == drift.price_id) else {
                warn!(price_id = %drift.price_id, "drifted price not among fetched items");
                continue;
            };
            match self.update_one(user, &derive_price_item(item)).await {
                Ok(_) => {
                    info!(price_id = %drift.price_id, price = drift.computed, "price updated");
                    outcome.updated.push(drift.price_id.clone());
                }
                Err(error) => {
                    warn!(price_id = %drift.price_id, %error, "price update failed");
                    outcome.failed.push((drift.price_id.clone(), error));
                }
            }
        }
        outcome
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    async fn call(
        &self,
        family: &'static str,
        process: ProcessType,
        params: &[(&str, &str)],
        user: Option<&ActingUser>,
        payload: Option<&Value>,
    ) -> Result<Value, AdminClientError> {
        let mut url = self.url(family)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("ProcessType", process.as_str());
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if let Some(user) = user {
                query.append_pair("LoggedUser", user.as_str());
            }
        }

        debug!(%url, process = process.as_str(), "backend request");
        let request = self.http.post(url.clone());
        let request = match payload {
            Some(body) => request.json(body),
            None => request.json(&serde_json::json!({})),
        };

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            if status.is_success() && !process.is_mutation() {
                return Err(AdminClientError::Empty { family });
            }
            Value::Null
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(body) => body,
                Err(_) if !status.is_success() => {
                    return Err(AdminClientError::Api(format!("{family} returned HTTP {status}")));
                }
                Err(source) => return Err(AdminClientError::Decode { family, source }),
            }
        };

        if let Some(message) = error_message(&body) {
            return Err(AdminClientError::Api(message));
        }
        if !status.is_success() {
            return Err(AdminClientError::Api(format!("{family} returned HTTP {status}")));
        }

        if process.is_mutation() {
            self.cache.lock().await.invalidate(family);
            info!(
                family,
                process = process.as_str(),
                user = ?user.map(ActingUser::as_str),
                "mutation applied"
            );
        }

        let (payload, shape) = unwrap_envelope(body);
        debug!(family, ?shape, "unwrapped response envelope");
        Ok(payload)
    }

    async fn cached<T: Clone>(
        &self,
        select: impl FnOnce(&CatalogCache) -> Option<&Cached<T>>,
    ) -> Option<CachedPayload<T>> {
        let cache = self.cache.lock().await;
        select(&cache).and_then(|entry| entry.if_fresh(self.ttl))
    }

    async fn stale<T: Clone>(
        &self,
        select: impl FnOnce(&CatalogCache) -> Option<&Cached<T>>,
    ) -> Option<CachedPayload<T>> {
        let cache = self.cache.lock().await;
        select(&cache).map(Cached::stale)
    }

    fn url(&self, family: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(&format!("{family}/crud"))
    }
}

fn decode<R: Resource>(body: Value) -> Result<Vec<R>, AdminClientError> {
    decode_records::<R>(body).map_err(|source| AdminClientError::Decode {
        family: R::FAMILY,
        source,
    })
}

/// Mutations echo the record back, either bare or inside a list.
fn echoed<R: Resource>(body: Value) -> Result<R, AdminClientError> {
    let records: Records<R> =
        serde_json::from_value(body).map_err(|source| AdminClientError::Decode {
            family: R::FAMILY,
            source,
        })?;
    records
        .into_first()
        .ok_or(AdminClientError::Empty { family: R::FAMILY })
}

struct Cached<T> {
    value: T,
    fetched_at: SystemTime,
}

impl<T: Clone> Cached<T> {
    fn new(value: T, fetched_at: SystemTime) -> Self {
        Self { value, fetched_at }
    }

    fn if_fresh(&self, ttl: Duration) -> Option<CachedPayload<T>> {
        if self
            .fetched_at
            .elapsed()
            .map(|elapsed| elapsed <= ttl)
            .unwrap_or(false)
        {
            Some(CachedPayload::new(
                self.value.clone(),
                self.fetched_at,
                CacheStatus::Cached,
            ))
        } else {
            None
        }
    }

    fn stale(&self) -> CachedPayload<T> {
        CachedPayload::new(self.value.clone(), self.fetched_at, CacheStatus::Stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn product_json(sku: &str) -> Value {
        json!({
            "SKUID": sku,
            "PRODUCTNAME": format!("Producto {sku}"),
            "MARCA": "X",
            "CATEGORIAS": ["bebidas"],
            "ACTIVED": true,
            "DELETED": false
        })
    }

    async fn client_for(server: &MockServer) -> AdminClient {
        AdminClient::with_base_url(&server.uri()).unwrap()
    }

    #[tokio::test]
    async fn get_all_unwraps_cap_batch_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztproducts/crud"))
            .and(query_param("ProcessType", "GetAll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "data": [{ "dataRes": [product_json("SKU-1"), product_json("SKU-2")] }] }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let first = client.get_products().await.unwrap();
        assert_eq!(first.status, CacheStatus::Fresh);
        assert_eq!(first.data.len(), 2);

        // Served from memory; the mock expects a single hit.
        let second = client.get_products().await.unwrap();
        assert_eq!(second.status, CacheStatus::Cached);
    }

    #[tokio::test]
    async fn serves_stale_products_when_backend_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztproducts/crud"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [product_json("SKU-1")] })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ztproducts/crud"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": { "message": "down" } })))
            .mount(&server)
            .await;

        let client = client_for(&server).await.with_ttl(Duration::ZERO);
        assert_eq!(client.get_products().await.unwrap().status, CacheStatus::Fresh);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let fallback = client.get_products().await.unwrap();
        assert_eq!(fallback.status, CacheStatus::Stale);
        assert_eq!(fallback.data[0].sku, "SKU-1");
    }

    #[tokio::test]
    async fn api_errors_surface_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": { "message": "SKU duplicado" } })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.get_all::<Promotion>().await.unwrap_err();
        assert!(matches!(err, AdminClientError::Api(ref msg) if msg == "SKU duplicado"));
    }

    #[tokio::test]
    async fn mutations_send_acting_user_and_invalidate_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztproducts/crud"))
            .and(query_param("ProcessType", "GetAll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([product_json("SKU-1")])))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ztproducts/crud"))
            .and(query_param("ProcessType", "UpdateOne"))
            .and(query_param("skuid", "SKU-1"))
            .and(query_param("LoggedUser", "jlopez"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "dataRes": [product_json("SKU-1")] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let user = ActingUser::new("jlopez");
        let mut product = client.get_products().await.unwrap().data.remove(0);
        product.brand = "Y".into();

        let echoed = client.update_one(&user, &product).await.unwrap();
        assert_eq!(echoed.sku, "SKU-1");

        let refreshed = client.get_products().await.unwrap();
        assert_eq!(refreshed.status, CacheStatus::Fresh);
    }

    #[tokio::test]
    async fn presentations_lookup_uses_sku_parameter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztproducts-presentaciones/crud"))
            .and(query_param("ProcessType", "GetBySKUID"))
            .and(query_param("skuid", "SKU-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "IdPresentaOK": "SKU-1-600ML",
                "SKUID": "SKU-1",
                "NOMBREPRESENTACION": "600 ml",
                "ACTIVED": true
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let presentations = client.get_presentations_by_sku("SKU-1").await.unwrap();
        assert_eq!(presentations.len(), 1);
        assert_eq!(presentations[0].name, "600 ml");
    }

    #[tokio::test]
    async fn html_gateway_page_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztproducts/crud"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.get_products().await.unwrap_err();
        assert!(matches!(err, AdminClientError::Decode { family: "ztproducts", .. }));
    }

    #[tokio::test]
    async fn non_json_body_falls_back_to_stale_products() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztproducts/crud"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([product_json("SKU-1")])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ztproducts/crud"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server).await.with_ttl(Duration::ZERO);
        assert_eq!(client.get_products().await.unwrap().status, CacheStatus::Fresh);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let fallback = client.get_products().await.unwrap();
        assert_eq!(fallback.status, CacheStatus::Stale);
        assert_eq!(fallback.data.len(), 1);
    }

    #[tokio::test]
    async fn empty_body_on_a_read_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.get_all::<PriceList>().await.unwrap_err();
        assert!(matches!(err, AdminClientError::Empty { family: "ztprecios-listas" }));
    }

    #[tokio::test]
    async fn get_one_sends_the_family_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztprecios-listas/crud"))
            .and(query_param("ProcessType", "GetOne"))
            .and(query_param("IdListaOK", "L-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "IdListaOK": "L-1", "DESLISTA": "Mayoreo" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let list = client.get_one::<PriceList>("L-1").await.unwrap().unwrap();
        assert_eq!(list.description, "Mayoreo");
        assert!(list.active);
    }

    #[tokio::test]
    async fn prices_lookup_uses_presentation_parameter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztprecios-items/crud"))
            .and(query_param("ProcessType", "GetByIdPresentaOK"))
            .and(query_param("IdPresentaOK", "SKU-1-600ML"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "dataRes": [{
                "IdPrecioOK": "P-1",
                "IdListaOK": "L-1",
                "IdPresentaOK": "SKU-1-600ML",
                "CostoIni": 10.0,
                "Formula": "COSTO * 1.5",
                "Precio": 15.0
            }] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let prices = client.get_prices_by_presentation("SKU-1-600ML").await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].sale_price, Some(15.0));
    }

    #[tokio::test]
    async fn key_mutations_send_process_key_and_user_then_invalidate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztproducts/crud"))
            .and(query_param("ProcessType", "GetAll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([product_json("SKU-1")])))
            .expect(4)
            .mount(&server)
            .await;
        for process in ["DeleteLogic", "DeleteHard", "ActivateOne"] {
            Mock::given(method("POST"))
                .and(path("/ztproducts/crud"))
                .and(query_param("ProcessType", process))
                .and(query_param("skuid", "SKU-1"))
                .and(query_param("LoggedUser", "jlopez"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "dataRes": {} })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = client_for(&server).await;
        let user = ActingUser::new("jlopez");
        assert_eq!(client.get_products().await.unwrap().status, CacheStatus::Fresh);

        client.delete_logic::<Product>(&user, "SKU-1").await.unwrap();
        assert_eq!(client.get_products().await.unwrap().status, CacheStatus::Fresh);

        client.delete_hard::<Product>(&user, "SKU-1").await.unwrap();
        assert_eq!(client.get_products().await.unwrap().status, CacheStatus::Fresh);

        client.activate_one::<Product>(&user, "SKU-1").await.unwrap();
        assert_eq!(client.get_products().await.unwrap().status, CacheStatus::Fresh);
    }

    #[tokio::test]
    async fn mutation_only_invalidates_its_own_family() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztproducts/crud"))
            .and(query_param("ProcessType", "GetAll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([product_json("SKU-1")])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ztprecios-listas/crud"))
            .and(query_param("ProcessType", "DeleteLogic"))
            .and(query_param("IdListaOK", "L-1"))
            .and(query_param("LoggedUser", "jlopez"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.get_products().await.unwrap();
        client
            .delete_logic::<PriceList>(&ActingUser::new("jlopez"), "L-1")
            .await
            .unwrap();
        assert_eq!(client.get_products().await.unwrap().status, CacheStatus::Cached);
    }

    #[tokio::test]
    async fn apply_drift_reports_failed_updates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztprecios-items/crud"))
            .and(query_param("ProcessType", "UpdateOne"))
            .and(query_param("IdPrecioOK", "P-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "dataRes": {
                "IdPrecioOK": "P-1", "IdListaOK": "L-1", "IdPresentaOK": "A", "Precio": 20.0
            } })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ztprecios-items/crud"))
            .and(query_param("ProcessType", "UpdateOne"))
            .and(query_param("IdPrecioOK", "P-2"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "locked" })))
            .expect(1)
            .mount(&server)
            .await;

        let item = |id: &str, presentation: &str| PriceItem {
            id: id.into(),
            list_id: "L-1".into(),
            presentation_id: presentation.into(),
            sku: "SKU-1".into(),
            base_cost: Some(10.0),
            formula: "COSTO * 2".into(),
            sale_price: Some(18.0),
            final_cost: None,
            active: true,
        };
        let items = vec![item("P-1", "A"), item("P-2", "B")];
        let report = crate::domain::recalculate_list(&items, "L-1");
        assert_eq!(report.drifted.len(), 2);

        let client = client_for(&server).await;
        let outcome = client
            .apply_drift(&ActingUser::new("jlopez"), &items, &report.drifted)
            .await;
        assert_eq!(outcome.updated, vec!["P-1".to_string()]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "P-2");
        assert_eq!(outcome.total(), 2);
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn empty_mutation_echo_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("ProcessType", "AddOne"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "dataRes": [] })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let list = PriceList {
            id: "L-1".into(),
            description: "Mayoreo".into(),
            valid_from: None,
            valid_until: None,
            skus: Default::default(),
            default_formula: None,
            active: true,
        };
        let err = client
            .add_one(&ActingUser::new("jlopez"), &list)
            .await
            .unwrap_err();
        assert!(matches!(err, AdminClientError::Empty { family: "ztprecios-listas" }));
    }
}
