use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::Date;

/// Stock-keeping unit, the primary key of a product.
pub type Sku = String;
/// Identifier of a presentation (sellable packaging of a product).
pub type PresentationId = String;
/// Identifier of a price list.
pub type ListId = String;

/// Identity on whose behalf mutating backend calls are made.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingUser(String);

impl ActingUser {
    pub fn new(login: impl Into<String>) -> Self {
        Self(login.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActingUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "SKUID")]
    pub sku: Sku,
    #[serde(rename = "PRODUCTNAME", default)]
    pub name: String,
    #[serde(rename = "MARCA", default)]
    pub brand: String,
    #[serde(rename = "CATEGORIAS", default)]
    pub categories: BTreeSet<String>,
    #[serde(rename = "ACTIVED", default = "default_true")]
    pub active: bool,
    #[serde(rename = "DELETED", default)]
    pub deleted: bool,
    /// Lowest active price known for this product; filled from price items,
    /// never sent to the backend.
    #[serde(skip)]
    pub reference_price: Option<f64>,
}

impl Product {
    /// Visible in pickers unless inactive or logically deleted.
    pub fn is_available(&self) -> bool {
        self.active && !self.deleted
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    #[serde(rename = "IdPresentaOK")]
    pub id: PresentationId,
    #[serde(rename = "SKUID")]
    pub sku: Sku,
    #[serde(rename = "NOMBREPRESENTACION", default)]
    pub name: String,
    #[serde(rename = "ACTIVED", default = "default_true")]
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceList {
    #[serde(rename = "IdListaOK")]
    pub id: ListId,
    #[serde(rename = "DESLISTA", default)]
    pub description: String,
    #[serde(rename = "FECHAEXPIRAINI", default, with = "iso_date::option")]
    pub valid_from: Option<Date>,
    #[serde(rename = "FECHAEXPIRAFIN", default, with = "iso_date::option")]
    pub valid_until: Option<Date>,
    #[serde(rename = "SKUSIDS", default)]
    pub skus: BTreeSet<Sku>,
    /// Formula proposed for new price items of this list.
    #[serde(rename = "FORMULA", default, skip_serializing_if = "Option::is_none")]
    pub default_formula: Option<String>,
    #[serde(rename = "ACTIVED", default = "default_true")]
    pub active: bool,
}

impl PriceList {
    /// Active and within its validity window; open bounds are unbounded.
    pub fn is_valid_on(&self, date: Date) -> bool {
        if !self.active {
            return false;
        }
        let after_start = self.valid_from.map(|from| date >= from).unwrap_or(true);
        let before_end = self.valid_until.map(|until| date <= until).unwrap_or(true);
        after_start && before_end
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceItem {
    #[serde(rename = "IdPrecioOK")]
    pub id: String,
    #[serde(rename = "IdListaOK")]
    pub list_id: ListId,
    #[serde(rename = "IdPresentaOK")]
    pub presentation_id: PresentationId,
    #[serde(rename = "SKUID", default)]
    pub sku: Sku,
    #[serde(rename = "CostoIni", default)]
    pub base_cost: Option<f64>,
    #[serde(rename = "Formula", default)]
    pub formula: String,
    #[serde(rename = "Precio", default)]
    pub sale_price: Option<f64>,
    #[serde(rename = "CostoFin", default)]
    pub final_cost: Option<f64>,
    #[serde(rename = "ACTIVED", default = "default_true")]
    pub active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountType {
    #[serde(rename = "PORCENTAJE")]
    Percentage,
    #[serde(rename = "MONTO_FIJO")]
    FixedAmount,
}

impl DiscountType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Percentage => "%",
            Self::FixedAmount => "$",
        }
    }
}

/// Denormalised snapshot of a presentation attached to a promotion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplicablePresentation {
    #[serde(rename = "IdPresentaOK")]
    pub presentation_id: PresentationId,
    #[serde(rename = "SKUID")]
    pub sku: Sku,
    #[serde(rename = "NombreProducto", default)]
    pub name: String,
    #[serde(rename = "PrecioOriginal", default)]
    pub original_price: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    #[serde(rename = "IdPromoOK")]
    pub id: String,
    #[serde(rename = "Titulo", default)]
    pub title: String,
    #[serde(rename = "Descripcion", default)]
    pub description: String,
    #[serde(rename = "FechaIni", default, with = "iso_date::option")]
    pub valid_from: Option<Date>,
    #[serde(rename = "FechaFin", default, with = "iso_date::option")]
    pub valid_until: Option<Date>,
    #[serde(rename = "TipoDescuento")]
    pub discount_type: DiscountType,
    #[serde(rename = "Descuento", default)]
    pub discount: f64,
    #[serde(rename = "ProductosAplicables", default)]
    pub applicable: Vec<ApplicablePresentation>,
    #[serde(rename = "ACTIVED", default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Dates travel as `YYYY-MM-DD` or full RFC 3339 timestamps; only the date
/// part is kept.
pub mod iso_date {
    use time::{
        format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    };

    pub fn parse(raw: &str) -> Option<Date> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
            return Some(date);
        }
        OffsetDateTime::parse(raw, &Rfc3339)
            .ok()
            .map(|timestamp| timestamp.date())
            .or_else(|| {
                raw.get(..10).and_then(|prefix| {
                    Date::parse(prefix, format_description!("[year]-[month]-[day]")).ok()
                })
            })
    }

    pub fn format(date: Date) -> String {
        date.format(format_description!("[year]-[month]-[day]"))
            .unwrap_or_else(|_| date.to_string())
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use time::Date;

        pub fn serialize<S>(value: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(date) => serializer.serialize_str(&super::format(*date)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = Option::<String>::deserialize(deserializer)?;
            Ok(raw.as_deref().and_then(super::parse))
        }
    }
}
