//! Response envelope adapter.
//!
//! The CRUD backend nests its payload differently depending on the
//! endpoint and on whether the call went through the CAP service layer.
//! Every response passes through [`unwrap_envelope`] exactly once; nothing
//! else in the crate inspects response shapes.

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

/// Which nesting the payload was found under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeShape {
    /// `value[0].data[0].dataRes`
    CapBatch,
    /// `dataRes`
    DataRes,
    /// `data`
    Data,
    /// The body itself.
    Raw,
}

/// Extracts the payload, trying the known nestings in order.
pub fn unwrap_envelope(body: Value) -> (Value, EnvelopeShape) {
    if let Some(inner) = body
        .get("value")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("data"))
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("dataRes"))
    {
        return (inner.clone(), EnvelopeShape::CapBatch);
    }
    if let Some(inner) = body.get("dataRes") {
        return (inner.clone(), EnvelopeShape::DataRes);
    }
    if let Some(inner) = body.get("data") {
        return (inner.clone(), EnvelopeShape::Data);
    }
    (body, EnvelopeShape::Raw)
}

/// Error message carried by a CAP/OData error body, if any.
pub fn error_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| error.as_str().map(str::to_string))
        .or_else(|| Some(error.to_string()))
}

/// A payload that is either a single record or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Records<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Records<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Records::Many(items) => items,
            Records::One(item) => vec![item],
        }
    }

    pub fn into_first(self) -> Option<T> {
        self.into_vec().into_iter().next()
    }
}

/// Decodes an unwrapped payload into a list, treating `null` as empty.
pub fn decode_records<T: DeserializeOwned>(payload: Value) -> Result<Vec<T>, serde_json::Error> {
    if payload.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value::<Records<T>>(payload).map(Records::into_vec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!([{ "SKUID": "SKU-1" }])
    }

    #[test]
    fn resolves_every_known_shape() {
        let cases = [
            (
                json!({ "value": [{ "data": [{ "dataRes": payload() }] }] }),
                EnvelopeShape::CapBatch,
            ),
            (json!({ "dataRes": payload() }), EnvelopeShape::DataRes),
            (json!({ "data": payload() }), EnvelopeShape::Data),
            (payload(), EnvelopeShape::Raw),
        ];

        for (body, expected_shape) in cases {
            let (inner, shape) = unwrap_envelope(body);
            assert_eq!(shape, expected_shape);
            assert_eq!(inner, payload());
        }
    }

    #[test]
    fn partial_cap_batch_falls_through_to_next_shape() {
        let body = json!({ "value": [{ "data": [] }], "data": payload() });
        let (inner, shape) = unwrap_envelope(body);
        assert_eq!(shape, EnvelopeShape::Data);
        assert_eq!(inner, payload());
    }

    #[test]
    fn records_accept_single_object_or_list() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Row {
            #[serde(rename = "SKUID")]
            sku: String,
        }

        let many: Vec<Row> = decode_records(payload()).unwrap();
        let one: Vec<Row> = decode_records(json!({ "SKUID": "SKU-1" })).unwrap();
        let none: Vec<Row> = decode_records(Value::Null).unwrap();
        assert_eq!(many, one);
        assert!(none.is_empty());
    }

    #[test]
    fn extracts_error_messages() {
        assert_eq!(
            error_message(&json!({ "error": { "code": "500", "message": "boom" } })),
            Some("boom".to_string())
        );
        assert_eq!(error_message(&json!({ "error": "plain" })), Some("plain".to_string()));
        assert_eq!(error_message(&payload()), None);
    }
}
