//! Flat records as they cross the store boundary.
//!
//! Every record is a map of field name to [`Value`]. Entities never read a
//! [`Document`] field by field outside their `from_document` constructor,
//! which is where a record is checked against the entity schema.
use crate::error::SchemaError;
use crate::types::TimeStamp;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;

pub type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Value {
    #[n(0)]
    Text(#[n(0)] String),
    #[n(1)]
    Number(#[n(0)] Number),
    #[n(2)]
    Bool(#[n(0)] bool),
}

// newtype wrapper over Decimal because it doesn't implement minicbor traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Number(pub Decimal);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Number(Number(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&TimeStamp<Utc>> for Value {
    fn from(value: &TimeStamp<Utc>) -> Self {
        Value::Text(value.to_rfc3339())
    }
}

/// A stored record and the key it lives under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn encode_fields(fields: &Fields) -> anyhow::Result<Vec<u8>> {
        Ok(minicbor::to_vec(fields)?)
    }

    pub fn decode_fields(bytes: &[u8]) -> anyhow::Result<Fields> {
        Ok(minicbor::decode(bytes)?)
    }

    pub fn matches(&self, filter: &Filter) -> bool {
        filter
            .conditions
            .iter()
            .all(|(field, expected)| self.fields.get(field) == Some(expected))
    }

    fn required(&self, field: &'static str) -> Result<&Value, SchemaError> {
        self.fields.get(field).ok_or(SchemaError::MissingField(field))
    }

    pub fn text(&self, field: &'static str) -> Result<&str, SchemaError> {
        match self.required(field)? {
            Value::Text(text) => Ok(text),
            _ => Err(SchemaError::WrongType {
                field,
                expected: "text",
            }),
        }
    }

    pub fn optional_text(&self, field: &'static str) -> Result<Option<&str>, SchemaError> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text)),
            Some(_) => Err(SchemaError::WrongType {
                field,
                expected: "text",
            }),
        }
    }

    pub fn number(&self, field: &'static str) -> Result<Decimal, SchemaError> {
        match self.required(field)? {
            Value::Number(Number(n)) => Ok(*n),
            _ => Err(SchemaError::WrongType {
                field,
                expected: "a number",
            }),
        }
    }

    pub fn timestamp(&self, field: &'static str) -> Result<TimeStamp<Utc>, SchemaError> {
        parse_timestamp(field, self.text(field)?)
    }

    pub fn optional_timestamp(
        &self,
        field: &'static str,
    ) -> Result<Option<TimeStamp<Utc>>, SchemaError> {
        self.optional_text(field)?
            .map(|text| parse_timestamp(field, text))
            .transpose()
    }

    /// Reads a text field and parses it with `FromStr`, e.g. a status or category name.
    pub fn parsed<T>(&self, field: &'static str) -> Result<T, SchemaError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.text(field)?
            .parse()
            .map_err(|e: T::Err| SchemaError::InvalidValue {
                field,
                reason: e.to_string(),
            })
    }
}

fn parse_timestamp(field: &'static str, text: &str) -> Result<TimeStamp<Utc>, SchemaError> {
    TimeStamp::parse_rfc3339(text).map_err(|e| SchemaError::InvalidValue {
        field,
        reason: e.to_string(),
    })
}

/// Equality conditions over top-level fields, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }
}

impl<C> minicbor::Encode<C> for Number {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0.to_string())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Number {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let text = d.str()?;

        Decimal::from_str(text)
            .map(Number)
            .map_err(|_| minicbor::decode::Error::message("failed to parse decimal"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut fields = Fields::new();
        fields.insert("cropName".into(), "Tomato".into());
        fields.insert("minPrice".into(), Decimal::new(1250, 2).into());
        fields.insert("createdAt".into(), (&TimeStamp::new()).into());
        Document::new("listing_1xyz", fields)
    }

    #[test]
    fn fields_survive_cbor() {
        let doc = sample();

        let bytes = Document::encode_fields(&doc.fields).unwrap();
        let decoded = Document::decode_fields(&bytes).unwrap();

        assert_eq!(doc.fields, decoded);
        assert_eq!(
            Document::new("listing_1xyz", decoded).number("minPrice"),
            Ok(Decimal::new(1250, 2))
        );
    }

    #[test]
    fn accessors_report_schema_violations() {
        let doc = sample();

        assert_eq!(doc.text("missing"), Err(SchemaError::MissingField("missing")));
        assert_eq!(
            doc.number("cropName"),
            Err(SchemaError::WrongType {
                field: "cropName",
                expected: "a number"
            })
        );
        assert!(matches!(
            doc.timestamp("cropName"),
            Err(SchemaError::InvalidValue { field: "cropName", .. })
        ));
        assert_eq!(doc.optional_text("phone"), Ok(None));
    }

    #[test]
    fn filters_match_on_equality() {
        let doc = sample();

        assert!(doc.matches(&Filter::all()));
        assert!(doc.matches(&Filter::all().eq("cropName", "Tomato")));
        assert!(!doc.matches(&Filter::all().eq("cropName", "tomato")));
        assert!(!doc.matches(&Filter::all().eq("farmerId", "x")));
    }
}
