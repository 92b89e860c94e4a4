use std::collections::BTreeMap;

use geo::MultiPolygon;
use shapefile::dbase::FieldValue;

/// One attribute value of a vector feature.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// Decode a dBase field; empty and unsupported values read as `None`.
    pub(crate) fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Character(Some(s)) => Some(Self::Text(s.trim().to_string())),
            FieldValue::Numeric(Some(n)) => Some(Self::Number(n)),
            FieldValue::Float(Some(n)) => Some(Self::Number(n as f64)),
            FieldValue::Double(n) => Some(Self::Number(n)),
            FieldValue::Integer(n) => Some(Self::Number(n as f64)),
            FieldValue::Currency(n) => Some(Self::Number(n)),
            FieldValue::Logical(Some(b)) => Some(Self::Text(if b { "T" } else { "F" }.to_string())),
            _ => None,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self { Self::Number(n) }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self { Self::Text(s.to_string()) }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self { Self::Text(s) }
}

/// A polygon feature with named attributes (kept in name order).
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub geometry: MultiPolygon<f64>,
    pub attrs: BTreeMap<String, AttrValue>,
}

impl Feature {
    pub fn new(geometry: MultiPolygon<f64>) -> Self {
        Self { geometry, attrs: BTreeMap::new() }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    #[inline]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.attrs.get(name).and_then(AttrValue::as_number)
    }

    #[inline]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(AttrValue::as_text)
    }
}
