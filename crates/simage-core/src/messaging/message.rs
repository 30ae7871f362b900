//! Transport-neutral message: typed properties plus an opaque binary body.

use std::collections::BTreeMap;

use crate::error::MessagingError;

/// A typed message property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Int(i32),
    Long(i64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
}

impl PropertyValue {
    fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Int(_) => "int",
            PropertyValue::Long(_) => "long",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::String(_) => "string",
            PropertyValue::Bytes(_) => "bytes",
        }
    }
}

/// A message as carried by a [`MessageTransport`](super::MessageTransport).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    properties: BTreeMap<String, PropertyValue>,
    body: Vec<u8>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// A message whose body is `body`.
    pub fn with_body(body: Vec<u8>) -> Self {
        Self {
            properties: BTreeMap::new(),
            body,
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Set a property, replacing any previous value under that name.
    pub fn put(&mut self, name: &str, value: PropertyValue) -> &mut Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    pub fn put_int(&mut self, name: &str, value: i32) -> &mut Self {
        self.put(name, PropertyValue::Int(value))
    }

    pub fn put_long(&mut self, name: &str, value: i64) -> &mut Self {
        self.put(name, PropertyValue::Long(value))
    }

    pub fn put_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.put(name, PropertyValue::Bool(value))
    }

    pub fn put_string(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.put(name, PropertyValue::String(value.into()))
    }

    pub fn put_bytes(&mut self, name: &str, value: impl Into<Vec<u8>>) -> &mut Self {
        self.put(name, PropertyValue::Bytes(value.into()))
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    fn required(&self, name: &str) -> Result<&PropertyValue, MessagingError> {
        self.properties
            .get(name)
            .ok_or_else(|| MessagingError::MissingProperty {
                name: name.to_string(),
            })
    }

    fn wrong_type(name: &str, expected: &str, found: &PropertyValue) -> MessagingError {
        MessagingError::PropertyType {
            name: name.to_string(),
            expected: format!("{expected} (found {})", found.type_name()),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i32, MessagingError> {
        match self.required(name)? {
            PropertyValue::Int(v) => Ok(*v),
            other => Err(Self::wrong_type(name, "int", other)),
        }
    }

    /// Read a long property. Int values widen.
    pub fn get_long(&self, name: &str) -> Result<i64, MessagingError> {
        match self.required(name)? {
            PropertyValue::Long(v) => Ok(*v),
            PropertyValue::Int(v) => Ok(i64::from(*v)),
            other => Err(Self::wrong_type(name, "long", other)),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, MessagingError> {
        match self.required(name)? {
            PropertyValue::Bool(v) => Ok(*v),
            other => Err(Self::wrong_type(name, "bool", other)),
        }
    }

    pub fn get_string(&self, name: &str) -> Result<&str, MessagingError> {
        match self.required(name)? {
            PropertyValue::String(v) => Ok(v.as_str()),
            other => Err(Self::wrong_type(name, "string", other)),
        }
    }

    pub fn get_bytes(&self, name: &str) -> Result<&[u8], MessagingError> {
        match self.required(name)? {
            PropertyValue::Bytes(v) => Ok(v.as_slice()),
            other => Err(Self::wrong_type(name, "bytes", other)),
        }
    }
}
