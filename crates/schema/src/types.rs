use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Result, SchemaError};
use crate::normalize;
use crate::validate;

static VECTOR_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(\d+)\]f(16|32)$").unwrap());

/// Simple type names, sorted for messages
pub const SIMPLE_TYPE_NAMES: [&str; 4] = ["bool", "string", "uint64", "uuid"];

/// Keys an annotated type object may carry besides `type`
pub const OPTION_KEYS: [&str; 3] = ["filterable", "full_text_search", "regex_index"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpleType {
    String,
    Uint64,
    Uuid,
    Bool,
}

impl SimpleType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "string" => Some(Self::String),
            "uint64" => Some(Self::Uint64),
            "uuid" => Some(Self::Uuid),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Uint64 => "uint64",
            Self::Uuid => "uuid",
            Self::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    F16,
    F32,
}

impl Precision {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::F16 => "f16",
            Self::F32 => "f32",
        }
    }
}

/// `[<dims>]f16` or `[<dims>]f32`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorType {
    pub dimensions: u32,
    pub precision: Precision,
}

impl VectorType {
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = VECTOR_TYPE.captures(raw)?;
        let dimensions = caps[1].parse::<u32>().ok().filter(|dims| *dims > 0)?;
        let precision = match &caps[2] {
            "16" => Precision::F16,
            _ => Precision::F32,
        };
        Some(Self {
            dimensions,
            precision,
        })
    }

    /// Vector-shaped text whose dimension count is 0 or does not fit a `u32`
    pub fn has_dimensions_out_of_range(raw: &str) -> bool {
        VECTOR_TYPE.is_match(raw) && Self::parse(raw).is_none()
    }
}

impl fmt::Display for VectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.dimensions, self.precision.as_str())
    }
}

/// The part of a type declaration named by the `type` key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Simple(SimpleType),
    Vector(VectorType),
}

impl BaseType {
    pub fn parse(raw: &str) -> Option<Self> {
        SimpleType::parse(raw)
            .map(Self::Simple)
            .or_else(|| VectorType::parse(raw).map(Self::Vector))
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(simple) => f.write_str(simple.as_str()),
            Self::Vector(vector) => vector.fmt(f),
        }
    }
}

/// Index options of an annotated type. `None` means the key is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TypeOptions {
    pub full_text_search: Option<bool>,
    pub regex_index: Option<bool>,
    pub filterable: Option<bool>,
}

impl TypeOptions {
    pub const fn is_empty(&self) -> bool {
        self.full_text_search.is_none() && self.regex_index.is_none() && self.filterable.is_none()
    }

    fn set(&mut self, key: &str, value: bool) -> bool {
        match key {
            "full_text_search" => self.full_text_search = Some(value),
            "regex_index" => self.regex_index = Some(value),
            "filterable" => self.filterable = Some(value),
            _ => return false,
        }
        true
    }

    fn entries(&self) -> impl Iterator<Item = (&'static str, bool)> {
        [
            ("filterable", self.filterable),
            ("full_text_search", self.full_text_search),
            ("regex_index", self.regex_index),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
    }
}

/// Declared type of one schema attribute.
///
/// Declaration files only ever produce `Simple`, `Vector` or `Annotated`.
/// `Opaque` holds whatever the service reports that the declaration grammar
/// cannot express (newer base types, structured option values); it still
/// takes part in comparisons through its canonical JSON form.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    Simple(SimpleType),
    Vector(VectorType),
    Annotated { base: BaseType, options: TypeOptions },
    Opaque(Value),
}

impl AttributeType {
    /// Parse a declaration-file value, rejecting anything the grammar forbids.
    pub fn from_declaration(name: &str, value: &Value) -> std::result::Result<Self, Vec<String>> {
        let errors = validate::validate_attribute(name, value);
        if !errors.is_empty() {
            return Err(errors);
        }
        Self::from_value(value).ok_or_else(|| {
            vec![format!(
                "Attribute '{name}': type must be a string or object, got {}",
                validate::json_kind(value)
            )]
        })
    }

    /// Parse a value reported by the service. Never fails.
    pub fn from_remote(value: &Value) -> Self {
        let cleaned = match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            other => other.clone(),
        };
        Self::from_value(&cleaned).unwrap_or(Self::Opaque(cleaned))
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(raw) => Some(Self::from_base(BaseType::parse(raw)?)),
            Value::Object(map) => {
                let base = BaseType::parse(map.get("type")?.as_str()?)?;
                let mut options = TypeOptions::default();
                for (key, value) in map.iter().filter(|(key, _)| key.as_str() != "type") {
                    if !options.set(key, value.as_bool()?) {
                        return None;
                    }
                }
                if options.is_empty() {
                    Some(Self::from_base(base))
                } else {
                    Some(Self::Annotated { base, options })
                }
            }
            _ => None,
        }
    }

    const fn from_base(base: BaseType) -> Self {
        match base {
            BaseType::Simple(simple) => Self::Simple(simple),
            BaseType::Vector(vector) => Self::Vector(vector),
        }
    }

    /// JSON shape accepted by the service's write endpoint
    pub fn to_json(&self) -> Value {
        match self {
            Self::Simple(simple) => Value::String(simple.as_str().to_string()),
            Self::Vector(vector) => Value::String(vector.to_string()),
            Self::Annotated { base, options } => {
                let mut map = Map::new();
                map.insert("type".to_string(), Value::String(base.to_string()));
                for (key, value) in options.entries() {
                    map.insert(key.to_string(), Value::Bool(value));
                }
                Value::Object(map)
            }
            Self::Opaque(value) => value.clone(),
        }
    }

    /// Vector shape of this attribute, whatever variant carries it
    pub fn vector(&self) -> Option<VectorType> {
        match self {
            Self::Vector(vector) => Some(*vector),
            Self::Annotated {
                base: BaseType::Vector(vector),
                ..
            } => Some(*vector),
            Self::Opaque(value) => {
                let raw = value
                    .as_str()
                    .or_else(|| value.get("type").and_then(Value::as_str))?;
                VectorType::parse(raw)
            }
            _ => None,
        }
    }

    pub fn normalized(&self) -> String {
        normalize::normalize(&self.to_json())
    }

    pub fn display_form(&self) -> String {
        normalize::display_form(&self.to_json())
    }
}

impl Serialize for AttributeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Attribute name → declared type, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    attributes: BTreeMap<String, AttributeType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and parse a whole declaration. All errors are collected
    /// before giving up.
    pub fn from_declaration(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(SchemaError::NotAnObject(validate::json_kind(value)));
        };

        let errors = validate::validate_schema(map);
        if !errors.is_empty() {
            return Err(SchemaError::Invalid(errors));
        }

        let mut schema = Self::new();
        for (name, raw) in map {
            let ty = AttributeType::from_declaration(name, raw).map_err(SchemaError::Invalid)?;
            schema.insert(name.clone(), ty);
        }
        Ok(schema)
    }

    pub fn parse_declaration(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_declaration(&value)
    }

    /// Read and validate a JSON declaration file
    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SchemaError::FileNotFound(path.to_path_buf())
            } else {
                SchemaError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::parse_declaration(&raw)
    }

    /// Build from the `schema` object of a namespace metadata response
    pub fn from_remote(map: &Map<String, Value>) -> Self {
        map.iter()
            .map(|(name, value)| (name.clone(), AttributeType::from_remote(value)))
            .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: AttributeType) -> Option<AttributeType> {
        self.attributes.insert(name.into(), ty)
    }

    pub fn get(&self, name: &str) -> Option<&AttributeType> {
        self.attributes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeType)> {
        self.attributes.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// First vector-typed attribute in name order
    pub fn vector_attribute(&self) -> Option<(&str, VectorType)> {
        self.iter().find_map(|(name, ty)| ty.vector().map(|v| (name, v)))
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.attributes
                .iter()
                .map(|(name, ty)| (name.clone(), ty.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, AttributeType)> for Schema {
    fn from_iter<I: IntoIterator<Item = (String, AttributeType)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.attributes.serialize(serializer)
    }
}
