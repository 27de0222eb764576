//! Plugin parameter schema and parsing
//!
//! A plugin declares its parameters as a static table of [`ParameterSpec`]s.
//! The raw parameter table from the configuration is checked against that
//! table before the plugin is initialized, so `on_initialize` only ever sees
//! well-typed values.

use crate::error::{PluginError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Type of a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// `true` / `false`
    Boolean,
    /// Signed integer
    Int,
    /// Unsigned integer
    UInt,
    /// Floating point number
    Double,
    /// Free-form string
    String,
    /// List of strings
    StringList,
    /// Filesystem path
    Path,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterKind::Boolean => "a boolean",
            ParameterKind::Int => "an integer",
            ParameterKind::UInt => "an unsigned integer",
            ParameterKind::Double => "a number",
            ParameterKind::String => "a string",
            ParameterKind::StringList => "a list of strings",
            ParameterKind::Path => "a path",
        };
        f.write_str(name)
    }
}

/// Declaration of one plugin parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    /// Parameter name
    pub name: &'static str,
    /// Value type
    pub kind: ParameterKind,
    /// Whether the parameter must be given
    pub required: bool,
    /// Human-readable description
    pub description: &'static str,
}

impl ParameterSpec {
    /// A parameter that must be given
    pub const fn required(
        name: &'static str,
        kind: ParameterKind,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    /// A parameter that may be omitted
    pub const fn optional(
        name: &'static str,
        kind: ParameterKind,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

/// A parsed parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Boolean value
    Boolean(bool),
    /// Signed integer value
    Int(i64),
    /// Unsigned integer value
    UInt(u64),
    /// Floating point value
    Double(f64),
    /// String value
    String(String),
    /// String list value
    StringList(Vec<String>),
    /// Path value
    Path(PathBuf),
}

/// Parameters of a plugin, validated against its schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginParams {
    values: BTreeMap<String, ParamValue>,
}

impl PluginParams {
    /// Check `raw` against `specs`
    ///
    /// Keys may use `-` or `_` interchangeably. Strings are accepted for
    /// numeric and boolean parameters when they parse, and a single string
    /// is accepted for a string list. Unknown keys, values of the wrong type
    /// and missing required parameters are rejected.
    pub fn parse(specs: &[ParameterSpec], raw: &Map<String, Value>) -> Result<Self> {
        let mut values = BTreeMap::new();

        for (key, value) in raw {
            let canonical = canonical_name(key);
            let spec = specs
                .iter()
                .find(|s| canonical_name(s.name) == canonical)
                .ok_or_else(|| PluginError::parameter(key, "unknown parameter"))?;

            let parsed = convert(spec, value)?;
            if values.insert(canonical, parsed).is_some() {
                return Err(PluginError::parameter(key, "given more than once"));
            }
        }

        if let Some(missing) = specs
            .iter()
            .find(|s| s.required && !values.contains_key(&canonical_name(s.name)))
        {
            return Err(PluginError::parameter(
                missing.name,
                "required parameter missing",
            ));
        }

        Ok(Self { values })
    }

    /// Raw parsed value
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(&canonical_name(name))
    }

    /// Whether a parameter was given
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Boolean parameter
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(ParamValue::Boolean(v)) => Some(*v),
            _ => None,
        }
    }

    /// Signed integer parameter
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Unsigned integer parameter
    pub fn get_uint(&self, name: &str) -> Option<u64> {
        match self.get(name) {
            Some(ParamValue::UInt(v)) => Some(*v),
            _ => None,
        }
    }

    /// Floating point parameter
    pub fn get_double(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(ParamValue::Double(v)) => Some(*v),
            _ => None,
        }
    }

    /// String parameter
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(ParamValue::String(v)) => Some(v),
            _ => None,
        }
    }

    /// String list parameter
    pub fn get_list(&self, name: &str) -> Option<&[String]> {
        match self.get(name) {
            Some(ParamValue::StringList(v)) => Some(v),
            _ => None,
        }
    }

    /// Path parameter
    pub fn get_path(&self, name: &str) -> Option<&Path> {
        match self.get(name) {
            Some(ParamValue::Path(v)) => Some(v),
            _ => None,
        }
    }

    /// Number of given parameters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no parameter was given
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn canonical_name(name: &str) -> String {
    name.replace('_', "-")
}

fn convert(spec: &ParameterSpec, value: &Value) -> Result<ParamValue> {
    let mismatch = || PluginError::parameter(spec.name, format!("expected {}", spec.kind));

    let converted = match spec.kind {
        ParameterKind::Boolean => match value {
            Value::Bool(b) => ParamValue::Boolean(*b),
            Value::String(s) => ParamValue::Boolean(s.parse().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        ParameterKind::Int => match value {
            Value::Number(n) => ParamValue::Int(n.as_i64().ok_or_else(mismatch)?),
            Value::String(s) => ParamValue::Int(s.trim().parse().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        ParameterKind::UInt => match value {
            Value::Number(n) => ParamValue::UInt(n.as_u64().ok_or_else(mismatch)?),
            Value::String(s) => ParamValue::UInt(s.trim().parse().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        ParameterKind::Double => match value {
            Value::Number(n) => ParamValue::Double(n.as_f64().ok_or_else(mismatch)?),
            Value::String(s) => ParamValue::Double(s.trim().parse().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        ParameterKind::String => match value {
            Value::String(s) => ParamValue::String(s.clone()),
            Value::Number(n) => ParamValue::String(n.to_string()),
            Value::Bool(b) => ParamValue::String(b.to_string()),
            _ => return Err(mismatch()),
        },
        ParameterKind::StringList => match value {
            Value::String(s) => ParamValue::StringList(vec![s.clone()]),
            Value::Array(items) => ParamValue::StringList(
                items
                    .iter()
                    .map(|item| item.as_str().map(String::from).ok_or_else(mismatch))
                    .collect::<Result<_>>()?,
            ),
            _ => return Err(mismatch()),
        },
        ParameterKind::Path => match value {
            Value::String(s) if !s.is_empty() => ParamValue::Path(PathBuf::from(s)),
            _ => return Err(mismatch()),
        },
    };

    Ok(converted)
}
