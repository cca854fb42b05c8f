//! Format descriptors.
//!
//! A format descriptor is the textual configuration attached to a table or a
//! data file: a flat list of `key=value` items in which a value may itself be
//! a parenthesized group of items.
//!
//! ```text
//! key_format=S,value_format=S,columns=(k,v),log=(enabled=false),app_metadata="a, b"
//! ```
//!
//! Descriptors keep their keys in insertion order and preserve keys they do
//! not understand, so a descriptor read from one instance can be rendered and
//! handed to another unchanged. Two descriptors describe the same table when
//! their [`normalized`](FormatDescriptor::normalized) forms are equal.

mod parser;
mod render;
mod value;

use std::fmt;
use std::str::FromStr;

pub use parser::parse;
pub use value::ConfigValue;

use crate::error::ImportError;

/// Key holding the instance-local file id.
pub const ID_KEY: &str = "id";

/// An ordered set of configuration items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatDescriptor {
    entries: Vec<(String, ConfigValue)>,
}

impl FormatDescriptor {
    /// Creates an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration string.
    pub fn parse(input: &str) -> Result<Self, ImportError> {
        parser::parse(input)
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns the string stored under `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigValue::as_str)
    }

    /// Returns the integer stored under `key`.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ConfigValue::as_int)
    }

    /// Returns the boolean meaning of the value under `key`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ConfigValue::as_bool)
    }

    /// Returns the group stored under `key`.
    pub fn get_group(&self, key: &str) -> Option<&FormatDescriptor> {
        self.get(key).and_then(ConfigValue::as_group)
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Stores `value` under `key`.
    ///
    /// An existing key keeps its position and has its value replaced; a new
    /// key is appended.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Stores `value` under `key` only if the key is absent.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        let key = key.into();
        if !self.contains(&key) {
            self.entries.push((key, value.into()));
        }
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Iterates over items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of items at this level.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the descriptor has no items.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the descriptor as a configuration string.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Returns the canonical form used to compare descriptors across
    /// instances.
    ///
    /// Keys are sorted at every level, integer `id` items are dropped at
    /// every level, and bare flags become explicit `true`.
    pub fn normalized(&self) -> FormatDescriptor {
        let mut entries: Vec<(String, ConfigValue)> = self
            .entries
            .iter()
            .filter(|(k, v)| !(k == ID_KEY && matches!(v, ConfigValue::Int(_))))
            .map(|(k, v)| {
                let v = match v {
                    ConfigValue::Flag => ConfigValue::Bool(true),
                    ConfigValue::Group(g) => ConfigValue::Group(g.normalized()),
                    other => other.clone(),
                };
                (k.clone(), v)
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        FormatDescriptor { entries }
    }

    /// Returns true if both descriptors normalize to the same form.
    pub fn equivalent(&self, other: &FormatDescriptor) -> bool {
        self.normalized() == other.normalized()
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(&render::render_key(key))?;
            if !matches!(value, ConfigValue::Flag) {
                write!(f, "={}", value)?;
            }
        }
        Ok(())
    }
}

impl FromStr for FormatDescriptor {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse(s)
    }
}

impl<K: Into<String>, V: Into<ConfigValue>> FromIterator<(K, V)> for FormatDescriptor {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut desc = FormatDescriptor::new();
        for (k, v) in iter {
            desc.set(k, v);
        }
        desc
    }
}
