//! Request parameter model and wire encoding.
//!
//! The action API takes flat key/value pairs. Sequence values are joined with
//! `|`; when an element itself contains `|` the whole field switches to the
//! unit-separator convention the API defines for exactly this case. `false`
//! flags are never sent at all, because the API treats the mere presence of a
//! parameter as "set".

/// ASCII unit separator, the API's escape hatch for pipe-containing values.
pub const UNIT_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Text(String),
    List(Vec<String>),
    Flag(bool),
    Int(i64),
}

impl Param {
    /// Wire form of this value, or `None` when the field must be omitted.
    pub fn encode(&self) -> Option<String> {
        match self {
            Self::Text(value) => Some(value.clone()),
            Self::Int(value) => Some(value.to_string()),
            Self::Flag(false) => None,
            Self::Flag(true) => Some(String::new()),
            Self::List(values) => {
                if values.iter().any(|value| value.contains('|')) {
                    let mut joined = String::new();
                    for value in values {
                        joined.push(UNIT_SEPARATOR);
                        joined.push_str(value);
                    }
                    Some(joined)
                } else {
                    Some(values.join("|"))
                }
            }
        }
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Vec<String>> for Param {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl From<&[String]> for Param {
    fn from(values: &[String]) -> Self {
        Self::List(values.to_vec())
    }
}

/// An ordered parameter map. Insertion order is preserved on the wire;
/// setting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, Param)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Param>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(existing, _)| *existing == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
        self
    }

    /// Builder-style [`Params::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Param>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Param> {
        self.0
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Param> {
        let index = self.0.iter().position(|(existing, _)| existing == key)?;
        Some(self.0.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode into wire pairs, dropping omitted fields.
    pub fn encode(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter_map(|(key, value)| value.encode().map(|encoded| (key.clone(), encoded)))
            .collect()
    }
}
