//! Namespace lookup tables and title decomposition.
//!
//! The table is owned by the engine instance that fetched it, never
//! process-global; it is rebuilt whenever a response carrying siteinfo
//! namespace data comes back.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::Error;

/// A validated, decomposed page identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub namespace: i64,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceMap {
    ids_by_name: HashMap<String, i64>,
    names_by_id: HashMap<i64, String>,
}

impl NamespaceMap {
    /// Build the lookup tables from a siteinfo payload
    /// (`meta=siteinfo&siprop=namespaces|namespacealiases`).
    pub fn from_site_info(site_info: &Value) -> Result<Self, Error> {
        let namespaces = site_info
            .pointer("/query/namespaces")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::MissingField {
                expected: "query.namespaces",
                response: site_info.clone(),
            })?;

        let mut map = Self::default();
        for namespace in namespaces.values() {
            let Some(id) = namespace.get("id").and_then(Value::as_i64) else {
                continue;
            };
            // formatversion=2 exposes the localized name as `name` and the
            // English one as `canonical`; the main namespace has neither
            // canonical nor a non-empty name.
            if let Some(name) = namespace.get("name").and_then(Value::as_str) {
                map.insert(id, name);
            }
            if let Some(canonical) = namespace.get("canonical").and_then(Value::as_str) {
                map.insert(id, canonical);
            }
        }
        if let Some(aliases) = site_info
            .pointer("/query/namespacealiases")
            .and_then(Value::as_array)
        {
            for alias in aliases {
                if let Some(id) = alias.get("id").and_then(Value::as_i64)
                    && let Some(name) = alias.get("alias").and_then(Value::as_str)
                {
                    map.ids_by_name.insert(normalize_key(name), id);
                }
            }
        }
        map.names_by_id.entry(0).or_default();
        Ok(map)
    }

    fn insert(&mut self, id: i64, name: &str) {
        self.ids_by_name.insert(normalize_key(name), id);
        self.names_by_id.entry(id).or_insert_with(|| name.to_string());
    }

    pub fn id_for(&self, name: &str) -> Option<i64> {
        self.ids_by_name.get(&normalize_key(name)).copied()
    }

    pub fn name_for(&self, id: i64) -> Option<&str> {
        self.names_by_id.get(&id).map(String::as_str)
    }

    /// Validate and decompose a raw page identifier. Returns `None` for
    /// empty input or titles containing characters MediaWiki forbids.
    pub fn new_from_text(&self, raw: &str) -> Option<Title> {
        let mut text = raw.trim().replace('_', " ");
        // a leading colon forces the main namespace
        if let Some(rest) = text.strip_prefix(':') {
            text = rest.trim_start().to_string();
        }
        if text.is_empty() || text.chars().any(is_forbidden) {
            return None;
        }

        if let Some((prefix, rest)) = text.split_once(':')
            && let Some(id) = self.id_for(prefix)
        {
            let rest = rest.trim();
            if rest.is_empty() {
                return None;
            }
            return Some(Title {
                namespace: id,
                title: capitalize_first(rest),
            });
        }

        Some(Title {
            namespace: 0,
            title: capitalize_first(&text),
        })
    }
}

fn normalize_key(name: &str) -> String {
    name.trim().replace('_', " ").to_lowercase()
}

fn is_forbidden(ch: char) -> bool {
    matches!(ch, '<' | '>' | '[' | ']' | '{' | '}' | '|' | '#')
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
