//! Named transform presets.
//!
//! A preset is a reusable parameter set declared under `[presets.<name>]` in
//! the config file. It carries the same keys a request does and goes through
//! the same resolver, so a preset can never express anything a request
//! cannot. Request parameters override preset values.

use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};
use crate::resolve::RawParams;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: String,
    params: RawParams,
}

impl Preset {
    /// Build from a config table. Scalars are stringified the way a query
    /// string would carry them.
    pub fn from_table(name: &str, table: &BTreeMap<String, toml::Value>) -> Self {
        let params = table
            .iter()
            .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key.clone(), v)))
            .collect();
        Self {
            name: name.to_string(),
            params,
        }
    }

    pub fn params(&self) -> RawParams {
        self.params.clone()
    }

    /// Preset parameters with `overrides` laid on top.
    pub fn apply(&self, overrides: &RawParams) -> RawParams {
        self.params().overlay(overrides)
    }
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

/// All presets declared in config, sorted by name.
pub fn load_presets(config: &EngineConfig) -> Vec<Preset> {
    config
        .presets
        .iter()
        .map(|(name, table)| Preset::from_table(name, table))
        .collect()
}

/// Look up one preset by name.
pub fn find_preset(config: &EngineConfig, name: &str) -> Result<Preset> {
    config
        .presets
        .get(name)
        .map(|table| Preset::from_table(name, table))
        .ok_or_else(|| PipelineError::NotFound(format!("preset '{name}'")))
}
