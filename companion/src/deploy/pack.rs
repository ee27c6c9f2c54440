//! Configuration pack validation

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use crate::content::{hash, FileHashes};
use crate::errors::CompanionError;
use crate::storage::layout::is_safe_component;
use crate::storage::snapshots::GenerationFiles;

const RULES_FILE: &str = "rules.json";

/// A validated, non-empty set of named configuration files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPack {
    files: GenerationFiles,
}

impl ConfigPack {
    /// Validate a set of files
    pub fn new(files: GenerationFiles) -> Result<Self, CompanionError> {
        if files.is_empty() {
            return Err(CompanionError::ValidationError(
                "Config pack contains no files".to_string(),
            ));
        }
        for (name, contents) in &files {
            validate_file(name, contents)?;
        }
        Ok(Self { files })
    }

    /// Decode base64 file contents, then validate
    pub fn from_base64(encoded: &BTreeMap<String, String>) -> Result<Self, CompanionError> {
        let mut files = GenerationFiles::new();
        for (name, data) in encoded {
            let contents = STANDARD.decode(data.trim()).map_err(|e| {
                CompanionError::ValidationError(format!("{} is not valid base64: {}", name, e))
            })?;
            files.insert(name.clone(), contents);
        }
        Self::new(files)
    }

    pub fn files(&self) -> &GenerationFiles {
        &self.files
    }

    pub fn names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Content hash of every file in the pack
    pub fn hashes(&self) -> FileHashes {
        self.files
            .iter()
            .map(|(name, contents)| (name.clone(), Some(hash(contents))))
            .collect()
    }
}

fn validate_file(name: &str, contents: &[u8]) -> Result<(), CompanionError> {
    if !is_safe_component(name) {
        return Err(CompanionError::ValidationError(format!(
            "Invalid file name: {:?}",
            name
        )));
    }

    if name.ends_with(".json") {
        let value: Value = serde_json::from_slice(contents).map_err(|e| {
            CompanionError::ValidationError(format!("{} is not valid JSON: {}", name, e))
        })?;
        if name == RULES_FILE {
            validate_rules(&value)?;
        }
    } else if name.ends_with(".css") && std::str::from_utf8(contents).is_err() {
        return Err(CompanionError::ValidationError(format!(
            "{} must be UTF-8 text",
            name
        )));
    }

    Ok(())
}

fn validate_rules(rules: &Value) -> Result<(), CompanionError> {
    let Some(actuators) = rules.get("actuators").and_then(Value::as_array) else {
        return Ok(());
    };
    for (idx, actuator) in actuators.iter().enumerate() {
        if actuator.get("ttl_s").is_none() || actuator.get("cooldown_s").is_none() {
            return Err(CompanionError::ValidationError(format!(
                "Actuator entry {} missing ttl_s/cooldown_s",
                idx
            )));
        }
    }
    Ok(())
}
