use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file is empty: {0}")]
    Empty(String),
}

/// One molecule line from a `.smi` file: the SMILES token plus an optional
/// trailing name, tagged with its 1-based line number in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub line: usize,
    pub smiles: String,
    pub name: Option<String>,
}

impl Record {
    /// The record's name, or the caller's fallback when the line had none.
    pub fn name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(fallback)
    }

    /// The record's name, or a placeholder derived from its line number.
    pub fn numbered_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Molécula {}", self.line),
        }
    }
}

/// Reads a `.smi`-style file: one molecule per line, SMILES first, the
/// rest of the line is the name. Blank lines and `#` comments are skipped.
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    if !path.exists() {
        return Err(InputError::NotFound(path.display().to_string()).into());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if text.is_empty() {
        return Err(InputError::Empty(path.display().to_string()).into());
    }
    Ok(parse_records(&text))
}

/// Splits file text into records without touching the filesystem.
pub fn parse_records(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let smiles = match parts.next() {
            Some(token) => token.to_string(),
            None => continue,
        };
        let rest: Vec<&str> = parts.collect();
        let name = if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        };
        records.push(Record {
            line: index + 1,
            smiles,
            name,
        });
    }
    debug!("parsed {} molecule records", records.len());
    records
}

/// Convenience for callers that only want a file's first molecule line.
pub fn first_record(path: &Path) -> Result<Option<Record>> {
    let records = read_records(path)?;
    Ok(records.into_iter().next())
}
