use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum InputDoc {
    Object {
        #[serde(default)]
        urls: Vec<String>,
    },
    List(Vec<String>),
}

/// Read the URL list from `path`.
pub fn load(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input {}", path.display()))?;
    parse(&text).with_context(|| format!("Failed to parse input {}", path.display()))
}

/// JSON (`{"urls": [...]}` or a bare array) or one URL per line.
pub fn parse(text: &str) -> Result<Vec<String>> {
    let trimmed = text.trim_start();
    let raw = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        match serde_json::from_str::<InputDoc>(trimmed)? {
            InputDoc::Object { urls } | InputDoc::List(urls) => urls,
        }
    } else {
        text.lines()
            .filter(|l| !l.trim_start().starts_with('#'))
            .map(str::to_string)
            .collect()
    };
    Ok(clean(raw))
}

/// Trim entries and drop empty ones.
pub fn clean(urls: Vec<String>) -> Vec<String> {
    urls.into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect()
}
