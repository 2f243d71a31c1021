// Tolerant JSON extraction from model output
//
// Models wrap JSON in markdown fences or surround it with prose even when
// asked not to. These helpers recover the outermost object before parsing.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Strip leading/trailing markdown code fences (```json ... ``` or ``` ... ```)
pub fn strip_markdown_fences(s: &str) -> &str {
    let s = s.trim();
    let s = if let Some(rest) = s.strip_prefix("```json") {
        rest
    } else if let Some(rest) = s.strip_prefix("```") {
        rest
    } else {
        s
    };
    if let Some(rest) = s.strip_suffix("```") {
        rest.trim()
    } else {
        s.trim()
    }
}

/// Parse a JSON object out of model text.
///
/// Tries the fence-stripped text first, then the slice between the first `{`
/// and the last `}`.
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T> {
    let stripped = strip_markdown_fences(text);

    let direct = serde_json::from_str::<T>(stripped);
    if let Ok(value) = direct {
        return Ok(value);
    }

    if let (Some(start), Some(end)) = (stripped.find('{'), stripped.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<T>(&stripped[start..=end]) {
                return Ok(value);
            }
        }
    }

    direct.context("Model response did not contain a valid JSON object")
}
