//! YAML front matter helpers for storage backends.
//!
//! Front matter is a YAML mapping fenced by `---` lines at the very start of
//! a content file. Backends split it off with [`split_front_matter`] and
//! decode it with [`parse_front_matter`].

use crate::record::Metadata;

const FENCE: &str = "---";

/// Front matter decoding error.
#[derive(Debug, thiserror::Error)]
pub enum FrontMatterError {
    /// The YAML is malformed.
    #[error("Invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// The YAML is valid but not a mapping.
    #[error("Front matter must be a mapping")]
    NotAMapping,
    /// The opening fence has no matching closing fence.
    #[error("Unterminated front matter")]
    Unterminated,
}

/// Split `source` into its front matter block and body.
///
/// Returns `(None, source)` when the source doesn't start with a fence.
///
/// # Errors
///
/// Returns [`FrontMatterError::Unterminated`] if the closing fence is missing.
pub fn split_front_matter(source: &str) -> Result<(Option<&str>, &str), FrontMatterError> {
    let Some(rest) = source.strip_prefix(FENCE) else {
        return Ok((None, source));
    };
    let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
        return Ok((None, source));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Ok((Some(yaml), body));
        }
        offset += line.len();
    }
    Err(FrontMatterError::Unterminated)
}

/// Decode a YAML front matter block into metadata.
///
/// Empty input yields empty metadata.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or not a mapping.
pub fn parse_front_matter(yaml: &str) -> Result<Metadata, FrontMatterError> {
    if yaml.trim().is_empty() {
        return Ok(Metadata::new());
    }
    let value: serde_json::Value = serde_yaml::from_str(yaml)?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(Metadata::new()),
        _ => Err(FrontMatterError::NotAMapping),
    }
}
