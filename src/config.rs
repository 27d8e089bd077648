//! Construction and rendering options
//!
//! Defaults are threaded explicitly through constructors and render calls;
//! there is no process-wide configuration. Both option structs deserialize
//! from any serde format with missing fields falling back to defaults.
//!
//! Author: Moroya Sakamoto

use serde::{Deserialize, Serialize};

/// Default cap on markdown header depth
pub const DEFAULT_MAX_HEADER_LEVEL: usize = 4;

/// Default longest run of unchanged chunks folded into a surrounding edit
pub const DEFAULT_MAX_EQUAL_ISLAND: usize = 1;

/// Default list separator when no `sep=` hint is given
pub const DEFAULT_SEPARATOR: &str = "\n";

/// Options applied while building a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeOptions {
    /// Permit repeated interpolation keys (lookups then go through `get_all`)
    pub allow_duplicate_keys: bool,
    /// Separator for list interpolations without a `sep=` hint
    pub default_separator: String,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            allow_duplicate_keys: false,
            default_separator: String::from(DEFAULT_SEPARATOR),
        }
    }
}

impl TreeOptions {
    pub fn allow_duplicates() -> Self {
        Self {
            allow_duplicate_keys: true,
            ..Self::default()
        }
    }
}

/// Options applied while rendering a tree to chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Header levels deeper than this are clamped
    pub max_header_level: usize,
    /// Rendered diff: equal runs up to this many chunks with edits on both
    /// sides are reported as part of the edit; 0 keeps every equal pair
    pub max_equal_island: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_header_level: DEFAULT_MAX_HEADER_LEVEL,
            max_equal_island: DEFAULT_MAX_EQUAL_ISLAND,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = TreeOptions::default();
        assert!(!opts.allow_duplicate_keys);
        assert_eq!(opts.default_separator, "\n");
        assert_eq!(RenderConfig::default().max_header_level, 4);
        assert_eq!(RenderConfig::default().max_equal_island, 1);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let opts: TreeOptions = serde_json::from_str(r#"{"allow_duplicate_keys": true}"#).unwrap();
        assert!(opts.allow_duplicate_keys);
        assert_eq!(opts.default_separator, "\n");

        let cfg: RenderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, RenderConfig::default());
    }
}
