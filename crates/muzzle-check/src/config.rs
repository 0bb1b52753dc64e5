//! Matcher configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Check class, field and method flags against the found declarations.
    pub check_flags: bool,
    /// Check field references. When off, fields are not looked up at all.
    pub check_fields: bool,
    /// Supertypes under these prefixes may be absent from an environment
    /// without failing a lookup. An absent `java.lang.Object` is replaced by
    /// its well-known shape; other absent ones may declare any member.
    pub platform_prefixes: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            check_flags: true,
            check_fields: true,
            platform_prefixes: vec!["java.".to_string()],
        }
    }
}
