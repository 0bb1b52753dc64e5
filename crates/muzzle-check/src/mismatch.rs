//! Mismatch diagnostics.
//!
//! A [`Mismatch`] is one reason a reference graph does not fit an
//! environment. Every variant carries the [`Source`]s that caused it, so a
//! report can point at the advice line responsible. Display renders the
//! first source followed by [`Mismatch::details`].

use std::fmt;

use muzzle_core::{Flag, Source};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    /// The type does not exist in the environment.
    MissingClass {
        sources: Vec<Source>,
        class_name: String,
    },

    /// No reachable declaration of the method, e.g. `helper()void`.
    MissingMethod {
        sources: Vec<Source>,
        class_name: String,
        method: String,
    },

    /// No reachable declaration of the field, e.g. `count:int`.
    MissingField {
        sources: Vec<Source>,
        class_name: String,
        field: String,
    },

    /// A declaration was found but its access mask violates a flag.
    MissingFlag {
        sources: Vec<Source>,
        /// `Class`, `Class#method()void` or `Class#field:type`.
        target: String,
        flag: Flag,
        found: u16,
    },

    /// Checking the reference failed. Carries no sources.
    ReferenceCheckError {
        class_name: String,
        environment: String,
        detail: String,
    },
}

impl Mismatch {
    pub fn sources(&self) -> &[Source] {
        match self {
            Mismatch::MissingClass { sources, .. }
            | Mismatch::MissingMethod { sources, .. }
            | Mismatch::MissingField { sources, .. }
            | Mismatch::MissingFlag { sources, .. } => sources,
            Mismatch::ReferenceCheckError { .. } => &[],
        }
    }

    /// The type whose check produced this mismatch.
    pub fn class_name(&self) -> &str {
        match self {
            Mismatch::MissingClass { class_name, .. }
            | Mismatch::MissingMethod { class_name, .. }
            | Mismatch::MissingField { class_name, .. }
            | Mismatch::ReferenceCheckError { class_name, .. } => class_name,
            Mismatch::MissingFlag { target, .. } => {
                target.split_once('#').map_or(target.as_str(), |(class, _)| class)
            }
        }
    }

    /// Human-readable description without the source location.
    pub fn details(&self) -> String {
        match self {
            Mismatch::MissingClass { class_name, .. } => format!("Missing class {class_name}"),
            Mismatch::MissingMethod {
                class_name, method, ..
            } => format!("Missing method {class_name}#{method}"),
            Mismatch::MissingField {
                class_name, field, ..
            } => format!("Missing field {class_name}#{field}"),
            Mismatch::MissingFlag {
                target, flag, found, ..
            } => format!("{target} requires flag {flag} found 0x{found:04x}"),
            Mismatch::ReferenceCheckError {
                class_name,
                environment,
                detail,
            } => format!(
                "Failed to generate reference check for {class_name} on {environment}: {detail}"
            ),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sources().first() {
            Some(source) => write!(f, "{source} {}", self.details()),
            None => write!(f, "<no-source> {}", self.details()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_leads_with_the_first_source() {
        let mismatch = Mismatch::MissingMethod {
            sources: vec![Source::at("agent.Advice", 12), Source::at("agent.Helper", 40)],
            class_name: "external.Lib".to_string(),
            method: "helper()void".to_string(),
        };
        insta::assert_snapshot!(
            mismatch.to_string(),
            @"agent.Advice:12 Missing method external.Lib#helper()void"
        );
        assert_eq!(mismatch.class_name(), "external.Lib");
    }

    #[test]
    fn display_without_sources() {
        let mismatch = Mismatch::ReferenceCheckError {
            class_name: "external.Lib".to_string(),
            environment: "app".to_string(),
            detail: "bad magic 0x00000000".to_string(),
        };
        insta::assert_snapshot!(
            mismatch.to_string(),
            @"<no-source> Failed to generate reference check for external.Lib on app: bad magic 0x00000000"
        );
        assert!(mismatch.sources().is_empty());
    }

    #[test]
    fn flag_details_name_the_target() {
        let mismatch = Mismatch::MissingFlag {
            sources: vec![Source::new("agent.Advice", None)],
            target: "external.Lib#count:int".to_string(),
            flag: Flag::Public,
            found: 0x0002,
        };
        insta::assert_snapshot!(
            mismatch.to_string(),
            @"agent.Advice external.Lib#count:int requires flag PUBLIC found 0x0002"
        );
        assert_eq!(mismatch.class_name(), "external.Lib");
    }

    #[test]
    fn serializes_with_a_kind_tag() {
        let mismatch = Mismatch::MissingClass {
            sources: Vec::new(),
            class_name: "external.Lib".to_string(),
        };
        insta::assert_json_snapshot!(mismatch, @r#"
        {
          "kind": "missing_class",
          "sources": [],
          "class_name": "external.Lib"
        }
        "#);
    }
}
