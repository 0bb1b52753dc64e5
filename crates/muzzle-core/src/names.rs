//! Symbol name helpers.
//!
//! Symbols are keyed by their dotted binary name (`external.Lib`,
//! `a.b.Outer$Inner`). Compiled units spell the same names in internal form
//! (`external/Lib`); these helpers convert between the two.

/// Converts an internal name (`a/b/C`) to its dotted binary form (`a.b.C`).
pub fn binary_name(internal: &str) -> String {
    internal.replace('/', ".")
}

/// Converts a dotted binary name (`a.b.C`) to its internal form (`a/b/C`).
pub fn internal_name(binary: &str) -> String {
    binary.replace('.', "/")
}

/// Returns the package part of a dotted name, or `""` for the default package.
///
/// Nested classes belong to the package of their outer class:
/// `a.b.Outer$Inner` lives in `a.b`.
pub fn package_of(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((package, _)) => package,
        None => "",
    }
}

/// Returns the relative resource path of a compiled unit, e.g.
/// `external/Lib.class` for `external.Lib`.
pub fn resource_path(name: &str) -> String {
    format!("{}.class", internal_name(name))
}

/// Returns true if `name` starts with any of the given prefixes.
pub fn has_any_prefix<S: AsRef<str>>(name: &str, prefixes: &[S]) -> bool {
    prefixes.iter().any(|p| name.starts_with(p.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_and_binary_names_convert() {
        assert_eq!(binary_name("external/Lib"), "external.Lib");
        assert_eq!(internal_name("a.b.Outer$Inner"), "a/b/Outer$Inner");
    }

    #[test]
    fn package_of_nested_and_default_package() {
        assert_eq!(package_of("a.b.Outer$Inner"), "a.b");
        assert_eq!(package_of("TopLevel"), "");
    }

    #[test]
    fn resource_path_uses_slashes() {
        assert_eq!(resource_path("external.Lib"), "external/Lib.class");
    }

    #[test]
    fn prefix_matching() {
        assert!(has_any_prefix("java.lang.String", &["java."]));
        assert!(!has_any_prefix("javax.servlet.Filter", &["java."]));
        assert!(!has_any_prefix("anything", &[] as &[&str]));
    }
}
