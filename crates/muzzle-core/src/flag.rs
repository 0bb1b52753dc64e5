//! Reference flags and JVM access masks.
//!
//! A [`Flag`] is an expectation recorded on a class, field or method
//! reference. Each flag can be checked against the access mask of the symbol
//! actually found in an environment with [`Flag::matches`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// JVM access flag bits as they appear in compiled units.
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SUPER: u16 = 0x0020;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ENUM: u16 = 0x4000;
}

/// The family a flag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    /// The exact visibility of a declared member.
    Visibility,
    /// The least visibility an accessor needs.
    MinimumVisibility,
    /// Static or instance ownership.
    Ownership,
    /// Final / abstract / interface shape.
    Manifestation,
}

/// An expected property of a referenced symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Flag {
    Public,
    Protected,
    Package,
    Private,

    ProtectedOrHigher,
    PackageOrHigher,
    PrivateOrHigher,

    Final,
    NonFinal,
    Abstract,

    Static,
    NonStatic,

    Interface,
    NonInterface,
}

impl Flag {
    /// Returns true if a symbol declared with `mask` satisfies this flag.
    pub fn matches(self, mask: u16) -> bool {
        let has = |bit: u16| mask & bit != 0;
        match self {
            Flag::Public => has(access::PUBLIC),
            Flag::Protected => has(access::PROTECTED),
            Flag::Package => !has(access::PUBLIC | access::PROTECTED | access::PRIVATE),
            Flag::Private => has(access::PRIVATE),
            Flag::ProtectedOrHigher => has(access::PUBLIC | access::PROTECTED),
            Flag::PackageOrHigher => !has(access::PRIVATE),
            // you can't out-private a private
            Flag::PrivateOrHigher => true,
            Flag::Final => has(access::FINAL),
            Flag::NonFinal => !has(access::FINAL | access::ABSTRACT),
            Flag::Abstract => has(access::ABSTRACT),
            Flag::Static => has(access::STATIC),
            Flag::NonStatic => !has(access::STATIC),
            Flag::Interface => has(access::INTERFACE),
            Flag::NonInterface => !has(access::INTERFACE),
        }
    }

    /// The family this flag belongs to.
    pub fn kind(self) -> FlagKind {
        match self {
            Flag::Public | Flag::Protected | Flag::Package | Flag::Private => FlagKind::Visibility,
            Flag::ProtectedOrHigher | Flag::PackageOrHigher | Flag::PrivateOrHigher => {
                FlagKind::MinimumVisibility
            }
            Flag::Static | Flag::NonStatic => FlagKind::Ownership,
            Flag::Final | Flag::NonFinal | Flag::Abstract | Flag::Interface | Flag::NonInterface => {
                FlagKind::Manifestation
            }
        }
    }

    /// The exact visibility of a declaration.
    pub fn visibility_of(mask: u16) -> Flag {
        if Flag::Public.matches(mask) {
            Flag::Public
        } else if Flag::Protected.matches(mask) {
            Flag::Protected
        } else if Flag::Private.matches(mask) {
            Flag::Private
        } else {
            Flag::Package
        }
    }

    pub fn ownership_of(mask: u16) -> Flag {
        if Flag::Static.matches(mask) {
            Flag::Static
        } else {
            Flag::NonStatic
        }
    }

    /// Abstract, final or neither. Interfaces are abstract.
    pub fn manifestation_of(mask: u16) -> Flag {
        if Flag::Abstract.matches(mask) {
            Flag::Abstract
        } else if Flag::Final.matches(mask) {
            Flag::Final
        } else {
            Flag::NonFinal
        }
    }

    pub fn interface_of(mask: u16) -> Flag {
        if Flag::Interface.matches(mask) {
            Flag::Interface
        } else {
            Flag::NonInterface
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flag::Public => "PUBLIC",
            Flag::Protected => "PROTECTED",
            Flag::Package => "PACKAGE",
            Flag::Private => "PRIVATE",
            Flag::ProtectedOrHigher => "PROTECTED_OR_HIGHER",
            Flag::PackageOrHigher => "PACKAGE_OR_HIGHER",
            Flag::PrivateOrHigher => "PRIVATE_OR_HIGHER",
            Flag::Final => "FINAL",
            Flag::NonFinal => "NON_FINAL",
            Flag::Abstract => "ABSTRACT",
            Flag::Static => "STATIC",
            Flag::NonStatic => "NON_STATIC",
            Flag::Interface => "INTERFACE",
            Flag::NonInterface => "NON_INTERFACE",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::access::*;
    use super::*;

    #[test]
    fn minimum_visibility_is_a_lower_bound() {
        assert!(Flag::PackageOrHigher.matches(PUBLIC));
        assert!(Flag::PackageOrHigher.matches(PROTECTED));
        assert!(Flag::PackageOrHigher.matches(0));
        assert!(!Flag::PackageOrHigher.matches(PRIVATE));

        assert!(Flag::ProtectedOrHigher.matches(PROTECTED));
        assert!(!Flag::ProtectedOrHigher.matches(0));

        assert!(Flag::PrivateOrHigher.matches(PRIVATE));
        assert!(Flag::Public.matches(PUBLIC | STATIC));
        assert!(!Flag::Public.matches(PROTECTED));
    }

    #[test]
    fn manifestation_flags() {
        assert!(Flag::NonFinal.matches(PUBLIC));
        assert!(!Flag::NonFinal.matches(PUBLIC | ABSTRACT));
        assert!(Flag::Interface.matches(INTERFACE | ABSTRACT));
        assert!(Flag::NonInterface.matches(PUBLIC));
        assert_eq!(Flag::manifestation_of(INTERFACE | ABSTRACT), Flag::Abstract);
        assert_eq!(Flag::manifestation_of(FINAL), Flag::Final);
    }

    #[test]
    fn exact_visibility_of_masks() {
        assert_eq!(Flag::visibility_of(PUBLIC | FINAL), Flag::Public);
        assert_eq!(Flag::visibility_of(PROTECTED), Flag::Protected);
        assert_eq!(Flag::visibility_of(PRIVATE | STATIC), Flag::Private);
        assert_eq!(Flag::visibility_of(STATIC), Flag::Package);
    }

    #[test]
    fn kinds_partition_flags() {
        assert_eq!(Flag::Public.kind(), FlagKind::Visibility);
        assert_eq!(Flag::PrivateOrHigher.kind(), FlagKind::MinimumVisibility);
        assert_eq!(Flag::NonStatic.kind(), FlagKind::Ownership);
        assert_eq!(Flag::NonInterface.kind(), FlagKind::Manifestation);
    }

    #[test]
    fn display_and_serde_use_screaming_names() {
        assert_eq!(Flag::PackageOrHigher.to_string(), "PACKAGE_OR_HIGHER");
        let json = serde_json::to_string(&Flag::NonStatic).unwrap();
        assert_eq!(json, "\"NON_STATIC\"");
    }
}
