//! The reference model: what one code unit requires of another symbol.
//!
//! A [`Reference`] is one graph node per symbol name. It accumulates the
//! flags, fields and methods every accessor expects from that symbol, plus the
//! `(unit, line)` [`Source`]s that caused each expectation. Sources exist for
//! diagnostics only and never take part in equality.
//!
//! References for the same symbol are combined with [`Reference::merge`]
//! (or in place with [`Reference::absorb`]). Merging is a set union except
//! for the supertype, where the first known value wins.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::{MethodSig, TypeSig};
use crate::error::CoreError;
use crate::flag::Flag;

/// Where an expectation came from: the accessing unit and, if the unit
/// carried line information, the line of the access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Source {
    pub unit: String,
    pub line: Option<u32>,
}

impl Source {
    pub fn new(unit: impl Into<String>, line: Option<u32>) -> Self {
        Source {
            unit: unit.into(),
            line,
        }
    }

    pub fn at(unit: impl Into<String>, line: u32) -> Self {
        Source::new(unit, Some(line))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.unit, line),
            None => f.write_str(&self.unit),
        }
    }
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

/// A required method. Identity is `name + signature`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodRef {
    pub name: String,
    pub signature: MethodSig,
    #[serde(default)]
    pub flags: BTreeSet<Flag>,
    #[serde(default)]
    pub sources: BTreeSet<Source>,
}

impl MethodRef {
    pub fn new(name: impl Into<String>, signature: MethodSig) -> Self {
        MethodRef {
            name: name.into(),
            signature,
            flags: BTreeSet::new(),
            sources: BTreeSet::new(),
        }
    }

    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.sources.insert(source);
        self
    }

    /// The identity key, e.g. `helper(int)void`.
    pub fn key(&self) -> String {
        format!("{}{}", self.name, self.signature)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    fn absorb(&mut self, other: MethodRef, class_name: &str) -> Result<(), CoreError> {
        if self != &other {
            return Err(CoreError::IllegalMemberMerge {
                class_name: class_name.to_string(),
                left: self.key(),
                right: other.key(),
            });
        }
        self.flags.extend(other.flags);
        self.sources.extend(other.sources);
        Ok(())
    }
}

impl PartialEq for MethodRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.signature == other.signature
    }
}

impl Eq for MethodRef {}

impl std::hash::Hash for MethodRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.signature.hash(state);
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.signature)
    }
}

/// A required field. Identity is `name + type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRef {
    pub name: String,
    pub ty: TypeSig,
    #[serde(default)]
    pub flags: BTreeSet<Flag>,
    #[serde(default)]
    pub sources: BTreeSet<Source>,
    /// Set when the owning unit declares the field itself rather than
    /// only accessing it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub declared: bool,
}

impl FieldRef {
    pub fn new(name: impl Into<String>, ty: TypeSig) -> Self {
        FieldRef {
            name: name.into(),
            ty,
            flags: BTreeSet::new(),
            sources: BTreeSet::new(),
            declared: false,
        }
    }

    /// Marks the field as declared by its owner.
    pub fn declared(mut self) -> Self {
        self.declared = true;
        self
    }

    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.sources.insert(source);
        self
    }

    /// The identity key, e.g. `count:int`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.ty)
    }

    fn absorb(&mut self, other: FieldRef, class_name: &str) -> Result<(), CoreError> {
        if self != &other {
            return Err(CoreError::IllegalMemberMerge {
                class_name: class_name.to_string(),
                left: self.key(),
                right: other.key(),
            });
        }
        self.flags.extend(other.flags);
        self.sources.extend(other.sources);
        self.declared |= other.declared;
        Ok(())
    }
}

impl PartialEq for FieldRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.ty == other.ty
    }
}

impl Eq for FieldRef {}

impl std::hash::Hash for FieldRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.ty.hash(state);
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.ty)
    }
}

// ---------------------------------------------------------------------------
// Reference
// ---------------------------------------------------------------------------

/// Everything required of one symbol.
///
/// Equality ignores sources at every level but does compare the flags of
/// each field and method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_name: Option<String>,
    #[serde(default)]
    pub interfaces: BTreeSet<String>,
    #[serde(default)]
    pub flags: BTreeSet<Flag>,
    /// Keyed by [`FieldRef::key`].
    #[serde(default)]
    pub fields: BTreeMap<String, FieldRef>,
    /// Keyed by [`MethodRef::key`].
    #[serde(default)]
    pub methods: BTreeMap<String, MethodRef>,
    #[serde(default)]
    pub sources: BTreeSet<Source>,
}

impl Reference {
    /// An empty reference: the symbol is required to exist, nothing more.
    pub fn new(class_name: impl Into<String>) -> Self {
        Reference {
            class_name: class_name.into(),
            super_name: None,
            interfaces: BTreeSet::new(),
            flags: BTreeSet::new(),
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
            sources: BTreeSet::new(),
        }
    }

    pub fn builder(class_name: impl Into<String>) -> ReferenceBuilder {
        ReferenceBuilder {
            reference: Reference::new(class_name),
        }
    }

    pub fn method(&self, key: &str) -> Option<&MethodRef> {
        self.methods.get(key)
    }

    pub fn field(&self, key: &str) -> Option<&FieldRef> {
        self.fields.get(key)
    }

    /// Combines two references to the same symbol into a new one.
    ///
    /// Fails with [`CoreError::IllegalMerge`] if the class names differ.
    pub fn merge(&self, other: &Reference) -> Result<Reference, CoreError> {
        let mut merged = self.clone();
        merged.absorb(other.clone())?;
        Ok(merged)
    }

    /// In-place [`merge`](Reference::merge). `self` is left untouched when
    /// the class names differ.
    pub fn absorb(&mut self, other: Reference) -> Result<(), CoreError> {
        if self.class_name != other.class_name {
            return Err(CoreError::IllegalMerge {
                left: self.class_name.clone(),
                right: other.class_name,
            });
        }

        if self.super_name.is_none() {
            self.super_name = other.super_name;
        }
        self.interfaces.extend(other.interfaces);
        self.flags.extend(other.flags);
        self.sources.extend(other.sources);

        for (key, field) in other.fields {
            match self.fields.get_mut(&key) {
                Some(existing) => existing.absorb(field, &self.class_name)?,
                None => {
                    self.fields.insert(key, field);
                }
            }
        }
        for (key, method) in other.methods {
            match self.methods.get_mut(&key) {
                Some(existing) => existing.absorb(method, &self.class_name)?,
                None => {
                    self.methods.insert(key, method);
                }
            }
        }
        Ok(())
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.class_name == other.class_name
            && self.super_name == other.super_name
            && self.interfaces == other.interfaces
            && self.flags == other.flags
            && members_eq(&self.fields, &other.fields, |f| &f.flags)
            && members_eq(&self.methods, &other.methods, |m| &m.flags)
    }
}

impl Eq for Reference {}

fn members_eq<T: PartialEq>(
    left: &BTreeMap<String, T>,
    right: &BTreeMap<String, T>,
    flags: impl Fn(&T) -> &BTreeSet<Flag>,
) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right.iter())
            .all(|((lk, lv), (rk, rv))| lk == rk && lv == rv && flags(lv) == flags(rv))
}

/// Fluent construction of a [`Reference`], mostly for tests and for the
/// collector's self-declarations.
#[derive(Debug, Clone)]
pub struct ReferenceBuilder {
    reference: Reference,
}

impl ReferenceBuilder {
    pub fn super_name(mut self, name: impl Into<String>) -> Self {
        self.reference.super_name = Some(name.into());
        self
    }

    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.reference.interfaces.insert(name.into());
        self
    }

    pub fn interfaces<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference
            .interfaces
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn flag(mut self, flag: Flag) -> Self {
        self.reference.flags.insert(flag);
        self
    }

    pub fn source(mut self, source: Source) -> Self {
        self.reference.sources.insert(source);
        self
    }

    /// Adds a field; a field with the same identity is merged into.
    pub fn field(mut self, field: FieldRef) -> Self {
        match self.reference.fields.get_mut(&field.key()) {
            Some(existing) => {
                existing.flags.extend(field.flags);
                existing.sources.extend(field.sources);
            }
            None => {
                self.reference.fields.insert(field.key(), field);
            }
        }
        self
    }

    /// Adds a method; a method with the same identity is merged into.
    pub fn method(mut self, method: MethodRef) -> Self {
        match self.reference.methods.get_mut(&method.key()) {
            Some(existing) => {
                existing.flags.extend(method.flags);
                existing.sources.extend(method.sources);
            }
            None => {
                self.reference.methods.insert(method.key(), method);
            }
        }
        self
    }

    pub fn build(self) -> Reference {
        self.reference
    }
}
