//! Type signatures parsed from JVM descriptors.
//!
//! [`TypeSig`] is a field type (primitive, object or array) and [`MethodSig`]
//! a method's parameter and return types. Both render with source-like names
//! so mismatch reports read naturally: `helper(int,java.lang.String[])void`.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::CoreError;
use crate::names::{binary_name, internal_name};

/// Primitive types, including `void` (valid only as a method return type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl Primitive {
    fn from_code(code: char) -> Option<Primitive> {
        Some(match code {
            'Z' => Primitive::Boolean,
            'B' => Primitive::Byte,
            'C' => Primitive::Char,
            'S' => Primitive::Short,
            'I' => Primitive::Int,
            'J' => Primitive::Long,
            'F' => Primitive::Float,
            'D' => Primitive::Double,
            'V' => Primitive::Void,
            _ => return None,
        })
    }

    fn code(self) -> char {
        match self {
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
            Primitive::Void => 'V',
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Void => "void",
        }
    }
}

/// A field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeSig {
    Primitive(Primitive),
    /// An object type, by dotted binary name.
    Object(String),
    Array(Box<TypeSig>),
}

impl TypeSig {
    /// Parses a complete field descriptor such as `I`, `Ljava/lang/String;`
    /// or `[[J`.
    pub fn parse(descriptor: &str) -> Result<TypeSig, CoreError> {
        let (sig, rest) = parse_field_type(descriptor, descriptor)?;
        if !rest.is_empty() {
            return Err(invalid(descriptor, "trailing characters"));
        }
        Ok(sig)
    }

    /// Interprets the operand of a class constant: either an internal class
    /// name (`a/b/C`) or, for array classes, a descriptor (`[La/b/C;`).
    pub fn from_class_constant(raw: &str) -> Result<TypeSig, CoreError> {
        if raw.starts_with('[') {
            TypeSig::parse(raw)
        } else if raw.is_empty() {
            Err(invalid(raw, "empty class name"))
        } else {
            Ok(TypeSig::Object(binary_name(raw)))
        }
    }

    /// The element type with every array dimension removed.
    pub fn element(&self) -> &TypeSig {
        let mut current = self;
        while let TypeSig::Array(inner) = current {
            current = inner;
        }
        current
    }

    /// The object class this type mentions, looking through arrays.
    /// Primitives (and arrays of primitives) mention no class.
    pub fn object_name(&self) -> Option<&str> {
        match self.element() {
            TypeSig::Object(name) => Some(name),
            _ => None,
        }
    }

    /// Renders the type back into descriptor form.
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            TypeSig::Primitive(p) => out.push(p.code()),
            TypeSig::Object(name) => {
                out.push('L');
                out.push_str(&internal_name(name));
                out.push(';');
            }
            TypeSig::Array(inner) => {
                out.push('[');
                inner.write_descriptor(out);
            }
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Primitive(p) => f.write_str(p.keyword()),
            TypeSig::Object(name) => f.write_str(name),
            TypeSig::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

/// A method's parameter and return types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodSig {
    pub params: SmallVec<[TypeSig; 4]>,
    pub ret: TypeSig,
}

impl MethodSig {
    /// Parses a method descriptor such as `(I[Ljava/lang/String;)V`.
    pub fn parse(descriptor: &str) -> Result<MethodSig, CoreError> {
        let mut rest = descriptor
            .strip_prefix('(')
            .ok_or_else(|| invalid(descriptor, "expected '('"))?;

        let mut params = SmallVec::new();
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }
            if rest.is_empty() {
                return Err(invalid(descriptor, "unterminated parameter list"));
            }
            let (param, after) = parse_field_type(rest, descriptor)?;
            params.push(param);
            rest = after;
        }

        let ret = if rest == "V" {
            TypeSig::Primitive(Primitive::Void)
        } else {
            TypeSig::parse(rest).map_err(|_| invalid(descriptor, "invalid return type"))?
        };

        Ok(MethodSig { params, ret })
    }

    /// Builds a signature from already-parsed parts.
    pub fn new(params: impl IntoIterator<Item = TypeSig>, ret: TypeSig) -> Self {
        MethodSig {
            params: params.into_iter().collect(),
            ret,
        }
    }

    /// Renders the signature back into descriptor form.
    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for param in &self.params {
            param.write_descriptor(&mut out);
        }
        out.push(')');
        self.ret.write_descriptor(&mut out);
        out
    }

    /// Object classes mentioned by the return type and each parameter, in
    /// that order.
    pub fn referenced_classes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(&self.ret)
            .chain(self.params.iter())
            .filter_map(TypeSig::object_name)
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, "){}", self.ret)
    }
}

fn parse_field_type<'a>(input: &'a str, whole: &str) -> Result<(TypeSig, &'a str), CoreError> {
    let mut chars = input.chars();
    let code = chars
        .next()
        .ok_or_else(|| invalid(whole, "unexpected end of descriptor"))?;
    match code {
        'L' => {
            let body = &input[1..];
            let end = body
                .find(';')
                .ok_or_else(|| invalid(whole, "unterminated class name"))?;
            if end == 0 {
                return Err(invalid(whole, "empty class name"));
            }
            Ok((TypeSig::Object(binary_name(&body[..end])), &body[end + 1..]))
        }
        '[' => {
            let (inner, rest) = parse_field_type(&input[1..], whole)?;
            Ok((TypeSig::Array(Box::new(inner)), rest))
        }
        'V' => Err(invalid(whole, "void is only valid as a return type")),
        other => match Primitive::from_code(other) {
            Some(p) => Ok((TypeSig::Primitive(p), &input[1..])),
            None => Err(invalid(whole, &format!("unknown type code '{other}'"))),
        },
    }
}

fn invalid(descriptor: &str, reason: &str) -> CoreError {
    CoreError::InvalidDescriptor {
        descriptor: descriptor.to_string(),
        reason: reason.to_string(),
    }
}
