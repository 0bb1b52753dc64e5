//! Resolved declarations of one type in an environment.

use indexmap::IndexMap;
use muzzle_classfile::ClassEvent;
use muzzle_core::{access, MethodSig, Primitive, TypeSig};
use serde::Serialize;

/// The root of every class hierarchy.
pub const OBJECT: &str = "java.lang.Object";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclaredMethod {
    pub name: String,
    pub sig: MethodSig,
    pub access: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclaredField {
    pub name: String,
    pub ty: TypeSig,
    pub access: u16,
}

/// The declared shape of a type: its access mask, its direct supertypes
/// and the members it declares itself. Inherited members live on the
/// supertypes' own shapes, which are resolved separately and on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shape {
    pub name: String,
    pub access: u16,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    /// Keyed like `FieldRef::key`, e.g. `count:int`.
    fields: IndexMap<String, DeclaredField>,
    /// Keyed like `MethodRef::key`, e.g. `helper()void`.
    methods: IndexMap<String, DeclaredMethod>,
}

impl Shape {
    /// Builds a shape from a header-only event stream. Returns `None` when
    /// the stream does not start with a type header.
    pub fn from_events(events: &[ClassEvent]) -> Option<Shape> {
        let mut events = events.iter();
        let mut shape = match events.next()? {
            ClassEvent::TypeHeader {
                name,
                super_name,
                interfaces,
                access,
            } => Shape {
                name: name.clone(),
                access: *access,
                super_name: super_name.clone(),
                interfaces: interfaces.clone(),
                fields: IndexMap::new(),
                methods: IndexMap::new(),
            },
            _ => return None,
        };
        for event in events {
            match event {
                ClassEvent::FieldDecl { name, ty, access } => {
                    shape.fields.insert(
                        format!("{name}:{ty}"),
                        DeclaredField {
                            name: name.clone(),
                            ty: ty.clone(),
                            access: *access,
                        },
                    );
                }
                ClassEvent::MethodDecl { name, sig, access } => {
                    shape.methods.insert(
                        format!("{name}{sig}"),
                        DeclaredMethod {
                            name: name.clone(),
                            sig: sig.clone(),
                            access: *access,
                        },
                    );
                }
                _ => {}
            }
        }
        Some(shape)
    }

    /// The shape of `java.lang.Object`, for environments that leave the
    /// platform classes to a runtime they do not expose.
    pub fn platform_object() -> Shape {
        use access::{FINAL, NATIVE, PROTECTED, PUBLIC};
        use Primitive::{Boolean, Int, Long, Void};

        let object = || TypeSig::Object(OBJECT.to_string());
        let class = TypeSig::Object("java.lang.Class".to_string());
        let string = TypeSig::Object("java.lang.String".to_string());
        let void = TypeSig::Primitive(Void);
        let methods = [
            (PUBLIC, "<init>", vec![], void.clone()),
            (PUBLIC | FINAL | NATIVE, "getClass", vec![], class),
            (PUBLIC | NATIVE, "hashCode", vec![], TypeSig::Primitive(Int)),
            (PUBLIC, "equals", vec![object()], TypeSig::Primitive(Boolean)),
            (PROTECTED | NATIVE, "clone", vec![], object()),
            (PUBLIC, "toString", vec![], string),
            (PUBLIC | FINAL | NATIVE, "notify", vec![], void.clone()),
            (PUBLIC | FINAL | NATIVE, "notifyAll", vec![], void.clone()),
            (PUBLIC | FINAL, "wait", vec![], void.clone()),
            (PUBLIC | FINAL | NATIVE, "wait", vec![TypeSig::Primitive(Long)], void.clone()),
            (
                PUBLIC | FINAL,
                "wait",
                vec![TypeSig::Primitive(Long), TypeSig::Primitive(Int)],
                void.clone(),
            ),
            (PROTECTED, "finalize", vec![], void),
        ];

        let mut shape = Shape {
            name: OBJECT.to_string(),
            access: PUBLIC | access::SUPER,
            super_name: None,
            interfaces: Vec::new(),
            fields: IndexMap::new(),
            methods: IndexMap::new(),
        };
        for (access, name, params, ret) in methods {
            let sig = MethodSig::new(params, ret);
            shape.methods.insert(
                format!("{name}{sig}"),
                DeclaredMethod {
                    name: name.to_string(),
                    sig,
                    access,
                },
            );
        }
        shape
    }

    pub fn method(&self, key: &str) -> Option<&DeclaredMethod> {
        self.methods.get(key)
    }

    pub fn field(&self, key: &str) -> Option<&DeclaredField> {
        self.fields.get(key)
    }

    pub fn methods(&self) -> impl Iterator<Item = &DeclaredMethod> {
        self.methods.values()
    }

    pub fn fields(&self) -> impl Iterator<Item = &DeclaredField> {
        self.fields.values()
    }

    /// Direct supertypes in lookup order: superclass, then interfaces.
    pub fn supertypes(&self) -> impl Iterator<Item = &str> {
        self.super_name
            .iter()
            .chain(&self.interfaces)
            .map(String::as_str)
    }

    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }
}
