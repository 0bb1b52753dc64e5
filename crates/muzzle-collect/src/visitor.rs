//! Folds the event stream of one unit into the references it makes.
//!
//! The fold is stateless across units: everything it learns goes into a
//! [`UnitReferences`], which the collector merges into the graph.

use indexmap::{IndexMap, IndexSet};
use muzzle_classfile::{ClassEvent, HandleRef, Instruction, InvokeKind};
use muzzle_core::{
    CoreError, FieldRef, Flag, MethodRef, MethodSig, Reference, Source, TypeSig,
};

use crate::config::CollectorConfig;
use crate::visibility::Accessor;

/// What one unit references.
#[derive(Debug, Default)]
pub struct UnitReferences {
    /// Keyed by class name, in discovery order.
    pub references: IndexMap<String, Reference>,
    /// Internal names this unit mentions.
    pub helper_classes: IndexSet<String>,
    /// Internal names this unit extends or implements.
    pub helper_supers: IndexSet<String>,
}

pub(crate) struct UnitVisitor<'a> {
    config: &'a CollectorConfig,
    is_internal: &'a dyn Fn(&str) -> bool,
    accessor: Accessor,
    is_advice: bool,
    line: Option<u32>,
    out: UnitReferences,
}

impl<'a> UnitVisitor<'a> {
    pub(crate) fn new(
        config: &'a CollectorConfig,
        is_internal: &'a dyn Fn(&str) -> bool,
        accessor: Accessor,
        is_advice: bool,
    ) -> Self {
        UnitVisitor {
            config,
            is_internal,
            accessor,
            is_advice,
            line: None,
            out: UnitReferences::default(),
        }
    }

    pub(crate) fn visit_all(mut self, events: &[ClassEvent]) -> Result<UnitReferences, CoreError> {
        for event in events {
            self.visit(event)?;
        }
        Ok(self.out)
    }

    fn unit(&self) -> &str {
        &self.accessor.name
    }

    fn source(&self) -> Source {
        Source::new(self.unit(), self.line)
    }

    fn declaration_source(&self) -> Source {
        Source::new(self.unit(), None)
    }

    fn visit(&mut self, event: &ClassEvent) -> Result<(), CoreError> {
        match event {
            ClassEvent::TypeHeader {
                super_name,
                interfaces,
                access,
                ..
            } => {
                // advice code is inlined into the target, its own shape is no constraint
                if self.is_advice {
                    return Ok(());
                }
                let source = self.declaration_source();
                for parent in super_name.iter().chain(interfaces) {
                    self.add_extends(Reference::builder(parent).source(source.clone()).build())?;
                }
                let mut own = Reference::builder(self.unit())
                    .source(source)
                    .interfaces(interfaces.iter().cloned())
                    .flag(Flag::manifestation_of(*access));
                if let Some(parent) = super_name {
                    own = own.super_name(parent);
                }
                self.add(own.build())
            }
            ClassEvent::FieldDecl { name, ty, access } => {
                if self.is_advice {
                    return Ok(());
                }
                let field = FieldRef::new(name.as_str(), ty.clone())
                    .with_flag(Flag::visibility_of(*access))
                    .with_flag(Flag::ownership_of(*access))
                    .declared();
                let own = Reference::builder(self.unit())
                    .source(self.declaration_source())
                    .field(field)
                    .build();
                self.add(own)
            }
            ClassEvent::MethodDecl { name, sig, access } => {
                self.line = None;
                if self.is_advice || !declares_overridable(name, *access) {
                    return Ok(());
                }
                let method = MethodRef::new(name.as_str(), sig.clone())
                    .with_flag(Flag::visibility_of(*access))
                    .with_flag(Flag::ownership_of(*access))
                    .with_flag(Flag::manifestation_of(*access));
                let own = Reference::builder(self.unit())
                    .source(self.declaration_source())
                    .method(method)
                    .build();
                self.add(own)
            }
            ClassEvent::LineMarker { line } => {
                self.line = Some(*line);
                Ok(())
            }
            ClassEvent::Instruction(instruction) => self.visit_instruction(instruction),
        }
    }

    fn visit_instruction(&mut self, instruction: &Instruction) -> Result<(), CoreError> {
        match instruction {
            Instruction::FieldAccess {
                owner,
                name,
                ty,
                is_static,
            } => {
                let Some(owner) = owner.object_name() else {
                    return Ok(());
                };
                let access = self.accessor.minimum_access(owner);
                let field = FieldRef::new(name.as_str(), ty.clone())
                    .with_flag(access)
                    .with_flag(ownership(*is_static))
                    .with_source(self.source());
                let owner_ref = Reference::builder(owner)
                    .source(self.source())
                    .flag(access)
                    .field(field)
                    .build();
                self.add(owner_ref)?;
                self.add_type(ty)
            }
            Instruction::MethodInvoke {
                kind,
                owner,
                name,
                sig,
                is_interface,
            } => {
                // methods of primitive arrays such as int[].clone()
                let TypeSig::Object(owner) = owner.element() else {
                    return Ok(());
                };
                self.add_signature_types(sig)?;
                let access = self.accessor.minimum_access(owner);
                let method = MethodRef::new(name.as_str(), sig.clone())
                    .with_flag(ownership(*kind == InvokeKind::Static))
                    .with_flag(access)
                    .with_source(self.source());
                let manifestation = if *is_interface {
                    Flag::Interface
                } else {
                    Flag::NonInterface
                };
                let owner_ref = Reference::builder(owner.as_str())
                    .source(self.source())
                    .flag(manifestation)
                    .flag(access)
                    .method(method)
                    .build();
                self.add(owner_ref)
            }
            Instruction::TypeRef { ty, .. } | Instruction::LoadType { ty } => self.add_type(ty),
            Instruction::InvokeDynamic {
                bootstrap,
                handle_args,
                ..
            } => {
                if let Some(owner) = bootstrap.owner.object_name() {
                    let access = self.accessor.minimum_access(owner);
                    let bootstrap_ref = Reference::builder(owner)
                        .source(self.source())
                        .flag(access)
                        .build();
                    self.add(bootstrap_ref)?;
                }
                for handle in handle_args.iter().filter(|h| h.is_method()) {
                    self.add_handle(handle)?;
                }
                Ok(())
            }
        }
    }

    fn add_handle(&mut self, handle: &HandleRef) -> Result<(), CoreError> {
        let Some(owner) = handle.owner.object_name() else {
            return Ok(());
        };
        let access = self.accessor.minimum_access(owner);
        let method = MethodRef::new(handle.name.as_str(), MethodSig::parse(&handle.descriptor)?)
            .with_flag(ownership(handle.is_static()))
            .with_flag(access)
            .with_source(self.source());
        let owner_ref = Reference::builder(owner)
            .source(self.source())
            .flag(access)
            .method(method)
            .build();
        self.add(owner_ref)
    }

    fn add_signature_types(&mut self, sig: &MethodSig) -> Result<(), CoreError> {
        for name in sig.referenced_classes() {
            self.add_class(name)?;
        }
        Ok(())
    }

    /// References the element class of `ty`, if it has one.
    fn add_type(&mut self, ty: &TypeSig) -> Result<(), CoreError> {
        match ty.object_name() {
            Some(name) => self.add_class(name),
            None => Ok(()),
        }
    }

    fn add_class(&mut self, name: &str) -> Result<(), CoreError> {
        let reference = Reference::builder(name)
            .source(self.source())
            .flag(self.accessor.minimum_access(name))
            .build();
        self.add(reference)
    }

    fn add_extends(&mut self, reference: Reference) -> Result<(), CoreError> {
        if (self.is_internal)(&reference.class_name) {
            self.out.helper_supers.insert(reference.class_name.clone());
        }
        self.add(reference)
    }

    fn add(&mut self, reference: Reference) -> Result<(), CoreError> {
        let name = reference.class_name.clone();
        if self.is_advice && name == self.accessor.name {
            return Ok(());
        }
        if (self.is_internal)(&name) {
            self.out.helper_classes.insert(name.clone());
        }
        if self.config.is_platform(&name) {
            return Ok(());
        }
        match self.out.references.get_mut(&name) {
            Some(existing) => existing.absorb(reference),
            None => {
                self.out.references.insert(name, reference);
                Ok(())
            }
        }
    }
}

fn ownership(is_static: bool) -> Flag {
    if is_static {
        Flag::Static
    } else {
        Flag::NonStatic
    }
}

/// Declared methods that describe the unit's shape to its subtypes.
fn declares_overridable(name: &str, access: u16) -> bool {
    name != "<init>"
        && name != "<clinit>"
        && !Flag::Private.matches(access)
        && !Flag::Static.matches(access)
}
