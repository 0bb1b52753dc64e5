//! Structural events produced by the decoder.
//!
//! A decoded unit is a flat, ordered sequence of [`ClassEvent`]s: one
//! [`ClassEvent::TypeHeader`], then every field declaration, then each method
//! declaration followed by the events of its body. Inside a body,
//! [`ClassEvent::LineMarker`] updates the current line for the instructions
//! that follow it.

use muzzle_core::{MethodSig, TypeSig};

#[derive(Debug, Clone, PartialEq)]
pub enum ClassEvent {
    TypeHeader {
        /// Dotted binary name.
        name: String,
        /// `None` only for `java.lang.Object` (and module-info).
        super_name: Option<String>,
        interfaces: Vec<String>,
        access: u16,
    },
    FieldDecl {
        name: String,
        ty: TypeSig,
        access: u16,
    },
    MethodDecl {
        name: String,
        sig: MethodSig,
        access: u16,
    },
    LineMarker {
        line: u32,
    },
    Instruction(Instruction),
}

/// The four ways a method can be invoked directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Instructions that mention another type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOp {
    New,
    CheckCast,
    InstanceOf,
    /// `anewarray`; the operand type is the array type created.
    NewArray,
    MultiNewArray,
}

/// A method handle constant, as used by `invokedynamic` bootstrap methods
/// and their arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleRef {
    /// Reference kind 1..=9 (`getField` .. `invokeInterface`).
    pub kind: u8,
    pub owner: TypeSig,
    pub name: String,
    /// Raw descriptor: a field descriptor for kinds 1..=4, a method
    /// descriptor for 5..=9.
    pub descriptor: String,
    pub is_interface: bool,
}

impl HandleRef {
    pub const INVOKE_STATIC: u8 = 6;

    /// True for the kinds that target a method (5..=9).
    pub fn is_method(&self) -> bool {
        (5..=9).contains(&self.kind)
    }

    pub fn is_static(&self) -> bool {
        self.kind == Self::INVOKE_STATIC
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `getfield`, `putfield`, `getstatic` or `putstatic`.
    FieldAccess {
        owner: TypeSig,
        name: String,
        ty: TypeSig,
        is_static: bool,
    },
    MethodInvoke {
        kind: InvokeKind,
        owner: TypeSig,
        name: String,
        sig: MethodSig,
        is_interface: bool,
    },
    TypeRef {
        op: TypeOp,
        ty: TypeSig,
    },
    /// `ldc` of a class constant.
    LoadType {
        ty: TypeSig,
    },
    InvokeDynamic {
        name: String,
        sig: MethodSig,
        bootstrap: HandleRef,
        /// Only the method-handle arguments of the bootstrap method.
        handle_args: Vec<HandleRef>,
    },
}
