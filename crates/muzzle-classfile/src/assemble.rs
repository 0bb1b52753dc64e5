//! A minimal class-file writer.
//!
//! [`ClassAssembler`] produces real, decodable class files for fixtures:
//! headers, fields, and methods whose bodies are written with a
//! [`CodeBuilder`]. It knows just enough bytecode to express symbol
//! references (field access, invocations, type instructions, class
//! constants, `invokedynamic`). It does not compute stack map frames, so the
//! output is meant for decoding, not for loading into a JVM.
//!
//! Names are given in dotted form (`external.Lib`); array classes are given
//! as descriptors (`[Lexternal.Lib;` or `[Lexternal/Lib;`).

use indexmap::IndexMap;
use muzzle_core::access;
use muzzle_core::names::internal_name;

use crate::constant_pool::tag;
use crate::opcodes;

pub const RETURN: u8 = 0xB1;
pub const ARETURN: u8 = 0xB0;
pub const POP: u8 = 0x57;
pub const ACONST_NULL: u8 = 0x01;
pub const ALOAD_0: u8 = 0x2A;
pub const DUP: u8 = 0x59;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Class(u16),
    NameAndType(u16, u16),
    Member(u8, u16, u16),
    Handle(u8, u16),
    InvokeDynamic(u16, u16),
    Long(i64),
}

#[derive(Debug)]
struct PoolWriter {
    indices: IndexMap<PoolKey, u16>,
    bytes: Vec<u8>,
    next: u16,
}

impl PoolWriter {
    fn new() -> Self {
        PoolWriter {
            indices: IndexMap::new(),
            bytes: Vec::new(),
            next: 1,
        }
    }

    fn intern(&mut self, key: PoolKey) -> u16 {
        if let Some(index) = self.indices.get(&key) {
            return *index;
        }
        let index = self.next;
        match &key {
            PoolKey::Utf8(text) => {
                self.bytes.push(tag::UTF8);
                self.bytes.extend_from_slice(&(text.len() as u16).to_be_bytes());
                self.bytes.extend_from_slice(text.as_bytes());
            }
            PoolKey::Class(name) => {
                self.bytes.push(tag::CLASS);
                self.bytes.extend_from_slice(&name.to_be_bytes());
            }
            PoolKey::NameAndType(name, descriptor) => {
                self.bytes.push(tag::NAME_AND_TYPE);
                self.bytes.extend_from_slice(&name.to_be_bytes());
                self.bytes.extend_from_slice(&descriptor.to_be_bytes());
            }
            PoolKey::Member(member_tag, class, nat) => {
                self.bytes.push(*member_tag);
                self.bytes.extend_from_slice(&class.to_be_bytes());
                self.bytes.extend_from_slice(&nat.to_be_bytes());
            }
            PoolKey::Handle(kind, reference) => {
                self.bytes.push(tag::METHOD_HANDLE);
                self.bytes.push(*kind);
                self.bytes.extend_from_slice(&reference.to_be_bytes());
            }
            PoolKey::InvokeDynamic(bootstrap, nat) => {
                self.bytes.push(tag::INVOKE_DYNAMIC);
                self.bytes.extend_from_slice(&bootstrap.to_be_bytes());
                self.bytes.extend_from_slice(&nat.to_be_bytes());
            }
            PoolKey::Long(value) => {
                self.bytes.push(tag::LONG);
                self.bytes.extend_from_slice(&value.to_be_bytes());
            }
        }
        self.next += if matches!(key, PoolKey::Long(_)) { 2 } else { 1 };
        self.indices.insert(key, index);
        index
    }

    fn utf8(&mut self, text: &str) -> u16 {
        self.intern(PoolKey::Utf8(text.to_string()))
    }

    fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(&internal_name(name));
        self.intern(PoolKey::Class(name))
    }

    fn member(&mut self, member_tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let nat = self.intern(PoolKey::NameAndType(name, descriptor));
        self.intern(PoolKey::Member(member_tag, class, nat))
    }

    fn handle(&mut self, handle: &HandleSpec<'_>) -> u16 {
        let member_tag = match handle.kind {
            1..=4 => tag::FIELD_REF,
            _ if handle.is_interface => tag::INTERFACE_METHOD_REF,
            _ => tag::METHOD_REF,
        };
        let member = self.member(member_tag, handle.owner, handle.name, handle.descriptor);
        self.intern(PoolKey::Handle(handle.kind, member))
    }
}

/// A method handle to place in a bootstrap method or its arguments.
#[derive(Debug, Clone, Copy)]
pub struct HandleSpec<'a> {
    pub kind: u8,
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_interface: bool,
}

impl<'a> HandleSpec<'a> {
    pub fn invoke_static(owner: &'a str, name: &'a str, descriptor: &'a str) -> Self {
        HandleSpec {
            kind: 6,
            owner,
            name,
            descriptor,
            is_interface: false,
        }
    }

    pub fn invoke_virtual(owner: &'a str, name: &'a str, descriptor: &'a str) -> Self {
        HandleSpec {
            kind: 5,
            owner,
            name,
            descriptor,
            is_interface: false,
        }
    }

    pub fn get_field(owner: &'a str, name: &'a str, descriptor: &'a str) -> Self {
        HandleSpec {
            kind: 1,
            owner,
            name,
            descriptor,
            is_interface: false,
        }
    }
}

/// Writes one class file.
#[derive(Debug)]
pub struct ClassAssembler {
    pool: PoolWriter,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<u8>,
    field_count: u16,
    methods: Vec<u8>,
    method_count: u16,
    bootstrap_methods: Vec<(u16, Vec<u16>)>,
}

impl ClassAssembler {
    /// A public class extending `java.lang.Object`.
    pub fn new(name: &str) -> Self {
        let mut pool = PoolWriter::new();
        let this_class = pool.class(name);
        let super_class = pool.class("java.lang.Object");
        ClassAssembler {
            pool,
            access: access::PUBLIC | access::SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            field_count: 0,
            methods: Vec::new(),
            method_count: 0,
            bootstrap_methods: Vec::new(),
        }
    }

    /// A public interface.
    pub fn interface(name: &str) -> Self {
        ClassAssembler::new(name).access(access::PUBLIC | access::INTERFACE | access::ABSTRACT)
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn extends(mut self, name: &str) -> Self {
        self.super_class = self.pool.class(name);
        self
    }

    /// No supertype at all, as for `java.lang.Object` itself.
    pub fn without_super(mut self) -> Self {
        self.super_class = 0;
        self
    }

    pub fn implements(mut self, name: &str) -> Self {
        let index = self.pool.class(name);
        self.interfaces.push(index);
        self
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        self.fields.extend_from_slice(&access.to_be_bytes());
        self.fields.extend_from_slice(&name.to_be_bytes());
        self.fields.extend_from_slice(&descriptor.to_be_bytes());
        self.fields.extend_from_slice(&0u16.to_be_bytes());
        self.field_count += 1;
        self
    }

    /// A method without a body (abstract or native).
    pub fn declare_method(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.write_method_header(access, name, descriptor, 0);
        self
    }

    /// A method whose body is written by `body`.
    pub fn method(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        body: impl FnOnce(&mut CodeBuilder<'_>),
    ) -> Self {
        let (code, lines) = {
            let mut builder = CodeBuilder {
                pool: &mut self.pool,
                bootstrap_methods: &mut self.bootstrap_methods,
                code: Vec::new(),
                lines: Vec::new(),
            };
            body(&mut builder);
            (builder.code, builder.lines)
        };

        let code_name = self.pool.utf8("Code");
        let mut attribute = Vec::new();
        attribute.extend_from_slice(&16u16.to_be_bytes()); // max_stack
        attribute.extend_from_slice(&16u16.to_be_bytes()); // max_locals
        attribute.extend_from_slice(&(code.len() as u32).to_be_bytes());
        attribute.extend_from_slice(&code);
        attribute.extend_from_slice(&0u16.to_be_bytes()); // exception table
        if lines.is_empty() {
            attribute.extend_from_slice(&0u16.to_be_bytes());
        } else {
            let table_name = self.pool.utf8("LineNumberTable");
            attribute.extend_from_slice(&1u16.to_be_bytes());
            attribute.extend_from_slice(&table_name.to_be_bytes());
            attribute.extend_from_slice(&((2 + lines.len() * 4) as u32).to_be_bytes());
            attribute.extend_from_slice(&(lines.len() as u16).to_be_bytes());
            for (pc, line) in &lines {
                attribute.extend_from_slice(&pc.to_be_bytes());
                attribute.extend_from_slice(&line.to_be_bytes());
            }
        }

        self.write_method_header(access, name, descriptor, 1);
        self.methods.extend_from_slice(&code_name.to_be_bytes());
        self.methods
            .extend_from_slice(&(attribute.len() as u32).to_be_bytes());
        self.methods.extend_from_slice(&attribute);
        self
    }

    fn write_method_header(&mut self, access: u16, name: &str, descriptor: &str, attributes: u16) {
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        self.methods.extend_from_slice(&access.to_be_bytes());
        self.methods.extend_from_slice(&name.to_be_bytes());
        self.methods.extend_from_slice(&descriptor.to_be_bytes());
        self.methods.extend_from_slice(&attributes.to_be_bytes());
        self.method_count += 1;
    }

    /// Serializes the class file.
    pub fn finish(mut self) -> Vec<u8> {
        let mut class_attributes = Vec::new();
        let mut class_attribute_count = 0u16;
        if !self.bootstrap_methods.is_empty() {
            let name = self.pool.utf8("BootstrapMethods");
            let mut body = Vec::new();
            body.extend_from_slice(&(self.bootstrap_methods.len() as u16).to_be_bytes());
            for (handle, args) in &self.bootstrap_methods {
                body.extend_from_slice(&handle.to_be_bytes());
                body.extend_from_slice(&(args.len() as u16).to_be_bytes());
                for arg in args {
                    body.extend_from_slice(&arg.to_be_bytes());
                }
            }
            class_attributes.extend_from_slice(&name.to_be_bytes());
            class_attributes.extend_from_slice(&(body.len() as u32).to_be_bytes());
            class_attributes.extend_from_slice(&body);
            class_attribute_count += 1;
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major: Java 8
        out.extend_from_slice(&self.pool.next.to_be_bytes());
        out.extend_from_slice(&self.pool.bytes);
        out.extend_from_slice(&self.access.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }
        out.extend_from_slice(&self.field_count.to_be_bytes());
        out.extend_from_slice(&self.fields);
        out.extend_from_slice(&self.method_count.to_be_bytes());
        out.extend_from_slice(&self.methods);
        out.extend_from_slice(&class_attribute_count.to_be_bytes());
        out.extend_from_slice(&class_attributes);
        out
    }
}

/// Writes the body of one method.
pub struct CodeBuilder<'a> {
    pool: &'a mut PoolWriter,
    bootstrap_methods: &'a mut Vec<(u16, Vec<u16>)>,
    code: Vec<u8>,
    lines: Vec<(u16, u16)>,
}

impl CodeBuilder<'_> {
    /// Starts source line `line` at the next instruction.
    pub fn line(&mut self, line: u16) -> &mut Self {
        self.lines.push((self.code.len() as u16, line));
        self
    }

    /// Emits a raw opcode with no operands (`return`, `pop`, ...).
    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.code.push(opcode);
        self
    }

    /// Emits raw bytes.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    pub fn return_void(&mut self) -> &mut Self {
        self.op(RETURN)
    }

    fn with_u16(&mut self, opcode: u8, operand: u16) -> &mut Self {
        self.code.push(opcode);
        self.code.extend_from_slice(&operand.to_be_bytes());
        self
    }

    fn field_op(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.member(tag::FIELD_REF, owner, name, descriptor);
        self.with_u16(opcode, index)
    }

    pub fn get_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field_op(opcodes::GETFIELD, owner, name, descriptor)
    }

    pub fn put_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field_op(opcodes::PUTFIELD, owner, name, descriptor)
    }

    pub fn get_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field_op(opcodes::GETSTATIC, owner, name, descriptor)
    }

    pub fn put_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field_op(opcodes::PUTSTATIC, owner, name, descriptor)
    }

    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.member(tag::METHOD_REF, owner, name, descriptor);
        self.with_u16(opcodes::INVOKEVIRTUAL, index)
    }

    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.member(tag::METHOD_REF, owner, name, descriptor);
        self.with_u16(opcodes::INVOKESPECIAL, index)
    }

    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.member(tag::METHOD_REF, owner, name, descriptor);
        self.with_u16(opcodes::INVOKESTATIC, index)
    }

    pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self
            .pool
            .member(tag::INTERFACE_METHOD_REF, owner, name, descriptor);
        // count and the zero byte are not checked by the decoder
        self.with_u16(opcodes::INVOKEINTERFACE, index);
        self.code.extend_from_slice(&[1, 0]);
        self
    }

    pub fn new_object(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.with_u16(opcodes::NEW, index)
    }

    pub fn check_cast(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.with_u16(opcodes::CHECKCAST, index)
    }

    pub fn instance_of(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.with_u16(opcodes::INSTANCEOF, index)
    }

    pub fn new_array(&mut self, component: &str) -> &mut Self {
        let index = self.pool.class(component);
        self.with_u16(opcodes::ANEWARRAY, index)
    }

    /// `ldc` (or `ldc_w` for wide indices) of a class constant.
    pub fn ldc_class(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        match u8::try_from(index) {
            Ok(narrow) => {
                self.code.extend_from_slice(&[opcodes::LDC, narrow]);
                self
            }
            Err(_) => self.with_u16(opcodes::LDC_W, index),
        }
    }

    /// `ldc2_w` of a long constant.
    pub fn ldc_long(&mut self, value: i64) -> &mut Self {
        let index = self.pool.intern(PoolKey::Long(value));
        self.with_u16(opcodes::LDC2_W, index)
    }

    pub fn invoke_dynamic(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: HandleSpec<'_>,
        handle_args: &[HandleSpec<'_>],
    ) -> &mut Self {
        let handle = self.pool.handle(&bootstrap);
        let args: Vec<u16> = handle_args.iter().map(|arg| self.pool.handle(arg)).collect();
        let bootstrap_index = self.bootstrap_methods.len() as u16;
        self.bootstrap_methods.push((handle, args));

        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        let nat = self.pool.intern(PoolKey::NameAndType(name, descriptor));
        let index = self
            .pool
            .intern(PoolKey::InvokeDynamic(bootstrap_index, nat));
        self.with_u16(opcodes::INVOKEDYNAMIC, index);
        self.code.extend_from_slice(&[0, 0]);
        self
    }
}
