//! Class-file decoding into a [`ClassEvent`] stream.
//!
//! Decoding runs in two passes over one buffer. The first pass walks the
//! fixed layout (pool, header, fields, methods, class attributes) and keeps
//! the raw `Code` attribute of each method. The second pass walks each code
//! array once the `BootstrapMethods` attribute is known, emitting line
//! markers and the instructions that mention other types.
//!
//! Stack map frames, local variable tables and every other attribute are
//! skipped. Corrupt input fails with a [`DecodeError`]; a successful decode
//! always starts with a [`ClassEvent::TypeHeader`].

use muzzle_core::names::binary_name;
use muzzle_core::{MethodSig, TypeSig};

use crate::constant_pool::{Constant, ConstantPool, MemberRef};
use crate::error::DecodeError;
use crate::event::{ClassEvent, HandleRef, Instruction, InvokeKind, TypeOp};
use crate::opcodes::{self, instruction_length, operand_u16, LengthError};
use crate::reader::ByteReader;

const MAGIC: u32 = 0xCAFE_BABE;

/// Decodes a unit completely: header, declarations and method bodies.
pub fn decode(bytes: &[u8]) -> Result<Vec<ClassEvent>, DecodeError> {
    decode_unit(bytes, true)
}

/// Decodes only the header, field and method declarations. Method bodies
/// are skipped without being validated.
pub fn decode_headers(bytes: &[u8]) -> Result<Vec<ClassEvent>, DecodeError> {
    decode_unit(bytes, false)
}

struct MethodInfo<'a> {
    name: String,
    sig: MethodSig,
    access: u16,
    code: Option<&'a [u8]>,
}

struct BootstrapMethod {
    handle: u16,
    args: Vec<u16>,
}

fn decode_unit(bytes: &[u8], bodies: bool) -> Result<Vec<ClassEvent>, DecodeError> {
    let mut r = ByteReader::new(bytes);
    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    r.skip(4)?; // minor, major
    let pool = ConstantPool::parse(&mut r)?;

    let access = r.u16()?;
    let this_name = binary_name(pool.class_name(r.u16()?)?);
    let super_name = pool.optional_class_name(r.u16()?)?.map(binary_name);
    let interface_count = r.u16()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(binary_name(pool.class_name(r.u16()?)?));
    }

    let mut events = vec![ClassEvent::TypeHeader {
        name: this_name.clone(),
        super_name,
        interfaces,
        access,
    }];

    let field_count = r.u16()?;
    for _ in 0..field_count {
        let access = r.u16()?;
        let name = pool.utf8(r.u16()?)?.to_string();
        let ty = TypeSig::parse(pool.utf8(r.u16()?)?)?;
        skip_attributes(&mut r)?;
        events.push(ClassEvent::FieldDecl { name, ty, access });
    }

    let method_count = r.u16()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        let access = r.u16()?;
        let name = pool.utf8(r.u16()?)?.to_string();
        let sig = MethodSig::parse(pool.utf8(r.u16()?)?)?;
        let mut code = None;
        let attribute_count = r.u16()?;
        for _ in 0..attribute_count {
            let attribute_name = pool.utf8(r.u16()?)?;
            let len = r.u32()? as usize;
            let body = r.take(len)?;
            if attribute_name == "Code" {
                code = Some(body);
            }
        }
        methods.push(MethodInfo {
            name,
            sig,
            access,
            code,
        });
    }

    let mut bootstrap_methods = Vec::new();
    let attribute_count = r.u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.utf8(r.u16()?)?;
        let len = r.u32()? as usize;
        let body = r.take(len)?;
        if bodies && attribute_name == "BootstrapMethods" {
            bootstrap_methods = parse_bootstrap_methods(body)?;
        }
    }

    for method in methods {
        events.push(ClassEvent::MethodDecl {
            name: method.name.clone(),
            sig: method.sig,
            access: method.access,
        });
        if let (true, Some(code)) = (bodies, method.code) {
            let context = BodyContext {
                pool: &pool,
                bootstrap_methods: &bootstrap_methods,
                method: format!("{}#{}", this_name, method.name),
            };
            context.decode_code_attribute(code, &mut events)?;
        }
    }

    tracing::trace!(
        unit = %this_name,
        constants = pool.len(),
        events = events.len(),
        bodies,
        "decoded unit"
    );
    Ok(events)
}

fn skip_attributes(r: &mut ByteReader<'_>) -> Result<(), DecodeError> {
    let count = r.u16()?;
    for _ in 0..count {
        r.skip(2)?;
        let len = r.u32()? as usize;
        r.skip(len)?;
    }
    Ok(())
}

fn parse_bootstrap_methods(body: &[u8]) -> Result<Vec<BootstrapMethod>, DecodeError> {
    let mut r = ByteReader::new(body);
    let count = r.u16()?;
    let mut methods = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let handle = r.u16()?;
        let arg_count = r.u16()?;
        let mut args = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            args.push(r.u16()?);
        }
        methods.push(BootstrapMethod { handle, args });
    }
    Ok(methods)
}

struct BodyContext<'p> {
    pool: &'p ConstantPool,
    bootstrap_methods: &'p [BootstrapMethod],
    method: String,
}

impl BodyContext<'_> {
    fn decode_code_attribute(
        &self,
        attribute: &[u8],
        events: &mut Vec<ClassEvent>,
    ) -> Result<(), DecodeError> {
        let mut r = ByteReader::new(attribute);
        r.skip(4)?; // max_stack, max_locals
        let code_len = r.u32()? as usize;
        let code = r.take(code_len)?;
        let exception_count = r.u16()? as usize;
        r.skip(exception_count * 8)?;

        let mut lines: Vec<(usize, u32)> = Vec::new();
        let attribute_count = r.u16()?;
        for _ in 0..attribute_count {
            let name = self.pool.utf8(r.u16()?)?;
            let len = r.u32()? as usize;
            let body = r.take(len)?;
            if name == "LineNumberTable" {
                let mut t = ByteReader::new(body);
                let entries = t.u16()?;
                for _ in 0..entries {
                    let start_pc = t.u16()? as usize;
                    let line = t.u16()? as u32;
                    lines.push((start_pc, line));
                }
            }
        }
        lines.sort_by_key(|(pc, _)| *pc);

        let mut next_line = 0;
        let mut pc = 0;
        while pc < code.len() {
            while next_line < lines.len() && lines[next_line].0 <= pc {
                events.push(ClassEvent::LineMarker {
                    line: lines[next_line].1,
                });
                next_line += 1;
            }

            let len = instruction_length(code, pc).map_err(|err| match err {
                LengthError::Unknown(opcode) => DecodeError::UnknownOpcode {
                    method: self.method.clone(),
                    pc,
                    opcode,
                },
                LengthError::Overrun => DecodeError::CodeOverrun {
                    method: self.method.clone(),
                    pc,
                },
            })?;
            if let Some(instruction) = self.instruction_at(code, pc)? {
                events.push(ClassEvent::Instruction(instruction));
            }
            pc += len;
        }
        Ok(())
    }

    fn instruction_at(&self, code: &[u8], pc: usize) -> Result<Option<Instruction>, DecodeError> {
        let op = code[pc];
        let pool_index = || {
            operand_u16(code, pc).ok_or_else(|| DecodeError::CodeOverrun {
                method: self.method.clone(),
                pc,
            })
        };

        let instruction = match op {
            opcodes::GETSTATIC..=opcodes::PUTFIELD => {
                let member = self.pool.member(pool_index()?)?;
                Instruction::FieldAccess {
                    owner: TypeSig::from_class_constant(member.owner)?,
                    name: member.name.to_string(),
                    ty: TypeSig::parse(member.descriptor)?,
                    is_static: matches!(op, opcodes::GETSTATIC | opcodes::PUTSTATIC),
                }
            }
            opcodes::INVOKEVIRTUAL..=opcodes::INVOKEINTERFACE => {
                let kind = match op {
                    opcodes::INVOKEVIRTUAL => InvokeKind::Virtual,
                    opcodes::INVOKESPECIAL => InvokeKind::Special,
                    opcodes::INVOKESTATIC => InvokeKind::Static,
                    _ => InvokeKind::Interface,
                };
                let member = self.pool.member(pool_index()?)?;
                Instruction::MethodInvoke {
                    kind,
                    owner: TypeSig::from_class_constant(member.owner)?,
                    name: member.name.to_string(),
                    sig: MethodSig::parse(member.descriptor)?,
                    is_interface: member.is_interface,
                }
            }
            opcodes::INVOKEDYNAMIC => self.invoke_dynamic(pool_index()?)?,
            opcodes::NEW
            | opcodes::CHECKCAST
            | opcodes::INSTANCEOF
            | opcodes::ANEWARRAY
            | opcodes::MULTIANEWARRAY => {
                let operand = TypeSig::from_class_constant(self.pool.class_name(pool_index()?)?)?;
                let (op, ty) = match op {
                    opcodes::NEW => (TypeOp::New, operand),
                    opcodes::CHECKCAST => (TypeOp::CheckCast, operand),
                    opcodes::INSTANCEOF => (TypeOp::InstanceOf, operand),
                    opcodes::ANEWARRAY => (TypeOp::NewArray, TypeSig::Array(Box::new(operand))),
                    _ => (TypeOp::MultiNewArray, operand),
                };
                Instruction::TypeRef { op, ty }
            }
            opcodes::LDC | opcodes::LDC_W => {
                let index = if op == opcodes::LDC {
                    u16::from(code[pc + 1])
                } else {
                    pool_index()?
                };
                match self.pool.get(index) {
                    Some(Constant::Class { .. }) => Instruction::LoadType {
                        ty: TypeSig::from_class_constant(self.pool.class_name(index)?)?,
                    },
                    _ => return Ok(None),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(instruction))
    }

    fn invoke_dynamic(&self, index: u16) -> Result<Instruction, DecodeError> {
        let (bootstrap_index, name, descriptor) = self.pool.invoke_dynamic(index)?;
        let bootstrap = self
            .bootstrap_methods
            .get(bootstrap_index as usize)
            .ok_or(DecodeError::BadBootstrapIndex {
                index: bootstrap_index,
            })?;

        let mut handle_args = Vec::new();
        for &arg in &bootstrap.args {
            if let Some(Constant::MethodHandle { .. }) = self.pool.get(arg) {
                handle_args.push(self.handle(arg)?);
            }
        }

        Ok(Instruction::InvokeDynamic {
            name: name.to_string(),
            sig: MethodSig::parse(descriptor)?,
            bootstrap: self.handle(bootstrap.handle)?,
            handle_args,
        })
    }

    fn handle(&self, index: u16) -> Result<HandleRef, DecodeError> {
        let (kind, MemberRef {
            owner,
            name,
            descriptor,
            is_interface,
        }) = self.pool.method_handle(index)?;
        Ok(HandleRef {
            kind,
            owner: TypeSig::from_class_constant(owner)?,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_interface,
        })
    }
}
