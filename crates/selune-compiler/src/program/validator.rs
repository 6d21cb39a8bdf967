//! Program validator — static checks over a compiled program
//!
//! Verifies the machine-checkable output invariants after compilation:
//!
//! 1. **Index ranges** — every constant, local-slot, upvalue, and prototype
//!    reference is in range of its table
//! 2. **Jump targets** — all relative jumps land inside the instruction list
//! 3. **Local ranges** — `start_pc ≤ end_pc ≤ len` for every descriptor
//! 4. **Termination** — every prototype ends with a `return`
//!
//! The validator is advisory: callers are free to ignore the result, and it
//! never short-circuits on the first error.

use super::{Program, Prototype};
use crate::opcode::Opcode;

/// A validation error locating the offending prototype (and instruction)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Index of the prototype the error was found in
    pub proto: usize,
    /// Instruction index, when the error is tied to one
    pub pc: Option<usize>,
    /// What went wrong
    pub kind: ValidationErrorKind,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pc {
            Some(pc) => write!(f, "prototype {} pc {}: {}", self.proto, pc, self.kind),
            None => write!(f, "prototype {}: {}", self.proto, self.kind),
        }
    }
}

/// Kinds of errors the validator can detect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A constant-pool index exceeds the pool size
    ConstantOutOfBounds { index: u16, pool_size: usize },
    /// A local slot index is not below the prototype's high-water mark
    LocalOutOfBounds { index: u16, num_locals: u16 },
    /// An upvalue index exceeds the upvalue list
    UpvalueOutOfBounds { index: u16, count: usize },
    /// A closure references a prototype index outside the program
    PrototypeOutOfBounds { index: u16, count: usize },
    /// A jump target falls outside `[0, instruction count)`
    JumpOutOfBounds { target: i64, len: usize },
    /// A local descriptor range is inverted or exceeds the instruction list
    BadLocalRange {
        slot: u16,
        start_pc: usize,
        end_pc: usize,
        len: usize,
    },
    /// The prototype does not end with `return`
    MissingReturn,
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConstantOutOfBounds { index, pool_size } => {
                write!(f, "constant index {} out of bounds (pool size {})", index, pool_size)
            }
            Self::LocalOutOfBounds { index, num_locals } => {
                write!(f, "local slot {} out of bounds (num_locals {})", index, num_locals)
            }
            Self::UpvalueOutOfBounds { index, count } => {
                write!(f, "upvalue index {} out of bounds (count {})", index, count)
            }
            Self::PrototypeOutOfBounds { index, count } => {
                write!(f, "prototype index {} out of bounds (count {})", index, count)
            }
            Self::JumpOutOfBounds { target, len } => {
                write!(f, "jump target {} out of bounds (len {})", target, len)
            }
            Self::BadLocalRange {
                slot,
                start_pc,
                end_pc,
                len,
            } => write!(
                f,
                "local slot {} has range {}..{} outside 0..{}",
                slot, start_pc, end_pc, len
            ),
            Self::MissingReturn => write!(f, "prototype does not end with return"),
        }
    }
}

/// Validate `program`, collecting every error found
pub fn validate(program: &Program) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (proto_index, proto) in program.prototypes.iter().enumerate() {
        check_instructions(program, proto, proto_index, &mut errors);
        check_local_ranges(proto, proto_index, &mut errors);
        check_terminator(proto, proto_index, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_instructions(
    program: &Program,
    proto: &Prototype,
    proto_index: usize,
    errors: &mut Vec<ValidationError>,
) {
    let len = proto.opcodes.len();
    let mut push = |pc: usize, kind: ValidationErrorKind| {
        errors.push(ValidationError {
            proto: proto_index,
            pc: Some(pc),
            kind,
        });
    };

    for (pc, op) in proto.opcodes.iter().enumerate() {
        match *op {
            Opcode::PushConst(index) => {
                if index as usize >= proto.constants.len() {
                    push(
                        pc,
                        ValidationErrorKind::ConstantOutOfBounds {
                            index,
                            pool_size: proto.constants.len(),
                        },
                    );
                }
            }
            Opcode::LoadLocal(index)
            | Opcode::StoreLocal(index)
            | Opcode::MarkTbc(index)
            | Opcode::CloseUpvalue(index)
            | Opcode::TestFor(index)
            | Opcode::PrepareForNum(index)
            | Opcode::PrepareForGen(index) => {
                if index >= proto.num_locals {
                    push(
                        pc,
                        ValidationErrorKind::LocalOutOfBounds {
                            index,
                            num_locals: proto.num_locals,
                        },
                    );
                }
            }
            Opcode::LoadUpvalue(index) | Opcode::StoreUpvalue(index) => {
                if index as usize >= proto.upvalues.len() {
                    push(
                        pc,
                        ValidationErrorKind::UpvalueOutOfBounds {
                            index,
                            count: proto.upvalues.len(),
                        },
                    );
                }
            }
            Opcode::Closure(index) => {
                if index as usize >= program.prototypes.len() {
                    push(
                        pc,
                        ValidationErrorKind::PrototypeOutOfBounds {
                            index,
                            count: program.prototypes.len(),
                        },
                    );
                }
            }
            Opcode::Jump(offset) => {
                let target = pc as i64 + offset as i64;
                if target < 0 || target as usize >= len {
                    push(pc, ValidationErrorKind::JumpOutOfBounds { target, len });
                }
            }
            _ => {}
        }
    }
}

fn check_local_ranges(proto: &Prototype, proto_index: usize, errors: &mut Vec<ValidationError>) {
    let len = proto.opcodes.len();
    for local in proto.locals.iter() {
        let end_pc = local.end_pc.unwrap_or(len);
        if local.start_pc > end_pc || end_pc > len {
            errors.push(ValidationError {
                proto: proto_index,
                pc: None,
                kind: ValidationErrorKind::BadLocalRange {
                    slot: local.index,
                    start_pc: local.start_pc,
                    end_pc,
                    len,
                },
            });
        }
    }
}

fn check_terminator(proto: &Prototype, proto_index: usize, errors: &mut Vec<ValidationError>) {
    // Block exits may close upvalues after the final return; skip those
    let last_effective = proto
        .opcodes
        .iter()
        .rev()
        .find(|op| !matches!(op, Opcode::CloseUpvalue(_)));
    if !matches!(last_effective, Some(Opcode::Return(_))) {
        errors.push(ValidationError {
            proto: proto_index,
            pc: None,
            kind: ValidationErrorKind::MissingReturn,
        });
    }
}
