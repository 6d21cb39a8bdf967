//! Human-readable program dump
//!
//! Formats a `Program` as tabular text: per prototype a header, the opcode
//! table with per-instruction comments, then the constant pool, locals and
//! upvalues. Exists for debugging and as the seed for test assertions; the
//! exact spacing is not a stable contract.

use super::{Program, Prototype};
use crate::opcode::{count_str, Opcode};
use std::fmt;
use std::fmt::Write as _;

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, proto) in self.prototypes.iter().enumerate() {
            writeln!(f, "function {}({}) [{}]", proto.name, proto.param_str(), index)?;
            let body = self.proto_str(proto);
            for line in body.lines() {
                if line.is_empty() {
                    writeln!(f)?;
                } else {
                    writeln!(f, "    {}", line)?;
                }
            }
            writeln!(f, "end")?;
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Program {
    fn proto_str(&self, proto: &Prototype) -> String {
        let mut out = String::new();

        for (pc, op) in proto.opcodes.iter().enumerate() {
            let comment = self.comment_str(proto, pc, op);
            let mut row = format!("{:<5} {:<16} {:<8}", pc, op.name(), op.operand_str());
            if !comment.is_empty() {
                write!(row, "; {}", comment).unwrap();
            }
            out.push_str(row.trim_end());
            out.push('\n');
        }
        out.push('\n');

        writeln!(out, "consts({}):", proto.constants.len()).unwrap();
        writeln!(out, "    {:<6} {:<8} value", "index", "type").unwrap();
        for (index, constant) in proto.constants.iter().enumerate() {
            writeln!(out, "    {:<6} {:<8} {}", index, constant.kind_str(), constant).unwrap();
        }
        out.push('\n');

        writeln!(out, "locals({}):", proto.locals.len()).unwrap();
        writeln!(out, "    {:<6} {:<12} {:<6} end", "index", "name", "start").unwrap();
        for local in proto.locals.iter() {
            let end = local
                .end_pc
                .map(|pc| pc.to_string())
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                out,
                "    {:<6} {:<12} {:<6} {}",
                local.index,
                local.display_name(),
                local.start_pc,
                end
            )
            .unwrap();
        }
        out.push('\n');

        writeln!(out, "upvalues({}):", proto.upvalues.len()).unwrap();
        writeln!(out, "    {:<6} {:<12} on-stack", "index", "name").unwrap();
        for upvalue in &proto.upvalues {
            writeln!(
                out,
                "    {:<6} {:<12} {}",
                upvalue.index, upvalue.name, upvalue.is_on_stack
            )
            .unwrap();
        }

        out
    }

    /// The comment column for one instruction
    fn comment_str(&self, proto: &Prototype, pc: usize, op: &Opcode) -> String {
        match op {
            Opcode::PushConst(i) => proto
                .constants
                .get(*i as usize)
                .map(|c| c.to_string())
                .unwrap_or_default(),
            Opcode::LoadLocal(i)
            | Opcode::StoreLocal(i)
            | Opcode::MarkTbc(i)
            | Opcode::CloseUpvalue(i) => proto
                .locals
                .by_index(*i)
                .map(|l| format!("'{}'", l.display_name()))
                .unwrap_or_default(),
            Opcode::LoadUpvalue(i) | Opcode::StoreUpvalue(i) => proto
                .upvalues
                .get(*i as usize)
                .map(|u| format!("'{}'", u.name))
                .unwrap_or_default(),
            Opcode::Jump(offset) => format!("to {}", pc as i64 + *offset as i64),
            Opcode::Call { params, returns } => {
                format!("p:{} r:{}", count_str(*params), count_str(*returns))
            }
            Opcode::Return(count) => format!("r:{}", count_str(*count)),
            Opcode::Varargs(count) => {
                if *count == 0 {
                    "all".to_string()
                } else {
                    format!("{} val", count - 1)
                }
            }
            Opcode::StoreList(count) => {
                if *count == 0 {
                    "all".to_string()
                } else {
                    count.to_string()
                }
            }
            Opcode::Closure(i) => self
                .prototypes
                .get(*i as usize)
                .map(|p| format!("function {}({}) [{}]", p.name, p.param_str(), i))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}
