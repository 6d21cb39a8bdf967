//! Expression-list adjustment
//!
//! Reconciles a producer list with a fixed target count. Multi-result
//! producers take an explicit count in the `n+1 / 0=all` convention; the
//! static protocol here is used by assignments, local declarations and the
//! generic-for header. Every other adjustment is deferred to the VM via the
//! count operand on the multi-result instructions.

use super::state::CompilerState;
use crate::ast::Expr;
use crate::error::Result;
use crate::opcode::Opcode;

impl CompilerState {
    /// Evaluate `expr` for exactly one value
    pub(crate) fn evaluate_single(&mut self, expr: &Expr) -> Result<()> {
        if expr.is_multires() {
            self.compile_multires(expr, 2)
        } else {
            self.compile_expr(expr)
        }
    }

    /// Evaluate `exprs` so that exactly `count` values end up on the stack,
    /// left to right (the last value on top)
    pub(crate) fn adjust_static(&mut self, count: usize, exprs: &[Expr]) -> Result<()> {
        if count == 0 {
            panic!("internal compiler error: static adjustment to a count of zero");
        }

        if exprs.is_empty() {
            for _ in 0..count {
                self.add_opcode(Opcode::PushNil);
            }
            return Ok(());
        }

        let (last, init) = exprs.split_last().unwrap();
        for expr in init {
            self.evaluate_single(expr)?;
        }

        if exprs.len() >= count {
            // Surplus values are still evaluated, then discarded
            self.evaluate_single(last)?;
            for _ in 0..exprs.len() - count {
                self.add_opcode(Opcode::Pop);
            }
        } else {
            let missing = count - exprs.len();
            if last.is_multires() {
                // The producer fills the gap (with nils if it runs short)
                self.compile_multires(last, (2 + missing) as u8)?;
            } else {
                self.evaluate_single(last)?;
                for _ in 0..missing {
                    self.add_opcode(Opcode::PushNil);
                }
            }
        }
        Ok(())
    }
}
