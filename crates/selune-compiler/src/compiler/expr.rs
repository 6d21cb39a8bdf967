//! Expression lowering
//!
//! Single-value expressions push exactly one value; multi-result
//! expressions (calls, method calls, varargs) take an explicit return
//! count in the `n+1 / 0=all` convention.

use super::state::{Access, CompilerState};
use crate::ast::{Expr, ExprKind, Field, FuncBody, StmtKind};
use crate::error::{CompileError, Result};
use crate::opcode::Opcode;
use crate::program::Constant;

impl CompilerState {
    /// Lower a single-value expression. Multi-result kinds are routed
    /// through `compile_multires` with a count of one value.
    pub(crate) fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Nil => self.add_opcode(Opcode::PushNil),
            ExprKind::True => self.add_opcode(Opcode::PushTrue),
            ExprKind::False => self.add_opcode(Opcode::PushFalse),
            ExprKind::Integer(value) => self.push_int(*value),
            ExprKind::Float(value) => self.push_float(*value),
            ExprKind::Str(bytes) => {
                let index = self.get_const_index(Constant::Bytes(bytes.clone()));
                self.add_opcode(Opcode::PushConst(index));
            }
            ExprKind::Name(name) => {
                self.resolve_variable(name, Access::Read, expr.span)?;
            }
            ExprKind::Dot { base, name } => {
                self.evaluate_single(base)?;
                let key = self.get_const_index(Constant::from_str(name));
                self.add_opcode(Opcode::PushConst(key));
                self.add_opcode(Opcode::GetTable);
            }
            ExprKind::Index { base, key } => {
                self.evaluate_single(base)?;
                self.evaluate_single(key)?;
                self.add_opcode(Opcode::GetTable);
            }
            ExprKind::Binary { op, left, right } => {
                self.evaluate_single(left)?;
                self.evaluate_single(right)?;
                self.add_opcode(Opcode::Binary(*op));
            }
            ExprKind::Unary { op, operand } => {
                self.evaluate_single(operand)?;
                self.add_opcode(Opcode::Unary(*op));
            }
            ExprKind::Paren(inner) => self.evaluate_single(inner)?,
            ExprKind::Function(body) => self.compile_function(body, None)?,
            ExprKind::Table(fields) => self.compile_table(fields)?,
            ExprKind::Varargs | ExprKind::Call { .. } | ExprKind::MethodCall { .. } => {
                self.compile_multires(expr, 2)?;
            }
        }
        Ok(())
    }

    /// Lower a multi-result expression with an explicit return count
    pub(crate) fn compile_multires(&mut self, expr: &Expr, return_count: u8) -> Result<()> {
        match &expr.kind {
            ExprKind::Varargs => {
                if !self.is_variadic() {
                    return Err(CompileError::VarargsOutsideVariadic { span: expr.span });
                }
                self.add_opcode(Opcode::Varargs(return_count));
                Ok(())
            }
            ExprKind::Call { callee, args } => {
                self.evaluate_single(callee)?;
                self.add_opcode(Opcode::MarkStack);
                let params = self.compile_arguments(args, 0)?;
                self.add_opcode(Opcode::Call {
                    params,
                    returns: return_count,
                });
                Ok(())
            }
            ExprKind::MethodCall {
                receiver,
                name,
                args,
            } => {
                // Sample the receiver once; it is both the indexed base and
                // the implicit first argument
                self.evaluate_single(receiver)?;
                let receiver_slot = self.add_temporary();
                self.add_opcode(Opcode::StoreLocal(receiver_slot));

                self.add_opcode(Opcode::LoadLocal(receiver_slot));
                let key = self.get_const_index(Constant::from_str(name));
                self.add_opcode(Opcode::PushConst(key));
                self.add_opcode(Opcode::GetTable);

                self.add_opcode(Opcode::MarkStack);
                self.add_opcode(Opcode::LoadLocal(receiver_slot));
                let params = self.compile_arguments(args, 1)?;
                self.add_opcode(Opcode::Call {
                    params,
                    returns: return_count,
                });

                self.release_locals(receiver_slot, 1);
                Ok(())
            }
            _ => panic!("internal compiler error: expression is not multi-result"),
        }
    }

    /// Evaluate call arguments. `implicit` counts values already pushed
    /// (the method receiver). Returns the `call` param-count operand: a
    /// trailing multi-result argument propagates everything (`0`).
    fn compile_arguments(&mut self, args: &[Expr], implicit: usize) -> Result<u8> {
        let Some((last, init)) = args.split_last() else {
            return Ok((1 + implicit) as u8);
        };

        for arg in init {
            self.evaluate_single(arg)?;
        }
        if last.is_multires() {
            self.compile_multires(last, 0)?;
            Ok(0)
        } else {
            self.evaluate_single(last)?;
            Ok((1 + implicit + args.len()) as u8)
        }
    }

    /// Lower a table constructor, batching runs of positional values into
    /// single `store_list` instructions
    fn compile_table(&mut self, fields: &[Field]) -> Result<()> {
        self.add_opcode(Opcode::CreateTable);
        let table_slot = self.add_temporary();
        self.add_opcode(Opcode::StoreLocal(table_slot));

        let mut pending: u8 = 0;
        for (index, field) in fields.iter().enumerate() {
            match field {
                Field::Keyed { key, value } => {
                    self.flush_positional(table_slot, &mut pending);
                    self.evaluate_single(value)?;
                    self.add_opcode(Opcode::LoadLocal(table_slot));
                    self.evaluate_single(key)?;
                    self.add_opcode(Opcode::SetTable);
                }
                Field::Named { name, value } => {
                    self.flush_positional(table_slot, &mut pending);
                    self.evaluate_single(value)?;
                    self.add_opcode(Opcode::LoadLocal(table_slot));
                    let key = self.get_const_index(Constant::from_str(name));
                    self.add_opcode(Opcode::PushConst(key));
                    self.add_opcode(Opcode::SetTable);
                }
                Field::Positional(value) => {
                    if value.is_multires() && index == fields.len() - 1 {
                        // Trailing producer appends everything it yields
                        self.flush_positional(table_slot, &mut pending);
                        self.add_opcode(Opcode::MarkStack);
                        self.compile_multires(value, 0)?;
                        self.add_opcode(Opcode::LoadLocal(table_slot));
                        self.add_opcode(Opcode::StoreList(0));
                    } else {
                        self.evaluate_single(value)?;
                        pending += 1;
                        if pending == u8::MAX {
                            self.flush_positional(table_slot, &mut pending);
                        }
                    }
                }
            }
        }
        self.flush_positional(table_slot, &mut pending);

        self.add_opcode(Opcode::LoadLocal(table_slot));
        self.release_locals(table_slot, 1);
        Ok(())
    }

    fn flush_positional(&mut self, table_slot: u16, pending: &mut u8) {
        if *pending > 0 {
            self.add_opcode(Opcode::LoadLocal(table_slot));
            self.add_opcode(Opcode::StoreList(*pending));
            *pending = 0;
        }
    }

    /// Lower a function literal into a fresh prototype and (except for the
    /// entry wrapper) emit `closure` in the enclosing prototype
    pub(crate) fn compile_function(&mut self, body: &FuncBody, name: Option<String>) -> Result<()> {
        let name = match name {
            Some(name) => name,
            None => format!("<lambda#{}>", self.next_lambda_index()),
        };

        let proto_index = self.begin_proto(&name, body.params.len() as u16, body.is_variadic);
        self.begin_block();

        if !body.params.is_empty() {
            self.set_linear_mode(true);
            let slots: Vec<u16> = body
                .params
                .iter()
                .map(|param| self.add_locals(param, 1))
                .collect();
            self.set_linear_mode(false);
            for slot in slots {
                self.add_opcode(Opcode::StoreLocal(slot));
            }
        }

        self.compile_block(&body.block)?;
        let ends_with_return = matches!(
            body.block.statements.last(),
            Some(stmt) if matches!(stmt.kind, StmtKind::Return { .. })
        );
        if !ends_with_return {
            self.add_opcode(Opcode::Return(1));
        }

        self.end_block();
        self.end_proto()?;

        if self.depth() > 0 {
            self.add_opcode(Opcode::Closure(proto_index));
        }
        Ok(())
    }
}
