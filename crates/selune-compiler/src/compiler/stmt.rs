//! Statement lowering
//!
//! Statements mutate the emitter and leave the stack balanced. Control
//! flow is built from reserved jumps patched once their targets are known;
//! loops collect their breaks through the state's break collectors.

use super::state::{Access, CompilerState, ConstValue};
use crate::ast::{AttribName, Block, Expr, ExprKind, FuncBody, FuncName, Stmt, StmtKind};
use crate::error::{CompileError, Result};
use crate::opcode::Opcode;
use crate::program::Constant;
use crate::span::Span;

/// How an assignment target's operands were cached before the value list
/// was evaluated
enum TargetCache {
    /// Plain variable, nothing to cache
    Plain,
    /// Dot access: base sampled into a temporary
    Dot { base: u16 },
    /// Index access with a literal key: only the base is sampled
    IndexConst { base: u16 },
    /// Index access: base and key both sampled
    Index { base: u16, key: u16 },
}

impl CompilerState {
    /// Lower a statement list into the current block. Labels are detected
    /// here so that a label trailing its block (followed only by empty
    /// statements or other labels) is marked as such.
    pub(crate) fn compile_block(&mut self, block: &Block) -> Result<()> {
        for (index, stmt) in block.statements.iter().enumerate() {
            if let StmtKind::Label { name } = &stmt.kind {
                let trailing = block.statements[index + 1..]
                    .iter()
                    .all(|s| matches!(s.kind, StmtKind::Empty | StmtKind::Label { .. }));
                self.add_label(name, trailing, stmt.span)?;
            } else {
                self.compile_stmt(stmt)?;
            }
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Empty => Ok(()),
            StmtKind::Do(block) => {
                self.begin_block();
                self.compile_block(block)?;
                self.end_block();
                Ok(())
            }
            // A call in statement position discards every result
            StmtKind::Call(expr) => self.compile_multires(expr, 1),
            StmtKind::Assign { targets, values } => self.compile_assign(targets, values),
            StmtKind::Local { names, values } => self.compile_local(names, values, stmt.span),
            StmtKind::If {
                condition,
                body,
                elseifs,
                else_body,
            } => self.compile_if(condition, body, elseifs, else_body.as_ref()),
            StmtKind::While { condition, body } => self.compile_while(condition, body),
            StmtKind::Repeat { body, condition } => self.compile_repeat(body, condition),
            StmtKind::NumericFor {
                control,
                initial,
                limit,
                step,
                body,
            } => self.compile_numeric_for(control, initial, limit, step.as_ref(), body),
            StmtKind::GenericFor {
                names,
                values,
                body,
            } => self.compile_generic_for(names, values, body),
            StmtKind::Break => self.add_break(stmt.span),
            StmtKind::Goto { label } => {
                self.add_goto(label, stmt.span);
                Ok(())
            }
            StmtKind::Label { .. } => {
                panic!("internal compiler error: label outside of block lowering")
            }
            StmtKind::Return { values } => self.compile_return(values),
            StmtKind::FunctionDef { name, body } => self.compile_function_def(name, body),
            StmtKind::LocalFunctionDef { name, body } => {
                // The slot is declared first so the function sees itself
                let slot = self.add_locals(name, 1);
                self.compile_function(body, Some(name.clone()))?;
                self.add_opcode(Opcode::StoreLocal(slot));
                Ok(())
            }
        }
    }

    /// Assignment: sample the bases/keys of compound targets, evaluate the
    /// value list, then store into the targets in reverse source order
    fn compile_assign(&mut self, targets: &[Expr], values: &[Expr]) -> Result<()> {
        let mut caches = Vec::with_capacity(targets.len());
        let mut temps: Vec<u16> = Vec::new();

        for target in targets {
            let cache = match &target.kind {
                ExprKind::Name(_) => TargetCache::Plain,
                ExprKind::Dot { base, .. } => {
                    let slot = self.add_temporary();
                    self.evaluate_single(base)?;
                    self.add_opcode(Opcode::StoreLocal(slot));
                    temps.push(slot);
                    TargetCache::Dot { base: slot }
                }
                ExprKind::Index { base, key } => {
                    let base_slot = self.add_temporary();
                    self.evaluate_single(base)?;
                    self.add_opcode(Opcode::StoreLocal(base_slot));
                    temps.push(base_slot);

                    if key.is_constant() {
                        TargetCache::IndexConst { base: base_slot }
                    } else {
                        let key_slot = self.add_temporary();
                        self.evaluate_single(key)?;
                        self.add_opcode(Opcode::StoreLocal(key_slot));
                        temps.push(key_slot);
                        TargetCache::Index {
                            base: base_slot,
                            key: key_slot,
                        }
                    }
                }
                _ => panic!("internal compiler error: illegal assignment target"),
            };
            caches.push(cache);
        }

        self.adjust_static(targets.len(), values)?;

        for (target, cache) in targets.iter().zip(caches.iter()).rev() {
            match (&target.kind, cache) {
                (ExprKind::Name(name), TargetCache::Plain) => {
                    self.resolve_variable(name, Access::Write, target.span)?;
                }
                (ExprKind::Dot { name, .. }, TargetCache::Dot { base }) => {
                    self.add_opcode(Opcode::LoadLocal(*base));
                    let key = self.get_const_index(Constant::from_str(name));
                    self.add_opcode(Opcode::PushConst(key));
                    self.add_opcode(Opcode::SetTable);
                }
                (ExprKind::Index { key, .. }, TargetCache::IndexConst { base }) => {
                    self.evaluate_single(key)?;
                    self.add_opcode(Opcode::LoadLocal(*base));
                    self.add_opcode(Opcode::SetTable);
                }
                (ExprKind::Index { .. }, TargetCache::Index { base, key }) => {
                    self.add_opcode(Opcode::LoadLocal(*key));
                    self.add_opcode(Opcode::LoadLocal(*base));
                    self.add_opcode(Opcode::SetTable);
                }
                _ => panic!("internal compiler error: assignment target/cache mismatch"),
            }
        }

        for slot in temps {
            self.release_locals(slot, 1);
        }
        Ok(())
    }

    /// Local declaration with attribute processing: `<const>` literals
    /// become compile-time bindings, everything else takes a slot
    fn compile_local(&mut self, names: &[AttribName], values: &[Expr], span: Span) -> Result<()> {
        let mut slot_entries: Vec<(usize, bool, bool)> = Vec::new(); // (name idx, const, close)
        let mut const_bindings: Vec<(usize, ConstValue)> = Vec::new();
        let mut has_close = false;

        for (index, attrib) in names.iter().enumerate() {
            match attrib.attribute.as_deref() {
                None => slot_entries.push((index, false, false)),
                Some("close") => {
                    if has_close {
                        return Err(CompileError::TbcDuplication { span });
                    }
                    has_close = true;
                    slot_entries.push((index, false, true));
                }
                Some("const") => match values.get(index) {
                    Some(value) if value.is_constant() => {
                        const_bindings.push((index, const_value_of(value)));
                    }
                    Some(_) => slot_entries.push((index, true, false)),
                    None => const_bindings.push((index, ConstValue::Nil)),
                },
                Some(other) => {
                    return Err(CompileError::UnknownAttribute {
                        attribute: other.to_string(),
                        span: attrib.span,
                    });
                }
            }
        }

        // Captured literals leave the evaluation list
        let exprs: Vec<Expr> = values
            .iter()
            .enumerate()
            .filter(|(index, _)| !const_bindings.iter().any(|(i, _)| i == index))
            .map(|(_, expr)| expr.clone())
            .collect();

        if slot_entries.is_empty() {
            // Nothing takes a slot; leftover expressions still run for
            // their side effects
            for expr in &exprs {
                self.evaluate_single(expr)?;
                self.add_opcode(Opcode::Pop);
            }
        } else {
            self.adjust_static(slot_entries.len(), &exprs)?;

            // Multi-name declarations take contiguous fresh slots so that
            // adjacency-dependent protocols hold; a single name may reuse
            // a released slot
            let contiguous = slot_entries.len() > 1;
            if contiguous {
                self.set_linear_mode(true);
            }
            let slots: Vec<u16> = slot_entries
                .iter()
                .map(|&(index, _, _)| self.add_locals(&names[index].name, 1))
                .collect();
            if contiguous {
                self.set_linear_mode(false);
            }

            let mut tbc_slot = None;
            for (&(index, is_const, is_close), &slot) in
                slot_entries.iter().zip(slots.iter()).rev()
            {
                self.add_opcode(Opcode::StoreLocal(slot));
                if is_const {
                    self.mark_local_const(&names[index].name);
                }
                if is_close {
                    tbc_slot = Some(slot);
                }
            }
            if let Some(slot) = tbc_slot {
                self.add_opcode(Opcode::MarkTbc(slot));
            }
        }

        for (index, value) in const_bindings {
            self.add_const_local(&names[index].name, value);
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        body: &Block,
        elseifs: &[crate::ast::ElseIf],
        else_body: Option<&Block>,
    ) -> Result<()> {
        let mut end_jumps = Vec::new();
        let branch_count = 1 + elseifs.len();

        for (index, (cond, block)) in std::iter::once((condition, body))
            .chain(elseifs.iter().map(|e| (&e.condition, &e.body)))
            .enumerate()
        {
            let has_more = index + 1 < branch_count || else_body.is_some();

            self.evaluate_single(cond)?;
            self.add_opcode(Opcode::Test);
            let escape = self.reserve_opcode();

            self.begin_block();
            self.compile_block(block)?;
            self.end_block();

            if has_more {
                end_jumps.push(self.reserve_opcode());
            }
            self.set_jump(escape);
        }

        if let Some(block) = else_body {
            self.begin_block();
            self.compile_block(block)?;
            self.end_block();
        }

        for jump in end_jumps {
            self.set_jump(jump);
        }
        Ok(())
    }

    fn compile_while(&mut self, condition: &Expr, body: &Block) -> Result<()> {
        let start = self.pc();
        self.evaluate_single(condition)?;
        self.add_opcode(Opcode::Test);
        let escape = self.reserve_opcode();

        self.begin_block();
        self.begin_loop();
        self.compile_block(body)?;
        self.end_block();
        self.add_jump(start);

        self.set_jump(escape);
        self.end_loop();
        Ok(())
    }

    fn compile_repeat(&mut self, body: &Block, condition: &Expr) -> Result<()> {
        self.begin_block();
        self.begin_loop();
        let start = self.pc();

        self.compile_block(body)?;
        // The until condition still sees the body's locals
        self.evaluate_single(condition)?;
        self.add_opcode(Opcode::Test);
        self.add_jump(start);

        self.end_loop();
        self.end_block();
        Ok(())
    }

    fn compile_numeric_for(
        &mut self,
        control: &str,
        initial: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
    ) -> Result<()> {
        self.begin_block();

        // Contiguous control group: control value, limit, step
        let control_slot = self.add_locals(control, 3);

        self.evaluate_single(initial)?;
        self.evaluate_single(limit)?;
        match step {
            Some(expr) => self.evaluate_single(expr)?,
            None => self.push_int(1),
        }
        self.add_opcode(Opcode::PrepareForNum(control_slot));

        let start = self.pc();
        self.add_opcode(Opcode::TestFor(control_slot));
        self.emit_loop_body(body, start)?;

        self.release_locals(control_slot, 3);
        Ok(())
    }

    fn compile_generic_for(&mut self, names: &[String], values: &[Expr], body: &Block) -> Result<()> {
        self.begin_block();

        // Contiguous group: control, state, iterator, to-be-closed closer
        let control = self.add_locals(&names[0], 4);
        let state_slot = control + 1;
        let iterator = control + 2;
        let closer = control + 3;

        let mut named_slots = vec![control];
        for name in &names[1..] {
            named_slots.push(self.add_locals(name, 1));
        }

        self.add_opcode(Opcode::MarkTbc(closer));
        self.adjust_static(4, values)?;
        self.add_opcode(Opcode::PrepareForGen(iterator));

        let start = self.pc();
        self.add_opcode(Opcode::LoadLocal(state_slot));
        self.add_opcode(Opcode::LoadLocal(control));
        self.add_opcode(Opcode::LoadLocal(iterator));
        self.add_opcode(Opcode::Call {
            params: 3,
            returns: (1 + names.len()) as u8,
        });

        // Reverse stores put the first result in the control slot
        for &slot in named_slots.iter().rev() {
            self.add_opcode(Opcode::StoreLocal(slot));
        }

        self.add_opcode(Opcode::LoadLocal(control));
        self.add_opcode(Opcode::TestNil);
        self.emit_loop_body(body, start)?;

        self.release_locals(control, 4);
        Ok(())
    }

    /// Shared tail of both `for` forms: escape reservation, loop body,
    /// back-jump, break patching, block exit. The caller opened the block.
    fn emit_loop_body(&mut self, body: &Block, loop_start: usize) -> Result<()> {
        let escape = self.reserve_opcode();
        self.begin_loop();
        self.compile_block(body)?;
        self.add_jump(loop_start);

        self.set_jump(escape);
        self.end_loop();
        self.end_block();
        Ok(())
    }

    fn compile_return(&mut self, values: &[Expr]) -> Result<()> {
        let Some((last, init)) = values.split_last() else {
            self.add_opcode(Opcode::Return(1));
            return Ok(());
        };

        for expr in init {
            self.evaluate_single(expr)?;
        }
        if last.is_multires() {
            self.compile_multires(last, 0)?;
            self.add_opcode(Opcode::Return(0));
        } else {
            self.evaluate_single(last)?;
            self.add_opcode(Opcode::Return((values.len() + 1) as u8));
        }
        Ok(())
    }

    /// `function a.b.c() … end` / `function a:m() … end`, lowered as an
    /// assignment of a named function to the dotted path
    fn compile_function_def(&mut self, name: &FuncName, body: &FuncBody) -> Result<()> {
        let body = if name.is_method {
            let mut body = body.clone();
            body.params.insert(0, "self".to_string());
            body
        } else {
            body.clone()
        };
        let full_name = name.joined();

        if name.names.len() == 1 {
            self.compile_function(&body, Some(full_name))?;
            self.resolve_variable(&name.names[0], Access::Write, body.span)?;
            return Ok(());
        }

        // Sample the base path before the function value is built, as the
        // assignment protocol requires
        let mut base = Expr::new(ExprKind::Name(name.names[0].clone()), body.span);
        for segment in &name.names[1..name.names.len() - 1] {
            base = Expr::new(
                ExprKind::Dot {
                    base: Box::new(base),
                    name: segment.clone(),
                },
                body.span,
            );
        }
        let last_segment = name.names.last().unwrap();

        let base_slot = self.add_temporary();
        self.evaluate_single(&base)?;
        self.add_opcode(Opcode::StoreLocal(base_slot));

        self.compile_function(&body, Some(full_name))?;

        self.add_opcode(Opcode::LoadLocal(base_slot));
        let key = self.get_const_index(Constant::from_str(last_segment));
        self.add_opcode(Opcode::PushConst(key));
        self.add_opcode(Opcode::SetTable);

        self.release_locals(base_slot, 1);
        Ok(())
    }
}

fn const_value_of(expr: &Expr) -> ConstValue {
    match &expr.kind {
        ExprKind::Nil => ConstValue::Nil,
        ExprKind::True => ConstValue::True,
        ExprKind::False => ConstValue::False,
        ExprKind::Integer(value) => ConstValue::Int(*value),
        ExprKind::Float(value) => ConstValue::Float(*value),
        ExprKind::Str(bytes) => ConstValue::Str(bytes.clone()),
        _ => panic!("internal compiler error: expression is not a compile-time constant"),
    }
}
