//! Compiler state machine
//!
//! Two nested stacks drive the whole lowering: a stack of prototype frames
//! (one per function being compiled) and, inside each, a stack of lexical
//! block frames. Frames are addressed by index into `frames` so that
//! upvalue-chain construction can touch several levels of the stack without
//! aliasing borrows.
//!
//! Instruction positions may be reserved empty and patched later; every
//! reservation must be resolved before `end_proto`, which is the single
//! point where pending gotos are linked against their labels.

use crate::error::{CompileError, Result};
use crate::opcode::Opcode;
use crate::program::{Constant, LocalVariable, LocalVariableStore, Program, Prototype, Upvalue};
use crate::span::Span;
use std::collections::HashMap;

/// Name of the implicit global-environment upvalue
pub const ENV_NAME: &str = "_ENV";

/// Whether a variable resolution reads or writes the binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A compile-time constant bound to a name by `local x <const> = literal`.
/// No slot is allocated; reads re-emit the literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Nil,
    True,
    False,
    Int(i64),
    Float(f64),
    Str(Vec<u8>),
}

/// One lexical block of the current prototype
struct BlockFrame {
    /// Per-prototype identity, stable after the block closes
    id: usize,
    /// Locals declared in this block, newest innermost
    locals: LocalVariableStore,
    /// Compile-time constant bindings
    const_locals: Vec<(String, ConstValue)>,
    /// Local slots opened as upvalues inside this block; each gets a
    /// `close_upvalue` when the block ends
    opened_upvalues: Vec<u16>,
}

impl BlockFrame {
    fn named_count(&self) -> usize {
        self.locals.iter().filter(|l| l.name.is_some()).count()
    }

    fn const_binding(&self, name: &str) -> Option<&ConstValue> {
        self.const_locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// A label definition awaiting goto linkage
#[derive(Clone)]
struct LabelRecord {
    name: String,
    pc: usize,
    block: usize,
    /// Cumulative named-local count visible at the label; trailing labels
    /// take the parent block's count instead
    active_locals: usize,
}

/// A pending goto, resolved at `end_proto`
struct GotoRecord {
    name: String,
    pc: usize,
    /// Active block chain at the goto, outermost first, with the
    /// cumulative named-local count up to and including each block
    chain: Vec<(usize, usize)>,
    span: Span,
}

/// One function being (or finished being) compiled
struct ProtoFrame {
    name: String,
    fixed_params: u16,
    is_variadic: bool,
    /// Instruction list; `None` entries are reservations awaiting a patch
    ops: Vec<Option<Opcode>>,
    constants: Vec<Constant>,
    const_lookup: HashMap<Constant, u16>,
    /// Locals of blocks that have already closed
    locals: LocalVariableStore,
    /// Slot indices available for reuse
    released: Vec<u16>,
    /// While set, slot allocation bypasses the reuse pool so multi-slot
    /// groups come out contiguous
    linear_mode: bool,
    /// High-water slot count
    num_locals: u16,
    upvalues: Vec<Upvalue>,
    blocks: Vec<BlockFrame>,
    /// Break collectors, one per active enclosing loop
    breaks: Vec<Vec<usize>>,
    labels: Vec<LabelRecord>,
    gotos: Vec<GotoRecord>,
    next_block_id: usize,
    /// Parent block id per block id, for visibility walks after blocks close
    block_parents: Vec<Option<usize>>,
}

impl ProtoFrame {
    fn new(name: String, fixed_params: u16, is_variadic: bool) -> Self {
        Self {
            name,
            fixed_params,
            is_variadic,
            ops: Vec::new(),
            constants: Vec::new(),
            const_lookup: HashMap::new(),
            locals: LocalVariableStore::new(),
            released: Vec::new(),
            linear_mode: false,
            num_locals: 0,
            upvalues: Vec::new(),
            blocks: Vec::new(),
            breaks: Vec::new(),
            labels: Vec::new(),
            gotos: Vec::new(),
            next_block_id: 0,
            block_parents: Vec::new(),
        }
    }

    fn pc(&self) -> usize {
        self.ops.len()
    }

    fn block_mut(&mut self) -> &mut BlockFrame {
        self.blocks
            .last_mut()
            .unwrap_or_else(|| panic!("internal compiler error: no active block"))
    }

    fn next_slot(&mut self) -> u16 {
        if !self.linear_mode {
            if let Some(slot) = self.released.pop() {
                return slot;
            }
        }
        let slot = self.num_locals;
        self.num_locals += 1;
        slot
    }

    fn release_slot(&mut self, slot: u16) {
        if !self.released.contains(&slot) {
            self.released.push(slot);
        }
    }

    fn ensure_upvalue(&mut self, name: &str, is_on_stack: bool) -> u16 {
        if let Some(upvalue) = self.upvalues.iter().find(|u| u.name == name) {
            return upvalue.index;
        }
        let index = self.upvalues.len() as u16;
        self.upvalues.push(Upvalue {
            index,
            name: name.to_string(),
            is_on_stack,
        });
        index
    }

    /// True when `ancestor` is `block` or one of its parents
    fn is_ancestor_or_self(&self, ancestor: usize, block: usize) -> bool {
        let mut current = Some(block);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.block_parents[id];
        }
        false
    }
}

/// The compiler state passed explicitly through every lowering function
pub struct CompilerState {
    frames: Vec<ProtoFrame>,
    proto_stack: Vec<usize>,
    num_lambdas: u32,
}

impl CompilerState {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            proto_stack: Vec::new(),
            num_lambdas: 0,
        }
    }

    fn top(&self) -> &ProtoFrame {
        let index = *self
            .proto_stack
            .last()
            .unwrap_or_else(|| panic!("internal compiler error: no active prototype"));
        &self.frames[index]
    }

    fn top_mut(&mut self) -> &mut ProtoFrame {
        let index = *self
            .proto_stack
            .last()
            .unwrap_or_else(|| panic!("internal compiler error: no active prototype"));
        &mut self.frames[index]
    }

    /// Unique index for the next anonymous function
    pub fn next_lambda_index(&mut self) -> u32 {
        let index = self.num_lambdas;
        self.num_lambdas += 1;
        index
    }

    /// Whether the function currently being compiled declares `...`
    pub fn is_variadic(&self) -> bool {
        self.top().is_variadic
    }

    /// Number of prototypes currently on the stack
    pub fn depth(&self) -> usize {
        self.proto_stack.len()
    }

    // === Prototype stack ===

    pub fn begin_proto(&mut self, name: &str, fixed_params: u16, is_variadic: bool) -> u16 {
        let index = self.frames.len();
        self.frames
            .push(ProtoFrame::new(name.to_string(), fixed_params, is_variadic));
        self.proto_stack.push(index);
        index as u16
    }

    /// Close the current prototype: link every pending goto, verify that
    /// no reserved instruction slot is left unpatched, and pop the frame.
    pub fn end_proto(&mut self) -> Result<()> {
        let index = *self
            .proto_stack
            .last()
            .unwrap_or_else(|| panic!("internal compiler error: no active prototype"));

        self.resolve_gotos(index)?;

        let frame = &self.frames[index];
        for (pc, op) in frame.ops.iter().enumerate() {
            if op.is_none() {
                panic!(
                    "internal compiler error: unresolved opcode placeholder at pc {} in '{}'",
                    pc, frame.name
                );
            }
        }

        self.proto_stack.pop();
        Ok(())
    }

    fn resolve_gotos(&mut self, frame_index: usize) -> Result<()> {
        let frame = &mut self.frames[frame_index];
        let gotos = std::mem::take(&mut frame.gotos);

        for goto in gotos {
            // Innermost chain block owning a matching label wins
            let mut resolved = None;
            for &(block, goto_count) in goto.chain.iter().rev() {
                if let Some(label) = frame
                    .labels
                    .iter()
                    .find(|l| l.name == goto.name && l.block == block)
                {
                    resolved = Some((label.clone(), goto_count));
                    break;
                }
            }

            let (label, goto_count) = resolved.ok_or_else(|| CompileError::LabelNotVisible {
                name: goto.name.clone(),
                span: goto.span,
            })?;

            if label.active_locals > goto_count {
                return Err(CompileError::JumpIntoLocalScope {
                    name: goto.name,
                    span: goto.span,
                });
            }

            let offset = label.pc as i64 - goto.pc as i64;
            frame.ops[goto.pc] = Some(Opcode::Jump(offset as i32));
        }
        Ok(())
    }

    /// Convert every compiled frame into its prototype. Call once, after
    /// the outermost `end_proto`.
    pub fn finish(self) -> Program {
        assert!(
            self.proto_stack.is_empty(),
            "internal compiler error: unbalanced prototype stack"
        );
        let prototypes = self
            .frames
            .into_iter()
            .map(|frame| Prototype {
                name: frame.name,
                fixed_params: frame.fixed_params,
                is_variadic: frame.is_variadic,
                opcodes: frame.ops.into_iter().map(Option::unwrap).collect(),
                constants: frame.constants,
                locals: frame.locals,
                upvalues: frame.upvalues,
                num_locals: frame.num_locals,
            })
            .collect();
        Program { prototypes }
    }

    /// Add the `_ENV` upvalue to the entry prototype if the chunk never
    /// referenced a global
    pub fn ensure_entry_env(&mut self) {
        self.frames[0].ensure_upvalue(ENV_NAME, true);
    }

    // === Block stack ===

    pub fn begin_block(&mut self) {
        let frame = self.top_mut();
        let id = frame.next_block_id;
        frame.next_block_id += 1;
        let parent = frame.blocks.last().map(|b| b.id);
        frame.block_parents.push(parent);
        frame.blocks.push(BlockFrame {
            id,
            locals: LocalVariableStore::new(),
            const_locals: Vec::new(),
            opened_upvalues: Vec::new(),
        });
    }

    /// Close the current block: stamp `end_pc` on its locals, close every
    /// upvalue opened inside it, return its slots to the reuse pool and
    /// merge the descriptors into the prototype store.
    pub fn end_block(&mut self) {
        let frame = self.top_mut();
        let block = frame
            .blocks
            .pop()
            .unwrap_or_else(|| panic!("internal compiler error: unbalanced block stack"));

        let end = frame.pc();
        let mut locals = block.locals;
        for local in locals.iter_mut() {
            local.end_pc = Some(end);
        }

        for slot in block.opened_upvalues {
            frame.ops.push(Some(Opcode::CloseUpvalue(slot)));
        }

        for local in locals.iter() {
            frame.release_slot(local.index);
        }
        frame.locals.merge(locals);
    }

    // === Loops and breaks ===

    pub fn begin_loop(&mut self) {
        self.top_mut().breaks.push(Vec::new());
    }

    /// Patch every break collected by the innermost loop to the current pc
    pub fn end_loop(&mut self) {
        let breaks = self
            .top_mut()
            .breaks
            .pop()
            .unwrap_or_else(|| panic!("internal compiler error: unbalanced loop stack"));
        for pc in breaks {
            self.set_jump(pc);
        }
    }

    pub fn add_break(&mut self, span: Span) -> Result<()> {
        if self.top().breaks.is_empty() {
            return Err(CompileError::BreakOutsideLoop { span });
        }
        let pc = self.reserve_opcode();
        self.top_mut().breaks.last_mut().unwrap().push(pc);
        Ok(())
    }

    // === Instruction emission ===

    pub fn pc(&self) -> usize {
        self.top().pc()
    }

    pub fn add_opcode(&mut self, op: Opcode) {
        self.top_mut().ops.push(Some(op));
    }

    /// Append a placeholder and return its pc for later patching. Every
    /// reservation must be patched before `end_proto`.
    pub fn reserve_opcode(&mut self) -> usize {
        let frame = self.top_mut();
        frame.ops.push(None);
        frame.pc() - 1
    }

    /// Emit a jump from the current pc to `target`
    pub fn add_jump(&mut self, target: usize) {
        let offset = target as i64 - self.pc() as i64;
        self.add_opcode(Opcode::Jump(offset as i32));
    }

    /// Patch the reservation at `at` with a jump to the current pc
    pub fn set_jump(&mut self, at: usize) {
        let target = self.pc();
        self.set_jump_to(at, target);
    }

    /// Patch the reservation at `at` with a jump to `target`
    pub fn set_jump_to(&mut self, at: usize, target: usize) {
        let offset = target as i64 - at as i64;
        self.top_mut().ops[at] = Some(Opcode::Jump(offset as i32));
    }

    // === Constants ===

    /// Deduplicating constant-pool insertion
    pub fn get_const_index(&mut self, constant: Constant) -> u16 {
        let frame = self.top_mut();
        if let Some(&index) = frame.const_lookup.get(&constant) {
            return index;
        }
        let index = frame.constants.len() as u16;
        frame.constants.push(constant.clone());
        frame.const_lookup.insert(constant, index);
        index
    }

    /// Push an integer value
    pub fn push_int(&mut self, value: i64) {
        self.add_opcode(Opcode::PushInt(value));
    }

    /// Push a float value: integral floats ride a dedicated immediate,
    /// fractional / infinite / NaN floats go through the constant pool
    pub fn push_float(&mut self, value: f64) {
        if value.is_finite() && value.fract() == 0.0 && (value as i64) as f64 == value {
            self.add_opcode(Opcode::PushFloat(value as i64));
        } else {
            let index = self.get_const_index(Constant::from_f64(value));
            self.add_opcode(Opcode::PushConst(index));
        }
    }

    /// Push a byte-string through the constant pool
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        let index = self.get_const_index(Constant::Bytes(bytes.to_vec()));
        self.add_opcode(Opcode::PushConst(index));
    }

    /// Re-emit the literal behind a compile-time constant binding
    pub fn push_const_value(&mut self, value: &ConstValue) {
        match value {
            ConstValue::Nil => self.add_opcode(Opcode::PushNil),
            ConstValue::True => self.add_opcode(Opcode::PushTrue),
            ConstValue::False => self.add_opcode(Opcode::PushFalse),
            ConstValue::Int(v) => self.push_int(*v),
            ConstValue::Float(v) => self.push_float(*v),
            ConstValue::Str(bytes) => self.push_bytes(bytes),
        }
    }

    // === Local slots ===

    /// Add one named local followed by `count - 1` temporaries sharing its
    /// start pc. Multi-slot groups allocate fresh contiguous slots in
    /// linear mode; returns the named slot's index.
    pub fn add_locals(&mut self, name: &str, count: u16) -> u16 {
        let pc = self.pc();
        let frame = self.top_mut();

        let was_linear = frame.linear_mode;
        if count > 1 {
            frame.linear_mode = true;
        }

        let first = frame.next_slot();
        frame
            .block_mut()
            .locals
            .add(LocalVariable::new(first, Some(name.to_string()), pc));
        for _ in 1..count {
            let slot = frame.next_slot();
            frame
                .block_mut()
                .locals
                .add(LocalVariable::new(slot, None, pc));
        }

        frame.linear_mode = was_linear;
        first
    }

    /// Allocate one unnamed temporary slot
    pub fn add_temporary(&mut self) -> u16 {
        let pc = self.pc();
        let frame = self.top_mut();
        let slot = frame.next_slot();
        frame
            .block_mut()
            .locals
            .add(LocalVariable::new(slot, None, pc));
        slot
    }

    /// Return `count` slots starting at `first` to the reuse pool.
    /// Tolerates slots that already came back via `end_block`.
    pub fn release_locals(&mut self, first: u16, count: u16) {
        let frame = self.top_mut();
        for slot in first..first + count {
            frame.release_slot(slot);
        }
    }

    /// While enabled, single-slot allocations also bypass the reuse pool.
    /// Used by declarations that need their slots adjacent.
    pub fn set_linear_mode(&mut self, enabled: bool) {
        self.top_mut().linear_mode = enabled;
    }

    /// Mark the innermost binding of `name` as a runtime constant
    pub fn mark_local_const(&mut self, name: &str) {
        if let Some(local) = self.top_mut().block_mut().locals.by_name_mut(name) {
            local.is_const = true;
        }
    }

    /// Bind `name` to a compile-time constant in the current block
    pub fn add_const_local(&mut self, name: &str, value: ConstValue) {
        self.top_mut()
            .block_mut()
            .const_locals
            .push((name.to_string(), value));
    }

    // === Name resolution ===

    /// Resolve `name` and emit the matching load or store. Walks the
    /// prototype stack innermost outward, each prototype's blocks innermost
    /// outward: compile-time constants first, then live locals (forming an
    /// upvalue chain when the owner is an enclosing function), falling back
    /// to a keyed access on the global environment.
    pub fn resolve_variable(&mut self, name: &str, access: Access, span: Span) -> Result<()> {
        let current_pos = self.proto_stack.len() - 1;

        for stack_pos in (0..=current_pos).rev() {
            let frame_index = self.proto_stack[stack_pos];

            for block_pos in (0..self.frames[frame_index].blocks.len()).rev() {
                if let Some(value) =
                    self.frames[frame_index].blocks[block_pos].const_binding(name)
                {
                    if access == Access::Write {
                        return Err(CompileError::ConstReassignment {
                            name: name.to_string(),
                            span,
                        });
                    }
                    let value = value.clone();
                    self.push_const_value(&value);
                    return Ok(());
                }

                let block = &self.frames[frame_index].blocks[block_pos];
                if let Some(local) = block.locals.by_name(name) {
                    let slot = local.index;
                    let is_const = local.is_const;

                    if access == Access::Write && is_const {
                        return Err(CompileError::ConstReassignment {
                            name: name.to_string(),
                            span,
                        });
                    }

                    if stack_pos == current_pos {
                        self.add_opcode(match access {
                            Access::Read => Opcode::LoadLocal(slot),
                            Access::Write => Opcode::StoreLocal(slot),
                        });
                    } else {
                        let index = self.capture_upvalue(stack_pos, block_pos, name, slot);
                        self.add_opcode(match access {
                            Access::Read => Opcode::LoadUpvalue(index),
                            Access::Write => Opcode::StoreUpvalue(index),
                        });
                    }
                    return Ok(());
                }
            }
        }

        // Free name: a key on the global environment
        let env = self.ensure_env();
        let key = self.get_const_index(Constant::from_str(name));
        self.add_opcode(Opcode::LoadUpvalue(env));
        self.add_opcode(Opcode::PushConst(key));
        self.add_opcode(match access {
            Access::Read => Opcode::GetTable,
            Access::Write => Opcode::SetTable,
        });
        Ok(())
    }

    /// Materialize the upvalue chain for a local owned by the prototype at
    /// `owner_pos` (block `owner_block`): the prototype directly inside the
    /// owner captures the stack slot, every deeper one forwards by name.
    /// Returns the upvalue index in the current prototype.
    fn capture_upvalue(
        &mut self,
        owner_pos: usize,
        owner_block: usize,
        name: &str,
        slot: u16,
    ) -> u16 {
        let mut index = 0;
        for pos in owner_pos + 1..self.proto_stack.len() {
            let frame_index = self.proto_stack[pos];
            let is_on_stack = pos == owner_pos + 1;
            index = self.frames[frame_index].ensure_upvalue(name, is_on_stack);
        }

        let owner_frame = self.proto_stack[owner_pos];
        let opened = &mut self.frames[owner_frame].blocks[owner_block].opened_upvalues;
        if !opened.contains(&slot) {
            opened.push(slot);
        }
        index
    }

    /// Thread `_ENV` from the entry prototype down to the current one.
    /// `_ENV` is runtime-managed: it is never opened into a block and never
    /// closed by `close_upvalue`.
    fn ensure_env(&mut self) -> u16 {
        let mut index = 0;
        for pos in 0..self.proto_stack.len() {
            let frame_index = self.proto_stack[pos];
            index = self.frames[frame_index].ensure_upvalue(ENV_NAME, pos == 0);
        }
        index
    }

    // === Labels and gotos ===

    /// Record a label at the current pc. Trailing labels (last statement of
    /// their block) count active locals from the parent block, so a goto
    /// just before `end` stays legal.
    pub fn add_label(&mut self, name: &str, trailing: bool, span: Span) -> Result<()> {
        let frame = self.top_mut();
        let current_block = frame.blocks.last().map(|b| b.id).unwrap_or(0);

        for label in &frame.labels {
            if label.name == name && frame.is_ancestor_or_self(label.block, current_block) {
                return Err(CompileError::LabelDuplicate {
                    name: name.to_string(),
                    span,
                });
            }
        }

        // A trailing label counts locals from the parent block: its own
        // block's locals die at the label, so a goto from before them stays
        // legal. The root block has no parent to fall back to, so a
        // trailing label there still counts its own locals.
        let counted_blocks = if trailing && frame.blocks.len() > 1 {
            frame.blocks.len() - 1
        } else {
            frame.blocks.len()
        };
        let active_locals: usize = frame.blocks[..counted_blocks]
            .iter()
            .map(BlockFrame::named_count)
            .sum();

        let pc = frame.pc();
        frame.labels.push(LabelRecord {
            name: name.to_string(),
            pc,
            block: current_block,
            active_locals,
        });
        Ok(())
    }

    /// Reserve a jump for a goto and snapshot the active block chain with
    /// cumulative named-local counts for resolution at `end_proto`
    pub fn add_goto(&mut self, name: &str, span: Span) {
        let pc = self.reserve_opcode();
        let frame = self.top_mut();

        let mut chain = Vec::with_capacity(frame.blocks.len());
        let mut cumulative = 0;
        for block in &frame.blocks {
            cumulative += block.named_count();
            chain.push((block.id, cumulative));
        }

        frame.gotos.push(GotoRecord {
            name: name.to_string(),
            pc,
            chain,
            span,
        });
    }
}

impl Default for CompilerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_proto() -> CompilerState {
        let mut state = CompilerState::new();
        state.begin_proto("$main", 0, true);
        state.begin_block();
        state
    }

    #[test]
    fn test_constant_dedup() {
        let mut state = state_with_proto();
        let a = state.get_const_index(Constant::Int(1));
        let b = state.get_const_index(Constant::from_str("x"));
        let c = state.get_const_index(Constant::Int(1));
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn test_int_and_float_constants_stay_distinct() {
        let mut state = state_with_proto();
        let int_index = state.get_const_index(Constant::Int(1));
        let float_index = state.get_const_index(Constant::from_f64(1.0));
        assert_ne!(int_index, float_index);
    }

    #[test]
    fn test_slot_reuse_and_linear_mode() {
        let mut state = state_with_proto();
        let a = state.add_temporary();
        state.release_locals(a, 1);
        // Reuse pops the released slot
        assert_eq!(state.add_temporary(), a);

        state.release_locals(a, 1);
        // Linear groups skip the pool and come out contiguous
        let group = state.add_locals("i", 3);
        assert_eq!(group, 1);
        assert_eq!(state.top().num_locals, 4);
    }

    #[test]
    fn test_release_twice_is_harmless() {
        let mut state = state_with_proto();
        let a = state.add_temporary();
        state.release_locals(a, 1);
        state.release_locals(a, 1);
        assert_eq!(state.add_temporary(), a);
        // Pool is empty again: next allocation takes a fresh slot
        assert_eq!(state.add_temporary(), a + 1);
    }

    #[test]
    fn test_break_outside_loop() {
        let mut state = state_with_proto();
        let err = state.add_break(Span::dummy()).unwrap_err();
        assert!(matches!(err, CompileError::BreakOutsideLoop { .. }));
    }

    #[test]
    fn test_jump_patching() {
        let mut state = state_with_proto();
        let at = state.reserve_opcode();
        state.add_opcode(Opcode::PushNil);
        state.add_opcode(Opcode::Pop);
        state.set_jump(at);
        state.add_opcode(Opcode::Return(1));
        state.end_proto().unwrap();
        let program = state.finish();
        assert_eq!(program.entry().opcodes[0], Opcode::Jump(3));
    }

    #[test]
    #[should_panic(expected = "unresolved opcode placeholder")]
    fn test_unpatched_reservation_panics() {
        let mut state = state_with_proto();
        state.reserve_opcode();
        state.end_block();
        state.end_proto().unwrap();
    }

    #[test]
    fn test_env_chain() {
        let mut state = state_with_proto();
        state.begin_proto("inner", 0, false);
        state.begin_block();
        state
            .resolve_variable("print", Access::Read, Span::dummy())
            .unwrap();
        state.end_block();
        state.end_proto().unwrap();
        state.end_block();
        state.end_proto().unwrap();

        let program = state.finish();
        let outer_env = program.prototypes[0].upvalue_by_name(ENV_NAME).unwrap();
        let inner_env = program.prototypes[1].upvalue_by_name(ENV_NAME).unwrap();
        assert!(outer_env.is_on_stack);
        assert!(!inner_env.is_on_stack);
    }
}
