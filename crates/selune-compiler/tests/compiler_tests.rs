//! Lowering integration tests
//!
//! Compiles small sources end to end and checks the emitted instruction
//! streams, constant pools and error cases.

use pretty_assertions::assert_eq;
use selune_compiler::ast::BinaryOp;
use selune_compiler::{validate, CompileError, Compiler, Constant, Opcode, Program};

fn compile(source: &str) -> Program {
    let program = Compiler::new().compile(source).expect("compilation failed");
    validate(&program).expect("validator rejected compiled program");
    program
}

fn compile_err(source: &str) -> CompileError {
    Compiler::new()
        .compile(source)
        .expect_err("expected a compilation error")
}

// ============================================================================
// Assignment and locals
// ============================================================================

#[test]
fn test_local_and_global_assignment() {
    let program = compile("x = 1; local y = 2");
    let main = program.entry();

    // The entry prototype owns _ENV as upvalue 0, on the stack
    let env = main.upvalue_by_name("_ENV").expect("missing _ENV");
    assert_eq!(env.index, 0);
    assert!(env.is_on_stack);

    assert_eq!(
        main.opcodes,
        vec![
            Opcode::PushInt(1),
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(0),
            Opcode::SetTable,
            Opcode::PushInt(2),
            Opcode::StoreLocal(0),
            Opcode::Return(1),
        ]
    );
    assert_eq!(main.constants, vec![Constant::from_str("x")]);

    let y = main.locals.by_name("y").expect("missing local y");
    assert_eq!(y.index, 0);
}

#[test]
fn test_dot_assignment_caches_base() {
    let program = compile("a.b = 1");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            // base sampled into a temporary before the value list runs
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(0),
            Opcode::GetTable,
            Opcode::StoreLocal(0),
            Opcode::PushInt(1),
            Opcode::LoadLocal(0),
            Opcode::PushConst(1),
            Opcode::SetTable,
            Opcode::Return(1),
        ]
    );
    assert_eq!(
        main.constants,
        vec![Constant::from_str("a"), Constant::from_str("b")]
    );
}

#[test]
fn test_index_assignment_with_nonconstant_key_caches_key() {
    let program = compile("t[k] = 1");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(0), // "t"
            Opcode::GetTable,
            Opcode::StoreLocal(0),
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(1), // "k"
            Opcode::GetTable,
            Opcode::StoreLocal(1),
            Opcode::PushInt(1),
            Opcode::LoadLocal(1), // cached key
            Opcode::LoadLocal(0), // cached base
            Opcode::SetTable,
            Opcode::Return(1),
        ]
    );
}

#[test]
fn test_index_assignment_with_literal_key_evaluates_key_inline() {
    let program = compile("t[1] = 2");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(0),
            Opcode::GetTable,
            Opcode::StoreLocal(0),
            Opcode::PushInt(2),
            Opcode::PushInt(1), // literal key, no temporary
            Opcode::LoadLocal(0),
            Opcode::SetTable,
            Opcode::Return(1),
        ]
    );
}

#[test]
fn test_swap_assignment_stores_in_reverse() {
    let program = compile("local a, b = 1, 2 a, b = b, a");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::PushInt(1),
            Opcode::PushInt(2),
            Opcode::StoreLocal(1), // b
            Opcode::StoreLocal(0), // a
            Opcode::LoadLocal(1),
            Opcode::LoadLocal(0),
            Opcode::StoreLocal(1), // reverse target order: b first
            Opcode::StoreLocal(0),
            Opcode::Return(1),
        ]
    );
}

#[test]
fn test_multi_return_adjustment() {
    let program = compile("local a, b, c = f()");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(0),
            Opcode::GetTable,
            Opcode::MarkStack,
            // exactly three values requested from the call
            Opcode::Call {
                params: 1,
                returns: 4
            },
            // stores in reverse order, no push_nil
            Opcode::StoreLocal(2),
            Opcode::StoreLocal(1),
            Opcode::StoreLocal(0),
            Opcode::Return(1),
        ]
    );
}

#[test]
fn test_short_value_list_pads_with_nil() {
    let program = compile("local a, b, c = 1");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::PushInt(1),
            Opcode::PushNil,
            Opcode::PushNil,
            Opcode::StoreLocal(2),
            Opcode::StoreLocal(1),
            Opcode::StoreLocal(0),
            Opcode::Return(1),
        ]
    );
}

#[test]
fn test_surplus_values_are_popped() {
    let program = compile("local a = 1, 2, 3");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::PushInt(1),
            Opcode::PushInt(2),
            Opcode::PushInt(3),
            Opcode::Pop,
            Opcode::Pop,
            Opcode::StoreLocal(0),
            Opcode::Return(1),
        ]
    );
}

#[test]
fn test_parenthesized_call_truncates_to_one_value() {
    let program = compile("local a = (f())");
    let main = program.entry();
    assert!(main.opcodes.contains(&Opcode::Call {
        params: 1,
        returns: 2
    }));
    assert!(!main.opcodes.contains(&Opcode::PushNil));
}

// ============================================================================
// Constant handling
// ============================================================================

#[test]
fn test_const_folding() {
    let program = compile("local x = 2 + 3");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::PushInt(5),
            Opcode::StoreLocal(0),
            Opcode::Return(1),
        ]
    );
    assert!(!main
        .opcodes
        .iter()
        .any(|op| matches!(op, Opcode::Binary(BinaryOp::Add))));
}

#[test]
fn test_unfoldable_arithmetic_emits_operator() {
    let program = compile("local x = 1 // 0");
    assert!(program
        .entry()
        .opcodes
        .contains(&Opcode::Binary(BinaryOp::IDiv)));
}

#[test]
fn test_constant_pool_dedup() {
    let program = compile(r#"x = "k"; y = "k"; z = "k""#);
    let main = program.entry();
    let strings = main
        .constants
        .iter()
        .filter(|c| matches!(c, Constant::Bytes(_)))
        .count();
    // "k" deduplicates; "x", "y", "z" are distinct keys
    assert_eq!(strings, 4);
}

#[test]
fn test_integer_and_float_stay_distinct() {
    let program = compile("local a = 3 local b = 3.0 local c = 2.5");
    let main = program.entry();
    assert!(main.opcodes.contains(&Opcode::PushInt(3)));
    assert!(main.opcodes.contains(&Opcode::PushFloat(3)));
    // fractional floats go through the pool
    assert!(main.constants.contains(&Constant::from_f64(2.5)));
}

#[test]
fn test_compile_time_const_binding_takes_no_slot() {
    let program = compile("local x <const> = 5 local y = x");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::PushInt(5), // the binding re-emits its literal
            Opcode::StoreLocal(0),
            Opcode::Return(1),
        ]
    );
    assert!(main.locals.by_name("x").is_none());
    assert_eq!(main.num_locals, 1);
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_break_patches_to_end_of_loop() {
    let program = compile("while true do if x then break end end");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::PushTrue,
            Opcode::Test,
            Opcode::Jump(8), // while escape -> 10
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(0),
            Opcode::GetTable,
            Opcode::Test,
            Opcode::Jump(2),  // if escape -> 9
            Opcode::Jump(2),  // break -> 10, just past the back-jump
            Opcode::Jump(-9), // back edge -> 0
            Opcode::Return(1),
        ]
    );
}

#[test]
fn test_if_elseif_else_chain() {
    let program = compile("if a then x = 1 elseif b then x = 2 else x = 3 end");
    let main = program.entry();
    let jumps: Vec<usize> = main
        .opcodes
        .iter()
        .enumerate()
        .filter_map(|(pc, op)| match op {
            Opcode::Jump(offset) => Some((pc as i64 + *offset as i64) as usize),
            _ => None,
        })
        .collect();
    // Two branch escapes and two end-jumps, all landing inside the stream
    assert_eq!(jumps.len(), 4);
    let end = main.opcodes.len() - 1;
    assert!(jumps.iter().filter(|&&t| t == end).count() >= 2);
}

#[test]
fn test_while_loop_shape() {
    let program = compile("while x do y = 1 end");
    let main = program.entry();
    // condition, test, escape
    assert_eq!(main.opcodes[3], Opcode::Test);
    assert_eq!(main.opcodes[4], Opcode::Jump(6));
    // back edge returns to the condition
    assert_eq!(main.opcodes[9], Opcode::Jump(-9));
}

#[test]
fn test_repeat_until_shape() {
    let program = compile("repeat x = 1 until y");
    let main = program.entry();
    // until-false falls into the back jump
    let last = main.opcodes.len() - 2;
    assert_eq!(main.opcodes[last - 1], Opcode::Test);
    assert_eq!(main.opcodes[last], Opcode::Jump(-(last as i32)));
}

#[test]
fn test_numeric_for_shape() {
    let program = compile("for i = 1, 3 do end");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::PushInt(1),
            Opcode::PushInt(3),
            Opcode::PushInt(1), // default step
            Opcode::PrepareForNum(0),
            Opcode::TestFor(0),
            Opcode::Jump(2),
            Opcode::Jump(-2),
            Opcode::Return(1),
        ]
    );
    // control group: named control plus two temporaries
    assert_eq!(main.num_locals, 3);
    assert_eq!(main.locals.by_name("i").unwrap().index, 0);
}

#[test]
fn test_generic_for_shape() {
    let program = compile("for k, v in pairs, t do end");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::MarkTbc(3), // the closer slot
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(0), // "pairs"
            Opcode::GetTable,
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(1), // "t"
            Opcode::GetTable,
            Opcode::PushNil, // header adjusted to four values
            Opcode::PushNil,
            Opcode::PrepareForGen(2),
            Opcode::LoadLocal(1), // state
            Opcode::LoadLocal(0), // control
            Opcode::LoadLocal(2), // iterator
            Opcode::Call {
                params: 3,
                returns: 3
            },
            Opcode::StoreLocal(4), // v, reverse store order
            Opcode::StoreLocal(0), // k lands in the control slot
            Opcode::LoadLocal(0),
            Opcode::TestNil,
            Opcode::Jump(2),
            Opcode::Jump(-9),
            Opcode::Return(1),
        ]
    );
}

#[test]
fn test_numeric_for_slots_are_reusable_after_loop() {
    let program = compile("for i = 1, 3 do end local z = 9");
    let main = program.entry();
    // the released control group is reused for z
    assert_eq!(main.locals.by_name("z").unwrap().index, 2);
}

// ============================================================================
// Calls and tables
// ============================================================================

#[test]
fn test_call_statement_discards_results() {
    let program = compile("f(1, 2)");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(0),
            Opcode::GetTable,
            Opcode::MarkStack,
            Opcode::PushInt(1),
            Opcode::PushInt(2),
            Opcode::Call {
                params: 3,
                returns: 1
            },
            Opcode::Return(1),
        ]
    );
}

#[test]
fn test_trailing_multires_argument_propagates_all() {
    let program = compile("f(1, g())");
    let main = program.entry();
    assert!(main.opcodes.contains(&Opcode::Call {
        params: 0,
        returns: 1
    }));
}

#[test]
fn test_method_call_caches_receiver() {
    let program = compile("t:m(1)");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(0), // "t"
            Opcode::GetTable,
            Opcode::StoreLocal(0),
            Opcode::LoadLocal(0),
            Opcode::PushConst(1), // "m"
            Opcode::GetTable,
            Opcode::MarkStack,
            Opcode::LoadLocal(0), // receiver as implicit first argument
            Opcode::PushInt(1),
            Opcode::Call {
                params: 3,
                returns: 1
            },
            Opcode::Return(1),
        ]
    );
}

#[test]
fn test_table_constructor_batches_positionals() {
    let program = compile("local t = {1, 2, x = 3, f()}");
    let main = program.entry();
    assert_eq!(
        main.opcodes,
        vec![
            Opcode::CreateTable,
            Opcode::StoreLocal(0),
            Opcode::PushInt(1),
            Opcode::PushInt(2),
            Opcode::LoadLocal(0),
            Opcode::StoreList(2), // grouped positional singletons
            Opcode::PushInt(3),
            Opcode::LoadLocal(0),
            Opcode::PushConst(0), // "x"
            Opcode::SetTable,
            Opcode::MarkStack,
            Opcode::LoadUpvalue(0),
            Opcode::PushConst(1), // "f"
            Opcode::GetTable,
            Opcode::MarkStack,
            Opcode::Call {
                params: 1,
                returns: 0
            },
            Opcode::LoadLocal(0),
            Opcode::StoreList(0), // trailing producer stores everything
            Opcode::LoadLocal(0),
            // the released table temporary is reused for `t`
            Opcode::StoreLocal(0),
            Opcode::Return(1),
        ]
    );
}

#[test]
fn test_nonlast_multires_positional_takes_one_value() {
    let program = compile("local t = {f(), 2}");
    let main = program.entry();
    assert!(main.opcodes.contains(&Opcode::Call {
        params: 1,
        returns: 2
    }));
    assert!(main.opcodes.contains(&Opcode::StoreList(2)));
}

// ============================================================================
// Returns and varargs
// ============================================================================

#[test]
fn test_return_counts() {
    let program = compile("return 1, 2");
    assert_eq!(program.entry().opcodes.last(), Some(&Opcode::Return(3)));

    let program = compile("return f()");
    let main = program.entry();
    assert!(main.opcodes.contains(&Opcode::Call {
        params: 1,
        returns: 0
    }));
    assert_eq!(main.opcodes.last(), Some(&Opcode::Return(0)));

    let program = compile("return");
    assert_eq!(program.entry().opcodes.last(), Some(&Opcode::Return(1)));
}

#[test]
fn test_varargs_in_entry_chunk() {
    let program = compile("return ...");
    let main = program.entry();
    assert!(main.is_variadic);
    assert_eq!(
        main.opcodes,
        vec![Opcode::Varargs(0), Opcode::Return(0)]
    );
}

#[test]
fn test_varargs_outside_variadic_function() {
    let err = compile_err("local function f() return ... end");
    assert!(matches!(err, CompileError::VarargsOutsideVariadic { .. }));
}

// ============================================================================
// Goto and labels
// ============================================================================

#[test]
fn test_goto_into_local_scope_rejected() {
    let err = compile_err("do goto L end local x = 1; ::L::");
    assert!(matches!(err, CompileError::JumpIntoLocalScope { .. }));
}

#[test]
fn test_trailing_label_accepted() {
    let program = compile("for i = 1, 10 do if done then goto cont end ::cont:: end");
    validate(&program).expect("trailing label should compile");
}

#[test]
fn test_backward_goto() {
    let program = compile("::top:: x = 1 goto top");
    let main = program.entry();
    // the goto jumps back to the label's pc
    let jump_pc = main
        .opcodes
        .iter()
        .position(|op| matches!(op, Opcode::Jump(_)))
        .unwrap();
    assert_eq!(main.opcodes[jump_pc], Opcode::Jump(-(jump_pc as i32)));
}

#[test]
fn test_goto_to_unknown_label() {
    let err = compile_err("goto nowhere");
    assert!(matches!(err, CompileError::LabelNotVisible { .. }));
}

#[test]
fn test_goto_cannot_see_sibling_block_label() {
    let err = compile_err("goto inner do ::inner:: end");
    assert!(matches!(err, CompileError::LabelNotVisible { .. }));
}

#[test]
fn test_duplicate_label_rejected() {
    let err = compile_err("::a:: x = 1 ::a::");
    assert!(matches!(err, CompileError::LabelDuplicate { .. }));
}

#[test]
fn test_label_shadowing_across_closed_blocks_is_fine() {
    compile("do ::a:: end do ::a:: end");
}

// ============================================================================
// Error taxonomy
// ============================================================================

#[test]
fn test_break_outside_loop() {
    let err = compile_err("break");
    assert!(matches!(err, CompileError::BreakOutsideLoop { .. }));
}

#[test]
fn test_const_reassignment_of_compile_time_const() {
    let err = compile_err("local x <const> = 1 x = 2");
    assert!(matches!(err, CompileError::ConstReassignment { .. }));
}

#[test]
fn test_const_reassignment_of_runtime_const() {
    let err = compile_err("local x <const> = f() x = 2");
    assert!(matches!(err, CompileError::ConstReassignment { .. }));
}

#[test]
fn test_tbc_duplication() {
    let err = compile_err("local a <close>, b <close> = f(), g()");
    assert!(matches!(err, CompileError::TbcDuplication { .. }));
}

#[test]
fn test_unknown_attribute() {
    let err = compile_err("local a <frozen> = 1");
    assert!(matches!(
        err,
        CompileError::UnknownAttribute { ref attribute, .. } if attribute == "frozen"
    ));
}

#[test]
fn test_close_attribute_marks_tbc() {
    let program = compile("local a <close> = f()");
    let main = program.entry();
    assert!(main.opcodes.contains(&Opcode::MarkTbc(0)));
}

#[test]
fn test_syntax_error_carries_location() {
    let err = compile_err("local = 1");
    match err {
        CompileError::Syntax { span, .. } => assert_eq!(span.line, 1),
        other => panic!("unexpected error: {:?}", other),
    }
}

// ============================================================================
// Whole-program invariants
// ============================================================================

#[test]
fn test_every_prototype_is_validated() {
    let sources = [
        "local x = 1",
        "x = y + z * 2",
        "for i = 1, 10 do print(i) end",
        "local function fib(n) if n < 2 then return n end return fib(n - 1) + fib(n - 2) end",
        "local t = {} function t.a() end function t:b() return self end",
        "while x do local a = 1 do break end end",
        "repeat local v = next() until v == nil",
    ];
    for source in sources {
        let program = compile(source);
        assert!(!program.prototypes.is_empty(), "source: {}", source);
    }
}

#[test]
fn test_function_statement_names() {
    let program = compile("function a.b.c() end");
    assert_eq!(program.prototypes[1].name, "a.b.c");

    let program = compile("local f = function() end");
    assert_eq!(program.prototypes[1].name, "<lambda#0>");
}

#[test]
fn test_method_definition_gets_self() {
    let program = compile("function t:m(x) return self end");
    let method = &program.prototypes[1];
    assert_eq!(method.fixed_params, 2);
    assert_eq!(method.locals.by_name("self").unwrap().index, 0);
    assert_eq!(method.locals.by_name("x").unwrap().index, 1);
}

#[test]
fn test_local_function_sees_itself() {
    let program = compile("local function f() return f end");
    let inner = &program.prototypes[1];
    // the recursive reference resolves to an upvalue, not a global
    assert!(inner.upvalue_by_name("f").is_some());
    assert!(inner.opcodes.contains(&Opcode::LoadUpvalue(0)));
}
