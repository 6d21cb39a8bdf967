//! Closure formation and upvalue chain tests

use pretty_assertions::assert_eq;
use selune_compiler::{validate, CompileError, Compiler, Opcode, Program};

fn compile(source: &str) -> Program {
    let program = Compiler::new().compile(source).expect("compilation failed");
    validate(&program).expect("validator rejected compiled program");
    program
}

#[test]
fn test_closure_captures_outer_local() {
    let program = compile("local a = 10\nlocal function f() return a end");
    let main = program.entry();
    let f = &program.prototypes[1];

    // f has exactly one upvalue: a, captured from the enclosing stack
    assert_eq!(f.upvalues.len(), 1);
    let a = &f.upvalues[0];
    assert_eq!(a.name, "a");
    assert_eq!(a.index, 0);
    assert!(a.is_on_stack);

    assert_eq!(f.opcodes, vec![Opcode::LoadUpvalue(0), Opcode::Return(2)]);

    assert_eq!(main.locals.by_name("a").unwrap().index, 0);
    assert_eq!(main.locals.by_name("f").unwrap().index, 1);
    assert!(main.opcodes.contains(&Opcode::Closure(1)));
}

#[test]
fn test_transitive_upvalue_chain() {
    let program = compile(
        "local a = 1\n\
         local function f()\n\
           local function g() return a end\n\
           return g\n\
         end",
    );
    let f = &program.prototypes[1];
    let g = &program.prototypes[2];

    // f captures a from the stack even though it never reads it itself;
    // g forwards to f's upvalue by name
    let a_in_f = f.upvalue_by_name("a").expect("f must carry a");
    assert!(a_in_f.is_on_stack);
    let a_in_g = g.upvalue_by_name("a").expect("g must carry a");
    assert!(!a_in_g.is_on_stack);

    assert!(g.opcodes.contains(&Opcode::LoadUpvalue(a_in_g.index)));
}

#[test]
fn test_upvalue_reuse_within_prototype() {
    let program = compile(
        "local a = 1\n\
         local function f() a = a + a return a end",
    );
    let f = &program.prototypes[1];
    // four references, one descriptor
    assert_eq!(f.upvalues.len(), 1);
    assert!(f.opcodes.contains(&Opcode::StoreUpvalue(0)));
}

#[test]
fn test_block_exit_closes_opened_upvalue() {
    let program = compile(
        "do\n\
           local a = 1\n\
           local function f() return a end\n\
         end",
    );
    let main = program.entry();
    // a (slot 0) was opened as an upvalue inside the block
    assert!(main.opcodes.contains(&Opcode::CloseUpvalue(0)));
}

#[test]
fn test_env_is_never_closed() {
    let program = compile("do local a = 1 x = a end");
    let main = program.entry();
    // the global write threads _ENV, but nothing closes it
    assert!(main.upvalue_by_name("_ENV").is_some());
    assert!(!main
        .opcodes
        .iter()
        .any(|op| matches!(op, Opcode::CloseUpvalue(_))));
}

#[test]
fn test_env_threads_through_nested_prototypes() {
    let program = compile("local function f() local function g() print(1) end end");
    let main = program.entry();
    let f = &program.prototypes[1];
    let g = &program.prototypes[2];

    assert!(main.upvalue_by_name("_ENV").unwrap().is_on_stack);
    assert!(!f.upvalue_by_name("_ENV").unwrap().is_on_stack);
    assert!(!g.upvalue_by_name("_ENV").unwrap().is_on_stack);
}

#[test]
fn test_entry_env_exists_without_globals() {
    let program = compile("local a = 1");
    let main = program.entry();
    let env = main.upvalue_by_name("_ENV").expect("entry must carry _ENV");
    assert_eq!(env.index, 0);
    assert!(env.is_on_stack);
}

#[test]
fn test_parameter_capture() {
    let program = compile(
        "local function outer(x)\n\
           return function() return x end\n\
         end",
    );
    let inner = &program.prototypes[2];
    let x = inner.upvalue_by_name("x").expect("inner must capture x");
    assert!(x.is_on_stack);
}

#[test]
fn test_captured_const_cannot_be_written() {
    let err = Compiler::new()
        .compile("local x <const> = f()\nlocal function g() x = 1 end")
        .expect_err("expected const-reassignment");
    assert!(matches!(err, CompileError::ConstReassignment { .. }));
}

#[test]
fn test_shadowing_resolves_to_innermost_binding() {
    let program = compile(
        "local a = 1\n\
         do\n\
           local a = 2\n\
           local function f() return a end\n\
         end",
    );
    let f = &program.prototypes[1];
    assert_eq!(f.upvalues.len(), 1);

    // the captured binding is the inner one (slot 1)
    let main = program.entry();
    assert!(main.opcodes.contains(&Opcode::CloseUpvalue(1)));
}

#[test]
fn test_lambda_names_increment() {
    let program = compile("local a = function() end\nlocal b = function() end");
    assert_eq!(program.prototypes[1].name, "<lambda#0>");
    assert_eq!(program.prototypes[2].name, "<lambda#1>");
}
