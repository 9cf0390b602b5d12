//! End-to-end tests: source → tokens → AST → compile → run
use std::io::Cursor;

use tiny::compiler::{CompileOptions, Compiler};
use tiny::parser::{parse_source, Stmt};
use tiny::runtime::{Instruction, Vm, VmConfig};
use tiny::{Error, Fault};

fn config() -> VmConfig {
    VmConfig {
        heap_size: 1024,
        max_recursion: 100,
    }
}

fn run_with(source: &str, input: &str, config: VmConfig) -> (Result<(), Error>, String) {
    let program = match Compiler::default().compile_source(source) {
        Ok(program) => program,
        Err(err) => return (Err(err), String::new()),
    };
    let mut vm = Vm::new(program, &config, Cursor::new(input.to_string()), Vec::new()).unwrap();
    let outcome = vm.run();
    let output = String::from_utf8(vm.into_output()).unwrap().replace("\r\n", "\n");
    (outcome, output)
}

fn run_input(source: &str, input: &str) -> (Result<(), Error>, String) {
    run_with(source, input, config())
}

fn run(source: &str) -> String {
    let (outcome, output) = run_input(source, "");
    if let Err(err) = outcome {
        panic!("program failed: {err}");
    }
    output
}

#[test]
fn test_globals_and_arithmetic() {
    let output = run("var x: int; var y: real; x := 3; y := x + 2; write(y); newline();");
    assert_eq!(output, "5.0\n");
}

#[test]
fn test_by_reference_parameter() {
    let output = run(
        "proc inc(var n: int); n := n + 1; proc end; \
         var k: int; k := 10; inc(k); write(k); newline();",
    );
    assert_eq!(output, "11\n");
}

#[test]
fn test_pointer_allocation_and_dereference() {
    let output = run(
        "type Node = record(val: int, next: pointer(Node)); \
         var p: pointer(Node); \
         new(p); p^.val := 7; write(p^.val); newline(); delete(p);",
    );
    assert_eq!(output, "7\n");
}

#[test]
fn test_nil_dereference_aborts() {
    let (outcome, output) = run_input("var p: pointer(int); write(p^);", "");
    let err = outcome.unwrap_err();
    assert_eq!(err, Error::Runtime(Fault::NilDereference));
    assert_eq!(err.to_string(), "Execution aborted: [ERROR] access through null");
    assert!(output.is_empty());
}

#[test]
fn test_delete_nil_aborts() {
    let (outcome, _) = run_input("var p: pointer(int); delete(p);", "");
    assert_eq!(outcome, Err(Error::Runtime(Fault::NilDereference)));
}

#[test]
fn test_int_to_real_promotion_on_assignment() {
    let output = run("var r: real; var i: int; i := 4; r := i; write(r);");
    assert_eq!(output, "4.0");
}

#[test]
fn test_promotion_through_alias() {
    let output = run("type R = real; var r: R; r := 1; write(r);");
    assert_eq!(output, "1.0");
}

#[test]
fn test_duplicate_identifier_rejected() {
    let err = Compiler::default()
        .compile_source("var x: int; var x: real;")
        .unwrap_err();
    match &err {
        Error::Duplicate { name, pos } => {
            assert_eq!(name, "x");
            assert_eq!(pos.line, 1);
        }
        other => panic!("expected duplicate identifier, got {other:?}"),
    }
    assert!(err.to_string().starts_with("resolution error at (l:1; c:"));
}

#[test]
fn test_recursive_factorial() {
    let output = run(
        "var result: int; \
         proc fact(n: int, var r: int); \
            if n <= 1 then r := 1; \
            else fact(n - 1, r); r := r * n; \
            end; \
         proc end; \
         fact(10, result); write(result);",
    );
    assert_eq!(output, "3628800");
}

#[test]
fn test_array_loop() {
    let output = run(
        "var a: array(int, 5); var i: int; var sum: int; \
         i := 0; \
         while i < 5 do a[i] := i * i; i := i + 1; end; \
         i := 0; sum := 0; \
         while i < 5 do sum := sum + a[i]; i := i + 1; end; \
         write(sum);",
    );
    assert_eq!(output, "30");
}

#[test]
fn test_record_assignment_copies() {
    let output = run(
        "type P = record(x: int, y: real); \
         var a: P; var b: P; \
         a.x := 1; a.y := 2.5; \
         b := a; \
         a.x := 9; \
         write(b.x); write(\" \"); write(b.y); write(\" \"); write(a.x);",
    );
    assert_eq!(output, "1 2.5 9");
}

#[test]
fn test_record_value_parameter_is_copied() {
    let output = run(
        "type P = record(x: int, y: int); \
         var a: P; \
         proc show(p: P); p.x := p.x + 100; write(p.x); newline(); proc end; \
         a.x := 1; a.y := 2; \
         show(a); \
         write(a.x);",
    );
    assert_eq!(output, "101\n1");
}

#[test]
fn test_nested_procedures_use_display() {
    let output = run(
        "var g: int; \
         proc outer(a: int); \
            var local: int; \
            proc inner(b: int); \
               local := local + a + b; \
            proc end; \
            local := 0; \
            inner(1); \
            inner(2); \
            g := local; \
         proc end; \
         outer(10); \
         write(g);",
    );
    assert_eq!(output, "23");
}

#[test]
fn test_linked_list() {
    let output = run(
        "type Node = record(val: int, next: pointer(Node)); \
         var head: pointer(Node); var p: pointer(Node); var i: int; \
         head := nil; \
         i := 1; \
         while i <= 3 do \
            new(p); p^.val := i; p^.next := head; head := p; \
            i := i + 1; \
         end; \
         p := head; \
         while p != nil do write(p^.val); p := p^.next; end;",
    );
    assert_eq!(output, "321");
}

#[test]
fn test_procedure_declared_in_block() {
    let output = run(
        "begin \
            var x: int; \
            proc twice(var v: int); v := v * 2; proc end; \
            x := 21; \
            twice(x); \
            write(x); \
         end;",
    );
    assert_eq!(output, "42");
}

#[test]
fn test_conditionals_and_booleans() {
    let output = run(
        "var r: real; var b: bool; \
         r := 7 / 2; \
         b := not (r > 3.0) or r == 3; \
         if b then write(\"yes\"); else write(\"no\"); end; \
         write(-r);",
    );
    assert_eq!(output, "yes-3.0");
}

#[test]
fn test_empty_else_branch() {
    assert_eq!(run("var x: int; x := 0; if x == 0 then x := 1; else end; write(x);"), "1");
    assert_eq!(run("var x: int; x := 5; if x == 0 then x := 1; else end; write(x);"), "5");
}

#[test]
fn test_read_input() {
    let (outcome, output) = run_input(
        "var n: int; var s: string; var total: int; \
         read(n); read(s); \
         total := n * 2; \
         write(s); write(total);",
        "21\nanswer\n",
    );
    assert!(outcome.is_ok());
    assert_eq!(output, "answer42");
}

#[test]
fn test_read_past_end_of_input() {
    let (outcome, _) = run_input("var n: int; read(n);", "");
    assert!(matches!(
        outcome,
        Err(Error::Runtime(Fault::InvalidInput { expected: "int", .. }))
    ));
}

#[test]
fn test_division_by_zero() {
    let (outcome, _) = run_input("var x: int; x := 0; write(10 / x);", "");
    assert_eq!(outcome, Err(Error::Runtime(Fault::DivisionByZero)));
}

#[test]
fn test_deep_recursion_overflows_static_memory() {
    let source = "proc down(n: int); if n > 0 then down(n - 1); end; proc end; down(50);";
    let small = VmConfig {
        heap_size: 16,
        max_recursion: 10,
    };
    let (outcome, _) = run_with(source, "", small);
    assert!(matches!(outcome, Err(Error::Runtime(Fault::StaticOverflow { .. }))));

    let (outcome, _) = run_with(source, "", config());
    assert!(outcome.is_ok());
}

#[test]
fn test_heap_exhaustion() {
    let source = "var p: pointer(array(int, 10)); var i: int; \
                  i := 0; while i < 10 do new(p); i := i + 1; end;";
    let small = VmConfig {
        heap_size: 50,
        max_recursion: 1,
    };
    let (outcome, _) = run_with(source, "", small);
    assert!(matches!(outcome, Err(Error::Runtime(Fault::OutOfMemory { .. }))));
}

#[test]
fn test_type_errors_reported_together() {
    let err = Compiler::default()
        .compile_source("var x: int; var b: bool; x := true; b := 1; while x do end;")
        .unwrap_err();
    let diagnostics = err.diagnostics();
    assert_eq!(diagnostics.len(), 3);
    assert!(diagnostics.iter().all(|d| d.starts_with("type error at (l:1; c:")));
}

#[test]
fn test_labels_match_emitted_code() {
    let source = "type P = record(x: int, next: pointer(P)); \
                  var p: pointer(P); var r: real; var i: int; \
                  proc walk(var q: pointer(P), k: int); \
                     while q != nil do q := q^.next; k := k - 1; end; \
                  proc end; \
                  new(p); p^.x := 3; \
                  if p^.x > 2 then r := p^.x; else r := 0.5; end; \
                  walk(p, 4); \
                  write(r); newline(); delete(p);";
    let mut ast = parse_source(source).unwrap();
    let compiler = Compiler::new(CompileOptions { verify_labels: true });
    let program = compiler.compile(&mut ast).unwrap();

    assert_eq!(ast.program.ann.next, program.code.len());
    for stmt in ast.stmt_ids() {
        let ann = &ast[stmt].ann;
        assert!(ann.begin <= ann.next, "statement labels out of order");
        assert!(ann.next <= program.code.len());
        if let Stmt::Write(_) = ast[stmt].kind {
            assert_eq!(program.code[ann.next - 1], Instruction::Print);
        }
    }
    for expr in ast.expr_ids() {
        let ann = &ast[expr].ann;
        assert!(ann.begin <= ann.next, "expression labels out of order");
    }
}

#[test]
fn test_listing_has_one_line_per_instruction() {
    let program = Compiler::default()
        .compile_source("var x: int; x := 1; write(x);")
        .unwrap();
    let count = program.code.len();
    let vm = Vm::new(program, &config(), Cursor::new(String::new()), Vec::new()).unwrap();
    let mut listing = Vec::new();
    vm.write_listing(&mut listing).unwrap();
    let listing = String::from_utf8(listing).unwrap();
    assert_eq!(listing.lines().count(), count);
    assert_eq!(listing.lines().next(), Some("push 0"));
    assert_eq!(listing.lines().last(), Some("stop"));
}
