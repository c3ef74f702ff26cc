//! Bytecode backend: parity with the treewalk on the expression subset,
//! strict typing behavior, and the disassembler's rendering.

use loxide::{
    compile_bytecode, run_bytecode, run_source, CollectPrint, Diagnostics, ErrorKind, ExecStatus,
};

fn run_vm(expr: &str) -> (ExecStatus, String, Vec<ErrorKind>) {
    let mut out = CollectPrint::new();
    let mut diags = Diagnostics::new();
    let status = run_bytecode(expr, &mut out, &mut diags);
    let kinds = diags.errors().iter().map(|d| d.kind).collect();
    (status, out.output().to_owned(), kinds)
}

fn vm_output(expr: &str) -> String {
    let (status, output, kinds) = run_vm(expr);
    assert_eq!(status, ExecStatus::Ok, "vm failed on {expr}: {kinds:?}");
    output
}

fn treewalk_output(expr: &str) -> String {
    let mut out = CollectPrint::new();
    let mut diags = Diagnostics::new();
    let status = run_source(&format!("print {expr};"), &mut out, &mut diags);
    assert_eq!(status, ExecStatus::Ok, "treewalk failed on {expr}");
    out.output().to_owned()
}

#[test]
fn backends_agree_on_arithmetic() {
    for expr in [
        "1 + 2 * 3",
        "(1 + 2) * 3",
        "1 - 2 - 3",
        "-4 / 2",
        "-(4 / 2)",
        "10 / 4",
        "1 + 2 + 3 + 4",
        "2 * 3 - 4 * 5",
    ] {
        assert_eq!(
            vm_output(expr),
            treewalk_output(expr),
            "backends disagree on {expr}"
        );
    }
}

#[test]
fn backends_agree_on_comparisons_and_equality() {
    for expr in [
        "1 < 2",
        "2 <= 2",
        "3 > 4",
        "4 >= 4",
        "1 == 1",
        "1 != 2",
        "nil == nil",
        "true == false",
        "\"a\" == \"a\"",
        "1 == \"1\"",
    ] {
        assert_eq!(
            vm_output(expr),
            treewalk_output(expr),
            "backends disagree on {expr}"
        );
    }
}

#[test]
fn scenario_one_through_the_vm() {
    assert_eq!(vm_output("1 + 2 * 3"), "7\n");
}

#[test]
fn vm_boolean_logic_is_strict() {
    assert_eq!(vm_output("true and false or true"), "true\n");
    assert_eq!(vm_output("!false"), "true\n");

    // Where the treewalk applies truthiness, the VM insists on booleans.
    let (status, _, kinds) = run_vm("1 and 2");
    assert_eq!(status, ExecStatus::RuntimeError);
    assert_eq!(kinds, vec![ErrorKind::TypeMismatch]);

    let (status, _, kinds) = run_vm("!nil");
    assert_eq!(status, ExecStatus::RuntimeError);
    assert_eq!(kinds, vec![ErrorKind::TypeMismatch]);
}

#[test]
fn vm_arithmetic_type_errors() {
    for expr in ["1 + nil", "\"a\" * 2", "true - false", "\"a\" < \"b\""] {
        let (status, output, kinds) = run_vm(expr);
        assert_eq!(status, ExecStatus::RuntimeError, "expected failure on {expr}");
        assert_eq!(output, "");
        assert_eq!(kinds, vec![ErrorKind::TypeMismatch]);
    }
}

#[test]
fn vm_division_by_zero() {
    let (status, _, kinds) = run_vm("1 / 0");
    assert_eq!(status, ExecStatus::RuntimeError);
    assert_eq!(kinds, vec![ErrorKind::DivisionByZero]);
}

#[test]
fn compile_errors_map_to_compile_status() {
    for (expr, kind) in [
        ("(1 + 2", ErrorKind::UnclosedGrouping),
        ("1)", ErrorKind::UnmatchedClosingParen),
        ("1 +", ErrorKind::ExpectedExpression),
        ("1 2", ErrorKind::UnexpectedToken),
    ] {
        let (status, output, kinds) = run_vm(expr);
        assert_eq!(status, ExecStatus::CompileError, "on {expr}");
        assert_eq!(output, "");
        assert_eq!(kinds, vec![kind], "on {expr}");
    }
}

#[test]
fn disassembler_lists_the_compiled_chunk() {
    let mut diags = Diagnostics::new();
    let chunk = compile_bytecode("1 + 2 * 3", &mut diags).expect("compiles");

    let mut listing = String::new();
    chunk.disassemble("expr", &mut listing).unwrap();

    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines[0], "== expr ==");
    assert!(lines[1].contains("Constant") && lines[1].ends_with("'1'"));
    assert!(lines[2].contains("Constant") && lines[2].ends_with("'2'"));
    assert!(lines[3].contains("Constant") && lines[3].ends_with("'3'"));
    assert!(lines[4].contains("Multiply"));
    assert!(lines[5].contains("Add"));
    assert!(lines[6].contains("Return"));
    // Everything came from line 1; repeats collapse to '|'.
    assert!(lines[1].contains(" 1 "));
    assert!(lines[2].contains(" | "));
}

#[test]
fn disassembler_line_map_tracks_source_lines() {
    let mut diags = Diagnostics::new();
    let chunk = compile_bytecode("1 +\n2", &mut diags).expect("compiles");

    let mut listing = String::new();
    chunk.disassemble("expr", &mut listing).unwrap();
    let lines: Vec<&str> = listing.lines().collect();
    // The second constant sits on source line 2.
    assert!(lines[2].contains(" 2 "), "got: {}", lines[2]);
}

#[test]
fn vm_runtime_errors_carry_line_numbers() {
    let mut out = CollectPrint::new();
    let mut diags = Diagnostics::new();
    let status = run_bytecode("\n\n1 + nil", &mut out, &mut diags);
    assert_eq!(status, ExecStatus::RuntimeError);
    assert_eq!(diags.errors()[0].loc.line, 3);
}

#[test]
fn strings_push_and_compare() {
    assert_eq!(vm_output("\"hi\" == \"hi\""), "true\n");
    assert_eq!(vm_output("\"hi\" != \"ho\""), "true\n");
    assert_eq!(vm_output("\"lone\""), "lone\n");
}
