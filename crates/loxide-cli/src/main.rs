//! Command-line driver.
//!
//! `loxide` with no path starts the REPL; with one path it runs the file.
//! `--bytecode` routes through the VM backend (expressions only) and
//! `--dis` additionally dumps the disassembly to stderr. Exit codes follow
//! the usual convention: 0 success, 64 usage, 65 compile error, 70 runtime
//! error.

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use loxide::{
    compile_bytecode, render_ast, run_bytecode, run_source, Diagnostics, ExecStatus, ReplSession,
    StdPrint,
};

struct Options {
    bytecode: bool,
    disassemble: bool,
    print_ast: bool,
    path: Option<String>,
}

fn main() -> ExitCode {
    let Some(options) = parse_args(env::args().skip(1)) else {
        eprintln!("usage: loxide [--bytecode] [--dis] [--ast] [path]");
        return ExitCode::from(64);
    };

    match options.path {
        Some(ref path) => run_file(&options, path),
        None if options.bytecode => bytecode_repl(&options),
        None => repl(),
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> Option<Options> {
    let mut options = Options {
        bytecode: false,
        disassemble: false,
        print_ast: false,
        path: None,
    };
    for arg in args {
        match arg.as_str() {
            "--bytecode" => options.bytecode = true,
            "--dis" => {
                options.bytecode = true;
                options.disassemble = true;
            }
            "--ast" => options.print_ast = true,
            _ if arg.starts_with("--") => return None,
            // Two or more paths is a usage error.
            _ if options.path.is_some() => return None,
            _ => options.path = Some(arg),
        }
    }
    Some(options)
}

fn run_file(options: &Options, path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            return ExitCode::from(64);
        }
    };

    let mut diags = Diagnostics::new();
    let status = if options.bytecode {
        if options.disassemble {
            disassemble(&source, path);
        }
        run_bytecode(&source, &mut StdPrint, &mut diags)
    } else {
        if options.print_ast {
            let mut ast_diags = Diagnostics::new();
            if let Some(rendered) = render_ast(&source, &mut ast_diags) {
                eprint!("{rendered}");
            }
        }
        run_source(&source, &mut StdPrint, &mut diags)
    };

    report(&diags);
    ExitCode::from(status.exit_code())
}

fn disassemble(source: &str, name: &str) {
    let mut diags = Diagnostics::new();
    if let Some(chunk) = compile_bytecode(source, &mut diags) {
        let mut listing = String::new();
        if chunk.disassemble(name, &mut listing).is_ok() {
            eprint!("{listing}");
        }
    }
}

/// The line-oriented REPL. Bindings persist across lines; `exit` or EOF
/// ends the session. Errors print and the loop continues.
fn repl() -> ExitCode {
    let mut session = ReplSession::new();
    let stdin = io::stdin();
    loop {
        prompt();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {}
            Err(err) => {
                eprintln!("error reading input: {err}");
                return ExitCode::from(74);
            }
        }
        if line.trim() == "exit" {
            return ExitCode::SUCCESS;
        }
        if line.trim().is_empty() {
            continue;
        }
        if session.feed(&line, &mut StdPrint) != ExecStatus::Ok {
            report(session.diagnostics());
        }
    }
}

/// Expression-at-a-time REPL over the bytecode backend. Stateless per line:
/// the VM has no variable storage yet.
fn bytecode_repl(options: &Options) -> ExitCode {
    let stdin = io::stdin();
    loop {
        prompt();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {}
            Err(err) => {
                eprintln!("error reading input: {err}");
                return ExitCode::from(74);
            }
        }
        if line.trim() == "exit" {
            return ExitCode::SUCCESS;
        }
        if line.trim().is_empty() {
            continue;
        }
        if options.disassemble {
            disassemble(&line, "repl");
        }
        let mut diags = Diagnostics::new();
        run_bytecode(&line, &mut StdPrint, &mut diags);
        report(&diags);
    }
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

fn report(diags: &Diagnostics) {
    let stderr = io::stderr();
    let mut handle = stderr.lock();
    if diags.print_diagnostics(&mut handle).is_err() {
        // Nowhere left to report to.
        std::process::exit(74);
    }
}
