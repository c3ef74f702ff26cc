//! The tree-walking evaluator.
//!
//! Walks the AST arena directly, threading the current environment through
//! statement execution. The interpreter itself is constructed per run and
//! borrows everything it needs — the arena, the source buffer, the
//! resolver's depth table, and a [`PrintWriter`] — while the global
//! environment is owned by the caller so a REPL session keeps bindings
//! alive across runs.
//!
//! Non-local control uses one out-of-band channel: [`Unwind`]. A runtime
//! failure carries its diagnostic up to the pipeline boundary; the `Return`
//! sentinel carries nothing (the value travels in a dedicated slot on the
//! interpreter) and is intercepted at the nearest call frame.

use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::AHashMap;

use crate::ast::{Ast, Expr, ExprIdx, Lit, Stmt, StmtIdx};
use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::env::{EnvRef, Environment};
use crate::io::PrintWriter;
use crate::token::{Token, TokenTag};
use crate::value::{Callable, Class, Instance, LoxFunction, NativeFn, RuntimeValue};

/// Non-local exits during evaluation.
#[derive(Debug)]
enum Unwind {
    /// A runtime error, carrying its rendered diagnostic.
    Failure(Box<Diagnostic>),
    /// The `return` sentinel. Never surfaced: the nearest call frame catches
    /// it and picks the value up from the interpreter's return slot.
    Return,
}

type EvalResult<T> = Result<T, Unwind>;

/// Creates a global environment with the native functions installed.
#[must_use]
pub fn new_globals() -> EnvRef {
    let globals = Environment::root();
    globals.borrow_mut().define(
        "clock",
        RuntimeValue::Callable(Callable::Native(NativeFn {
            name: "clock",
            arity: 0,
            call: native_clock,
        })),
    );
    globals
}

/// `clock()`: wall-clock milliseconds since the Unix epoch.
fn native_clock(_args: &[RuntimeValue]) -> RuntimeValue {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    RuntimeValue::Number(elapsed.as_millis() as f64)
}

/// The evaluator. Construct per run; globals persist outside it.
pub struct Interpreter<'a, W: PrintWriter> {
    ast: &'a Ast,
    src: &'a str,
    locals: &'a AHashMap<Token, usize>,
    out: &'a mut W,
    globals: EnvRef,
    env: EnvRef,
    /// Where a `return` statement stashes its value for the call frame.
    return_slot: Option<RuntimeValue>,
}

impl<'a, W: PrintWriter> Interpreter<'a, W> {
    #[must_use]
    pub fn new(
        ast: &'a Ast,
        src: &'a str,
        locals: &'a AHashMap<Token, usize>,
        globals: EnvRef,
        out: &'a mut W,
    ) -> Self {
        let env = Rc::clone(&globals);
        Self {
            ast,
            src,
            locals,
            out,
            globals,
            env,
            return_slot: None,
        }
    }

    /// Executes the program rooted at `root`.
    ///
    /// The root block's statements run directly in the global environment —
    /// the top level is not a scope of its own, matching the resolver.
    ///
    /// # Errors
    ///
    /// Returns the first runtime error's diagnostic.
    pub fn interpret(&mut self, root: StmtIdx) -> Result<(), Diagnostic> {
        let result = match self.ast.stmt(root) {
            Stmt::Block { statements, .. } => {
                statements.iter().try_for_each(|&stmt| self.execute(stmt))
            }
            _ => self.execute(root),
        };
        match result {
            Ok(()) => Ok(()),
            Err(Unwind::Failure(diagnostic)) => Err(*diagnostic),
            // The resolver rejects top-level returns; a stray sentinel here
            // means nothing is waiting for the value.
            Err(Unwind::Return) => Ok(()),
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn execute(&mut self, idx: StmtIdx) -> EvalResult<()> {
        match self.ast.stmt(idx) {
            Stmt::Block { statements, .. } => {
                let previous = Rc::clone(&self.env);
                self.env = Environment::child(&previous);
                let result = statements.iter().try_for_each(|&stmt| self.execute(stmt));
                // Restore on every exit, including errors and returns.
                self.env = previous;
                result
            }

            Stmt::Variable { name, initializer } => {
                let value = match initializer {
                    Some(init) => self.evaluate(*init)?,
                    None => RuntimeValue::Nil,
                };
                self.env.borrow_mut().define(name.lexeme(self.src), value);
                Ok(())
            }

            Stmt::Expression { value } => {
                self.evaluate(*value)?;
                Ok(())
            }

            Stmt::Print { value } => {
                let value = self.evaluate(*value)?;
                self.out.print_line(&value.to_string());
                Ok(())
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let (condition, then_branch, else_branch) = (*condition, *then_branch, *else_branch);
                if self.evaluate(condition)?.truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(())
                }
            }

            Stmt::While { condition, body } => {
                let (condition, body) = (*condition, *body);
                while self.evaluate(condition)?.truthy() {
                    self.execute(body)?;
                }
                Ok(())
            }

            Stmt::Function { name, params, body } => {
                let function = LoxFunction {
                    name: name.lexeme(self.src).to_owned(),
                    params: params.clone(),
                    body: *body,
                    closure: Rc::clone(&self.env),
                    is_initializer: false,
                };
                self.env.borrow_mut().define(
                    name.lexeme(self.src),
                    RuntimeValue::Callable(Callable::Function(Rc::new(function))),
                );
                Ok(())
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.evaluate(*value)?,
                    None => RuntimeValue::Nil,
                };
                self.return_slot = Some(value);
                Err(Unwind::Return)
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(*name, *superclass, methods),
        }
    }

    fn execute_class(
        &mut self,
        name: Token,
        superclass: Option<ExprIdx>,
        methods: &[StmtIdx],
    ) -> EvalResult<()> {
        let name_lexeme = name.lexeme(self.src);
        // Defined as nil first so method bodies can refer to the class.
        self.env.borrow_mut().define(name_lexeme, RuntimeValue::Nil);

        let superclass = match superclass {
            Some(sup_idx) => {
                let Expr::Variable { name: sup_name } = self.ast.expr(sup_idx) else {
                    unreachable!("parser only stores Variable superclasses");
                };
                let sup_name = *sup_name;
                match self.evaluate(sup_idx)? {
                    RuntimeValue::Callable(Callable::Class(class)) => Some(class),
                    other => {
                        return Err(self.failure(
                            ErrorKind::TypeMismatch,
                            format!("superclass must be a class, not a {}", other.type_name()),
                            sup_name,
                        ))
                    }
                }
            }
            None => None,
        };

        // Method closures capture a scope with `super` bound when inheriting.
        let method_env = match &superclass {
            Some(sup) => {
                let env = Environment::child(&self.env);
                env.borrow_mut().define(
                    "super",
                    RuntimeValue::Callable(Callable::Class(Rc::clone(sup))),
                );
                env
            }
            None => Rc::clone(&self.env),
        };

        let mut method_map = AHashMap::new();
        for &method in methods {
            let Stmt::Function {
                name: method_name,
                params,
                body,
            } = self.ast.stmt(method)
            else {
                unreachable!("class methods are Function statements");
            };
            let method_lexeme = method_name.lexeme(self.src);
            method_map.insert(
                method_lexeme.to_owned(),
                Rc::new(LoxFunction {
                    name: method_lexeme.to_owned(),
                    params: params.clone(),
                    body: *body,
                    closure: Rc::clone(&method_env),
                    is_initializer: method_lexeme == "init",
                }),
            );
        }

        let class = RuntimeValue::Callable(Callable::Class(Rc::new(Class {
            name: name_lexeme.to_owned(),
            methods: method_map,
            superclass,
        })));
        let assigned = Environment::assign(&self.env, name_lexeme, class);
        debug_assert!(assigned, "class name was just defined");
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn evaluate(&mut self, idx: ExprIdx) -> EvalResult<RuntimeValue> {
        match self.ast.expr(idx) {
            Expr::Literal { value } => Ok(match *value {
                Lit::Nil => RuntimeValue::Nil,
                Lit::Bool(b) => RuntimeValue::Bool(b),
                Lit::Number(n) => RuntimeValue::Number(n),
                Lit::Str(span) => RuntimeValue::Str(Rc::from(span.slice(self.src))),
            }),

            Expr::Group { expr } => self.evaluate(*expr),

            Expr::Unary { op, expr } => {
                let (op, expr) = (*op, *expr);
                let operand = self.evaluate(expr)?;
                match op.tag {
                    TokenTag::Minus => match operand {
                        RuntimeValue::Number(n) => Ok(RuntimeValue::Number(-n)),
                        other => Err(self.failure(
                            ErrorKind::TypeMismatch,
                            format!("operand must be a number, not a {}", other.type_name()),
                            op,
                        )),
                    },
                    TokenTag::Bang => Ok(RuntimeValue::Bool(!operand.truthy())),
                    _ => unreachable!("parser only builds '-' and '!' unaries"),
                }
            }

            Expr::Binary { left, op, right } => {
                let (left, op, right) = (*left, *op, *right);
                let lhs = self.evaluate(left)?;
                let rhs = self.evaluate(right)?;
                self.binary(lhs, op, rhs)
            }

            Expr::Logical { left, op, right } => {
                let (left, op, right) = (*left, *op, *right);
                let lhs = self.evaluate(left)?;
                let short_circuits = match op.tag {
                    TokenTag::Or => lhs.truthy(),
                    TokenTag::And => !lhs.truthy(),
                    _ => unreachable!("parser only builds 'or' and 'and' logicals"),
                };
                if short_circuits {
                    Ok(lhs)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Variable { name } => self.look_up(*name),

            Expr::Assign { name, value } => {
                let (name, value) = (*name, *value);
                let value = self.evaluate(value)?;
                let lexeme = name.lexeme(self.src);
                let assigned = match self.locals.get(&name) {
                    Some(&depth) => Environment::assign_at(&self.env, depth, lexeme, value.clone()),
                    None => Environment::assign(&self.globals, lexeme, value.clone()),
                };
                if assigned {
                    Ok(value)
                } else {
                    Err(self.failure(
                        ErrorKind::UndefinedVariable,
                        format!("undefined variable '{lexeme}'"),
                        name,
                    ))
                }
            }

            Expr::Call { callee, paren, args } => {
                let callee_value = self.evaluate(*callee)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for &arg in args {
                    arg_values.push(self.evaluate(arg)?);
                }
                self.call(callee_value, arg_values, *paren)
            }

            Expr::Get { object, name } => {
                let (object, name) = (*object, *name);
                let instance = match self.evaluate(object)? {
                    RuntimeValue::Instance(instance) => instance,
                    other => {
                        return Err(self.failure(
                            ErrorKind::TypeMismatch,
                            format!("only instances have properties, not a {}", other.type_name()),
                            name,
                        ))
                    }
                };
                let lexeme = name.lexeme(self.src);
                // Fields shadow methods.
                if let Some(value) = instance.field(lexeme) {
                    return Ok(value);
                }
                match instance.class.find_method(lexeme) {
                    Some(method) => Ok(RuntimeValue::Callable(Callable::Function(
                        method.bind(&instance),
                    ))),
                    None => Err(self.failure(
                        ErrorKind::UndefinedProperty,
                        format!("undefined property '{lexeme}'"),
                        name,
                    )),
                }
            }

            Expr::Set {
                object,
                name,
                value,
            } => {
                let (object, name, value) = (*object, *name, *value);
                let instance = match self.evaluate(object)? {
                    RuntimeValue::Instance(instance) => instance,
                    other => {
                        return Err(self.failure(
                            ErrorKind::TypeMismatch,
                            format!("only instances have fields, not a {}", other.type_name()),
                            name,
                        ))
                    }
                };
                let value = self.evaluate(value)?;
                instance.set_field(name.lexeme(self.src), value.clone());
                Ok(value)
            }

            Expr::This { keyword } => self.look_up(*keyword),

            Expr::Super { keyword, method } => {
                let (keyword, method) = (*keyword, *method);
                self.super_method(keyword, method)
            }
        }
    }

    fn binary(&self, lhs: RuntimeValue, op: Token, rhs: RuntimeValue) -> EvalResult<RuntimeValue> {
        use RuntimeValue::{Number, Str};
        match op.tag {
            TokenTag::Plus => match (lhs, rhs) {
                (Number(a), Number(b)) => Ok(Number(a + b)),
                // Concatenation allocates the only new string in the system.
                (Str(a), Str(b)) => Ok(Str(Rc::from(format!("{a}{b}")))),
                (lhs, rhs) => Err(self.failure(
                    ErrorKind::InvalidBinaryOperand,
                    format!(
                        "operands must be two numbers or two strings, not {} and {}",
                        lhs.type_name(),
                        rhs.type_name()
                    ),
                    op,
                )),
            },
            TokenTag::Minus => self.arithmetic(lhs, op, rhs, |a, b| a - b),
            TokenTag::Star => self.arithmetic(lhs, op, rhs, |a, b| a * b),
            TokenTag::Slash => match (lhs, rhs) {
                // Only a well-typed division can divide by zero; anything
                // else is an operand error like the other arithmetic ops.
                (Number(_), Number(divisor)) if divisor == 0.0 => {
                    Err(self.failure(ErrorKind::DivisionByZero, "division by zero", op))
                }
                (lhs, rhs) => self.arithmetic(lhs, op, rhs, |a, b| a / b),
            },
            TokenTag::Greater => self.comparison(lhs, op, rhs, |a, b| a > b),
            TokenTag::GreaterEqual => self.comparison(lhs, op, rhs, |a, b| a >= b),
            TokenTag::Less => self.comparison(lhs, op, rhs, |a, b| a < b),
            TokenTag::LessEqual => self.comparison(lhs, op, rhs, |a, b| a <= b),
            TokenTag::EqualEqual => Ok(RuntimeValue::Bool(lhs == rhs)),
            TokenTag::BangEqual => Ok(RuntimeValue::Bool(lhs != rhs)),
            _ => unreachable!("parser never builds a binary node for {:?}", op.tag),
        }
    }

    fn arithmetic(
        &self,
        lhs: RuntimeValue,
        op: Token,
        rhs: RuntimeValue,
        apply: fn(f64, f64) -> f64,
    ) -> EvalResult<RuntimeValue> {
        match (lhs, rhs) {
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => {
                Ok(RuntimeValue::Number(apply(a, b)))
            }
            (lhs, rhs) => Err(self.operands_error(lhs, op, rhs)),
        }
    }

    fn comparison(
        &self,
        lhs: RuntimeValue,
        op: Token,
        rhs: RuntimeValue,
        apply: fn(f64, f64) -> bool,
    ) -> EvalResult<RuntimeValue> {
        match (lhs, rhs) {
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => {
                Ok(RuntimeValue::Bool(apply(a, b)))
            }
            (lhs, rhs) => Err(self.operands_error(lhs, op, rhs)),
        }
    }

    fn operands_error(&self, lhs: RuntimeValue, op: Token, rhs: RuntimeValue) -> Unwind {
        self.failure(
            ErrorKind::InvalidOperands,
            format!(
                "operands must be numbers, not {} and {}",
                lhs.type_name(),
                rhs.type_name()
            ),
            op,
        )
    }

    // ========================================================================
    // Calls and classes
    // ========================================================================

    fn call(
        &mut self,
        callee: RuntimeValue,
        args: Vec<RuntimeValue>,
        paren: Token,
    ) -> EvalResult<RuntimeValue> {
        let callable = match callee {
            RuntimeValue::Callable(callable) => callable,
            other => {
                return Err(self.failure(
                    ErrorKind::NotCallable,
                    format!("can only call functions and classes, not a {}", other.type_name()),
                    paren,
                ))
            }
        };

        let arity = callable.arity();
        if args.len() != arity {
            return Err(self.failure(
                ErrorKind::WrongNumberOfArguments,
                format!("expected {arity} arguments but got {}", args.len()),
                paren,
            ));
        }

        match callable {
            Callable::Native(native) => Ok((native.call)(&args)),
            Callable::Function(function) => self.call_function(&function, args),
            Callable::Class(class) => {
                let instance = Instance::new(Rc::clone(&class));
                if let Some(init) = class.find_method("init") {
                    self.call_function(&init.bind(&instance), args)?;
                }
                Ok(RuntimeValue::Instance(instance))
            }
        }
    }

    /// Runs a function body in a fresh scope chained onto its closure, with
    /// parameters bound. The body's statements execute directly in that
    /// scope (parameters and body share one scope, as resolved).
    fn call_function(
        &mut self,
        function: &Rc<LoxFunction>,
        args: Vec<RuntimeValue>,
    ) -> EvalResult<RuntimeValue> {
        let call_env = Environment::child(&function.closure);
        {
            let mut scope = call_env.borrow_mut();
            for (param, arg) in function.params.iter().zip(args) {
                scope.define(param.lexeme(self.src), arg);
            }
        }

        let Stmt::Block { statements, .. } = self.ast.stmt(function.body) else {
            unreachable!("function bodies are Block statements");
        };

        let previous = std::mem::replace(&mut self.env, call_env);
        let result = statements.iter().try_for_each(|&stmt| self.execute(stmt));
        self.env = previous;

        let returned = match result {
            Ok(()) => RuntimeValue::Nil,
            Err(Unwind::Return) => self.return_slot.take().unwrap_or(RuntimeValue::Nil),
            Err(failure) => return Err(failure),
        };

        if function.is_initializer {
            // `init` always hands back `this`, sitting at depth 0 of the
            // bound closure, regardless of how the body exited.
            return Ok(Environment::get_at(&function.closure, 0, "this")
                .expect("bound initializer closure defines 'this'"));
        }
        Ok(returned)
    }

    fn super_method(&mut self, keyword: Token, method: Token) -> EvalResult<RuntimeValue> {
        let Some(&depth) = self.locals.get(&keyword) else {
            return Err(self.failure(
                ErrorKind::UndefinedVariable,
                "undefined variable 'super'",
                keyword,
            ));
        };
        let superclass = match Environment::get_at(&self.env, depth, "super") {
            Some(RuntimeValue::Callable(Callable::Class(class))) => class,
            _ => {
                return Err(self.failure(
                    ErrorKind::UndefinedVariable,
                    "undefined variable 'super'",
                    keyword,
                ))
            }
        };
        // `this` is bound one scope nearer than `super`.
        let instance = match Environment::get_at(&self.env, depth - 1, "this") {
            Some(RuntimeValue::Instance(instance)) => instance,
            _ => {
                return Err(self.failure(
                    ErrorKind::UndefinedVariable,
                    "undefined variable 'this'",
                    keyword,
                ))
            }
        };
        let lexeme = method.lexeme(self.src);
        match superclass.find_method(lexeme) {
            Some(found) => Ok(RuntimeValue::Callable(Callable::Function(
                found.bind(&instance),
            ))),
            None => Err(self.failure(
                ErrorKind::MethodNotDefined,
                format!("undefined method '{lexeme}'"),
                method,
            )),
        }
    }

    // ========================================================================
    // Lookup and error plumbing
    // ========================================================================

    /// Variable/`this` lookup: through the depth table when the resolver
    /// recorded one, otherwise against the globals.
    fn look_up(&self, name: Token) -> EvalResult<RuntimeValue> {
        let lexeme = name.lexeme(self.src);
        let value = match self.locals.get(&name) {
            Some(&depth) => Environment::get_at(&self.env, depth, lexeme),
            None => Environment::get(&self.globals, lexeme),
        };
        value.ok_or_else(|| {
            self.failure(
                ErrorKind::UndefinedVariable,
                format!("undefined variable '{lexeme}'"),
                name,
            )
        })
    }

    fn failure(&self, kind: ErrorKind, message: impl Into<String>, token: Token) -> Unwind {
        Unwind::Failure(Box::new(
            Diagnostic::new(kind, message, token.loc).with_lexeme(token.lexeme(self.src)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::io::CollectPrint;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use crate::scanner::Scanner;

    /// Runs a program end to end, returning printed output and the runtime
    /// error, if any.
    fn run(src: &str) -> (String, Option<Diagnostic>) {
        let mut diags = Diagnostics::new();
        let tokens = Scanner::new(src).scan(&mut diags);
        let mut ast = Ast::new();
        let root = Parser::new(src, &tokens, &mut ast, &mut diags)
            .parse()
            .expect("test source should parse");
        let locals = Resolver::new(src, &ast, &mut diags).resolve(root);
        assert!(!diags.has_errors(), "test source should be static-error free");

        let mut out = CollectPrint::new();
        let mut interpreter = Interpreter::new(&ast, src, &locals, new_globals(), &mut out);
        let error = interpreter.interpret(root).err();
        (out.output().to_owned(), error)
    }

    fn run_ok(src: &str) -> String {
        let (output, error) = run(src);
        assert!(error.is_none(), "unexpected runtime error: {error:?}");
        output
    }

    fn run_err(src: &str) -> Diagnostic {
        let (_, error) = run(src);
        error.expect("expected a runtime error")
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(run_ok("print 1 + 2 * 3;"), "7\n");
        assert_eq!(run_ok("print (1 + 2) * 3;"), "9\n");
        assert_eq!(run_ok("print -2 * 3;"), "-6\n");
    }

    #[test]
    fn string_concatenation_allocates_new_string() {
        assert_eq!(run_ok("var a = \"foo\"; print a + \"bar\"; print a;"), "foobar\nfoo\n");
    }

    #[test]
    fn truthiness_in_conditions() {
        assert_eq!(run_ok("if (0) print \"yes\"; else print \"no\";"), "yes\n");
        assert_eq!(run_ok("if (\"\") print \"yes\"; else print \"no\";"), "yes\n");
        assert_eq!(run_ok("if (nil) print \"yes\"; else print \"no\";"), "no\n");
    }

    #[test]
    fn short_circuit_skips_right_operand() {
        // The right side would blow up if evaluated.
        assert_eq!(run_ok("print false and missing_function();"), "false\n");
        assert_eq!(run_ok("print true or missing_function();"), "true\n");
        assert_eq!(run_ok("print nil or \"fallback\";"), "fallback\n");
    }

    #[test]
    fn block_scoping_restores_on_exit() {
        assert_eq!(
            run_ok("var a = 1; { var a = 2; print a; } print a;"),
            "2\n1\n"
        );
    }

    #[test]
    fn while_loop_counts() {
        assert_eq!(run_ok("var i = 0; while (i < 3) { print i; i = i + 1; }"), "0\n1\n2\n");
    }

    #[test]
    fn function_call_and_return() {
        assert_eq!(
            run_ok("fun add(a, b) { return a + b; } print add(1, 2);"),
            "3\n"
        );
    }

    #[test]
    fn function_without_return_yields_nil() {
        assert_eq!(run_ok("fun noop() { } print noop();"), "nil\n");
    }

    #[test]
    fn closure_sees_declaration_scope() {
        let src = "
            var greeting = \"global\";
            {
                fun show() { print greeting; }
                var greeting = \"local\";
                show();
            }
        ";
        // `show` captured the scope before the shadowing declaration.
        assert_eq!(run_ok(src), "global\n");
    }

    #[test]
    fn counter_closure_keeps_private_state() {
        let src = "
            fun mk() { var x = 0; fun inc() { x = x + 1; return x; } return inc; }
            var f = mk();
            print f();
            print f();
        ";
        assert_eq!(run_ok(src), "1\n2\n");
    }

    #[test]
    fn class_fields_shadow_methods() {
        let src = "
            class A { m() { return \"method\"; } }
            var a = A();
            a.m = \"field\";
            print a.m;
        ";
        assert_eq!(run_ok(src), "field\n");
    }

    #[test]
    fn bound_method_remembers_receiver() {
        let src = "
            class Cake { flavor() { return this.kind; } }
            var cake = Cake();
            cake.kind = \"chocolate\";
            var m = cake.flavor;
            var cake2 = Cake();
            cake2.kind = \"vanilla\";
            print m();
        ";
        assert_eq!(run_ok(src), "chocolate\n");
    }

    #[test]
    fn initializer_returns_this() {
        let src = "
            class A { init() { this.x = 1; } }
            var a = A();
            print a.x;
            print A() == A();
        ";
        assert_eq!(run_ok(src), "1\nfalse\n");
    }

    #[test]
    fn inherited_method_and_super() {
        let src = "
            class A { greet() { return \"A\"; } }
            class B < A { greet() { return super.greet() + \"B\"; } }
            print B().greet();
        ";
        assert_eq!(run_ok(src), "AB\n");
    }

    #[test]
    fn undefined_variable_is_a_runtime_error() {
        assert_eq!(run_err("print ghost;").kind, ErrorKind::UndefinedVariable);
        assert_eq!(run_err("ghost = 1;").kind, ErrorKind::UndefinedVariable);
    }

    #[test]
    fn mixed_plus_is_invalid_binary_operand() {
        assert_eq!(run_err("print 1 + \"a\";").kind, ErrorKind::InvalidBinaryOperand);
    }

    #[test]
    fn comparison_of_non_numbers_is_invalid_operands() {
        assert_eq!(run_err("print \"a\" < \"b\";").kind, ErrorKind::InvalidOperands);
    }

    #[test]
    fn unary_minus_requires_a_number() {
        assert_eq!(run_err("print -\"a\";").kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(run_err("print 1 / 0;").kind, ErrorKind::DivisionByZero);
        assert_eq!(run_ok("print 1 / 2;"), "0.5\n");
        // Operand typing is checked before the divisor's value.
        assert_eq!(run_err("print \"a\" / 0;").kind, ErrorKind::InvalidOperands);
        assert_eq!(run_err("print nil / 0;").kind, ErrorKind::InvalidOperands);
    }

    #[test]
    fn calling_a_non_callable_fails() {
        assert_eq!(run_err("var x = 1; x();").kind, ErrorKind::NotCallable);
    }

    #[test]
    fn arity_mismatch_fails() {
        assert_eq!(
            run_err("fun f(a) { return a; } f(1, 2);").kind,
            ErrorKind::WrongNumberOfArguments
        );
    }

    #[test]
    fn missing_property_fails() {
        assert_eq!(
            run_err("class A { } print A().nope;").kind,
            ErrorKind::UndefinedProperty
        );
    }

    #[test]
    fn missing_super_method_fails() {
        let src = "
            class A { }
            class B < A { m() { return super.nope(); } }
            B().m();
        ";
        assert_eq!(run_err(src).kind, ErrorKind::MethodNotDefined);
    }

    #[test]
    fn property_access_on_non_instance_fails() {
        assert_eq!(run_err("print (1).x;").kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn superclass_must_be_a_class() {
        assert_eq!(
            run_err("var NotAClass = 1; class B < NotAClass { }").kind,
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn clock_native_returns_a_number() {
        assert_eq!(run_ok("print clock() >= 0;"), "true\n");
        assert_eq!(run_err("clock(1);").kind, ErrorKind::WrongNumberOfArguments);
    }

    #[test]
    fn equality_across_kinds_is_false() {
        assert_eq!(run_ok("print 1 == \"1\";"), "false\n");
        assert_eq!(run_ok("print nil == false;"), "false\n");
        assert_eq!(run_ok("print \"a\" + \"b\" == \"ab\";"), "true\n");
    }
}
