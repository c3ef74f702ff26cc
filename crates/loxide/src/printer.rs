//! Debug rendering of the AST as s-expressions.
//!
//! One line per top-level statement, children parenthesized and nested
//! inline: `for (var i = 0; i < 3; i = i + 1) print i;` renders as the
//! block/while shape it desugars to, which makes the printer a convenient
//! window into what the parser actually built.

use crate::ast::{Ast, Expr, ExprIdx, Lit, Stmt, StmtIdx};
use crate::value::format_number;

/// Renders AST nodes against their arena and source buffer.
#[derive(Debug, Clone, Copy)]
pub struct AstPrinter<'a> {
    ast: &'a Ast,
    src: &'a str,
}

impl<'a> AstPrinter<'a> {
    #[must_use]
    pub fn new(ast: &'a Ast, src: &'a str) -> Self {
        Self { ast, src }
    }

    /// Renders a whole program, one top-level statement per line.
    #[must_use]
    pub fn print_program(&self, root: StmtIdx) -> String {
        let mut out = String::new();
        match self.ast.stmt(root) {
            Stmt::Block { statements, .. } => {
                for &stmt in statements {
                    out.push_str(&self.print_stmt(stmt));
                    out.push('\n');
                }
            }
            _ => {
                out.push_str(&self.print_stmt(root));
                out.push('\n');
            }
        }
        out
    }

    #[must_use]
    pub fn print_stmt(&self, idx: StmtIdx) -> String {
        match self.ast.stmt(idx) {
            Stmt::Block { statements, .. } => {
                let mut parts = vec!["block".to_owned()];
                parts.extend(statements.iter().map(|&stmt| self.print_stmt(stmt)));
                parenthesize(&parts)
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let mut parts = vec!["class".to_owned(), name.lexeme(self.src).to_owned()];
                if let Some(sup) = superclass {
                    parts.push(format!("(< {})", self.print_expr(*sup)));
                }
                parts.extend(methods.iter().map(|&method| self.print_stmt(method)));
                parenthesize(&parts)
            }
            Stmt::Expression { value } => parenthesize(&["expr".to_owned(), self.print_expr(*value)]),
            Stmt::Function { name, params, body } => {
                let params = params
                    .iter()
                    .map(|param| param.lexeme(self.src))
                    .collect::<Vec<_>>()
                    .join(" ");
                parenthesize(&[
                    "fun".to_owned(),
                    name.lexeme(self.src).to_owned(),
                    format!("({params})"),
                    self.print_stmt(*body),
                ])
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut parts = vec![
                    "if".to_owned(),
                    self.print_expr(*condition),
                    self.print_stmt(*then_branch),
                ];
                if let Some(else_branch) = else_branch {
                    parts.push(self.print_stmt(*else_branch));
                }
                parenthesize(&parts)
            }
            Stmt::Print { value } => parenthesize(&["print".to_owned(), self.print_expr(*value)]),
            Stmt::Return { value, .. } => match value {
                Some(value) => parenthesize(&["return".to_owned(), self.print_expr(*value)]),
                None => "(return)".to_owned(),
            },
            Stmt::Variable { name, initializer } => {
                let mut parts = vec!["var".to_owned(), name.lexeme(self.src).to_owned()];
                if let Some(init) = initializer {
                    parts.push(self.print_expr(*init));
                }
                parenthesize(&parts)
            }
            Stmt::While { condition, body } => parenthesize(&[
                "while".to_owned(),
                self.print_expr(*condition),
                self.print_stmt(*body),
            ]),
        }
    }

    #[must_use]
    pub fn print_expr(&self, idx: ExprIdx) -> String {
        match self.ast.expr(idx) {
            Expr::Assign { name, value } => parenthesize(&[
                "=".to_owned(),
                name.lexeme(self.src).to_owned(),
                self.print_expr(*value),
            ]),
            Expr::Binary { left, op, right } | Expr::Logical { left, op, right } => {
                parenthesize(&[
                    op.lexeme(self.src).to_owned(),
                    self.print_expr(*left),
                    self.print_expr(*right),
                ])
            }
            Expr::Call { callee, args, .. } => {
                let mut parts = vec!["call".to_owned(), self.print_expr(*callee)];
                parts.extend(args.iter().map(|&arg| self.print_expr(arg)));
                parenthesize(&parts)
            }
            Expr::Get { object, name } => parenthesize(&[
                "get".to_owned(),
                self.print_expr(*object),
                name.lexeme(self.src).to_owned(),
            ]),
            Expr::Group { expr } => parenthesize(&["group".to_owned(), self.print_expr(*expr)]),
            Expr::Literal { value } => match *value {
                Lit::Nil => "nil".to_owned(),
                Lit::Bool(true) => "true".to_owned(),
                Lit::Bool(false) => "false".to_owned(),
                Lit::Number(n) => format_number(n),
                Lit::Str(span) => format!("\"{}\"", span.slice(self.src)),
            },
            Expr::Set {
                object,
                name,
                value,
            } => parenthesize(&[
                "set".to_owned(),
                self.print_expr(*object),
                name.lexeme(self.src).to_owned(),
                self.print_expr(*value),
            ]),
            Expr::Super { method, .. } => {
                parenthesize(&["super".to_owned(), method.lexeme(self.src).to_owned()])
            }
            Expr::This { .. } => "this".to_owned(),
            Expr::Unary { op, expr } => parenthesize(&[
                op.lexeme(self.src).to_owned(),
                self.print_expr(*expr),
            ]),
            Expr::Variable { name } => name.lexeme(self.src).to_owned(),
        }
    }
}

fn parenthesize(parts: &[String]) -> String {
    format!("({})", parts.join(" "))
}
