//! Static name resolution.
//!
//! A pass over the AST that computes, for every variable reference bound in
//! a local scope, how many scopes to skip at runtime to reach its binding.
//! The result is a side-table keyed on token identity; references that are
//! not in the table resolve against the globals. Running this once up front
//! means the interpreter never searches scopes by name at execution time and
//! closures capture exactly the bindings that were visible at declaration.
//!
//! The same pass rejects the static errors: reading a variable from its own
//! initializer, redeclaring in the same local scope, `return` outside a
//! function, returning a value from `init`, `this`/`super` misuse, and a
//! class inheriting from itself. Errors are buffered and resolution
//! continues, so one pass surfaces them all.

use ahash::AHashMap;

use crate::ast::{Ast, Expr, ExprIdx, Stmt, StmtIdx};
use crate::diagnostics::{Diagnostic, Diagnostics, ErrorKind};
use crate::token::Token;

/// What kind of function body we are currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FunctionKind {
    #[default]
    None,
    Function,
    Method,
    Initializer,
}

/// What kind of class body we are currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ClassKind {
    #[default]
    None,
    Class,
    Subclass,
}

/// The resolver. One-shot: construct, call [`Resolver::resolve`].
pub struct Resolver<'a> {
    src: &'a str,
    ast: &'a Ast,
    diags: &'a mut Diagnostics,
    /// Innermost scope last. Each maps a name to "fully defined yet?".
    scopes: Vec<AHashMap<String, bool>>,
    /// The produced side-table: reference token → scope distance.
    locals: AHashMap<Token, usize>,
    curr_function: FunctionKind,
    curr_class: ClassKind,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(src: &'a str, ast: &'a Ast, diags: &'a mut Diagnostics) -> Self {
        Self {
            src,
            ast,
            diags,
            scopes: Vec::new(),
            locals: AHashMap::new(),
            curr_function: FunctionKind::None,
            curr_class: ClassKind::None,
        }
    }

    /// Resolves the whole program and returns the depth side-table.
    ///
    /// The root block's statements are the top level: they run in the global
    /// environment, so no scope is pushed for the root itself.
    #[must_use]
    pub fn resolve(mut self, root: StmtIdx) -> AHashMap<Token, usize> {
        match self.ast.stmt(root) {
            Stmt::Block { statements, .. } => {
                for &stmt in statements {
                    self.resolve_stmt(stmt);
                }
            }
            _ => self.resolve_stmt(root),
        }
        self.locals
    }

    fn resolve_stmt(&mut self, idx: StmtIdx) {
        match self.ast.stmt(idx) {
            Stmt::Block { statements, .. } => {
                self.begin_scope();
                for &stmt in statements {
                    self.resolve_stmt(stmt);
                }
                self.end_scope();
            }

            Stmt::Variable { name, initializer } => {
                let (name, initializer) = (*name, *initializer);
                self.declare(name);
                if let Some(init) = initializer {
                    self.resolve_expr(init);
                }
                self.define(name);
            }

            Stmt::Function { name, params, body } => {
                // Defined eagerly so the function can recurse into itself.
                self.declare(*name);
                self.define(*name);
                self.resolve_function(params, *body, FunctionKind::Function);
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                self.resolve_class(*name, *superclass, methods);
            }

            Stmt::Expression { value } | Stmt::Print { value } => self.resolve_expr(*value),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(*condition);
                self.resolve_stmt(*then_branch);
                if let Some(else_branch) = *else_branch {
                    self.resolve_stmt(else_branch);
                }
            }

            Stmt::Return { keyword, value } => {
                let (keyword, value) = (*keyword, *value);
                if self.curr_function == FunctionKind::None {
                    self.error(
                        ErrorKind::ReturnFromTopLevel,
                        "can't return from top-level code",
                        keyword,
                    );
                }
                if let Some(value) = value {
                    if self.curr_function == FunctionKind::Initializer {
                        self.error(
                            ErrorKind::InitializerReturnedValue,
                            "can't return a value from an initializer",
                            keyword,
                        );
                    }
                    self.resolve_expr(value);
                }
            }

            Stmt::While { condition, body } => {
                let (condition, body) = (*condition, *body);
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }
        }
    }

    fn resolve_class(&mut self, name: Token, superclass: Option<ExprIdx>, methods: &[StmtIdx]) {
        let enclosing = self.curr_class;
        self.curr_class = ClassKind::Class;

        self.declare(name);
        self.define(name);

        if let Some(sup_idx) = superclass {
            let Expr::Variable { name: sup_name } = self.ast.expr(sup_idx) else {
                unreachable!("parser only stores Variable superclasses");
            };
            let sup_name = *sup_name;
            if sup_name.lexeme(self.src) == name.lexeme(self.src) {
                self.error(
                    ErrorKind::InheritanceCycle,
                    "a class can't inherit from itself",
                    sup_name,
                );
            }
            self.curr_class = ClassKind::Subclass;
            self.resolve_expr(sup_idx);

            // `super` lives one scope outside the method scopes.
            self.begin_scope();
            self.scope_insert("super");
        }

        // `this` is injected in a scope enclosing every method body.
        self.begin_scope();
        self.scope_insert("this");

        for &method in methods {
            let Stmt::Function { name, params, body } = self.ast.stmt(method) else {
                unreachable!("class methods are Function statements");
            };
            let kind = if name.lexeme(self.src) == "init" {
                FunctionKind::Initializer
            } else {
                FunctionKind::Method
            };
            self.resolve_function(params, *body, kind);
        }

        self.end_scope();
        if superclass.is_some() {
            self.end_scope();
        }
        self.curr_class = enclosing;
    }

    /// Resolves a function body: parameters and body statements share one
    /// scope, mirroring the single environment a call creates at runtime.
    fn resolve_function(&mut self, params: &[Token], body: StmtIdx, kind: FunctionKind) {
        let enclosing = self.curr_function;
        self.curr_function = kind;

        self.begin_scope();
        for &param in params {
            self.declare(param);
            self.define(param);
        }
        let Stmt::Block { statements, .. } = self.ast.stmt(body) else {
            unreachable!("function bodies are Block statements");
        };
        for &stmt in statements.clone().iter() {
            self.resolve_stmt(stmt);
        }
        self.end_scope();

        self.curr_function = enclosing;
    }

    fn resolve_expr(&mut self, idx: ExprIdx) {
        match self.ast.expr(idx) {
            Expr::Variable { name } => {
                let name = *name;
                if self
                    .scopes
                    .last()
                    .is_some_and(|scope| scope.get(name.lexeme(self.src)) == Some(&false))
                {
                    self.error(
                        ErrorKind::SelfreferenceInitializer,
                        "can't read local variable in its own initializer",
                        name,
                    );
                }
                self.resolve_local(name);
            }

            Expr::Assign { name, value } => {
                let (name, value) = (*name, *value);
                self.resolve_expr(value);
                self.resolve_local(name);
            }

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                let (left, right) = (*left, *right);
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Call { callee, args, .. } => {
                self.resolve_expr(*callee);
                for &arg in args {
                    self.resolve_expr(arg);
                }
            }

            Expr::Get { object, .. } => {
                // Property names are looked up dynamically; only the object
                // expression resolves statically.
                self.resolve_expr(*object);
            }

            Expr::Set { object, value, .. } => {
                let (object, value) = (*object, *value);
                self.resolve_expr(object);
                self.resolve_expr(value);
            }

            Expr::Group { expr } | Expr::Unary { expr, .. } => self.resolve_expr(*expr),

            Expr::Literal { .. } => {}

            Expr::This { keyword } => {
                let keyword = *keyword;
                if self.curr_class == ClassKind::None {
                    self.error(
                        ErrorKind::ThisOutsideClass,
                        "can't use 'this' outside of a class",
                        keyword,
                    );
                    return;
                }
                self.resolve_local(keyword);
            }

            Expr::Super { keyword, .. } => {
                let keyword = *keyword;
                match self.curr_class {
                    ClassKind::None => {
                        self.error(
                            ErrorKind::SuperOutsideSubclass,
                            "can't use 'super' outside of a class",
                            keyword,
                        );
                    }
                    ClassKind::Class => {
                        self.error(
                            ErrorKind::SuperOutsideSubclass,
                            "can't use 'super' in a class with no superclass",
                            keyword,
                        );
                    }
                    ClassKind::Subclass => self.resolve_local(keyword),
                }
            }
        }
    }

    /// Records the scope distance for a reference that binds locally; global
    /// (unfound) references are intentionally left out of the table.
    fn resolve_local(&mut self, token: Token) {
        let name = token.lexeme(self.src);
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(name) {
                self.locals.insert(token, depth);
                return;
            }
        }
    }

    fn declare(&mut self, name: Token) {
        let lexeme = name.lexeme(self.src);
        let Some(scope) = self.scopes.last_mut() else {
            return; // globals may redeclare freely
        };
        if scope.contains_key(lexeme) {
            self.error(
                ErrorKind::VariableRedeclaration,
                format!("'{lexeme}' is already declared in this scope"),
                name,
            );
            return;
        }
        scope.insert(lexeme.to_owned(), false);
    }

    fn define(&mut self, name: Token) {
        let lexeme = name.lexeme(self.src);
        if let Some(scope) = self.scopes.last_mut() {
            if let Some(defined) = scope.get_mut(lexeme) {
                *defined = true;
            }
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(AHashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn scope_insert(&mut self, name: &str) {
        self.scopes
            .last_mut()
            .expect("scope_insert requires an open scope")
            .insert(name.to_owned(), true);
    }

    fn error(&mut self, kind: ErrorKind, message: impl Into<String>, token: Token) {
        self.diags.report_error(
            Diagnostic::new(kind, message, token.loc).with_lexeme(token.lexeme(self.src)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn resolve(src: &str) -> (AHashMap<Token, usize>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = Scanner::new(src).scan(&mut diags);
        let mut ast = Ast::new();
        let root = Parser::new(src, &tokens, &mut ast, &mut diags)
            .parse()
            .expect("test source should parse");
        assert!(!diags.has_errors(), "test source should parse cleanly");
        let locals = Resolver::new(src, &ast, &mut diags).resolve(root);
        (locals, diags)
    }

    fn error_kinds(src: &str) -> Vec<ErrorKind> {
        resolve(src).1.errors().iter().map(|d| d.kind).collect()
    }

    #[test]
    fn globals_are_not_in_the_side_table() {
        let (locals, diags) = resolve("var a = 1; print a;");
        assert!(!diags.has_errors());
        assert!(locals.is_empty());
    }

    #[test]
    fn block_locals_resolve_at_depth_zero() {
        let (locals, diags) = resolve("{ var a = 1; print a; }");
        assert!(!diags.has_errors());
        assert_eq!(locals.len(), 1);
        assert!(locals.values().all(|&depth| depth == 0));
    }

    #[test]
    fn closure_captures_across_function_scope() {
        // `x` inside `inner` lives in `outer`'s function scope: one scope
        // (inner's own) must be skipped.
        let src = "fun outer() { var x = 1; fun inner() { print x; } }";
        let (locals, diags) = resolve(src);
        assert!(!diags.has_errors());
        assert!(locals.values().any(|&depth| depth == 1));
    }

    #[test]
    fn params_resolve_like_locals() {
        let (locals, diags) = resolve("fun f(a) { print a; }");
        assert!(!diags.has_errors());
        assert_eq!(locals.len(), 1);
        assert!(locals.values().all(|&depth| depth == 0));
    }

    #[test]
    fn redeclaration_in_same_scope_is_an_error() {
        assert_eq!(
            error_kinds("{ var a = 1; var a = 2; }"),
            vec![ErrorKind::VariableRedeclaration]
        );
    }

    #[test]
    fn redeclaration_of_globals_is_allowed() {
        let (_, diags) = resolve("var a = 1; var a = 2;");
        assert!(!diags.has_errors());
    }

    #[test]
    fn self_referential_initializer_is_an_error() {
        assert_eq!(
            error_kinds("var a = 1; { var a = a; }"),
            vec![ErrorKind::SelfreferenceInitializer]
        );
    }

    #[test]
    fn return_at_top_level_is_an_error() {
        assert_eq!(error_kinds("return 1;"), vec![ErrorKind::ReturnFromTopLevel]);
    }

    #[test]
    fn initializer_returning_a_value_is_an_error() {
        assert_eq!(
            error_kinds("class A { init() { return 1; } }"),
            vec![ErrorKind::InitializerReturnedValue]
        );
    }

    #[test]
    fn bare_return_from_initializer_is_fine() {
        let (_, diags) = resolve("class A { init() { return; } }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn this_outside_a_class_is_an_error() {
        assert_eq!(error_kinds("print this;"), vec![ErrorKind::ThisOutsideClass]);
    }

    #[test]
    fn this_inside_a_method_resolves() {
        let (locals, diags) = resolve("class A { m() { return this; } }");
        assert!(!diags.has_errors());
        // `this` skips the method scope to the injected binding.
        assert!(locals.values().any(|&depth| depth == 1));
    }

    #[test]
    fn super_outside_a_class_is_an_error() {
        assert_eq!(
            error_kinds("print super.m;"),
            vec![ErrorKind::SuperOutsideSubclass]
        );
    }

    #[test]
    fn super_without_a_superclass_is_an_error() {
        assert_eq!(
            error_kinds("class A { m() { return super.m; } }"),
            vec![ErrorKind::SuperOutsideSubclass]
        );
    }

    #[test]
    fn super_in_a_subclass_resolves() {
        let src = "class A { m() { return 1; } } class B < A { m() { return super.m(); } }";
        let (locals, diags) = resolve(src);
        assert!(!diags.has_errors());
        // `super` skips the method scope and the `this` scope.
        assert!(locals.values().any(|&depth| depth == 2));
    }

    #[test]
    fn class_inheriting_from_itself_is_an_error() {
        assert_eq!(
            error_kinds("class A < A { }"),
            vec![ErrorKind::InheritanceCycle]
        );
    }
}
