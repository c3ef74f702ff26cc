//! Runtime values for the treewalk backend.
//!
//! [`RuntimeValue`] is a tagged union over everything an expression can
//! produce. Heap-shaped values (strings, callables, instances) sit behind
//! `Rc` so copying a value is always cheap and closures/bound methods can
//! share structure; the cyclic shapes that arise between environments,
//! closures, and instances stay alive through whatever the execution stack
//! still roots, since parent links never own their targets.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::ast::StmtIdx;
use crate::env::{EnvRef, Environment};
use crate::token::Token;

/// A value as the treewalk interpreter sees it.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Nil,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Callable(Callable),
    Instance(Rc<Instance>),
}

impl RuntimeValue {
    /// `nil` and `false` are the only falsy values; `0` and `""` are truthy.
    #[must_use]
    pub fn truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// The value's kind, for type-mismatch messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Callable(Callable::Class(_)) => "class",
            Self::Callable(_) => "function",
            Self::Instance(_) => "instance",
        }
    }
}

/// Language equality: values of different kinds are never equal; numbers
/// follow IEEE-754 (`NaN != NaN`); strings compare by content; callables and
/// instances compare by identity.
impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Callable(a), Self::Callable(b)) => a == b,
            (Self::Instance(a), Self::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(true) => f.write_str("true"),
            Self::Bool(false) => f.write_str("false"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Str(s) => f.write_str(s),
            Self::Callable(c) => write!(f, "{c}"),
            Self::Instance(i) => write!(f, "{} instance", i.class.name),
        }
    }
}

/// Formats a number the way the language prints it: integral values drop the
/// fraction entirely.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n == n.trunc() {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

/// Anything that may appear to the left of a call.
#[derive(Debug, Clone)]
pub enum Callable {
    Function(Rc<LoxFunction>),
    Native(NativeFn),
    Class(Rc<Class>),
}

impl Callable {
    /// The number of arguments this callable expects.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::Function(function) => function.params.len(),
            Self::Native(native) => native.arity,
            // A class's arity is its initializer's, or zero without one.
            Self::Class(class) => class.find_method("init").map_or(0, |init| init.params.len()),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => a.name == b.name,
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(function) => write!(f, "<fn {}>", function.name),
            Self::Native(native) => write!(f, "<native fn {}>", native.name),
            Self::Class(class) => f.write_str(&class.name),
        }
    }
}

/// A user-declared function or method.
///
/// The body stays in the AST arena; only the handle is stored. The closure
/// is the environment captured at declaration time, which is what a later
/// call chains its locals onto.
#[derive(Debug)]
pub struct LoxFunction {
    pub name: String,
    pub params: Vec<Token>,
    /// Always references a `Block` statement.
    pub body: StmtIdx,
    pub closure: EnvRef,
    /// `init` methods return `this` no matter what the body says.
    pub is_initializer: bool,
}

impl LoxFunction {
    /// Produces a copy of this function bound to `instance`: the copy's
    /// closure is a fresh scope defining `this`, chained onto the original
    /// closure. Method bodies resolve `this` through exactly this scope.
    #[must_use]
    pub fn bind(&self, instance: &Rc<Instance>) -> Rc<Self> {
        let bound_env = Environment::child(&self.closure);
        bound_env
            .borrow_mut()
            .define("this", RuntimeValue::Instance(Rc::clone(instance)));
        Rc::new(Self {
            name: self.name.clone(),
            params: self.params.clone(),
            body: self.body,
            closure: bound_env,
            is_initializer: self.is_initializer,
        })
    }
}

/// A built-in function: declared arity plus a direct call pointer.
#[derive(Debug, Clone, Copy)]
pub struct NativeFn {
    pub name: &'static str,
    pub arity: usize,
    pub call: fn(&[RuntimeValue]) -> RuntimeValue,
}

/// A class: its method table and optional superclass.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub methods: AHashMap<String, Rc<LoxFunction>>,
    pub superclass: Option<Rc<Class>>,
}

impl Class {
    /// Looks up a method on this class or, transitively, its superclasses.
    #[must_use]
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        if let Some(method) = self.methods.get(name) {
            return Some(Rc::clone(method));
        }
        self.superclass
            .as_ref()
            .and_then(|superclass| superclass.find_method(name))
    }
}

/// A class instance: per-object fields plus a reference to its class.
///
/// Fields keep insertion order so reprs and debugging output are stable.
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<Class>,
    pub fields: RefCell<IndexMap<String, RuntimeValue>>,
}

impl Instance {
    #[must_use]
    pub fn new(class: Rc<Class>) -> Rc<Self> {
        Rc::new(Self {
            class,
            fields: RefCell::new(IndexMap::new()),
        })
    }

    /// Reads a field. Fields shadow methods; method lookup happens at the
    /// call site so the result can be bound to the instance.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<RuntimeValue> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: RuntimeValue) {
        self.fields.borrow_mut().insert(name.to_owned(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!RuntimeValue::Nil.truthy());
        assert!(!RuntimeValue::Bool(false).truthy());
        assert!(RuntimeValue::Bool(true).truthy());
        assert!(RuntimeValue::Number(0.0).truthy());
        assert!(RuntimeValue::Str(Rc::from("")).truthy());
    }

    #[test]
    fn equality_is_tag_then_value() {
        assert_eq!(RuntimeValue::Nil, RuntimeValue::Nil);
        assert_ne!(RuntimeValue::Nil, RuntimeValue::Bool(false));
        assert_ne!(RuntimeValue::Number(0.0), RuntimeValue::Str(Rc::from("0")));
        assert_eq!(
            RuntimeValue::Str(Rc::from("ab")),
            RuntimeValue::Str(Rc::from("ab"))
        );
        assert_ne!(
            RuntimeValue::Number(f64::NAN),
            RuntimeValue::Number(f64::NAN)
        );
    }

    #[test]
    fn number_formatting_drops_integral_fraction() {
        assert_eq!(format_number(7.0), "7");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(0.1), "0.1");
    }

    #[test]
    fn instances_compare_by_identity() {
        let class = Rc::new(Class {
            name: "Point".to_owned(),
            methods: AHashMap::new(),
            superclass: None,
        });
        let a = Instance::new(Rc::clone(&class));
        let b = Instance::new(Rc::clone(&class));
        assert_eq!(
            RuntimeValue::Instance(Rc::clone(&a)),
            RuntimeValue::Instance(Rc::clone(&a))
        );
        assert_ne!(RuntimeValue::Instance(a), RuntimeValue::Instance(b));
    }

    #[test]
    fn method_lookup_walks_superclasses() {
        let mut base_methods = AHashMap::new();
        let base_env = Environment::root();
        base_methods.insert(
            "greet".to_owned(),
            Rc::new(LoxFunction {
                name: "greet".to_owned(),
                params: vec![],
                body: crate::ast::Ast::new().push_stmt(crate::ast::Stmt::Block {
                    statements: vec![],
                    loc: crate::token::Token::new(
                        crate::token::TokenTag::LeftBrace,
                        crate::token::Span::new(0, 0),
                        crate::token::SrcLoc::new(1, 1),
                    ),
                }),
                closure: base_env,
                is_initializer: false,
            }),
        );
        let base = Rc::new(Class {
            name: "A".to_owned(),
            methods: base_methods,
            superclass: None,
        });
        let derived = Class {
            name: "B".to_owned(),
            methods: AHashMap::new(),
            superclass: Some(base),
        };
        assert!(derived.find_method("greet").is_some());
        assert!(derived.find_method("missing").is_none());
    }

    #[test]
    fn fields_preserve_insertion_order() {
        let class = Rc::new(Class {
            name: "Bag".to_owned(),
            methods: AHashMap::new(),
            superclass: None,
        });
        let instance = Instance::new(class);
        instance.set_field("z", RuntimeValue::Number(1.0));
        instance.set_field("a", RuntimeValue::Number(2.0));
        let order: Vec<String> = instance.fields.borrow().keys().cloned().collect();
        assert_eq!(order, vec!["z", "a"]);
    }
}
