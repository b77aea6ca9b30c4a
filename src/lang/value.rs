use std::rc::Rc;

use crate::runtime::frame::Closure;

/// Runtime value of an interpreted program.
///
/// These are the only data that can live on the VM operand stack. The code
/// generator's C runtime mirrors this set one-to-one (`rt_value`).
#[derive(Debug, Clone)]
pub enum Value {
    Nil,

    Bool(bool),

    /// 64-bit signed integer with wrapping arithmetic.
    Integer(i64),

    /// Immutable UTF-8 string.
    String(Rc<str>),

    Symbol(Rc<str>),

    /// The top-level `main` object.
    Main,

    /// A block captured over its defining run-time scope.
    Proc(Rc<Closure>),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn symbol(s: &str) -> Self {
        Value::Symbol(Rc::from(s))
    }

    /// Everything except `nil` and `false` is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            Value::Nil => "NilClass",
            Value::Bool(true) => "TrueClass",
            Value::Bool(false) => "FalseClass",
            Value::Integer(_) => "Integer",
            Value::String(_) => "String",
            Value::Symbol(_) => "Symbol",
            Value::Main => "Object",
            Value::Proc(_) => "Proc",
        }
    }

    /// Name used in coercion messages (`nil can't be coerced into Integer`).
    pub fn coercion_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(true) => "true",
            Value::Bool(false) => "false",
            other => other.class_name(),
        }
    }

    /// Receiver description used in `NoMethodError` messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Main => "main:Object".to_string(),
            other => format!("an instance of {}", other.class_name()),
        }
    }
}

impl Value {
    /// `inspect` rendering, used when echoing a program's final value.
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::String(s) => {
                let mut out = String::from("\"");
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        c => out.push(c),
                    }
                }
                out.push('"');
                out
            }
            Value::Symbol(s) => format!(":{}", s),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    /// Ruby `==`: numeric for integers, by content for strings and symbols,
    /// identity for procs.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) | (Value::Main, Value::Main) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Proc(a), Value::Proc(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    /// Format a value the way `puts` and `print` render it (`to_s`).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::String(s) | Value::Symbol(s) => write!(f, "{}", s),
            Value::Main => write!(f, "main"),
            Value::Proc(_) => write!(f, "#<Proc>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::string("").is_truthy());
    }

    #[test]
    fn test_to_s() {
        assert_eq!(Value::Nil.to_string(), "");
        assert_eq!(Value::Integer(-5).to_string(), "-5");
        assert_eq!(Value::symbol("fib").to_string(), "fib");
        assert_eq!(Value::Main.to_string(), "main");
    }

    #[test]
    fn test_equality_is_by_value() {
        assert_eq!(Value::string("a"), Value::string("a"));
        assert_ne!(Value::string("a"), Value::symbol("a"));
        assert_ne!(Value::Integer(1), Value::Bool(true));
    }

    #[test]
    fn test_inspect() {
        assert_eq!(Value::Nil.inspect(), "nil");
        assert_eq!(Value::string("a\"b\n").inspect(), "\"a\\\"b\\n\"");
        assert_eq!(Value::symbol("k").inspect(), ":k");
        assert_eq!(Value::Integer(3).inspect(), "3");
    }

    #[test]
    fn test_describe() {
        assert_eq!(Value::Main.describe(), "main:Object");
        assert_eq!(Value::Integer(3).describe(), "an instance of Integer");
        assert_eq!(Value::Nil.describe(), "nil");
    }
}
