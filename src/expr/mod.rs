//! Typed predicate expressions over session metrics.
//!
//! Rule conditions are written in a small expression language: integer,
//! string and boolean literals, arithmetic, comparisons, logical operators
//! and a handful of string methods (`startsWith`, `endsWith`, `contains`).
//! An [`Env`] declares the kind of every variable an expression may
//! reference, so misspelled metrics and operand mismatches are rejected at
//! startup rather than per request. Evaluation binds variables against a
//! single trace and degrades gracefully: runtime failures surface as
//! [`EvalError`] for the caller to log and skip.

mod eval;
pub mod lexer;
pub mod parser;

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use self::parser::Expr;

/// A runtime value: the language is deliberately limited to the three
/// kinds the metric schema uses.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Int(_) => Kind::Int,
            Value::Str(_) => Kind::Str,
            Value::Bool(_) => Kind::Bool,
        }
    }
}

/// The static kind of a value or variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Int,
    Str,
    Bool,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Int => write!(f, "int"),
            Kind::Str => write!(f, "string"),
            Kind::Bool => write!(f, "bool"),
        }
    }
}

/// Compilation failure, split by stage so operators can tell a typo from a
/// type error.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("program error: {0}")]
    Build(String),
}

/// Runtime evaluation failure. These never abort a scoring run; callers
/// log them and treat the rule as not matched.
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("type mismatch: {0}")]
    Kind(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
}

/// Declared variables and their kinds; the compilation context for every
/// rule expression.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, Kind>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable, builder-style.
    pub fn with_var(mut self, name: &str, kind: Kind) -> Self {
        self.vars.insert(name.to_string(), kind);
        self
    }

    pub fn kind_of(&self, name: &str) -> Option<Kind> {
        self.vars.get(name).copied()
    }

    /// Compile `source` into an executable predicate.
    ///
    /// Three stages, three distinct error variants: syntax, then a type
    /// check against this environment (the expression must produce a
    /// bool), then program construction.
    pub fn compile(&self, source: &str) -> Result<Program, CompileError> {
        let ast = parser::parse(source).map_err(CompileError::Parse)?;

        let kind = eval::check(&ast, self)?;
        if kind != Kind::Bool {
            return Err(CompileError::Type(format!(
                "expression must produce bool, got {kind}"
            )));
        }

        Program::build(ast)
    }
}

/// Expressions deeper than this are rejected at build time.
const MAX_DEPTH: usize = 64;

/// A compiled, immutable predicate ready for repeated evaluation.
#[derive(Debug, Clone)]
pub struct Program {
    root: Expr,
}

impl Program {
    fn build(root: Expr) -> Result<Self, CompileError> {
        let depth = root.depth();
        if depth > MAX_DEPTH {
            return Err(CompileError::Build(format!(
                "expression nesting of {depth} exceeds the limit of {MAX_DEPTH}"
            )));
        }
        Ok(Self { root })
    }

    /// Evaluate the predicate, resolving variables through `lookup`.
    /// A variable `lookup` cannot resolve is a runtime error, as is an
    /// operand whose runtime kind differs from its declaration.
    pub fn eval<F>(&self, lookup: F) -> Result<bool, EvalError>
    where
        F: Fn(&str) -> Option<Value>,
    {
        match eval::eval(&self.root, &lookup)? {
            Value::Bool(b) => Ok(b),
            v => Err(EvalError::Kind(format!(
                "expression produced {}, expected bool",
                v.kind()
            ))),
        }
    }
}
