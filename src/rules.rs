//! Scoring rules: a compiled predicate paired with a score delta.
//!
//! Rules are declared in YAML and compiled once at startup against the
//! metric environment; any compile failure aborts startup since it means
//! the operator shipped a broken rule file.
//!
//! ```yaml
//! - when: "mouseMoves > 10 && clicks > 0"
//!   then:
//!     human: 0.3
//! - when: "userAgent.contains('Headless')"
//!   then:
//!     automation: 0.8
//! ```

use crate::expr::{CompileError, Env, EvalError, Program};
use crate::scorers::Score;
use crate::trace::Trace;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Rule as written in the rules file, before compilation.
#[derive(Debug, Clone, Deserialize)]
struct RawRule {
    when: String,
    then: Score,
}

/// A compiled rule. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Rule {
    when: String,
    then: Score,
    program: Program,
}

impl Rule {
    /// Compile `when` against the declared environment.
    pub fn compile(when: &str, then: Score, env: &Env) -> Result<Self, CompileError> {
        let program = env.compile(when)?;
        Ok(Self {
            when: when.to_string(),
            then,
            program,
        })
    }

    /// The source text of the predicate, for logs.
    pub fn when(&self) -> &str {
        &self.when
    }

    /// Evaluate the rule against one trace.
    ///
    /// `Ok(Some(delta))` when the predicate holds, `Ok(None)` when it does
    /// not. Runtime failures (missing metric, shape mismatch, division by
    /// zero) are returned for the caller to log and skip, so one bad
    /// metric in one trace cannot poison the rest of the chain.
    pub fn eval(&self, trace: &Trace) -> Result<Option<&Score>, EvalError> {
        if self.program.eval(|name| trace.value(name))? {
            Ok(Some(&self.then))
        } else {
            Ok(None)
        }
    }
}

/// Failure to produce a usable rule set. All variants are startup-fatal.
#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("unable to read rules file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed rules file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("rule `{when}`: {source}")]
    Compile {
        when: String,
        #[source]
        source: CompileError,
    },
}

/// Load and compile a YAML rule file.
pub fn load_rules(path: impl AsRef<Path>, env: &Env) -> Result<Vec<Rule>, RuleLoadError> {
    let content = std::fs::read_to_string(path)?;
    parse_rules(&content, env)
}

/// Parse and compile rules from YAML text, preserving declaration order.
pub fn parse_rules(yaml: &str, env: &Env) -> Result<Vec<Rule>, RuleLoadError> {
    let raw: Vec<RawRule> = serde_yaml::from_str(yaml)?;
    raw.into_iter()
        .map(|r| {
            Rule::compile(&r.when, r.then, env).map_err(|source| RuleLoadError::Compile {
                when: r.when,
                source,
            })
        })
        .collect()
}
