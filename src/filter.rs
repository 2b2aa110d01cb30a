//! Filter chain — ordered predicate evaluation with fault containment
//!
//! Predicates run in the order they were given on the command line and
//! short-circuit at the first one that returns false or faults. A faulting
//! predicate suppresses the current message and emits one diagnostic naming
//! the predicate; it never terminates the session.

use serde_json::Value;

use crate::error::{Result, SnoopError};
use crate::expr::Predicate;

/// Outcome of running one message through the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Deliver,
    Suppress,
}

/// The ordered predicate sequence, fixed after startup.
#[derive(Debug)]
pub struct FilterChain {
    predicates: Vec<Predicate>,
}

impl FilterChain {
    /// Compile every expression, preserving declaration order. The first
    /// syntax error aborts startup.
    pub fn compile(sources: &[String]) -> Result<Self> {
        let predicates = sources
            .iter()
            .map(|src| {
                Predicate::compile(src).map_err(|err| SnoopError::Filter {
                    source_text: src.clone(),
                    err,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { predicates })
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Run the message through the chain. An empty chain delivers
    /// everything.
    pub fn evaluate(&self, msg: &Value) -> Verdict {
        self.evaluate_counting(msg).0
    }

    /// Like [`evaluate`](Self::evaluate), also reporting how many predicates
    /// actually ran, which makes the short-circuit behavior observable.
    fn evaluate_counting(&self, msg: &Value) -> (Verdict, usize) {
        for (i, predicate) in self.predicates.iter().enumerate() {
            match predicate.eval(msg) {
                Ok(true) => {}
                Ok(false) => return (Verdict::Suppress, i + 1),
                Err(fault) => {
                    tracing::warn!(
                        filter = predicate.source(),
                        error = %fault,
                        "error applying filter"
                    );
                    return (Verdict::Suppress, i + 1);
                }
            }
        }
        (Verdict::Deliver, self.predicates.len())
    }
}

#[cfg(test)]
#[path = "filter_test.rs"]
mod filter_test;
