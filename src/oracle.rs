use crate::guard::BoolExpr;
use crate::token::Environment;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("oracle failed: {0}")]
pub struct OracleError(pub String);

/// External satisfiability oracle consulted only when direct guard
/// evaluation raises. An implementation may block on a solver pool; failures
/// are treated as "guard not satisfied" by the caller.
pub trait SatOracle: Send {
    fn evaluate_guard(&self, guard: &BoolExpr, env: &Environment) -> Result<bool, OracleError>;
}

/// Default oracle with no solver behind it. Every consultation fails, so
/// guards that direct evaluation cannot decide fail closed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOracle;

impl SatOracle for NullOracle {
    fn evaluate_guard(&self, _guard: &BoolExpr, _env: &Environment) -> Result<bool, OracleError> {
        Err(OracleError("no solver configured".to_string()))
    }
}
