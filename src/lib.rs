//! apnsim is a simulation engine for Algebraic Petri Nets: places hold
//! typed token multisets (ints, booleans, strings, pairs, lists), arcs carry
//! binding patterns and computed expressions, and transitions fire under
//! boolean guards resolved by a backtracking assignment search.
//!
//! The typical flow: deserialize a [`PetriNet`], wrap it in an
//! [`AlgebraicSimulator`], then either single-step with
//! [`AlgebraicSimulator::step`] or drive a whole run through
//! [`run_to_completion`].
//!
//! ```no_run
//! use apnsim::{AlgebraicSimulator, SimOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let json = std::fs::read_to_string("net.json")?;
//! let mut sim = AlgebraicSimulator::from_json(&json, SimOptions::default())?;
//! while let Some(fired) = sim.step()? {
//!     println!("fired {}", fired);
//! }
//! # Ok(())
//! # }
//! ```

pub mod assignment;
pub mod binding;
pub mod conflict;
pub mod eval;
pub mod expr;
pub mod guard;
pub mod model;
pub mod oracle;
pub mod pattern;
pub mod protocol;
pub mod runner;
pub mod simulator;
pub mod token;
pub mod token_io;

pub use assignment::{find_satisfying_assignment, Assignment, Pick};
pub use binding::{classify_binding, Binding, BindingCache};
pub use conflict::ConflictResolver;
pub use eval::{evaluate_expr, evaluate_guard, EvalError};
pub use expr::{parse_arithmetic, stringify_arithmetic, Expr, ParseError};
pub use guard::{parse_guard, stringify_guard, BoolExpr};
pub use model::{Marking, NetArc, NetError, PetriNet, Place, SimulationEvent, Transition};
pub use oracle::{NullOracle, OracleError, SatOracle};
pub use pattern::{match_pattern, parse_pattern, stringify_pattern, Pattern};
pub use protocol::{RunStats, WorkerReply, WorkerRequest};
pub use runner::{run_to_completion, Progress, RunConfig, RunHooks, RunReport};
pub use simulator::{AlgebraicSimulator, SimError, SimOptions, SimulationMode};
pub use token::{Environment, Token, TokenType};
