/// The `lagrange_core` crate derives and evaluates classical equations of motion.
/// A small symbolic engine covers the expression shapes the pipelines produce, and
/// a bytecode VM turns the results into numeric functions.
///
/// Key components:
/// - **Expr**: tagged expression tree with domain-aware symbols, `simplify`, `expand`, and `diff`.
/// - **Solvers**: restricted algebraic solver, linear ODE solver (`dsolve`, modal IVP), eigenvalues.
/// - **Equation Engine**: infix parser, compiler, and stack VM behind `lambdify` and `EquationSystem`.
/// - **Numerics**: fixed-step Runge-Kutta integrators, Newton equilibria, phase-plane streamlines.
/// - **Pipelines**: derivation, stability, pendulum response, coupled masses.
pub mod calculus;
pub mod equation_engine;
pub mod equilibrium;
pub mod error;
pub mod evaluate;
pub mod expr;
pub mod lagrangian;
pub mod latex;
pub mod matrix;
pub mod ode;
pub mod phase;
pub mod pipelines;
pub mod simplify;
pub mod solve;
pub mod solvers;
pub mod symbol;
pub mod traits;

pub use error::{SymbolicError, SymbolicResult};
pub use expr::{Equation, Expr};
pub use symbol::{Coordinate, Domain, Symbol};
