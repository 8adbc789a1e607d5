//! Small nonlinear finite element solver for 2D plane elasticity.
//!
//! Four-node quadrilaterals are integrated with Gauss quadrature and driven
//! through a fixed sequence of load steps by a Newton-Raphson iteration.
//! Material points keep a committed and a trial state so that only converged
//! steps change their history.

pub mod assembly;
pub mod boundary_conditions;
pub mod config;
pub mod datatypes;
pub mod error;
pub mod integration;
pub mod material_model;
pub mod mesher;
pub mod post_processor;
pub mod shape_functions;
pub mod solver;

pub use config::AnalysisConfig;
pub use datatypes::Mesh;
pub use error::HematiteError;
pub use solver::{run, run_to_failure, Analysis, NewtonRaphson, Solution, SolverState, StepReport};
