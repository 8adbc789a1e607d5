use std::fmt::Display;

#[derive(Debug)]
pub enum HematiteError {
    Input(String),
    Mesher(String),
    DegenerateElement {
        element: usize,
        determinant: f64,
    },
    Diverged {
        time_step: usize,
        iterations: usize,
        residual_norm: f64,
    },
    SingularSystem {
        time_step: usize,
        iteration: usize,
    },
    PostProcessor(String),
}

impl Display for HematiteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HematiteError::Input(v) => write!(f, "Input error: {}", v),
            HematiteError::Mesher(v) => write!(f, "Mesher error: {}", v),
            HematiteError::DegenerateElement {
                element,
                determinant,
            } => write!(
                f,
                "Geometry error: element {} has a degenerate jacobian (det = {:e})",
                element, determinant
            ),
            HematiteError::Diverged {
                time_step,
                iterations,
                residual_norm,
            } => write!(
                f,
                "Solver error: time step {} diverged after {} iterations (residual norm {:e})",
                time_step, iterations, residual_norm
            ),
            HematiteError::SingularSystem {
                time_step,
                iteration,
            } => write!(
                f,
                "Solver error: singular system at time step {} iteration {}",
                time_step, iteration
            ),
            HematiteError::PostProcessor(v) => write!(f, "Post Processor error: {}", v),
        }
    }
}

impl std::error::Error for HematiteError {}
