use indicatif::ProgressBar;
use nalgebra::{DMatrix, DVector};

use crate::{
    assembly::assemble,
    boundary_conditions::{apply_dirichlet, external_force, prescribed_dofs, GlobalSystem},
    config::AnalysisConfig,
    datatypes::Mesh,
    error::HematiteError,
    integration::{gauss_rule, IntegrationPoint, ReferenceShape},
    material_model::MaterialTable,
};

/// Smallest accepted ratio between the smallest and largest LU pivot
pub const MIN_PIVOT_RATIO: f64 = 1e-14;

/// Solves a dense system of equations with LU decomposition
///
/// # Arguments
/// * `a` - A square matrix
/// * `b` - The right hand side of the system
///
/// # Returns
/// `x` from `Ax=b`, or None if the matrix is singular
pub fn solve_linear_system(a: DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let lu = a.lu();

    let pivots = lu.u().diagonal().abs();
    let largest = pivots.max();
    if !(largest > 0.0) || pivots.min() / largest < MIN_PIVOT_RATIO {
        return None;
    }

    lu.solve(b)
}

/// Lifecycle of the driver within a time step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    TimeStepStart,
    Iterating,
    Converged,
    Committed,
    Diverged,
}

/// Convergence record of one time step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub time_step: usize,
    /// Newton corrections applied before convergence
    pub iterations: usize,
    pub residual_norm: f64,
}

/// Result of a complete analysis
pub struct Solution {
    pub total_displacement: DVector<f64>,
    /// Internal force of the last converged iteration
    pub internal_force: DVector<f64>,
    pub materials: MaterialTable,
    pub reports: Vec<StepReport>,
}

/// Incremental Newton-Raphson equilibrium iteration over a fixed number of
/// time steps
pub struct NewtonRaphson<'a> {
    mesh: &'a Mesh,
    config: &'a AnalysisConfig,
    quad_rule: Vec<IntegrationPoint>,
    line_rule: Vec<IntegrationPoint>,
    materials: MaterialTable,
    total_displacement: DVector<f64>,
    internal_force: DVector<f64>,
    state: SolverState,
    reports: Vec<StepReport>,
}

impl<'a> NewtonRaphson<'a> {
    /// Sets up the driver with zero displacement and zero material history
    ///
    /// Configuration and boundary group names are checked here so that an
    /// invalid setup fails before the first assembly.
    ///
    /// # Arguments
    /// * `mesh` - The mesh to analyze
    /// * `config` - The analysis configuration
    pub fn new(mesh: &'a Mesh, config: &'a AnalysisConfig) -> Result<Self, HematiteError> {
        config.validate()?;

        let quad_rule = gauss_rule(ReferenceShape::Quadrilateral, config.num_integration_points)?;
        let line_rule = gauss_rule(ReferenceShape::Line, config.num_integration_points)?;

        prescribed_dofs(mesh, &config.dirichlet, 1.0)?;
        for condition in &config.neumann {
            mesh.boundary(&condition.group)?;
        }

        let materials = MaterialTable::new(
            config.material,
            config.elastic_matrix(),
            mesh.num_elements(),
            quad_rule.len(),
        );

        Ok(NewtonRaphson {
            mesh,
            config,
            quad_rule,
            line_rule,
            materials,
            total_displacement: DVector::zeros(mesh.num_dofs()),
            internal_force: DVector::zeros(mesh.num_dofs()),
            state: SolverState::TimeStepStart,
            reports: Vec::with_capacity(config.num_time_steps),
        })
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn total_displacement(&self) -> &DVector<f64> {
        &self.total_displacement
    }

    pub fn internal_force(&self) -> &DVector<f64> {
        &self.internal_force
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn reports(&self) -> &[StepReport] {
        &self.reports
    }

    fn fail(&mut self, err: HematiteError) -> HematiteError {
        self.state = SolverState::Diverged;
        self.materials.reset_trial_all();
        err
    }

    /// Iterates one time step to equilibrium and commits it
    ///
    /// # Arguments
    /// * `time_step` - Index of the step, in `0..num_time_steps`
    ///
    /// # Returns
    /// The convergence record of the step
    pub fn step(&mut self, time_step: usize) -> Result<StepReport, HematiteError> {
        if self.state == SolverState::Diverged {
            return Err(HematiteError::Input(
                "cannot continue an analysis after divergence".to_owned(),
            ));
        }

        let config = self.config;
        let num_steps = config.num_time_steps as f64;

        self.state = SolverState::TimeStepStart;
        self.materials.reset_trial_all();

        let prescribed = prescribed_dofs(self.mesh, &config.dirichlet, 1.0 / num_steps)?;
        let pending = prescribed.iter().any(|&(_, value)| value != 0.0);
        let external = external_force(
            self.mesh,
            &config.neumann,
            &self.line_rule,
            config.part_thickness,
            (time_step + 1) as f64 / num_steps,
        )?;

        let mut increment_displacement: DVector<f64> = DVector::zeros(self.mesh.num_dofs());
        self.state = SolverState::Iterating;

        let mut iteration = 0;
        loop {
            let (stiffness, internal_force) = match assemble(
                self.mesh,
                &self.quad_rule,
                config.part_thickness,
                &increment_displacement,
                &mut self.materials,
            ) {
                Ok(r) => r,
                Err(err) => return Err(self.fail(err)),
            };

            let system = apply_dirichlet(
                GlobalSystem {
                    stiffness,
                    force: &external - &internal_force,
                },
                &prescribed,
                iteration == 0,
            );
            let residual_norm = system.force.norm();

            if residual_norm < config.tolerance && !(iteration == 0 && pending) {
                self.state = SolverState::Converged;

                self.total_displacement += &increment_displacement;
                self.internal_force = internal_force;
                self.materials.commit_all();

                let report = StepReport {
                    time_step,
                    iterations: iteration,
                    residual_norm,
                };
                self.reports.push(report);
                self.state = SolverState::Committed;
                return Ok(report);
            }

            if iteration == config.max_iterations {
                return Err(self.fail(HematiteError::Diverged {
                    time_step,
                    iterations: iteration,
                    residual_norm,
                }));
            }

            let correction = match solve_linear_system(system.stiffness, &system.force) {
                Some(x) => x,
                None => {
                    return Err(self.fail(HematiteError::SingularSystem {
                        time_step,
                        iteration,
                    }))
                }
            };
            increment_displacement += correction;
            iteration += 1;
        }
    }

    /// Runs every remaining time step
    pub fn run(&mut self) -> Result<(), HematiteError> {
        let bar = if self.config.verbose {
            ProgressBar::new(self.config.num_time_steps as u64)
        } else {
            ProgressBar::hidden()
        };

        for time_step in self.reports.len()..self.config.num_time_steps {
            let report = match self.step(time_step) {
                Ok(r) => r,
                Err(err) => {
                    bar.abandon();
                    return Err(err);
                }
            };
            bar.println(format!(
                "info: time step {} converged in {} iterations (residual norm {:.3e})",
                report.time_step, report.iterations, report.residual_norm
            ));
            bar.inc(1);
        }
        bar.finish_and_clear();

        Ok(())
    }

    pub fn into_solution(self) -> Solution {
        Solution {
            total_displacement: self.total_displacement,
            internal_force: self.internal_force,
            materials: self.materials,
            reports: self.reports,
        }
    }
}

/// Outcome of an analysis that may stop before the last time step
pub struct Analysis {
    /// Results of the last committed time step
    pub solution: Solution,
    /// Divergence or singular system that stopped the analysis, if any
    pub failure: Option<HematiteError>,
}

/// Runs the solver until every time step is committed or one fails
///
/// Setup errors are returned directly. A failure inside a time step is
/// returned alongside the results of the last committed step.
///
/// # Arguments
/// * `mesh` - The mesh to analyze
/// * `config` - The analysis configuration
pub fn run_to_failure(mesh: &Mesh, config: &AnalysisConfig) -> Result<Analysis, HematiteError> {
    if config.verbose {
        println!(
            "info: solving {} dofs over {} time steps...",
            mesh.num_dofs(),
            config.num_time_steps
        );
    }
    let start = std::time::Instant::now();

    let mut driver = NewtonRaphson::new(mesh, config)?;
    let failure = driver.run().err();

    if config.verbose && failure.is_none() {
        let elapsed = (std::time::Instant::now() - start).as_secs_f32();
        println!("info: solved system in {:.3} seconds", elapsed);
    }

    Ok(Analysis {
        solution: driver.into_solution(),
        failure,
    })
}

/// Runs the solver over every time step
///
/// # Arguments
/// * `mesh` - The mesh to analyze
/// * `config` - The analysis configuration
///
/// # Returns
/// The converged solution of the last time step
pub fn run(mesh: &Mesh, config: &AnalysisConfig) -> Result<Solution, HematiteError> {
    let analysis = run_to_failure(mesh, config)?;
    match analysis.failure {
        Some(err) => Err(err),
        None => Ok(analysis.solution),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        boundary_conditions::{DirichletCondition, NeumannCondition},
        datatypes::Direction,
        material_model::{MaterialKind, PlaneCondition},
        mesher::rectangle,
    };
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector, Vector2};

    fn fixed(group: &str, direction: Direction, value: f64) -> DirichletCondition {
        DirichletCondition {
            group: group.to_string(),
            direction,
            value,
        }
    }

    #[test]
    fn lu_solves_regular_system() {
        let a = dmatrix![4.0, 1.0; 1.0, 3.0];
        let x = solve_linear_system(a, &dvector![1.0, 2.0]).unwrap();
        assert_relative_eq!(x, dvector![1.0 / 11.0, 7.0 / 11.0], epsilon = 1e-15);
    }

    #[test]
    fn lu_rejects_singular_system() {
        let a = dmatrix![1.0, 2.0; 2.0, 4.0];
        assert!(solve_linear_system(a, &dvector![1.0, 2.0]).is_none());
        assert!(solve_linear_system(DMatrix::zeros(3, 3), &DVector::zeros(3)).is_none());
    }

    #[test]
    fn single_linear_element_converges_in_one_iteration() {
        let mesh = rectangle(1.0, 1.0, 1, 1).unwrap();
        let config = AnalysisConfig {
            num_time_steps: 1,
            youngs_modulus: 10.0,
            poisson_ratio: 0.3,
            plane_condition: PlaneCondition::PlaneStress,
            dirichlet: vec![
                fixed("left", Direction::X, 0.0),
                fixed("bottom", Direction::Y, 0.0),
                fixed("right", Direction::X, 0.1),
            ],
            ..AnalysisConfig::default()
        };

        let mut driver = NewtonRaphson::new(&mesh, &config).unwrap();
        let report = driver.step(0).unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(driver.state(), SolverState::Committed);

        // uniaxial stress: free lateral contraction of ν·ε
        let u = driver.total_displacement();
        assert_relative_eq!(u[2], 0.1, epsilon = 1e-12);
        assert_relative_eq!(u[7], -0.03, epsilon = 1e-12);
        for state in driver.materials().element_states(0) {
            assert_relative_eq!(state.stress[0], 1.0, epsilon = 1e-10);
            assert_relative_eq!(state.stress[1], 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn diverged_driver_keeps_committed_results() {
        let mesh = rectangle(1.0, 1.0, 2, 1).unwrap();
        let config = AnalysisConfig {
            num_time_steps: 2,
            max_iterations: 1,
            material: MaterialKind::NonlinearElastic,
            plane_condition: PlaneCondition::PlaneStress,
            dirichlet: vec![
                fixed("left", Direction::X, 0.0),
                fixed("left", Direction::Y, 0.0),
            ],
            neumann: vec![NeumannCondition {
                group: "right".to_string(),
                traction: Vector2::new(0.5, 0.0),
            }],
            ..AnalysisConfig::default()
        };

        let mut driver = NewtonRaphson::new(&mesh, &config).unwrap();
        let result = driver.step(0);
        assert!(matches!(
            result,
            Err(HematiteError::Diverged {
                time_step: 0,
                iterations: 1,
                ..
            })
        ));
        assert_eq!(driver.state(), SolverState::Diverged);
        assert_eq!(driver.total_displacement(), &DVector::zeros(12));
        assert!(driver.reports().is_empty());
        assert!(driver.step(1).is_err());
    }

    #[test]
    fn unknown_group_fails_at_setup() {
        let mesh = rectangle(1.0, 1.0, 1, 1).unwrap();
        let config = AnalysisConfig {
            dirichlet: vec![fixed("hole", Direction::X, 0.0)],
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            NewtonRaphson::new(&mesh, &config),
            Err(HematiteError::Input(_))
        ));
    }

    #[test]
    fn unsupported_integration_count_fails_at_setup() {
        let mesh = rectangle(1.0, 1.0, 1, 1).unwrap();
        let config = AnalysisConfig {
            num_integration_points: 3,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            NewtonRaphson::new(&mesh, &config),
            Err(HematiteError::Input(_))
        ));
    }
}
