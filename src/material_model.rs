use std::str::FromStr;

use nalgebra::{matrix, Matrix3, Vector3};

use crate::error::HematiteError;

/// In-plane idealization used to reduce the 3D elastic law
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneCondition {
    PlaneStress,
    PlaneStrain,
}

/// Available constitutive models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    LinearElastic,
    NonlinearElastic,
}

impl FromStr for MaterialKind {
    type Err = HematiteError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "linear_elastic" => Ok(MaterialKind::LinearElastic),
            "nonlinear_elastic" => Ok(MaterialKind::NonlinearElastic),
            _ => Err(HematiteError::Input(format!(
                "Material model {name} is not implemented"
            ))),
        }
    }
}

/// Calculates the stress-strain matrix
///
/// # Arguments
/// * `poisson_ratio` - The poisson ratio for the model
/// * `youngs_modulus` - The modulus of elasticity of the model
/// * `condition` - Plane stress or plane strain
///
/// # Returns
/// A 3x3 stress-strain matrix acting on `[εxx, εyy, γxy]`
pub fn compute_stress_strain_matrix(
    poisson_ratio: f64,
    youngs_modulus: f64,
    condition: PlaneCondition,
) -> Matrix3<f64> {
    let nu = poisson_ratio;

    match condition {
        PlaneCondition::PlaneStress => {
            let mut stress_strain_mat: Matrix3<f64> = matrix![
                1.0, nu, 0.0;
                nu, 1.0, 0.0;
                0.0, 0.0, (1.0 - nu) / 2.0;
            ];
            stress_strain_mat *= youngs_modulus / (1.0 - f64::powi(nu, 2));
            stress_strain_mat
        }
        PlaneCondition::PlaneStrain => {
            let mut stress_strain_mat: Matrix3<f64> = matrix![
                1.0 - nu, nu, 0.0;
                nu, 1.0 - nu, 0.0;
                0.0, 0.0, (1.0 - 2.0 * nu) / 2.0;
            ];
            stress_strain_mat *= youngs_modulus / ((1.0 + nu) * (1.0 - 2.0 * nu));
            stress_strain_mat
        }
    }
}

/// History variables of one integration point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialState {
    /// Stress `[σxx, σyy, τxy]`
    pub stress: Vector3<f64>,
    /// Accumulated strain `[εxx, εyy, γxy]`
    pub strain: Vector3<f64>,
}

impl Default for MaterialState {
    fn default() -> Self {
        MaterialState {
            stress: Vector3::zeros(),
            strain: Vector3::zeros(),
        }
    }
}

/// Committed (last converged) and trial (current iteration) states
#[derive(Debug, Clone, Copy, Default)]
pub struct StatePair {
    pub committed: MaterialState,
    pub trial: MaterialState,
}

impl StatePair {
    pub fn commit(&mut self) {
        self.committed = self.trial;
    }

    pub fn reset_trial(&mut self) {
        self.trial = self.committed;
    }
}

/// Stress update at a single integration point
pub trait MaterialModel {
    /// Computes the trial state from the committed state and a strain increment
    ///
    /// Never commits; repeated calls start from the same committed baseline.
    ///
    /// # Returns
    /// The consistent tangent stiffness and the updated stress, in that order
    fn compute_stress_and_stiffness(
        &mut self,
        increment_strain: &Vector3<f64>,
    ) -> (Matrix3<f64>, Vector3<f64>);

    fn state(&self) -> &StatePair;

    fn state_mut(&mut self) -> &mut StatePair;

    /// Accepts the trial state as the new committed state
    fn commit(&mut self) {
        self.state_mut().commit();
    }

    /// Discards the trial state
    fn reset_trial(&mut self) {
        self.state_mut().reset_trial();
    }

    fn committed(&self) -> &MaterialState {
        &self.state().committed
    }

    fn trial(&self) -> &MaterialState {
        &self.state().trial
    }
}

pub struct LinearElastic {
    elastic: Matrix3<f64>,
    state: StatePair,
}

impl LinearElastic {
    pub fn new(elastic: Matrix3<f64>) -> LinearElastic {
        LinearElastic {
            elastic,
            state: StatePair::default(),
        }
    }
}

impl MaterialModel for LinearElastic {
    fn compute_stress_and_stiffness(
        &mut self,
        increment_strain: &Vector3<f64>,
    ) -> (Matrix3<f64>, Vector3<f64>) {
        let committed = self.state.committed;
        let stress = committed.stress + self.elastic * increment_strain;

        self.state.trial = MaterialState {
            stress,
            strain: committed.strain + increment_strain,
        };

        (self.elastic, stress)
    }

    fn state(&self) -> &StatePair {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StatePair {
        &mut self.state
    }
}

/// Saturating elastic law `σ = D (1 - exp(-ε))`, exponential taken per component
pub struct NonlinearElastic {
    elastic: Matrix3<f64>,
    state: StatePair,
}

impl NonlinearElastic {
    pub fn new(elastic: Matrix3<f64>) -> NonlinearElastic {
        NonlinearElastic {
            elastic,
            state: StatePair::default(),
        }
    }
}

impl MaterialModel for NonlinearElastic {
    fn compute_stress_and_stiffness(
        &mut self,
        increment_strain: &Vector3<f64>,
    ) -> (Matrix3<f64>, Vector3<f64>) {
        let strain = self.state.committed.strain + increment_strain;
        let decay = strain.map(|e| f64::exp(-e));

        let stress = self.elastic * decay.map(|d| 1.0 - d);
        let tangent = self.elastic * Matrix3::from_diagonal(&decay);

        self.state.trial = MaterialState { stress, strain };

        (tangent, stress)
    }

    fn state(&self) -> &StatePair {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StatePair {
        &mut self.state
    }
}

/// Creates a material point with zero history
pub fn make_material(kind: MaterialKind, elastic: Matrix3<f64>) -> Box<dyn MaterialModel> {
    match kind {
        MaterialKind::LinearElastic => Box::new(LinearElastic::new(elastic)),
        MaterialKind::NonlinearElastic => Box::new(NonlinearElastic::new(elastic)),
    }
}

/// Material points of the whole mesh, indexed by (element, integration point)
pub struct MaterialTable {
    points: Vec<Box<dyn MaterialModel>>,
    points_per_element: usize,
}

impl MaterialTable {
    /// Allocates one zero-history material point per integration point
    ///
    /// # Arguments
    /// * `kind` - The constitutive model shared by every point
    /// * `elastic` - The elastic stress-strain matrix
    /// * `num_elements` - Number of elements in the mesh
    /// * `points_per_element` - Number of integration points per element
    pub fn new(
        kind: MaterialKind,
        elastic: Matrix3<f64>,
        num_elements: usize,
        points_per_element: usize,
    ) -> MaterialTable {
        let points = (0..num_elements * points_per_element)
            .map(|_| make_material(kind, elastic))
            .collect();
        MaterialTable {
            points,
            points_per_element,
        }
    }

    pub fn points_per_element(&self) -> usize {
        self.points_per_element
    }

    pub fn num_elements(&self) -> usize {
        if self.points_per_element == 0 {
            return 0;
        }
        self.points.len() / self.points_per_element
    }

    pub fn get(&self, element: usize, point: usize) -> &dyn MaterialModel {
        self.points[element * self.points_per_element + point].as_ref()
    }

    pub fn get_mut(&mut self, element: usize, point: usize) -> &mut dyn MaterialModel {
        self.points[element * self.points_per_element + point].as_mut()
    }

    /// Committed states of one element's integration points
    pub fn element_states(&self, element: usize) -> impl Iterator<Item = &MaterialState> {
        let start = element * self.points_per_element;
        self.points[start..start + self.points_per_element]
            .iter()
            .map(|m| m.committed())
    }

    pub fn commit_all(&mut self) {
        for material in self.points.iter_mut() {
            material.commit();
        }
    }

    pub fn reset_trial_all(&mut self) {
        for material in self.points.iter_mut() {
            material.reset_trial();
        }
    }
}
