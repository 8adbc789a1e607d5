use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector, SVector, Vector2};

use crate::{
    datatypes::{Direction, Mesh, DOF},
    error::HematiteError,
    integration::IntegrationPoint,
    shape_functions::{L2ShapeFunction, ShapeFunction},
};

/// Linear system `stiffness · x = force` produced for one Newton iteration
#[derive(Debug, Clone)]
pub struct GlobalSystem {
    pub stiffness: DMatrix<f64>,
    pub force: DVector<f64>,
}

/// Prescribed displacement on one component of every node of a boundary group
#[derive(Debug, Clone, PartialEq)]
pub struct DirichletCondition {
    pub group: String,
    pub direction: Direction,
    /// Total displacement reached at the end of the analysis
    pub value: f64,
}

/// Uniform traction (force per unit area) on a boundary group
#[derive(Debug, Clone, PartialEq)]
pub struct NeumannCondition {
    pub group: String,
    /// Total traction reached at the end of the analysis
    pub traction: Vector2<f64>,
}

/// Resolves Dirichlet conditions into an ordered list of (dof, value)
///
/// When several conditions prescribe the same dof the one listed last wins.
///
/// # Arguments
/// * `mesh` - The mesh holding the boundary groups
/// * `conditions` - Conditions in application order
/// * `scale` - Factor applied to every prescribed value
///
/// # Returns
/// Prescribed dofs sorted by global index
pub fn prescribed_dofs(
    mesh: &Mesh,
    conditions: &[DirichletCondition],
    scale: f64,
) -> Result<Vec<(usize, f64)>, HematiteError> {
    let mut prescribed: BTreeMap<usize, f64> = BTreeMap::new();

    for condition in conditions {
        for node in mesh.boundary_nodes(&condition.group)? {
            prescribed.insert(condition.direction.dof(node), condition.value * scale);
        }
    }

    Ok(prescribed.into_iter().collect())
}

/// Imposes prescribed displacements by equation modification
///
/// On the first iteration of a step the coupling `K[:, d] · U` is moved to the
/// right-hand side and `force[d] = U`; afterwards the prescribed displacement is
/// already in place and `force[d] = 0`. Rows and columns of every prescribed dof
/// are then zeroed with a unit diagonal, keeping the matrix dimension.
///
/// # Arguments
/// * `system` - The assembled system
/// * `prescribed` - Prescribed (dof, value) pairs, see [`prescribed_dofs`]
/// * `first_iteration` - Whether this is iteration 0 of the time step
///
/// # Returns
/// The modified system
pub fn apply_dirichlet(
    system: GlobalSystem,
    prescribed: &[(usize, f64)],
    first_iteration: bool,
) -> GlobalSystem {
    let GlobalSystem {
        mut stiffness,
        mut force,
    } = system;

    // coupling uses the unmodified matrix for every prescribed column
    if first_iteration {
        for &(dof, value) in prescribed {
            if value != 0.0 {
                force -= stiffness.column(dof) * value;
            }
        }
    }

    for &(dof, value) in prescribed {
        force[dof] = if first_iteration { value } else { 0.0 };
    }

    for &(dof, _) in prescribed {
        stiffness.row_mut(dof).fill(0.0);
        stiffness.column_mut(dof).fill(0.0);
    }
    for &(dof, _) in prescribed {
        stiffness[(dof, dof)] = 1.0;
    }

    GlobalSystem { stiffness, force }
}

/// Integrates a uniform traction over a boundary group into a force vector
///
/// # Arguments
/// * `mesh` - The mesh holding the boundary group
/// * `group` - Name of the boundary group
/// * `traction` - Traction vector
/// * `rule` - Integration points of the line element
/// * `thickness` - Out-of-plane thickness of the part
/// * `force` - Global force vector to add into
pub fn apply_neumann(
    mesh: &Mesh,
    group: &str,
    traction: &Vector2<f64>,
    rule: &[IntegrationPoint],
    thickness: f64,
    force: &mut DVector<f64>,
) -> Result<(), HematiteError> {
    for edge in mesh.boundary(group)? {
        let coords = edge.map(|n| [mesh.nodes[n].vertex.x, mesh.nodes[n].vertex.y]);
        let shape = L2ShapeFunction::new(coords);

        let mut edge_force: SVector<f64, 4> = SVector::zeros();
        for point in rule {
            edge_force += shape.evaluate_n_at(point).transpose()
                * traction
                * shape.evaluate_jacob_determinant_at(point)
                * point.weight
                * thickness;
        }

        for (local, node) in edge.iter().enumerate() {
            force[DOF * node] += edge_force[DOF * local];
            force[DOF * node + 1] += edge_force[DOF * local + 1];
        }
    }

    Ok(())
}

/// Builds the external force vector of all traction conditions
///
/// # Arguments
/// * `mesh` - The mesh
/// * `conditions` - Traction conditions
/// * `rule` - Integration points of the line element
/// * `thickness` - Out-of-plane thickness of the part
/// * `scale` - Load factor applied to every traction
pub fn external_force(
    mesh: &Mesh,
    conditions: &[NeumannCondition],
    rule: &[IntegrationPoint],
    thickness: f64,
    scale: f64,
) -> Result<DVector<f64>, HematiteError> {
    let mut force = DVector::zeros(mesh.num_dofs());
    for condition in conditions {
        apply_neumann(
            mesh,
            &condition.group,
            &(condition.traction * scale),
            rule,
            thickness,
            &mut force,
        )?;
    }
    Ok(force)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        integration::{gauss_rule, ReferenceShape},
        mesher::rectangle,
    };
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    fn sample_system() -> GlobalSystem {
        GlobalSystem {
            stiffness: dmatrix![
                4.0, -1.0, 0.5, 0.0;
                -1.0, 5.0, -2.0, 1.0;
                0.5, -2.0, 6.0, -1.5;
                0.0, 1.0, -1.5, 3.0;
            ],
            force: dvector![1.0, 2.0, 3.0, 4.0],
        }
    }

    #[test]
    fn prescribed_rows_and_columns_are_unit() {
        let system = apply_dirichlet(sample_system(), &[(1, 0.3), (3, -0.2)], true);
        for d in [1, 3] {
            for j in 0..4 {
                let expected = if j == d { 1.0 } else { 0.0 };
                assert_eq!(system.stiffness[(d, j)], expected);
                assert_eq!(system.stiffness[(j, d)], expected);
            }
        }
        assert_eq!(system.stiffness[(0, 2)], 0.5);
    }

    #[test]
    fn zero_prescribed_value_zeroes_force() {
        let system = apply_dirichlet(sample_system(), &[(0, 0.0), (2, 0.0)], true);
        assert_eq!(system.force[0], 0.0);
        assert_eq!(system.force[2], 0.0);
        assert_eq!(system.force[1], 2.0);
    }

    #[test]
    fn modified_system_matches_elimination() {
        let original = sample_system();
        let prescribed = [(0, 0.1), (3, -0.4)];
        let system = apply_dirichlet(original.clone(), &prescribed, true);
        let x = system.stiffness.clone().lu().solve(&system.force).unwrap();

        assert_relative_eq!(x[0], 0.1, epsilon = 1e-14);
        assert_relative_eq!(x[3], -0.4, epsilon = 1e-14);
        // equilibrium of the free rows of the original system
        let residual = &original.stiffness * &x - &original.force;
        assert_relative_eq!(residual[1], 0.0, epsilon = 1e-13);
        assert_relative_eq!(residual[2], 0.0, epsilon = 1e-13);
    }

    #[test]
    fn later_iterations_zero_the_correction() {
        let system = apply_dirichlet(sample_system(), &[(1, 0.3)], false);
        assert_eq!(system.force, dvector![1.0, 0.0, 3.0, 4.0]);
    }

    #[test]
    fn overlapping_groups_resolve_to_last_condition() {
        let mesh = rectangle(1.0, 1.0, 1, 1).unwrap();
        let conditions = vec![
            DirichletCondition {
                group: "left".to_string(),
                direction: Direction::X,
                value: 0.0,
            },
            DirichletCondition {
                group: "bottom".to_string(),
                direction: Direction::Y,
                value: 0.0,
            },
            DirichletCondition {
                group: "bottom".to_string(),
                direction: Direction::X,
                value: 2.0,
            },
        ];
        let prescribed = prescribed_dofs(&mesh, &conditions, 0.5).unwrap();
        // node 0 sits on both left and bottom
        assert_eq!(prescribed, vec![(0, 1.0), (1, 0.0), (2, 1.0), (3, 0.0), (4, 0.0)]);
    }

    #[test]
    fn traction_resultant_matches_edge_length() {
        let mesh = rectangle(1.0, 2.0, 1, 2).unwrap();
        let rule = gauss_rule(ReferenceShape::Line, 2).unwrap();
        let conditions = vec![NeumannCondition {
            group: "right".to_string(),
            traction: Vector2::new(0.5, -0.2),
        }];
        let force = external_force(&mesh, &conditions, &rule, 1.0, 1.0).unwrap();

        let fx: f64 = force.iter().step_by(2).sum();
        let fy: f64 = force.iter().skip(1).step_by(2).sum();
        assert_relative_eq!(fx, 1.0, epsilon = 1e-14);
        assert_relative_eq!(fy, -0.4, epsilon = 1e-14);

        // right nodes 1, 3, 5: end nodes carry half of the middle node
        assert_relative_eq!(force[2], 0.25, epsilon = 1e-14);
        assert_relative_eq!(force[6], 0.5, epsilon = 1e-14);
        assert_relative_eq!(force[10], 0.25, epsilon = 1e-14);
        assert_eq!(force[0], 0.0);
    }

    #[test]
    fn unknown_traction_group_is_an_input_error() {
        let mesh = rectangle(1.0, 1.0, 1, 1).unwrap();
        let rule = gauss_rule(ReferenceShape::Line, 1).unwrap();
        let mut force = DVector::zeros(mesh.num_dofs());
        assert!(matches!(
            apply_neumann(&mesh, "hole", &Vector2::new(1.0, 0.0), &rule, 1.0, &mut force),
            Err(HematiteError::Input(_))
        ));
    }
}
