use nalgebra::{DMatrix, DVector, SMatrix, SVector};

use crate::{
    datatypes::{Element, Mesh},
    error::HematiteError,
    integration::IntegrationPoint,
    material_model::MaterialTable,
    shape_functions::{Q4ShapeFunction, ShapeFunction},
};

/// Checks that the material table has one point per integration point of
/// the given element
fn check_material_layout(
    element: &Element,
    rule: &[IntegrationPoint],
    materials: &MaterialTable,
) -> Result<(), HematiteError> {
    if rule.len() != materials.points_per_element() {
        return Err(HematiteError::Input(format!(
            "Material table holds {} points per element but the integration rule has {}",
            materials.points_per_element(),
            rule.len()
        )));
    }
    if element.id >= materials.num_elements() {
        return Err(HematiteError::Input(format!(
            "Material table holds {} elements; element {} has no material points",
            materials.num_elements(),
            element.id
        )));
    }
    Ok(())
}

/// Integrates the tangent stiffness and internal force of one element
///
/// Every material point of the element is evaluated with the strain of the
/// given displacement increment, which overwrites its trial state.
///
/// # Arguments
/// * `mesh` - The mesh
/// * `element` - The element to target
/// * `rule` - Integration points of the quadrilateral
/// * `thickness` - Out-of-plane thickness of the part
/// * `increment_displacement` - Global displacement increment of the current step
/// * `materials` - The material table
///
/// # Returns
/// The 8x8 element stiffness and the 8-entry internal force, in that order
pub fn compute_element_contribution(
    mesh: &Mesh,
    element: &Element,
    rule: &[IntegrationPoint],
    thickness: f64,
    increment_displacement: &DVector<f64>,
    materials: &mut MaterialTable,
) -> Result<(SMatrix<f64, 8, 8>, SVector<f64, 8>), HematiteError> {
    check_material_layout(element, rule, materials)?;

    let shape = Q4ShapeFunction::new(element.id, mesh.element_coords(element));
    let dofs = mesh.element_dofs(element);
    let element_dofs = SVector::<f64, 8>::from_fn(|i, _| increment_displacement[dofs[i]]);

    let mut element_stiffness: SMatrix<f64, 8, 8> = SMatrix::zeros();
    let mut element_force: SVector<f64, 8> = SVector::zeros();

    for (i, point) in rule.iter().enumerate() {
        let b_mat = shape.evaluate_b_at(point)?;
        let jacob_det = shape.evaluate_jacob_determinant_at(point);
        let scale = jacob_det * point.weight * thickness;

        let element_strain = b_mat * element_dofs;
        let (tangent, stress) = materials
            .get_mut(element.id, i)
            .compute_stress_and_stiffness(&element_strain);

        element_stiffness += b_mat.transpose() * tangent * b_mat * scale;
        element_force += b_mat.transpose() * stress * scale;
    }

    Ok((element_stiffness, element_force))
}

/// Adds an element contribution into the global system
fn scatter(
    element: &Element,
    element_stiffness: &SMatrix<f64, 8, 8>,
    element_force: &SVector<f64, 8>,
    stiffness: &mut DMatrix<f64>,
    internal_force: &mut DVector<f64>,
) {
    for (local_row, node_row) in element.nodes.iter().enumerate() {
        let global_row = node_row * 2;
        let local_row = local_row * 2;

        internal_force[global_row] += element_force[local_row];
        internal_force[global_row + 1] += element_force[local_row + 1];

        for (local_col, node_col) in element.nodes.iter().enumerate() {
            let global_col = node_col * 2;
            let local_col = local_col * 2;

            // Add RowX ColX
            stiffness[(global_row, global_col)] += element_stiffness[(local_row, local_col)];
            // Add RowX ColY
            stiffness[(global_row, global_col + 1)] +=
                element_stiffness[(local_row, local_col + 1)];
            // Add RowY ColX
            stiffness[(global_row + 1, global_col)] +=
                element_stiffness[(local_row + 1, local_col)];
            // Add RowY ColY
            stiffness[(global_row + 1, global_col + 1)] +=
                element_stiffness[(local_row + 1, local_col + 1)];
        }
    }
}

/// Builds the global tangent stiffness matrix and internal force vector
///
/// Elements are visited in ascending id and integration points in rule order.
///
/// # Arguments
/// * `mesh` - The mesh
/// * `rule` - Integration points of the quadrilateral
/// * `thickness` - Out-of-plane thickness of the part
/// * `increment_displacement` - Global displacement increment of the current step
/// * `materials` - The material table, one point per (element, integration point)
///
/// # Returns
/// The global stiffness matrix and internal force vector, in that order
pub fn assemble(
    mesh: &Mesh,
    rule: &[IntegrationPoint],
    thickness: f64,
    increment_displacement: &DVector<f64>,
    materials: &mut MaterialTable,
) -> Result<(DMatrix<f64>, DVector<f64>), HematiteError> {
    let num_dofs = mesh.num_dofs();
    let mut stiffness: DMatrix<f64> = DMatrix::zeros(num_dofs, num_dofs);
    let mut internal_force: DVector<f64> = DVector::zeros(num_dofs);

    for element in &mesh.elements {
        let (element_stiffness, element_force) = compute_element_contribution(
            mesh,
            element,
            rule,
            thickness,
            increment_displacement,
            materials,
        )?;
        scatter(
            element,
            &element_stiffness,
            &element_force,
            &mut stiffness,
            &mut internal_force,
        );
    }

    Ok((stiffness, internal_force))
}
