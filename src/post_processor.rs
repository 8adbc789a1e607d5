use std::io::{BufWriter, Write};

use nalgebra::{DVector, Vector2, Vector3};

use crate::{
    datatypes::{Mesh, DOF},
    error::HematiteError,
    material_model::{MaterialState, MaterialTable},
    solver::Solution,
};

/// Splits the global displacement vector into per-node (ux, uy)
pub fn nodal_displacements(solution: &Solution) -> Vec<Vector2<f64>> {
    displacement_pairs(&solution.total_displacement)
}

fn displacement_pairs(displacement: &DVector<f64>) -> Vec<Vector2<f64>> {
    displacement
        .as_slice()
        .chunks_exact(DOF)
        .map(|u| Vector2::new(u[0], u[1]))
        .collect()
}

/// Averages committed stress and strain onto the nodes
///
/// Every integration point of every element adjacent to a node contributes
/// with equal weight. Nodes not referenced by any element stay at zero.
///
/// # Arguments
/// * `mesh` - The mesh
/// * `materials` - The material table after the last committed step
///
/// # Returns
/// One averaged state per node
pub fn nodal_stress_strain(mesh: &Mesh, materials: &MaterialTable) -> Vec<MaterialState> {
    let mut sums = vec![MaterialState::default(); mesh.num_nodes()];
    let mut counts = vec![0usize; mesh.num_nodes()];

    for element in &mesh.elements {
        for state in materials.element_states(element.id) {
            for node in element.nodes {
                sums[node].stress += state.stress;
                sums[node].strain += state.strain;
                counts[node] += 1;
            }
        }
    }

    sums.into_iter()
        .zip(counts)
        .map(|(sum, count)| {
            if count == 0 {
                return sum;
            }
            MaterialState {
                stress: sum.stress / count as f64,
                strain: sum.strain / count as f64,
            }
        })
        .collect()
}

/// Plane von Mises equivalent of `[σxx, σyy, τxy]`
pub fn von_mises(stress: &Vector3<f64>) -> f64 {
    let (sxx, syy, sxy) = (stress[0], stress[1], stress[2]);
    f64::sqrt(sxx.powi(2) - sxx * syy + syy.powi(2) + 3.0 * sxy.powi(2))
}

/// Von Mises stress of each element, from its mean integration point stress
pub fn element_von_mises(mesh: &Mesh, materials: &MaterialTable) -> Vec<f64> {
    mesh.elements
        .iter()
        .map(|element| {
            let mut mean: Vector3<f64> = Vector3::zeros();
            for state in materials.element_states(element.id) {
                mean += state.stress;
            }
            von_mises(&(mean / materials.points_per_element() as f64))
        })
        .collect()
}

fn create_output(path: &str) -> Result<BufWriter<std::fs::File>, HematiteError> {
    match std::fs::File::create(path) {
        Ok(f) => Ok(BufWriter::new(f)),
        Err(err) => Err(HematiteError::PostProcessor(format!(
            "Failed to create {path}: {err}"
        ))),
    }
}

fn write_error(path: &str) -> impl Fn(std::io::Error) -> HematiteError + '_ {
    move |err| HematiteError::PostProcessor(format!("Failed to write {path}: {err}"))
}

/// Writes simulation results to two CSV files
///
/// # Arguments
/// * `mesh` - The analyzed mesh
/// * `solution` - The converged solution
/// * `nodes_output` - The filename of the output nodes csv
/// * `elements_output` - The filename of the output elements csv
pub fn csv_output(
    mesh: &Mesh,
    solution: &Solution,
    nodes_output: &str,
    elements_output: &str,
) -> Result<(), HematiteError> {
    let mut nodes_file = create_output(nodes_output)?;
    let mut elements_file = create_output(elements_output)?;

    // Write nodes
    let displacements = nodal_displacements(solution);
    let states = nodal_stress_strain(mesh, &solution.materials);

    writeln!(nodes_file, "x,y,ux,uy,sxx,syy,sxy,exx,eyy,gxy").map_err(write_error(nodes_output))?;
    for ((node, u), state) in mesh.nodes.iter().zip(&displacements).zip(&states) {
        writeln!(
            nodes_file,
            "{x},{y},{ux},{uy},{sxx},{syy},{sxy},{exx},{eyy},{gxy}",
            x = node.vertex.x,
            y = node.vertex.y,
            ux = u[0],
            uy = u[1],
            sxx = state.stress[0],
            syy = state.stress[1],
            sxy = state.stress[2],
            exx = state.strain[0],
            eyy = state.strain[1],
            gxy = state.strain[2],
        )
        .map_err(write_error(nodes_output))?;
    }
    nodes_file.flush().map_err(write_error(nodes_output))?;

    // Write elements
    writeln!(elements_file, "n0,n1,n2,n3,von_mises").map_err(write_error(elements_output))?;
    for (element, stress) in mesh
        .elements
        .iter()
        .zip(element_von_mises(mesh, &solution.materials))
    {
        writeln!(
            elements_file,
            "{n0},{n1},{n2},{n3},{stress}",
            n0 = element.nodes[0],
            n1 = element.nodes[1],
            n2 = element.nodes[2],
            n3 = element.nodes[3],
        )
        .map_err(write_error(elements_output))?;
    }
    elements_file.flush().map_err(write_error(elements_output))?;

    Ok(())
}
