use nalgebra::{matrix, Matrix2, RowVector2, SMatrix};

use crate::{error::HematiteError, integration::IntegrationPoint};

/// Smallest accepted ratio between the jacobian determinant and the squared
/// longest edge of a quadrilateral
pub const MIN_JACOBIAN_RATIO: f64 = 1e-12;

/// Capabilities shared by the element families
pub trait ShapeFunction {
    /// Interpolation matrix type; two rows (x, y) and one column pair per node
    type Interpolation;

    /// Evaluates the interpolation matrix N at a reference point
    fn evaluate_n_at(&self, point: &IntegrationPoint) -> Self::Interpolation;

    /// Evaluates the measure scale between reference and physical space
    fn evaluate_jacob_determinant_at(&self, point: &IntegrationPoint) -> f64;
}

/// 4-node bilinear quadrilateral
pub struct Q4ShapeFunction {
    element: usize,
    coords: SMatrix<f64, 4, 2>,
}

impl Q4ShapeFunction {
    /// Creates the shape function of a quadrilateral element
    ///
    /// # Arguments
    /// * `element` - Id of the element, reported on degenerate geometry
    /// * `coords` - Corner coordinates, counter-clockwise
    pub fn new(element: usize, coords: [[f64; 2]; 4]) -> Q4ShapeFunction {
        Q4ShapeFunction {
            element,
            coords: SMatrix::<f64, 4, 2>::from_fn(|r, c| coords[r][c]),
        }
    }

    fn shape_values(point: &IntegrationPoint) -> [f64; 4] {
        let (xi, eta) = (point.xi, point.eta);
        [
            0.25 * (1.0 - xi) * (1.0 - eta),
            0.25 * (1.0 + xi) * (1.0 - eta),
            0.25 * (1.0 + xi) * (1.0 + eta),
            0.25 * (1.0 - xi) * (1.0 + eta),
        ]
    }

    /// Rows are ∂N/∂ξ and ∂N/∂η, one column per node
    fn shape_derivatives(point: &IntegrationPoint) -> SMatrix<f64, 2, 4> {
        let (xi, eta) = (point.xi, point.eta);
        matrix![
            -0.25 * (1.0 - eta), 0.25 * (1.0 - eta), 0.25 * (1.0 + eta), -0.25 * (1.0 + eta);
            -0.25 * (1.0 - xi), -0.25 * (1.0 + xi), 0.25 * (1.0 + xi), 0.25 * (1.0 - xi);
        ]
    }

    /// Squared length of the longest edge, the area scale of the element
    fn squared_edge_scale(&self) -> f64 {
        (0..4)
            .map(|i| {
                let j = (i + 1) % 4;
                (self.coords.row(j) - self.coords.row(i)).norm_squared()
            })
            .fold(0.0, f64::max)
    }

    /// Evaluates the 2x2 jacobian `[∂N/∂ξ; ∂N/∂η] · coords`
    pub fn evaluate_jacob_at(&self, point: &IntegrationPoint) -> Matrix2<f64> {
        Self::shape_derivatives(point) * self.coords
    }

    /// Evaluates the strain-displacement matrix at a reference point
    ///
    /// # Arguments
    /// * `point` - The reference point
    ///
    /// # Returns
    /// A 3x8 matrix mapping `[ux0, uy0, ..., ux3, uy3]` to `[εxx, εyy, γxy]`
    pub fn evaluate_b_at(&self, point: &IntegrationPoint) -> Result<SMatrix<f64, 3, 8>, HematiteError> {
        let jacobian = self.evaluate_jacob_at(point);
        let determinant = jacobian.determinant();

        // relative to the element size so that the unit of length does not matter
        if determinant.is_nan() || determinant <= MIN_JACOBIAN_RATIO * self.squared_edge_scale() {
            return Err(HematiteError::DegenerateElement {
                element: self.element,
                determinant,
            });
        }
        let inv_jacobian = match jacobian.try_inverse() {
            Some(inv) => inv,
            None => {
                return Err(HematiteError::DegenerateElement {
                    element: self.element,
                    determinant,
                })
            }
        };

        let dn_dx = inv_jacobian * Self::shape_derivatives(point);

        let mut b_mat: SMatrix<f64, 3, 8> = SMatrix::zeros();
        for node in 0..4 {
            let (dx, dy) = (dn_dx[(0, node)], dn_dx[(1, node)]);
            b_mat[(0, 2 * node)] = dx;
            b_mat[(1, 2 * node + 1)] = dy;
            b_mat[(2, 2 * node)] = dy;
            b_mat[(2, 2 * node + 1)] = dx;
        }

        Ok(b_mat)
    }
}

impl ShapeFunction for Q4ShapeFunction {
    type Interpolation = SMatrix<f64, 2, 8>;

    fn evaluate_n_at(&self, point: &IntegrationPoint) -> SMatrix<f64, 2, 8> {
        let values = Self::shape_values(point);
        let mut n_mat: SMatrix<f64, 2, 8> = SMatrix::zeros();
        for (node, value) in values.iter().enumerate() {
            n_mat[(0, 2 * node)] = *value;
            n_mat[(1, 2 * node + 1)] = *value;
        }
        n_mat
    }

    fn evaluate_jacob_determinant_at(&self, point: &IntegrationPoint) -> f64 {
        self.evaluate_jacob_at(point).determinant()
    }
}

/// 2-node line element embedded in the plane, used on boundary edges
pub struct L2ShapeFunction {
    coords: SMatrix<f64, 2, 2>,
}

impl L2ShapeFunction {
    pub fn new(coords: [[f64; 2]; 2]) -> L2ShapeFunction {
        L2ShapeFunction {
            coords: SMatrix::<f64, 2, 2>::from_fn(|r, c| coords[r][c]),
        }
    }

    /// The jacobian of a line in 2D is the 1x2 tangent `[dx/dξ, dy/dξ]`
    pub fn evaluate_jacob_at(&self, _point: &IntegrationPoint) -> RowVector2<f64> {
        let dn_dxi = RowVector2::new(-0.5, 0.5);
        dn_dxi * self.coords
    }
}

impl ShapeFunction for L2ShapeFunction {
    type Interpolation = SMatrix<f64, 2, 4>;

    fn evaluate_n_at(&self, point: &IntegrationPoint) -> SMatrix<f64, 2, 4> {
        let n0 = 0.5 * (1.0 - point.xi);
        let n1 = 0.5 * (1.0 + point.xi);
        matrix![
            n0, 0.0, n1, 0.0;
            0.0, n0, 0.0, n1;
        ]
    }

    /// A rectangular jacobian has no determinant; the length of the tangent
    /// plays the same role for line integrals.
    fn evaluate_jacob_determinant_at(&self, point: &IntegrationPoint) -> f64 {
        self.evaluate_jacob_at(point).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::{gauss_rule, ReferenceShape};
    use approx::assert_relative_eq;
    use nalgebra::SVector;

    const SQUARE: [[f64; 2]; 4] = [[0.0, 0.0], [5.0, 0.0], [5.0, 5.0], [0.0, 5.0]];

    fn point(xi: f64, eta: f64) -> IntegrationPoint {
        IntegrationPoint { xi, eta, weight: 1.0 }
    }

    #[test]
    fn q4_shape_functions_partition_unity() {
        let shape = Q4ShapeFunction::new(0, SQUARE);
        for p in gauss_rule(ReferenceShape::Quadrilateral, 2).unwrap() {
            let n = shape.evaluate_n_at(&p);
            let row_x: f64 = (0..4).map(|i| n[(0, 2 * i)]).sum();
            let row_y: f64 = (0..4).map(|i| n[(1, 2 * i + 1)]).sum();
            assert_relative_eq!(row_x, 1.0, epsilon = 1e-15);
            assert_relative_eq!(row_y, 1.0, epsilon = 1e-15);
        }
        let corner = shape.evaluate_n_at(&point(1.0, 1.0));
        assert_relative_eq!(corner[(0, 4)], 1.0);
        assert_relative_eq!(corner[(0, 0)], 0.0);
    }

    #[test]
    fn q4_jacobian_determinant_is_quarter_area() {
        let shape = Q4ShapeFunction::new(0, SQUARE);
        let p = point(0.3, -0.7);
        assert_relative_eq!(shape.evaluate_jacob_determinant_at(&p), 25.0 / 4.0, epsilon = 1e-12);

        let parallelogram = Q4ShapeFunction::new(0, [[0.0, 0.0], [2.0, 0.0], [3.0, 1.0], [1.0, 1.0]]);
        assert_relative_eq!(parallelogram.evaluate_jacob_determinant_at(&p), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn b_matrix_reproduces_uniform_strain() {
        // u = (0.01 x + 0.02 y, 0.03 x - 0.04 y)
        let coords = [[0.0, 0.0], [2.0, 0.2], [2.5, 1.8], [-0.3, 1.2]];
        let shape = Q4ShapeFunction::new(0, coords);
        let u = SVector::<f64, 8>::from_fn(|i, _| {
            let [x, y] = coords[i / 2];
            if i % 2 == 0 {
                0.01 * x + 0.02 * y
            } else {
                0.03 * x - 0.04 * y
            }
        });
        for p in gauss_rule(ReferenceShape::Quadrilateral, 2).unwrap() {
            let strain = shape.evaluate_b_at(&p).unwrap() * u;
            assert_relative_eq!(strain[0], 0.01, epsilon = 1e-14);
            assert_relative_eq!(strain[1], -0.04, epsilon = 1e-14);
            assert_relative_eq!(strain[2], 0.05, epsilon = 1e-14);
        }
    }

    #[test]
    fn clockwise_element_is_degenerate() {
        let clockwise = [SQUARE[0], SQUARE[3], SQUARE[2], SQUARE[1]];
        let shape = Q4ShapeFunction::new(7, clockwise);
        match shape.evaluate_b_at(&point(0.0, 0.0)) {
            Err(HematiteError::DegenerateElement { element, determinant }) => {
                assert_eq!(element, 7);
                assert!(determinant < 0.0);
            }
            other => panic!("expected degenerate element, got {:?}", other.map(|_| ())),
        }

        let collapsed = Q4ShapeFunction::new(3, [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]]);
        assert!(collapsed.evaluate_b_at(&point(0.0, 0.0)).is_err());

        let coincident = Q4ShapeFunction::new(4, [[1e-6, 1e-6]; 4]);
        assert!(coincident.evaluate_b_at(&point(0.0, 0.0)).is_err());
    }

    #[test]
    fn micrometre_element_is_not_degenerate() {
        // 2 µm square in metres: det J = 1e-12
        let shape = Q4ShapeFunction::new(0, [[0.0, 0.0], [2e-6, 0.0], [2e-6, 2e-6], [0.0, 2e-6]]);
        for p in gauss_rule(ReferenceShape::Quadrilateral, 2).unwrap() {
            assert_relative_eq!(shape.evaluate_jacob_determinant_at(&p), 1e-12, max_relative = 1e-12);
            let b_mat = shape.evaluate_b_at(&p).unwrap();
            assert_relative_eq!(b_mat[(0, 2)], 0.25e6 * (1.0 - p.eta), max_relative = 1e-12);
        }

        // a sliver of aspect ratio 1e-7 is still accepted, a flattened one is not
        let sliver = Q4ShapeFunction::new(0, [[0.0, 0.0], [1.0, 0.0], [1.0, 1e-7], [0.0, 1e-7]]);
        assert!(sliver.evaluate_b_at(&point(0.0, 0.0)).is_ok());
        let flat = Q4ShapeFunction::new(0, [[0.0, 0.0], [1.0, 0.0], [1.0, 1e-14], [0.0, 1e-14]]);
        assert!(flat.evaluate_b_at(&point(0.0, 0.0)).is_err());
    }

    #[test]
    fn l2_jacobian_is_half_edge_length() {
        let shape = L2ShapeFunction::new([[1.0, 1.0], [4.0, 5.0]]);
        let rule = gauss_rule(ReferenceShape::Line, 2).unwrap();
        let length: f64 = rule
            .iter()
            .map(|p| shape.evaluate_jacob_determinant_at(p) * p.weight)
            .sum();
        assert_relative_eq!(length, 5.0, epsilon = 1e-14);

        let n = shape.evaluate_n_at(&point(-1.0, 0.0));
        assert_relative_eq!(n[(0, 0)], 1.0);
        assert_relative_eq!(n[(1, 3)], 0.0);
    }
}
