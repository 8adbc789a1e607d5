use crate::error::HematiteError;

/// Reference element an integration rule is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceShape {
    /// The square [-1, 1]²
    Quadrilateral,
    /// The segment [-1, 1]
    Line,
}

/// A Gauss point in reference coordinates. `eta` is zero on lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationPoint {
    pub xi: f64,
    pub eta: f64,
    pub weight: f64,
}

impl IntegrationPoint {
    fn new(xi: f64, eta: f64, weight: f64) -> IntegrationPoint {
        IntegrationPoint { xi, eta, weight }
    }
}

/// Builds the Gauss-Legendre rule for a reference element
///
/// Quadrilateral points are enumerated (-,-), (+,-), (+,+), (-,+).
///
/// # Arguments
/// * `shape` - The reference element
/// * `points_per_direction` - Number of points along each reference axis (1 or 2)
///
/// # Returns
/// The integration points, with weights summing to the reference measure
pub fn gauss_rule(
    shape: ReferenceShape,
    points_per_direction: usize,
) -> Result<Vec<IntegrationPoint>, HematiteError> {
    let p = 1.0 / f64::sqrt(3.0);

    match (shape, points_per_direction) {
        (ReferenceShape::Quadrilateral, 1) => Ok(vec![IntegrationPoint::new(0.0, 0.0, 4.0)]),
        (ReferenceShape::Quadrilateral, 2) => Ok(vec![
            IntegrationPoint::new(-p, -p, 1.0),
            IntegrationPoint::new(p, -p, 1.0),
            IntegrationPoint::new(p, p, 1.0),
            IntegrationPoint::new(-p, p, 1.0),
        ]),
        (ReferenceShape::Line, 1) => Ok(vec![IntegrationPoint::new(0.0, 0.0, 2.0)]),
        (ReferenceShape::Line, 2) => Ok(vec![
            IntegrationPoint::new(-p, 0.0, 1.0),
            IntegrationPoint::new(p, 0.0, 1.0),
        ]),
        (shape, n) => Err(HematiteError::Input(format!(
            "Unsupported number of integration points {n} per direction for {:?}; expected 1 or 2",
            shape
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn weights_sum_to_reference_measure() {
        for n in [1, 2] {
            let quad: f64 = gauss_rule(ReferenceShape::Quadrilateral, n)
                .unwrap()
                .iter()
                .map(|p| p.weight)
                .sum();
            let line: f64 = gauss_rule(ReferenceShape::Line, n)
                .unwrap()
                .iter()
                .map(|p| p.weight)
                .sum();
            assert_relative_eq!(quad, 4.0);
            assert_relative_eq!(line, 2.0);
        }
    }

    #[test]
    fn quadrilateral_points_run_counter_clockwise() {
        let rule = gauss_rule(ReferenceShape::Quadrilateral, 2).unwrap();
        let signs: Vec<(bool, bool)> = rule.iter().map(|p| (p.xi > 0.0, p.eta > 0.0)).collect();
        assert_eq!(
            signs,
            vec![(false, false), (true, false), (true, true), (false, true)]
        );
        assert_relative_eq!(rule[2].xi, 1.0 / 3.0_f64.sqrt());
    }

    #[test]
    fn two_point_line_rule_integrates_cubics_exactly() {
        // ∫ (x³ + x² + 1) dx over [-1, 1] = 2/3 + 2
        let integral: f64 = gauss_rule(ReferenceShape::Line, 2)
            .unwrap()
            .iter()
            .map(|p| (p.xi.powi(3) + p.xi.powi(2) + 1.0) * p.weight)
            .sum();
        assert_relative_eq!(integral, 2.0 / 3.0 + 2.0, epsilon = 1e-14);
    }

    #[test]
    fn unsupported_point_count_is_an_input_error() {
        assert!(matches!(
            gauss_rule(ReferenceShape::Quadrilateral, 3),
            Err(HematiteError::Input(_))
        ));
        assert!(matches!(
            gauss_rule(ReferenceShape::Line, 0),
            Err(HematiteError::Input(_))
        ));
    }
}
