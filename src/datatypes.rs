use std::collections::BTreeMap;

use crate::error::HematiteError;

/// Number of degrees of freedom per node (ux, uy)
pub const DOF: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub vertex: Vertex,
}

/// A bilinear quadrilateral. Nodes are stored counter-clockwise.
#[derive(Debug, Clone)]
pub struct Element {
    pub id: usize,
    pub nodes: [usize; 4],
}

/// Displacement or force component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Direction {
    X,
    Y,
}

impl Direction {
    /// Global index of this component's degree of freedom on `node`
    pub fn dof(&self, node: usize) -> usize {
        match self {
            Direction::X => DOF * node,
            Direction::Y => DOF * node + 1,
        }
    }
}

/// Immutable mesh consumed by the solver
#[derive(Debug, Clone)]
pub struct Mesh {
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
    /// Named groups of boundary edges, each edge an ordered pair of node ids
    pub boundaries: BTreeMap<String, Vec<[usize; 2]>>,
}

impl Mesh {
    /// Builds a mesh and checks that every referenced node exists
    ///
    /// # Arguments
    /// * `nodes` - Nodes, where `nodes[i].id == i`
    /// * `elements` - Quadrilateral elements, where `elements[i].id == i`
    /// * `boundaries` - Named boundary edge groups
    ///
    /// # Returns
    /// The validated mesh
    pub fn new(
        nodes: Vec<Node>,
        elements: Vec<Element>,
        boundaries: BTreeMap<String, Vec<[usize; 2]>>,
    ) -> Result<Mesh, HematiteError> {
        for (i, node) in nodes.iter().enumerate() {
            if node.id != i {
                return Err(HematiteError::Mesher(format!(
                    "Node at position {i} has id {}; node ids must be dense and zero-based",
                    node.id
                )));
            }
        }
        for (i, element) in elements.iter().enumerate() {
            if element.id != i {
                return Err(HematiteError::Mesher(format!(
                    "Element at position {i} has id {}; element ids must be dense and zero-based",
                    element.id
                )));
            }
            if let Some(n) = element.nodes.iter().find(|n| **n >= nodes.len()) {
                return Err(HematiteError::Mesher(format!(
                    "Element {i} references missing node {n}"
                )));
            }
        }
        for (name, edges) in &boundaries {
            for edge in edges {
                if edge.iter().any(|n| *n >= nodes.len()) {
                    return Err(HematiteError::Mesher(format!(
                        "Boundary '{name}' references missing node in edge {:?}",
                        edge
                    )));
                }
            }
        }

        Ok(Mesh {
            nodes,
            elements,
            boundaries,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn num_dofs(&self) -> usize {
        DOF * self.nodes.len()
    }

    /// Looks up a boundary edge group by name
    pub fn boundary(&self, name: &str) -> Result<&Vec<[usize; 2]>, HematiteError> {
        match self.boundaries.get(name) {
            Some(edges) => Ok(edges),
            None => Err(HematiteError::Input(format!(
                "Unknown boundary group '{name}'. Known groups: {:?}",
                self.boundaries.keys().collect::<Vec<_>>()
            ))),
        }
    }

    /// Unique node ids of a boundary group, in order of first appearance
    pub fn boundary_nodes(&self, name: &str) -> Result<Vec<usize>, HematiteError> {
        let mut nodes: Vec<usize> = Vec::new();
        for edge in self.boundary(name)? {
            for node in edge {
                if !nodes.contains(node) {
                    nodes.push(*node);
                }
            }
        }
        Ok(nodes)
    }

    /// Corner coordinates of an element as a 4x2 row-per-node array
    pub fn element_coords(&self, element: &Element) -> [[f64; 2]; 4] {
        element
            .nodes
            .map(|n| [self.nodes[n].vertex.x, self.nodes[n].vertex.y])
    }

    /// Global degrees of freedom of an element, `[ux0, uy0, ux1, uy1, ...]`
    pub fn element_dofs(&self, element: &Element) -> [usize; 8] {
        let mut dofs = [0; 8];
        for (i, node) in element.nodes.iter().enumerate() {
            dofs[DOF * i] = DOF * node;
            dofs[DOF * i + 1] = DOF * node + 1;
        }
        dofs
    }
}
