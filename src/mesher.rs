use std::{
    collections::{BTreeMap, HashMap},
    str::FromStr,
};

use crate::{
    datatypes::{Element, Mesh, Node, Vertex},
    error::HematiteError,
};

/// Gmsh element type of a 2-node line
const GMSH_LINE: usize = 1;
/// Gmsh element type of a 4-node quadrangle
const GMSH_QUADRANGLE: usize = 3;
/// Gmsh element type of a 1-node point
const GMSH_POINT: usize = 15;

/// Builds a structured mesh of a rectangle with its lower-left corner at the origin
///
/// Nodes are numbered row by row from the bottom. The boundary groups
/// `bottom`, `right`, `top` and `left` list their edges counter-clockwise.
///
/// # Arguments
/// * `width` - Extent along x
/// * `height` - Extent along y
/// * `nx` - Number of elements along x
/// * `ny` - Number of elements along y
///
/// # Returns
/// The mesh
pub fn rectangle(width: f64, height: f64, nx: usize, ny: usize) -> Result<Mesh, HematiteError> {
    if nx == 0 || ny == 0 {
        return Err(HematiteError::Mesher(format!(
            "Rectangle needs at least one element per direction, got {nx}x{ny}"
        )));
    }
    if !(width > 0.0 && height > 0.0) {
        return Err(HematiteError::Mesher(format!(
            "Rectangle dimensions must be positive, got {width}x{height}"
        )));
    }

    let row = nx + 1;
    let node_id = |i: usize, j: usize| j * row + i;

    let mut nodes: Vec<Node> = Vec::with_capacity(row * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            nodes.push(Node {
                id: node_id(i, j),
                vertex: Vertex {
                    x: width * i as f64 / nx as f64,
                    y: height * j as f64 / ny as f64,
                },
            });
        }
    }

    let mut elements: Vec<Element> = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            elements.push(Element {
                id: elements.len(),
                nodes: [
                    node_id(i, j),
                    node_id(i + 1, j),
                    node_id(i + 1, j + 1),
                    node_id(i, j + 1),
                ],
            });
        }
    }

    let mut boundaries: BTreeMap<String, Vec<[usize; 2]>> = BTreeMap::new();
    boundaries.insert(
        "bottom".to_string(),
        (0..nx).map(|i| [node_id(i, 0), node_id(i + 1, 0)]).collect(),
    );
    boundaries.insert(
        "right".to_string(),
        (0..ny).map(|j| [node_id(nx, j), node_id(nx, j + 1)]).collect(),
    );
    boundaries.insert(
        "top".to_string(),
        (0..nx)
            .rev()
            .map(|i| [node_id(i + 1, ny), node_id(i, ny)])
            .collect(),
    );
    boundaries.insert(
        "left".to_string(),
        (0..ny)
            .rev()
            .map(|j| [node_id(0, j + 1), node_id(0, j)])
            .collect(),
    );

    Mesh::new(nodes, elements, boundaries)
}

fn next_line<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    section: &str,
) -> Result<&'a str, HematiteError> {
    match lines.next() {
        Some(line) => Ok(line.trim()),
        None => Err(HematiteError::Mesher(format!(
            "Unexpected end of mesh file in {section} section"
        ))),
    }
}

fn parse_numbers<T: FromStr>(line: &str, section: &str) -> Result<Vec<T>, HematiteError> {
    line.split_whitespace()
        .map(|token| {
            token.parse::<T>().map_err(|_| {
                HematiteError::Mesher(format!(
                    "Unexpected value '{token}' in {section} section of mesh file"
                ))
            })
        })
        .collect()
}

/// Reads `$PhysicalNames`: (dimension, tag) -> name
fn parse_physical_names<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
) -> Result<HashMap<(usize, usize), String>, HematiteError> {
    let count: usize = parse_numbers(next_line(lines, "PhysicalNames")?, "PhysicalNames")?
        .first()
        .copied()
        .unwrap_or(0);

    let mut names = HashMap::new();
    for _ in 0..count {
        let line = next_line(lines, "PhysicalNames")?;
        let mut parts = line.splitn(3, char::is_whitespace);
        let dim = parts.next().and_then(|p| p.parse::<usize>().ok());
        let tag = parts.next().and_then(|p| p.parse::<usize>().ok());
        let name = parts.next().map(|p| p.trim().trim_matches('"').to_string());

        match (dim, tag, name) {
            (Some(dim), Some(tag), Some(name)) => {
                names.insert((dim, tag), name);
            }
            _ => {
                return Err(HematiteError::Mesher(format!(
                    "Malformed physical name '{line}'"
                )))
            }
        }
    }

    Ok(names)
}

/// Reads `$Entities` and returns the physical tags of every curve
fn parse_curve_entities<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
) -> Result<HashMap<usize, Vec<usize>>, HematiteError> {
    let counts: Vec<usize> = parse_numbers(next_line(lines, "Entities")?, "Entities")?;
    if counts.len() < 2 {
        return Err(HematiteError::Mesher(
            "Malformed entity counts in mesh file".to_owned(),
        ));
    }

    for _ in 0..counts[0] {
        next_line(lines, "Entities")?;
    }

    let mut curves = HashMap::new();
    for _ in 0..counts[1] {
        // tag, bounding box (6 values), physical tag count, physical tags, bounding points
        let values: Vec<f64> = parse_numbers(next_line(lines, "Entities")?, "Entities")?;
        if values.len() < 8 {
            return Err(HematiteError::Mesher(
                "Malformed curve entity in mesh file".to_owned(),
            ));
        }
        let num_physical = values[7] as usize;
        let physical: Vec<usize> = values
            .iter()
            .skip(8)
            .take(num_physical)
            .map(|v| *v as usize)
            .collect();
        curves.insert(values[0] as usize, physical);
    }

    Ok(curves)
}

/// Parses the contents of an ASCII gmsh 4.1 `.msh` file
///
/// Quadrangles become elements and lines become boundary edges, grouped by the
/// physical name of their curve (or the physical tag when unnamed). Clockwise
/// quadrangles are reoriented.
///
/// # Arguments
/// * `contents` - The file contents
/// * `verbose` - Whether to print a warning for every reoriented quadrangle
///
/// # Returns
/// The mesh
pub fn parse_msh(contents: &str, verbose: bool) -> Result<Mesh, HematiteError> {
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());

    let mut physical_names: HashMap<(usize, usize), String> = HashMap::new();
    let mut curve_physicals: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut vertices: Vec<Option<Vertex>> = Vec::new();
    let mut quads: Vec<[usize; 4]> = Vec::new();
    let mut boundaries: BTreeMap<String, Vec<[usize; 2]>> = BTreeMap::new();

    while let Some(line) = lines.next() {
        match line.trim() {
            "$MeshFormat" => {
                let format = next_line(&mut lines, "MeshFormat")?;
                let fields: Vec<&str> = format.split_whitespace().collect();
                if fields.len() < 2 || !fields[0].starts_with('4') || fields[1] != "0" {
                    return Err(HematiteError::Mesher(format!(
                        "Unsupported mesh format '{format}'; expected ASCII msh 4.x"
                    )));
                }
            }
            "$PhysicalNames" => physical_names = parse_physical_names(&mut lines)?,
            "$Entities" => curve_physicals = parse_curve_entities(&mut lines)?,
            "$Nodes" => {
                let header: Vec<usize> = parse_numbers(next_line(&mut lines, "Nodes")?, "Nodes")?;
                if header.len() < 4 {
                    return Err(HematiteError::Mesher("Malformed node header".to_owned()));
                }
                vertices = vec![None; header[3]];

                for _ in 0..header[0] {
                    let block: Vec<usize> =
                        parse_numbers(next_line(&mut lines, "Nodes")?, "Nodes")?;
                    let num_nodes_local = *block.get(3).ok_or_else(|| {
                        HematiteError::Mesher("Malformed node block header".to_owned())
                    })?;

                    let mut node_tags: Vec<usize> = Vec::with_capacity(num_nodes_local);
                    for _ in 0..num_nodes_local {
                        let tag: Vec<usize> =
                            parse_numbers(next_line(&mut lines, "Nodes")?, "Nodes")?;
                        node_tags.push(tag.first().copied().unwrap_or(0));
                    }

                    for tag in node_tags {
                        let coords: Vec<f64> =
                            parse_numbers(next_line(&mut lines, "Nodes")?, "Nodes")?;
                        if tag == 0 || tag > vertices.len() || coords.len() < 2 {
                            return Err(HematiteError::Mesher(format!(
                                "Invalid node {tag}; node tags must run from 1 to {}",
                                vertices.len()
                            )));
                        }
                        vertices[tag - 1] = Some(Vertex {
                            x: coords[0],
                            y: coords[1],
                        });
                    }
                }
            }
            "$Elements" => {
                let header: Vec<usize> =
                    parse_numbers(next_line(&mut lines, "Elements")?, "Elements")?;
                let num_blocks = header.first().copied().unwrap_or(0);

                for _ in 0..num_blocks {
                    let block: Vec<usize> =
                        parse_numbers(next_line(&mut lines, "Elements")?, "Elements")?;
                    if block.len() < 4 {
                        return Err(HematiteError::Mesher(
                            "Malformed element block header".to_owned(),
                        ));
                    }
                    let (entity_dim, entity_tag, element_type, num_elements) =
                        (block[0], block[1], block[2], block[3]);

                    for _ in 0..num_elements {
                        let data: Vec<usize> =
                            parse_numbers(next_line(&mut lines, "Elements")?, "Elements")?;
                        if data.iter().skip(1).any(|tag| *tag == 0) {
                            return Err(HematiteError::Mesher(
                                "Element references node tag 0".to_owned(),
                            ));
                        }

                        match (entity_dim, element_type) {
                            (2, GMSH_QUADRANGLE) if data.len() >= 5 => {
                                quads.push([data[1] - 1, data[2] - 1, data[3] - 1, data[4] - 1]);
                            }
                            (1, GMSH_LINE) if data.len() >= 3 => {
                                let physicals = curve_physicals
                                    .get(&entity_tag)
                                    .cloned()
                                    .unwrap_or_default();
                                for physical in physicals {
                                    let name = physical_names
                                        .get(&(1, physical))
                                        .cloned()
                                        .unwrap_or_else(|| physical.to_string());
                                    boundaries
                                        .entry(name)
                                        .or_default()
                                        .push([data[1] - 1, data[2] - 1]);
                                }
                            }
                            (0, GMSH_POINT) => continue,
                            _ => {
                                return Err(HematiteError::Mesher(format!(
                                    "Unsupported gmsh element type {element_type} in entity of dimension {entity_dim}; only quadrangles and lines are supported"
                                )))
                            }
                        }
                    }
                }
            }
            _ => continue,
        }
    }

    let mut nodes: Vec<Node> = Vec::with_capacity(vertices.len());
    for (id, vertex) in vertices.into_iter().enumerate() {
        match vertex {
            Some(vertex) => nodes.push(Node { id, vertex }),
            None => {
                return Err(HematiteError::Mesher(format!(
                    "Node tag {} is missing; node tags must be contiguous",
                    id + 1
                )))
            }
        }
    }
    if quads.is_empty() {
        return Err(HematiteError::Mesher(
            "Mesh file contains no quadrangle elements".to_owned(),
        ));
    }

    let mut elements: Vec<Element> = Vec::with_capacity(quads.len());
    for (id, mut quad) in quads.into_iter().enumerate() {
        if quad.iter().any(|n| *n >= nodes.len()) {
            return Err(HematiteError::Mesher(format!(
                "Element {id} references missing node"
            )));
        }
        if signed_area(&nodes, &quad) < 0.0 {
            if verbose {
                println!("warning [mesh]: reordering clockwise element {id}");
            }
            quad = [quad[0], quad[3], quad[2], quad[1]];
        }
        elements.push(Element { id, nodes: quad });
    }

    Mesh::new(nodes, elements, boundaries)
}

/// Shoelace area of a quadrilateral, positive when counter-clockwise
fn signed_area(nodes: &[Node], quad: &[usize; 4]) -> f64 {
    let mut area = 0.0;
    for i in 0..4 {
        let a = nodes[quad[i]].vertex;
        let b = nodes[quad[(i + 1) % 4]].vertex;
        area += a.x * b.y - b.x * a.y;
    }
    0.5 * area
}

/// Reads an ASCII gmsh 4.1 `.msh` file
///
/// # Arguments
/// * `mesh_file` - The path to the mesh file
/// * `verbose` - Whether to report progress
pub fn read_msh(mesh_file: &str, verbose: bool) -> Result<Mesh, HematiteError> {
    let contents = match std::fs::read_to_string(mesh_file) {
        Ok(c) => c,
        Err(err) => {
            return Err(HematiteError::Mesher(format!(
                "Unable to open mesh file {mesh_file}: {err}"
            )))
        }
    };

    let mesh = parse_msh(&contents, verbose)?;

    if verbose {
        println!(
            "info: loaded {} nodes and {} elements",
            mesh.num_nodes(),
            mesh.num_elements()
        );
    }

    Ok(mesh)
}
