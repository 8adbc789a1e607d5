use json::JsonValue;
use nalgebra::{Matrix3, Vector2};

use crate::{
    boundary_conditions::{DirichletCondition, NeumannCondition},
    datatypes::{Direction, Mesh},
    error::HematiteError,
    material_model::{compute_stress_strain_matrix, MaterialKind, PlaneCondition},
    mesher,
};

/// Analysis parameters shared by every element and integration point
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub num_time_steps: usize,
    /// Maximum number of Newton corrections per time step
    pub max_iterations: usize,
    /// Threshold on the residual norm
    pub tolerance: f64,
    pub material: MaterialKind,
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
    pub plane_condition: PlaneCondition,
    pub part_thickness: f64,
    /// Gauss points per reference direction (1 or 2)
    pub num_integration_points: usize,
    pub dirichlet: Vec<DirichletCondition>,
    pub neumann: Vec<NeumannCondition>,
    pub verbose: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            num_time_steps: 10,
            max_iterations: 10,
            tolerance: 1e-6,
            material: MaterialKind::LinearElastic,
            youngs_modulus: 1.0,
            poisson_ratio: 0.0,
            plane_condition: PlaneCondition::PlaneStrain,
            part_thickness: 1.0,
            num_integration_points: 2,
            dirichlet: Vec::new(),
            neumann: Vec::new(),
            verbose: false,
        }
    }
}

impl AnalysisConfig {
    /// Checks the scalar parameters
    pub fn validate(&self) -> Result<(), HematiteError> {
        if self.num_time_steps == 0 {
            return Err(HematiteError::Input(
                "num_time_steps must be at least 1".to_owned(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(HematiteError::Input(
                "max_iterations must be at least 1".to_owned(),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(HematiteError::Input(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.youngs_modulus > 0.0) {
            return Err(HematiteError::Input(format!(
                "youngs_modulus must be positive, got {}",
                self.youngs_modulus
            )));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(HematiteError::Input(format!(
                "poisson_ratio must lie in (-1, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        if !(self.part_thickness > 0.0) {
            return Err(HematiteError::Input(format!(
                "part_thickness must be positive, got {}",
                self.part_thickness
            )));
        }
        Ok(())
    }

    /// The elastic stress-strain matrix of the configured material
    pub fn elastic_matrix(&self) -> Matrix3<f64> {
        compute_stress_strain_matrix(
            self.poisson_ratio,
            self.youngs_modulus,
            self.plane_condition,
        )
    }
}

/// Where the mesh of an input file comes from
#[derive(Debug, Clone, PartialEq)]
pub enum MeshSource {
    Rectangle {
        width: f64,
        height: f64,
        nx: usize,
        ny: usize,
    },
    File(String),
}

impl MeshSource {
    pub fn build(&self, verbose: bool) -> Result<Mesh, HematiteError> {
        match self {
            MeshSource::Rectangle {
                width,
                height,
                nx,
                ny,
            } => mesher::rectangle(*width, *height, *nx, *ny),
            MeshSource::File(path) => mesher::read_msh(path, verbose),
        }
    }
}

/// Parsed contents of an input file
#[derive(Debug, Clone)]
pub struct InputFile {
    pub config: AnalysisConfig,
    pub mesh: MeshSource,
}

/// Parses the input json into a JsonValue object
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// A JsonValue object
pub fn load_input_file(input_file: &str) -> Result<JsonValue, HematiteError> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(_err) => {
            return Err(HematiteError::Input(format!(
                "Unable to open input file {}",
                input_file
            )))
        }
    };

    match json::parse(&file_string) {
        Ok(f) => Ok(f),
        Err(err) => Err(HematiteError::Input(format!(
            "Error in input file json: {err}"
        ))),
    }
}

fn optional_f64(section: &JsonValue, key: &str, default: f64) -> Result<f64, HematiteError> {
    if !section.has_key(key) {
        return Ok(default);
    }
    section[key]
        .as_f64()
        .ok_or_else(|| HematiteError::Input(format!("Bad value for {key}; expected a number")))
}

fn optional_usize(section: &JsonValue, key: &str, default: usize) -> Result<usize, HematiteError> {
    if !section.has_key(key) {
        return Ok(default);
    }
    section[key].as_usize().ok_or_else(|| {
        HematiteError::Input(format!("Bad value for {key}; expected a non-negative integer"))
    })
}

fn optional_bool(section: &JsonValue, key: &str, default: bool) -> Result<bool, HematiteError> {
    if !section.has_key(key) {
        return Ok(default);
    }
    section[key]
        .as_bool()
        .ok_or_else(|| HematiteError::Input(format!("Bad value for {key}; expected true or false")))
}

/// Parses the analysis parameters from the metadata section
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
///
/// # Returns
/// An AnalysisConfig without boundary conditions
fn parse_input_metadata(input_json: &JsonValue) -> Result<AnalysisConfig, HematiteError> {
    let defaults = AnalysisConfig::default();
    let metadata = &input_json["metadata"];

    let material = if metadata.has_key("material_model") {
        match metadata["material_model"].as_str() {
            Some(name) => name.parse::<MaterialKind>()?,
            None => {
                return Err(HematiteError::Input(
                    "Bad value for material_model; expected a model name".to_owned(),
                ))
            }
        }
    } else {
        defaults.material
    };

    let plane_condition = if optional_bool(
        metadata,
        "plane_stress",
        defaults.plane_condition == PlaneCondition::PlaneStress,
    )? {
        PlaneCondition::PlaneStress
    } else {
        PlaneCondition::PlaneStrain
    };

    Ok(AnalysisConfig {
        num_time_steps: optional_usize(metadata, "num_time_steps", defaults.num_time_steps)?,
        max_iterations: optional_usize(metadata, "max_iterations", defaults.max_iterations)?,
        tolerance: optional_f64(metadata, "tolerance", defaults.tolerance)?,
        material,
        youngs_modulus: optional_f64(metadata, "youngs_modulus", defaults.youngs_modulus)?,
        poisson_ratio: optional_f64(metadata, "poisson_ratio", defaults.poisson_ratio)?,
        plane_condition,
        part_thickness: optional_f64(metadata, "part_thickness", defaults.part_thickness)?,
        num_integration_points: optional_usize(
            metadata,
            "num_integration_points",
            defaults.num_integration_points,
        )?,
        dirichlet: Vec::new(),
        neumann: Vec::new(),
        verbose: optional_bool(metadata, "verbose", defaults.verbose)?,
    })
}

fn parse_mesh_source(input_json: &JsonValue) -> Result<MeshSource, HematiteError> {
    let mesh = &input_json["mesh"];

    if mesh.has_key("file") {
        return match mesh["file"].as_str() {
            Some(path) => Ok(MeshSource::File(path.to_string())),
            None => Err(HematiteError::Input(
                "Bad value for file in mesh section".to_owned(),
            )),
        };
    }

    for key in ["width", "height", "nx", "ny"] {
        if !mesh.has_key(key) {
            return Err(HematiteError::Input(format!(
                "Input json missing {key} field in mesh section"
            )));
        }
    }

    Ok(MeshSource::Rectangle {
        width: optional_f64(mesh, "width", 0.0)?,
        height: optional_f64(mesh, "height", 0.0)?,
        nx: optional_usize(mesh, "nx", 0)?,
        ny: optional_usize(mesh, "ny", 0)?,
    })
}

/// Loads boundary rules from the input json, in sorted name order
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
///
/// # Returns
/// The prescribed displacements and tractions, in that order
fn parse_boundary_conditions(
    input_json: &JsonValue,
) -> Result<(Vec<DirichletCondition>, Vec<NeumannCondition>), HematiteError> {
    let mut dirichlet: Vec<DirichletCondition> = Vec::new();
    let mut neumann: Vec<NeumannCondition> = Vec::new();

    let mut rules: Vec<(&str, &JsonValue)> = input_json["boundary_conditions"].entries().collect();
    rules.sort_by(|a, b| a.0.cmp(b.0));

    for (name, rule_json) in rules {
        let group = match rule_json["group"].as_str() {
            Some(g) => g.to_string(),
            None => {
                return Err(HematiteError::Input(format!(
                    "Boundary rule {name} is missing group field"
                )))
            }
        };

        let target = |key: &str| -> Result<Option<f64>, HematiteError> {
            if !rule_json.has_key(key) {
                return Ok(None);
            }
            match rule_json[key].as_f64() {
                Some(v) => Ok(Some(v)),
                None => Err(HematiteError::Input(format!(
                    "Bad value for {key} in boundary rule {name}"
                ))),
            }
        };
        let (ux, uy, fx, fy) = (target("ux")?, target("uy")?, target("fx")?, target("fy")?);

        if fx.is_some() && ux.is_some() {
            return Err(HematiteError::Input(format!(
                "Boundary '{name}' is over-constrained in x-axis"
            )));
        }
        if fy.is_some() && uy.is_some() {
            return Err(HematiteError::Input(format!(
                "Boundary '{name}' is over-constrained in y-axis"
            )));
        }
        if ux.is_none() && uy.is_none() && fx.is_none() && fy.is_none() {
            return Err(HematiteError::Input(format!(
                "Boundary '{name}' has no ux, uy, fx or fy target"
            )));
        }

        for (direction, value) in [(Direction::X, ux), (Direction::Y, uy)] {
            if let Some(value) = value {
                dirichlet.push(DirichletCondition {
                    group: group.clone(),
                    direction,
                    value,
                });
            }
        }
        if fx.is_some() || fy.is_some() {
            neumann.push(NeumannCondition {
                group,
                traction: Vector2::new(fx.unwrap_or(0.0), fy.unwrap_or(0.0)),
            });
        }
    }

    Ok((dirichlet, neumann))
}

/// Parses and validates an input file already loaded as json
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
pub fn parse_input(input_json: &JsonValue) -> Result<InputFile, HematiteError> {
    if !input_json.has_key("metadata") {
        return Err(HematiteError::Input(
            "Input json missing metadata field".to_string(),
        ));
    }
    if !input_json.has_key("mesh") {
        return Err(HematiteError::Input(
            "Input json missing mesh field".to_string(),
        ));
    }
    if !input_json.has_key("boundary_conditions") {
        return Err(HematiteError::Input(
            "Input json missing boundary_conditions field".to_string(),
        ));
    }

    let mut config = parse_input_metadata(input_json)?;
    let (dirichlet, neumann) = parse_boundary_conditions(input_json)?;
    config.dirichlet = dirichlet;
    config.neumann = neumann;
    config.validate()?;

    Ok(InputFile {
        config,
        mesh: parse_mesh_source(input_json)?,
    })
}

/// Loads an input file and builds its mesh
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// The mesh and the analysis configuration, in that order
pub fn run(input_file: &str) -> Result<(Mesh, AnalysisConfig), HematiteError> {
    let input = parse_input(&load_input_file(input_file)?)?;
    let mesh = input.mesh.build(input.config.verbose)?;
    report_warnings(&input.config);

    Ok((mesh, input.config))
}

/// Prints warnings about a configuration that is valid but likely to fail
pub fn report_warnings(config: &AnalysisConfig) {
    if config.verbose && config.dirichlet.is_empty() {
        println!("warning [input]: no prescribed displacements; the system will be singular");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = r#"{
        "metadata": {
            "num_time_steps": 4,
            "material_model": "nonlinear_elastic",
            "youngs_modulus": 2.0,
            "plane_stress": true
        },
        "mesh": { "width": 1.0, "height": 0.5, "nx": 4, "ny": 2 },
        "boundary_conditions": {
            "pull": { "group": "right", "fx": 0.1 },
            "clamp": { "group": "left", "ux": 0.0, "uy": 0.0 }
        }
    }"#;

    #[test]
    fn parses_metadata_with_defaults() {
        let input = parse_input(&json::parse(INPUT).unwrap()).unwrap();
        let config = input.config;
        assert_eq!(config.num_time_steps, 4);
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.material, MaterialKind::NonlinearElastic);
        assert_eq!(config.plane_condition, PlaneCondition::PlaneStress);
        assert_eq!(config.youngs_modulus, 2.0);
        assert_eq!(config.tolerance, 1e-6);
        assert_eq!(
            input.mesh,
            MeshSource::Rectangle {
                width: 1.0,
                height: 0.5,
                nx: 4,
                ny: 2
            }
        );
    }

    #[test]
    fn boundary_rules_apply_in_name_order() {
        let config = parse_input(&json::parse(INPUT).unwrap()).unwrap().config;
        assert_eq!(config.dirichlet.len(), 2);
        assert_eq!(config.dirichlet[0].group, "left");
        assert_eq!(config.dirichlet[0].direction, Direction::X);
        assert_eq!(config.dirichlet[1].direction, Direction::Y);
        assert_eq!(config.neumann[0].traction, Vector2::new(0.1, 0.0));
    }

    #[test]
    fn unknown_material_is_rejected() {
        let input = INPUT.replace("nonlinear_elastic", "hyper_elastic");
        assert!(matches!(
            parse_input(&json::parse(&input).unwrap()),
            Err(HematiteError::Input(_))
        ));
    }

    #[test]
    fn over_constrained_rule_is_rejected() {
        let input = INPUT.replace(r#""fx": 0.1"#, r#""fx": 0.1, "ux": 0.2"#);
        assert!(matches!(
            parse_input(&json::parse(&input).unwrap()),
            Err(HematiteError::Input(_))
        ));
    }

    #[test]
    fn missing_mesh_section_is_rejected() {
        let mut input = json::parse(INPUT).unwrap();
        input.remove("mesh");
        assert!(matches!(parse_input(&input), Err(HematiteError::Input(_))));
    }

    #[test]
    fn unconstrained_input_is_parsed_quietly() {
        let input = INPUT.replace(r#""ux": 0.0, "uy": 0.0"#, r#""fy": 0.0"#);
        let input = parse_input(&json::parse(&input).unwrap()).unwrap();
        assert!(!input.config.verbose);
        assert!(input.config.dirichlet.is_empty());
        report_warnings(&input.config);

        let verbose = INPUT.replace(r#""plane_stress": true"#, r#""plane_stress": true, "verbose": true"#);
        let config = parse_input(&json::parse(&verbose).unwrap()).unwrap().config;
        assert!(config.verbose);

        let missing = MeshSource::File("/nonexistent/strip.msh".to_owned());
        assert!(matches!(missing.build(false), Err(HematiteError::Mesher(_))));
    }

    #[test]
    fn invalid_poisson_ratio_is_rejected() {
        let config = AnalysisConfig {
            poisson_ratio: 0.5,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(AnalysisConfig::default().validate().is_ok());
    }
}
