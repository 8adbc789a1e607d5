use clap::Parser;

use hematite::{config, post_processor, solver, Analysis, HematiteError};

/// Nonlinear 2D plane elasticity solver
#[derive(Parser, Debug)]
#[command(name = "hematite", version)]
struct Args {
    /// Path to the input json file
    input_json: String,

    /// Output csv of nodal displacements, stresses and strains
    #[arg(long, default_value = "nodes.csv")]
    nodes_output: String,

    /// Output csv of element connectivity and von Mises stress
    #[arg(long, default_value = "elements.csv")]
    elements_output: String,

    /// Silence progress output
    #[arg(short, long)]
    quiet: bool,
}

fn run(args: &Args) -> Result<(), HematiteError> {
    let mut input = config::parse_input(&config::load_input_file(&args.input_json)?)?;
    input.config.verbose = !args.quiet;

    let config = input.config;
    let mesh = input.mesh.build(config.verbose)?;
    config::report_warnings(&config);

    if config.verbose {
        println!(
            "info: analyzing {} nodes and {} elements with {} boundary rules",
            mesh.num_nodes(),
            mesh.num_elements(),
            config.dirichlet.len() + config.neumann.len()
        );
    }

    let Analysis { solution, failure } = solver::run_to_failure(&mesh, &config)?;

    // a failed analysis still exports its last committed time step
    if failure.is_none() || !solution.reports.is_empty() {
        post_processor::csv_output(
            &mesh,
            &solution,
            &args.nodes_output,
            &args.elements_output,
        )?;

        if config.verbose {
            println!(
                "info: wrote output to {} and {}",
                args.nodes_output, args.elements_output
            );
        }
    }

    match failure {
        Some(err) => {
            if let (true, Some(last)) = (config.verbose, solution.reports.last()) {
                println!(
                    "warning [solver]: output holds the last committed time step {}",
                    last.time_step
                );
            }
            Err(err)
        }
        None => Ok(()),
    }
}

fn main() {
    let args = Args::parse();

    if let Err(err) = run(&args) {
        eprintln!("{err}");
        std::process::exit(1)
    }
}
