use plotpy::{Curve, Plot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

/// One solver run of a constrained benchmark problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BenchmarkRecord {
    solver: String,
    num_dofs: usize,
    num_slaves: usize,
    its: usize,
    solve_time: f64,
}

/// Command line options
#[derive(StructOpt, Debug)]
#[structopt(
    name = "plot_iterations",
    about = "Plots solver iteration counts against problem size for the constrained benchmarks"
)]
struct Options {
    /// Plot the contact-elasticity benchmark
    #[structopt(long)]
    elasticity: bool,

    /// Plot the periodic Poisson benchmark
    #[structopt(long)]
    periodic: bool,

    /// Directory holding the benchmark result files
    #[structopt(long, default_value = "results")]
    results_dir: PathBuf,
}

fn main() -> eyre::Result<()> {
    let options = Options::from_args();

    if !options.elasticity && !options.periodic {
        println!("Nothing to plot; pass --elasticity and/or --periodic");
        return Ok(());
    }
    if options.elasticity {
        plot_benchmark(&options.results_dir, "elasticity")?;
    }
    if options.periodic {
        plot_benchmark(&options.results_dir, "periodic")?;
    }
    Ok(())
}

fn plot_benchmark(results_dir: &Path, name: &str) -> eyre::Result<()> {
    let input = results_dir.join(format!("{}.json", name));
    let contents = fs::read_to_string(&input)?;
    let records: Vec<BenchmarkRecord> = serde_json::from_str(&contents)?;

    // One curve per solver, runs ordered by problem size
    let mut by_solver: BTreeMap<&str, Vec<&BenchmarkRecord>> = BTreeMap::new();
    for record in &records {
        by_solver.entry(&record.solver).or_default().push(record);
    }

    let mut plot = Plot::new();
    for (solver, mut runs) in by_solver {
        runs.sort_by_key(|r| r.num_dofs);
        let dofs: Vec<f64> = runs.iter().map(|r| r.num_dofs as f64).collect();
        let its: Vec<f64> = runs.iter().map(|r| r.its as f64).collect();
        let mut curve = Curve::new();
        curve.set_label(solver).draw(&dofs, &its);
        plot.add(&curve);
    }
    let output = format!("{}_iterations.png", name);
    plot.set_log_x(true)
        .grid_labels_legend("Number of degrees of freedom", "Solver iterations")
        .save(&output)
        .map_err(|err| eyre::eyre!("Failed to render {}: {}", output, err))?;
    println!("Wrote {}", output);
    Ok(())
}
