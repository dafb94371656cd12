use anyhow::Context;
use grouping::{config, telemetry, DispatchSolver, Instance, SolveParams};
use tracing::info;

/// Usage: `grouping <instance.json> [params.json]`, result JSON on stdout.
fn main() -> anyhow::Result<()> {
    telemetry::init()?;

    let mut args = std::env::args().skip(1);
    let instance_path = args
        .next()
        .context("usage: grouping <instance.json> [params.json]")?;
    let raw = std::fs::read_to_string(&instance_path)
        .with_context(|| format!("reading {instance_path}"))?;
    let instance: Instance =
        serde_json::from_str(&raw).with_context(|| format!("parsing {instance_path}"))?;

    let base = match args.next() {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            config::parse_params(&raw)?
        }
        None => SolveParams::default(),
    };
    let params = config::params_from_env(base)?;

    let solver = DispatchSolver::new();
    info!(
        students = instance.students.len(),
        groups = instance.groups.len(),
        milp = solver.has_milp(),
        "solving"
    );
    let result = solver.solve_instance(&instance, &params)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
