use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use idgov_authz::{EvaluatorRegistry, GroupPermission, Policy};
use idgov_policy_check::{check, groups_from};

/// Validate a JSON file of authorization policies.
#[derive(Debug, Parser)]
#[command(name = "idgov-policy-check", version)]
struct Cli {
    /// JSON array of policies.
    policies: PathBuf,

    /// JSON array of permission groups; permissions outside a type's group are rejected.
    #[arg(long)]
    groups: Option<PathBuf>,

    /// List the registered evaluators and exit.
    #[arg(long)]
    list_evaluators: bool,

    /// Exit with failure when duplicates are found.
    #[arg(long)]
    strict: bool,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let registry = EvaluatorRegistry::with_builtin();
    if cli.list_evaluators {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let policies: Vec<Policy> = read_json(&cli.policies)?;
    let groups = cli
        .groups
        .as_ref()
        .map(read_json::<Vec<GroupPermission>>)
        .transpose()?
        .map(groups_from);

    tracing::info!(policies = policies.len(), file = %cli.policies.display(), "checking policies");
    let report = check(policies, &registry, groups.as_ref());
    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed = !report.rejected.is_empty() || (cli.strict && !report.duplicates.is_empty());
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn main() -> anyhow::Result<ExitCode> {
    idgov_observability::init_with_default("warn");
    run(Cli::parse())
}
