use crate::utils;
use colored::Colorize;
use std::path::Path;
use strata_core::DependencyGraph;

pub fn handle(stack_file: &Path) -> anyhow::Result<()> {
    println!("{}", "Validating stack...".blue());

    let checked = utils::load_stack(stack_file)
        .and_then(|deployment| Ok((DependencyGraph::build(&deployment)?, deployment)));
    let (graph, deployment) = match checked {
        Ok(checked) => checked,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Invalid stack".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ Stack is valid".green().bold());
    println!();
    println!("Stack: {}", deployment.name.cyan());
    println!(
        "  Settings: concurrency {}, on-failure {}, rollback {}",
        deployment.settings.concurrency,
        deployment.settings.failure_policy,
        deployment.settings.rollback_policy
    );

    println!("  Resources ({}), in apply order:", graph.len());
    for &node in graph.order() {
        let id = graph.id(node);
        let kind = deployment
            .get(id)
            .map(|r| r.kind.to_string())
            .unwrap_or_default();
        let deps: Vec<&str> = graph.dependencies(node).map(|d| graph.id(d)).collect();
        if deps.is_empty() {
            println!("    - {} ({})", id.cyan(), kind);
        } else {
            println!("    - {} ({}) after {}", id.cyan(), kind, deps.join(", "));
        }
    }

    if !deployment.outputs().is_empty() {
        println!("  Outputs ({}):", deployment.outputs().len());
        for output in deployment.outputs() {
            println!("    - {}", output.name.cyan());
        }
    }

    Ok(())
}
