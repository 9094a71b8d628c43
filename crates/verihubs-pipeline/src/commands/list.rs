//! `verihubs list` command implementation

use crate::error::Result;
use crate::graph::default_graph;
use colored::Colorize;

/// Print assets in execution order with their dependencies
pub async fn run() -> Result<()> {
    let graph = default_graph()?;

    println!("{}", "Assets:".cyan().bold());
    println!();

    for name in graph.topological_order() {
        let Some(asset) = graph.get(name) else {
            continue;
        };
        println!("{}", name.green());
        println!("  {}", asset.description());
        if asset.deps().is_empty() {
            println!("  Depends on: -");
        } else {
            println!("  Depends on: {}", asset.deps().join(", "));
        }
        println!();
    }

    Ok(())
}
