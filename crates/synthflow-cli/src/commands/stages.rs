use anyhow::{Context, Result};
use std::path::Path;
use synthflow_build::{Builder, Freshness};

/// Print each stage in execution order with its current freshness
pub fn run(target: &str, config: Option<&Path>) -> Result<()> {
    let builder = Builder::new(super::target_context(target, config)?);
    let plan = builder
        .plan()
        .with_context(|| format!("Failed to plan stages for '{}'", target))?;

    let width = plan.iter().map(|p| p.name.len()).max().unwrap_or(0);
    for (i, stage) in plan.iter().enumerate() {
        let state = match &stage.freshness {
            Freshness::Fresh => "up to date".to_string(),
            Freshness::Stale(reason) => format!("will run ({})", reason),
        };
        println!("{:>2}. {:<width$}  {}", i + 1, stage.name, state, width = width);
    }
    Ok(())
}
