use anyhow::{Context, Result};
use std::path::Path;
use synthflow_build::Builder;

/// Print the rendered descriptor for a target
pub fn run(target: &str, config: Option<&Path>) -> Result<()> {
    let builder = Builder::new(super::target_context(target, config)?);
    let descriptor = builder
        .descriptor()
        .with_context(|| format!("Failed to generate descriptor for '{}'", target))?;
    print!("{}", descriptor.render());
    Ok(())
}
