//! `wharf jsonpaths` - derive a field-mapping document from a sample file

use std::path::Path;

use anyhow::Context;

use wharf_core::jsonpaths::generate_jsonpaths;

pub fn run(file: &Path, index: Option<usize>) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read sample document '{}'", file.display()))?;
    let sample: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("'{}' is not valid JSON", file.display()))?;

    let paths = generate_jsonpaths(&sample, index);
    println!("{}", serde_json::to_string_pretty(&paths)?);
    Ok(())
}
