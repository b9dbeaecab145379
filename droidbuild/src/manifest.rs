use anyhow::{Context, Result};
use std::path::Path;

/// The `package` attribute of an `AndroidManifest.xml`.
pub fn package_name(manifest: &Path) -> Result<String> {
    let xml = std::fs::read_to_string(manifest)
        .with_context(|| format!("failed to read {}", manifest.display()))?;
    let doc = roxmltree::Document::parse(&xml)
        .with_context(|| format!("failed to parse {}", manifest.display()))?;
    let root = doc.root_element();
    anyhow::ensure!(
        root.has_tag_name("manifest"),
        "{} has no <manifest> root element",
        manifest.display()
    );
    root.attribute("package")
        .map(str::to_string)
        .with_context(|| format!("no package attribute in {}", manifest.display()))
}

/// Finds the package in the output of `aapt dump xmltree <apk> AndroidManifest.xml`.
pub fn package_from_xmltree(dump: &str) -> Option<String> {
    let mut in_manifest = false;
    for line in dump.lines().map(str::trim) {
        if line.starts_with("E: ") {
            if in_manifest {
                break;
            }
            in_manifest = line.starts_with("E: manifest");
        } else if in_manifest {
            if let Some(rest) = line.strip_prefix("A: package=\"") {
                return rest.split('"').next().map(str::to_string);
            }
        }
    }
    None
}
