//! `package.json`

use super::{line_of, ParserCapability};
use crate::error::ParseError;
use depgate_types::{Dependency, Ecosystem};
use serde_json::Value;
use std::path::Path;

const SECTIONS: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

pub(super) fn parse(manifest: &Path, content: &str) -> Result<Vec<Dependency>, ParseError> {
    let root: Value = serde_json::from_str(content)
        .map_err(|e| ParserCapability::Npm.error(e.to_string()))?;
    let root = root
        .as_object()
        .ok_or_else(|| ParserCapability::Npm.error("top level is not an object"))?;

    let mut deps = Vec::new();
    for section in SECTIONS {
        let Some(entries) = root.get(section) else {
            continue;
        };
        let entries = entries
            .as_object()
            .ok_or_else(|| ParserCapability::Npm.error(format!("`{section}` is not an object")))?;

        for (name, spec) in entries {
            let version = spec.as_str().map(str::to_string);
            deps.push(
                Dependency::new(name.clone(), Ecosystem::Npm, version, manifest)
                    .at_line(declaration_line(content, name)),
            );
        }
    }
    Ok(deps)
}

/// Line of the first `"name":` key in the document.
fn declaration_line(content: &str, name: &str) -> u32 {
    let needle = format!("\"{name}\"");
    let mut from = 0;
    while let Some(found) = content[from..].find(&needle) {
        let at = from + found;
        let rest = content[at + needle.len()..].trim_start();
        if rest.starts_with(':') {
            return line_of(content, at);
        }
        from = at + needle.len();
    }
    0
}
