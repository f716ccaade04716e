//! `build.gradle` and `build.gradle.kts`

use super::{line_of, ParserCapability};
use crate::error::ParseError;
use depgate_types::{Dependency, Ecosystem};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

const CONFIGURATIONS: &str = "implementation|api|compileOnly|runtimeOnly|testImplementation|\
testCompileOnly|testRuntimeOnly|annotationProcessor|kapt|ksp|classpath|compile|testCompile";

/// `implementation 'group:name:version'` and `implementation("group:name:version")`
static STRING_NOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?m)^[ \t]*(?:{CONFIGURATIONS})\s*\(?\s*["']([^"':\s]+):([^"':\s]+)(?::([^"'@\s]+))?(?:@\w+)?["']"#
    ))
    .expect("valid regex")
});

/// `implementation group: 'g', name: 'n', version: 'v'`
static MAP_NOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?m)^[ \t]*(?:{CONFIGURATIONS})\s*\(?\s*group\s*[:=]\s*["']([^"']+)["']\s*,\s*name\s*[:=]\s*["']([^"']+)["'](?:\s*,\s*version\s*[:=]\s*["']([^"']+)["'])?"#
    ))
    .expect("valid regex")
});

pub(super) fn parse(manifest: &Path, content: &str) -> Result<Vec<Dependency>, ParseError> {
    check_balanced(content)?;

    let mut found: Vec<(usize, Dependency)> = Vec::new();
    for re in [&*STRING_NOTATION, &*MAP_NOTATION] {
        for caps in re.captures_iter(content) {
            let (Some(whole), Some(group), Some(name)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let version = caps.get(3).map(|m| m.as_str().to_string());
            let dep = Dependency::new(
                format!("{}:{}", group.as_str(), name.as_str()),
                Ecosystem::Gradle,
                version,
                manifest,
            )
            .at_line(line_of(content, whole.start()));
            found.push((whole.start(), dep));
        }
    }
    found.sort_by_key(|(offset, _)| *offset);
    Ok(found.into_iter().map(|(_, dep)| dep).collect())
}

/// Reject scripts whose braces do not balance; usually a half-saved edit.
fn check_balanced(content: &str) -> Result<(), ParseError> {
    let mut depth: i64 = 0;
    for ch in content.chars() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ParserCapability::Gradle.error("unexpected `}`"));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ParserCapability::Gradle.error(format!("{depth} unclosed block(s)")));
    }
    Ok(())
}
