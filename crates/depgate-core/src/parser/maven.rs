//! `pom.xml`
//!
//! A declaration-level scan, not an XML parser: `<dependency>` blocks are
//! matched textually and `${property}` versions are resolved against the
//! document's `<properties>` section.

use super::{line_of, ParserCapability};
use crate::error::ParseError;
use depgate_types::{Dependency, Ecosystem};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

static DEPENDENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<dependency>(.*?)</dependency>").expect("valid regex"));
static GROUP_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<groupId>\s*([^<]+?)\s*</groupId>").expect("valid regex"));
static ARTIFACT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<artifactId>\s*([^<]+?)\s*</artifactId>").expect("valid regex"));
static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<version>\s*([^<]+?)\s*</version>").expect("valid regex"));
static PROPERTIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<properties>(.*?)</properties>").expect("valid regex"));
static PROPERTY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([\w.\-]+)>\s*([^<]*?)\s*</[\w.\-]+>").expect("valid regex"));
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$\{([\w.\-]+)\}$").expect("valid regex"));

pub(super) fn parse(manifest: &Path, content: &str) -> Result<Vec<Dependency>, ParseError> {
    if !content.contains("<project") {
        return Err(ParserCapability::Maven.error("missing <project> element"));
    }
    let opened = content.matches("<dependency>").count();
    let closed = content.matches("</dependency>").count();
    if opened != closed {
        return Err(ParserCapability::Maven.error(format!(
            "unbalanced <dependency> elements ({opened} opened, {closed} closed)"
        )));
    }

    let properties = properties(content);
    let mut deps = Vec::new();
    for block in DEPENDENCY.captures_iter(content) {
        let (Some(whole), Some(body)) = (block.get(0), block.get(1)) else {
            continue;
        };
        let body = body.as_str();
        let (Some(group), Some(artifact)) = (capture(&GROUP_ID, body), capture(&ARTIFACT_ID, body))
        else {
            continue;
        };
        let version = capture(&VERSION, body).map(|v| resolve(&v, &properties));
        deps.push(
            Dependency::new(format!("{group}:{artifact}"), Ecosystem::Maven, version, manifest)
                .at_line(line_of(content, whole.start())),
        );
    }
    Ok(deps)
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn properties(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for section in PROPERTIES.captures_iter(content) {
        let Some(body) = section.get(1) else {
            continue;
        };
        for prop in PROPERTY.captures_iter(body.as_str()) {
            if let (Some(key), Some(value)) = (prop.get(1), prop.get(2)) {
                map.insert(key.as_str().to_string(), value.as_str().to_string());
            }
        }
    }
    map
}

fn resolve(version: &str, properties: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .captures(version)
        .and_then(|c| c.get(1))
        .and_then(|key| properties.get(key.as_str()))
        .cloned()
        .unwrap_or_else(|| version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const POM: &str = r#"<?xml version="1.0"?>
<project>
  <properties>
    <slf4j.version>2.0.9</slf4j.version>
  </properties>
  <dependencies>
    <dependency>
      <groupId>org.slf4j</groupId>
      <artifactId>slf4j-api</artifactId>
      <version>${slf4j.version}</version>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <scope>test</scope>
    </dependency>
  </dependencies>
</project>"#;

    #[test]
    fn test_parse_with_properties() {
        let deps = ParserCapability::Maven
            .parse_all(Path::new("pom.xml"), POM)
            .unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name, "org.slf4j:slf4j-api");
        assert_eq!(deps[0].version.as_deref(), Some("2.0.9"));
        assert_eq!(deps[0].line, 7);
        assert_eq!(deps[1].name, "junit:junit");
        assert_eq!(deps[1].version, None);
    }

    #[test]
    fn test_unresolved_placeholder_kept() {
        let pom = "<project><dependency><groupId>a</groupId><artifactId>b</artifactId>\
                   <version>${missing}</version></dependency></project>";
        let deps = ParserCapability::Maven.parse_all(Path::new("pom.xml"), pom).unwrap();
        assert_eq!(deps[0].version.as_deref(), Some("${missing}"));
    }

    #[test]
    fn test_truncated_document() {
        let truncated = &POM[..POM.find("</dependency>").unwrap()];
        assert!(ParserCapability::Maven
            .parse_all(Path::new("pom.xml"), truncated)
            .is_err());
    }

    #[test]
    fn test_not_a_pom() {
        assert!(ParserCapability::Maven
            .parse_all(Path::new("pom.xml"), "hello")
            .is_err());
    }
}
