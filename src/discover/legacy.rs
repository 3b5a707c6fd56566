// ABOUTME: Regex-based container discovery for workflows the inspector cannot handle.
// ABOUTME: Scans flat config values and module sources, then rectifies raw matches.

use super::DiscoverError;
use super::nf_config::FlatConfig;
use crate::diagnostics::{Diagnostics, Warning};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use walkdir::WalkDir;

pub const GALAXY_DEPOT_URL: &str = "https://depot.galaxyproject.org/singularity";

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_\+.~#?&/=]*)",
    )
    .expect("valid url regex")
});

static MODULE_CONTAINER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"container\s+[\s{}=$]*(['"])"#).expect("valid container regex")
});

static CONTAINER_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"container[^${}]+\$\{([^{}]+)\}").expect("valid variable regex")
});

static HOST_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$").expect("valid host regex")
});

static PATH_COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9._-]*[a-z0-9])?$").expect("valid path regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,127}$").expect("valid tag regex")
});

/// A container declaration as found, before it is resolved to references.
#[derive(Debug, Clone)]
pub struct RawFinding {
    pub value: String,
    /// Text searched again when the value names a variable.
    pub search_space: String,
    pub source: String,
}

/// Finds the closing `quote` at or after `start`, skipping backslash-escaped ones.
fn closing_quote(text: &str, start: usize, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            c if c == quote && !escaped => return Some(start + offset),
            _ => escaped = false,
        }
    }
    None
}

/// Every quoted string in `text` whose opening quote is not escaped.
fn quoted_strings(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut position = 0;
    let mut previous = None;
    while let Some(c) = text[position..].chars().next() {
        let start = position + c.len_utf8();
        if (c == '\'' || c == '"') && previous != Some('\\') {
            let Some(end) = closing_quote(text, start, c) else {
                break;
            };
            found.push(text[start..end].to_string());
            position = end + 1;
            previous = Some(c);
            continue;
        }
        previous = Some(c);
        position = start;
    }
    found
}

fn is_host(part: &str) -> bool {
    let (host, port) = match part.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (part, None),
    };
    let port_ok = port.is_none_or(|p| (1..=5).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_digit()));
    port_ok && host.len() <= 253 && host.split('.').all(|label| HOST_LABEL.is_match(label))
}

fn is_image_path(path: &str) -> bool {
    path.split('/').all(|component| PATH_COMPONENT.is_match(component))
}

/// Whether `value` is a complete Docker image reference such as
/// `quay.io/biocontainers/fastqc:0.12.1--hdfd78af_0` or `nfcore/cellranger:6.0.2`.
pub fn is_docker_uri(value: &str) -> bool {
    let last_slash = value.rfind('/').map_or(0, |i| i + 1);
    let (name, tag) = match value[last_slash..].rfind(':') {
        Some(i) => (&value[..last_slash + i], Some(&value[last_slash + i + 1..])),
        None => (value, None),
    };
    if tag.is_some_and(|tag| !TAG.is_match(tag)) {
        return false;
    }
    if is_image_path(name) {
        return true;
    }
    match name.split_once('/') {
        Some((host, path)) => is_host(host) && is_image_path(path),
        None => false,
    }
}

/// The URL prefix of `value`, or the whole value if it is a Docker URI.
fn direct_match(value: &str) -> Option<String> {
    if let Some(found) = URL.find(value) {
        return Some(found.as_str().to_string());
    }
    is_docker_uri(value).then(|| value.to_string())
}

fn is_url_or_docker(value: &str) -> bool {
    URL.is_match(value) || is_docker_uri(value)
}

/// Values of `process.*.container` and `params.*.container` config keys.
pub fn config_findings(config: &FlatConfig) -> Vec<RawFinding> {
    let search_space: String = config
        .iter()
        .map(|(key, value)| format!("{key} = {value}\n"))
        .collect();

    let mut findings = Vec::new();
    for (key, value) in config.iter() {
        if !(key.starts_with("process.") || key.starts_with("params.")) || !key.ends_with(".container")
        {
            continue;
        }
        let unescaped = value.replace("\\'", "'").replace("\\\"", "\"");
        let quoted = quoted_strings(&unescaped);
        if quoted.is_empty() {
            findings.push(RawFinding {
                value: value.trim_matches(|c| c == '\'' || c == '"').to_string(),
                search_space: search_space.clone(),
                source: "Nextflow configs".to_string(),
            });
        } else {
            findings.extend(quoted.into_iter().map(|value| RawFinding {
                value,
                search_space: search_space.clone(),
                source: "Nextflow configs".to_string(),
            }));
        }
    }
    findings
}

/// Container declarations in one module source file.
pub fn module_source_findings(source: &str, file: &str) -> Vec<RawFinding> {
    let mut findings = Vec::new();
    let mut position = 0;
    while let Some(captures) = MODULE_CONTAINER.captures_at(source, position) {
        let (Some(whole), Some(quote)) = (captures.get(0), captures.get(1)) else {
            break;
        };
        let quote_char = if quote.as_str() == "'" { '\'' } else { '"' };
        let Some(end) = closing_quote(source, whole.end(), quote_char) else {
            break;
        };
        findings.push(RawFinding {
            value: source[whole.end()..end].to_string(),
            search_space: source.to_string(),
            source: file.to_string(),
        });
        position = end + 1;
    }
    findings
}

/// Container declarations in every `.nf` file under `tree/modules`.
pub fn module_findings(tree: &Path) -> Result<Vec<RawFinding>, DiscoverError> {
    let modules = tree.join("modules");
    if !modules.is_dir() {
        return Ok(Vec::new());
    }

    let mut findings = Vec::new();
    for entry in WalkDir::new(&modules).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "nf") {
            continue;
        }
        let source = std::fs::read_to_string(path)?;
        findings.extend(module_source_findings(&source, &path.display().to_string()));
    }
    Ok(findings)
}

/// Resolves a `${var}` container to the values assigned to `var` in the same source.
fn resolve_variable(search_space: &str) -> Vec<String> {
    for captures in CONTAINER_VARIABLE.captures_iter(search_space) {
        let (Some(whole), Some(variable)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        // Only the innermost `${...}` counts.
        let after = &search_space[whole.end()..];
        let until_open = after.split('{').next().unwrap_or_default();
        if until_open.contains('}') {
            continue;
        }

        let variable = variable.as_str().trim();
        if variable.is_empty() {
            continue;
        }
        let assignment = format!(r#"{}\s*=\s*["']([^"']+)["']"#, regex::escape(variable));
        let Ok(assignment) = Regex::new(&assignment) else {
            continue;
        };
        return assignment
            .captures_iter(search_space)
            .map(|c| format!("{GALAXY_DEPOT_URL}/{}", &c[1]))
            .collect();
    }
    Vec::new()
}

/// Turns raw findings into container references.
///
/// A plain URL or Docker URI is taken as is. Otherwise every quoted URL or
/// URI inside the value is taken. Failing that, a `${var}` value resolves
/// through the variable's assignment. Anything else is reported and skipped.
pub fn rectify(findings: Vec<RawFinding>, diagnostics: &mut Diagnostics) -> Vec<String> {
    let mut cleaned = Vec::new();
    for finding in findings {
        let value = finding.value.trim();
        if value.is_empty() {
            continue;
        }
        if let Some(direct) = direct_match(value) {
            cleaned.push(direct);
            continue;
        }

        let candidates: Vec<String> = quoted_strings(value)
            .into_iter()
            .filter(|c| c != "singularity" && c != "apptainer")
            .filter(|c| is_url_or_docker(c))
            .collect();
        if !candidates.is_empty() {
            cleaned.extend(candidates);
            continue;
        }

        let resolved = resolve_variable(&finding.search_space);
        if !resolved.is_empty() {
            cleaned.extend(resolved);
            continue;
        }

        let message = format!(
            "cannot parse container string in '{}': {value}; skipping this image",
            finding.source
        );
        tracing::error!("{message}");
        diagnostics.record(Warning::unparsable_container(message));
    }
    prioritize_direct_download(cleaned)
}

/// De-duplicates references by their last path segment, preferring direct
/// downloads over registry references. The result is sorted.
pub fn prioritize_direct_download(containers: Vec<String>) -> Vec<String> {
    let mut by_name: BTreeMap<String, String> = BTreeMap::new();
    for container in containers {
        if container.is_empty() {
            continue;
        }
        let key = container
            .rsplit_once('/')
            .map_or(container.as_str(), |(_, last)| last)
            .to_string();
        match by_name.get(&key) {
            Some(existing) if existing.starts_with("http") => {}
            _ => {
                tracing::debug!(container, key, "keeping container");
                by_name.insert(key, container);
            }
        }
    }
    let mut result: Vec<String> = by_name.into_values().collect();
    result.sort();
    result
}

/// Runs the full legacy scan over a workflow tree.
pub fn scan(
    tree: &Path,
    config: &FlatConfig,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<String>, DiscoverError> {
    let from_config = rectify(config_findings(config), diagnostics);
    let from_modules = rectify(module_findings(tree)?, diagnostics);
    Ok(prioritize_direct_download(
        from_config.into_iter().chain(from_modules).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(value: &str, search_space: &str) -> RawFinding {
        RawFinding {
            value: value.to_string(),
            search_space: search_space.to_string(),
            source: "main.nf".to_string(),
        }
    }

    #[test]
    fn docker_uris() {
        assert!(is_docker_uri("nfcore/cellranger:6.0.2"));
        assert!(is_docker_uri("quay.io/biocontainers/fastqc:0.11.9--0"));
        assert!(is_docker_uri("localhost:5000/tool/name:1"));
        assert!(is_docker_uri("ubuntu"));
        assert!(!is_docker_uri("${ workflow.containerEngine }"));
        assert!(!is_docker_uri("Biocontainers/Upper:1"));
        assert!(!is_docker_uri("a/b:.bad"));
    }

    #[test]
    fn module_regex_spans_lines_and_respects_escapes() {
        let source = r#"
process FASTQC {
    container "${ workflow.containerEngine == 'singularity' && !task.ext.singularity_pull_docker_container ?
        'https://depot.galaxyproject.org/singularity/fastqc:0.11.9--0' :
        'biocontainers/fastqc:0.11.9--0' }"

    script:
    "echo \"done\""
}
"#;
        let findings = module_source_findings(source, "fastqc/main.nf");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].value.contains("'biocontainers/fastqc:0.11.9--0' }"));
    }

    #[test]
    fn dsl2_ternary_yields_download_only() {
        let value = "${ workflow.containerEngine == 'singularity' && !task.ext.singularity_pull_docker_container ?\n\
                     'https://depot.galaxyproject.org/singularity/fastqc:0.11.9--0' :\n\
                     'biocontainers/fastqc:0.11.9--0' }";
        let mut diagnostics = Diagnostics::default();
        let containers = rectify(vec![finding(value, "")], &mut diagnostics);
        assert_eq!(
            containers,
            vec!["https://depot.galaxyproject.org/singularity/fastqc:0.11.9--0".to_string()]
        );
        assert!(!diagnostics.has_warnings());
    }

    #[test]
    fn plain_values_are_taken_directly() {
        let mut diagnostics = Diagnostics::default();
        let containers = rectify(
            vec![
                finding("nfcore/cellranger:6.0.2", ""),
                finding("https://depot.galaxyproject.org/singularity/ubuntu:20.04", ""),
            ],
            &mut diagnostics,
        );
        assert_eq!(
            containers,
            vec![
                "https://depot.galaxyproject.org/singularity/ubuntu:20.04".to_string(),
                "nfcore/cellranger:6.0.2".to_string(),
            ]
        );
    }

    #[test]
    fn variable_container_resolves_to_depot() {
        let source = r#"
    container "${ workflow.containerEngine == 'singularity' ?
        "https://depot.galaxyproject.org/singularity/${container_id}" :
        "quay.io/biocontainers/${container_id}" }"

    container_id = 'mulled-v2-1fa26d1ce03c295fe2fdcf85831a92fbcbd7e8c2:afaaa4c6f5b308b4b6aa2dd8e99e1466b2a6b0cd-0'
"#;
        let mut diagnostics = Diagnostics::default();
        let containers = rectify(module_source_findings(source, "mulled.nf"), &mut diagnostics);
        assert_eq!(
            containers,
            vec![
                "https://depot.galaxyproject.org/singularity/mulled-v2-1fa26d1ce03c295fe2fdcf85831a92fbcbd7e8c2:afaaa4c6f5b308b4b6aa2dd8e99e1466b2a6b0cd-0"
                    .to_string()
            ]
        );
    }

    #[test]
    fn unparsable_values_are_recorded() {
        let mut diagnostics = Diagnostics::default();
        let containers = rectify(vec![finding("${params.genome_container}", "")], &mut diagnostics);
        assert!(containers.is_empty());
        assert_eq!(
            diagnostics.count(crate::diagnostics::WarningKind::UnparsableContainer),
            1
        );
    }

    #[test]
    fn direct_download_wins_over_registry() {
        let containers = prioritize_direct_download(vec![
            "biocontainers/scanpy:1.7.2--pyhdfd78af_0".to_string(),
            "https://depot.galaxyproject.org/singularity/scanpy:1.7.2--pyhdfd78af_0".to_string(),
            "quay.io/biocontainers/scanpy:1.7.2--pyhdfd78af_0".to_string(),
            "nfcore/ubuntu:20.04".to_string(),
            String::new(),
        ]);
        assert_eq!(
            containers,
            vec![
                "https://depot.galaxyproject.org/singularity/scanpy:1.7.2--pyhdfd78af_0".to_string(),
                "nfcore/ubuntu:20.04".to_string(),
            ]
        );
    }

    #[test]
    fn config_keys_are_filtered() {
        let config = FlatConfig::parse(
            "process.container = 'nfcore/methylseq:1.0'\n\
             params.tool.container = quay.io/x/y:2\n\
             docker.registry = 'quay.io'\n\
             process.withName:FOO.memory = 2 GB\n",
        );
        let findings = config_findings(&config);
        let values: Vec<&str> = findings.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, vec!["quay.io/x/y:2", "nfcore/methylseq:1.0"]);
    }
}
