// ABOUTME: Maps container references to flat, registry-independent file names.
// ABOUTME: Also derives the registry-prefixed alias names used for symlinks.

use crate::types::{ArtefactName, RegistrySet};
use regex::Regex;
use std::sync::LazyLock;

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*://").expect("scheme pattern is valid"));

/// Which file extension family an implementation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionPolicy {
    /// `.img` for pulled images, `.sif` kept for native SIF references.
    Singularity,
    /// `.tar` archives written by `docker image save`.
    Docker,
}

impl ExtensionPolicy {
    /// Splits a scheme-less reference into its stem and the extension to append.
    fn split<'a>(self, reference: &'a str) -> (std::borrow::Cow<'a, str>, &'static str) {
        match self {
            ExtensionPolicy::Singularity => {
                if reference.contains(".sif:") {
                    (reference.replace(".sif:", "-").into(), ".sif")
                } else if let Some(stem) = reference.strip_suffix(".sif") {
                    (stem.into(), ".sif")
                } else if let Some(stem) = reference.strip_suffix(".img") {
                    (stem.into(), ".img")
                } else {
                    (reference.into(), ".img")
                }
            }
            ExtensionPolicy::Docker => (
                reference.strip_suffix(".tar").unwrap_or(reference).into(),
                ".tar",
            ),
        }
    }
}

/// Anchored alternation matching any known registry prefix of a flattened name.
///
/// Each `/` in a registry matches either `/` or `-`, and one trailing `-` is
/// consumed. Longer registries are tried first so nested prefixes win.
pub fn registry_prefix_pattern(registries: &RegistrySet) -> Option<Regex> {
    if registries.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = registries
        .longest_first()
        .into_iter()
        .map(|registry| format!("{}-?", regex::escape(registry).replace('/', "[/-]")))
        .collect();
    Regex::new(&format!("^(?:{})", alternatives.join("|"))).ok()
}

/// Strips known registry prefixes until none matches.
fn trim_registries(pattern: &Regex, mut name: String, extension: &str) -> String {
    while let Some(found) = pattern.find(&name) {
        let rest = &name[found.end()..];
        if found.as_str().is_empty() || rest.is_empty() || rest == extension {
            break;
        }
        name = rest.to_string();
    }
    name
}

/// Canonical file name for `reference`.
///
/// Strips any `scheme://`, flattens `/` and `:` to `-`, applies the extension
/// policy, then removes registry prefixes. Applying it to its own output
/// yields the same name.
pub fn canonicalise(
    reference: &str,
    registries: &RegistrySet,
    policy: ExtensionPolicy,
) -> ArtefactName {
    let stripped = SCHEME.replace(reference.trim(), "");
    let (stem, extension) = policy.split(&stripped);
    let mut name = stem.replace(['/', ':'], "-");
    name.push_str(extension);

    let name = match registry_prefix_pattern(registries) {
        Some(pattern) => trim_registries(&pattern, name, extension),
        None => name,
    };
    ArtefactName::from_canonical(name)
}

/// Alias names `<registry-with-dashes>-<name>` for every known registry.
///
/// Names that already carry a registry prefix are trimmed first, and the
/// alias equal to `name` itself is never returned.
pub fn registry_aliases(name: &ArtefactName, registries: &RegistrySet) -> Vec<String> {
    let bare = match registry_prefix_pattern(registries) {
        Some(pattern) => {
            let extension = name
                .as_str()
                .rfind('.')
                .map_or("", |dot| &name.as_str()[dot..]);
            trim_registries(&pattern, name.as_str().to_string(), extension)
        }
        None => name.as_str().to_string(),
    };

    registries
        .iter()
        .map(|registry| format!("{}-{}", registry.replace('/', "-"), bare))
        .filter(|alias| alias != name.as_str())
        .collect()
}
