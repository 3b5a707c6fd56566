// ABOUTME: Flat key/value view of a resolved workflow configuration.
// ABOUTME: Parses `nextflow config -flat` output and scrapes params declared in main.nf.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

static MAIN_NF_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(params\.[a-zA-Z0-9_]+)\s*=([^=]|$)").expect("valid params regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatConfig {
    entries: BTreeMap<String, String>,
}

impl FlatConfig {
    /// Parses `key = value` lines. Surrounding quotes are stripped from values;
    /// lines without the separator are ignored.
    pub fn parse(flat: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in flat.lines() {
            match line.split_once(" = ") {
                Some((key, value)) => {
                    let value = value.trim_matches(|c| c == '\'' || c == '"');
                    entries.insert(key.trim().to_string(), value.to_string());
                }
                None if line.trim().is_empty() => {}
                None => tracing::debug!(line, "no key = value pair in config line"),
            }
        }
        Self { entries }
    }

    /// Adds every `params.x = ...` declared at the start of a line in `main_nf`.
    ///
    /// Values declared there are usually expressions, so only the name is
    /// recorded, with the value `null`. Existing entries are left alone.
    pub fn add_main_nf_params(&mut self, main_nf: &str) {
        for line in main_nf.lines() {
            if let Some(captures) = MAIN_NF_PARAM.captures(line) {
                self.entries
                    .entry(captures[1].to_string())
                    .or_insert_with(|| "null".to_string());
            }
        }
    }

    /// Reads `main.nf` under `tree`, if present, and adds its params.
    pub fn scrape_main_nf(&mut self, tree: &Path) {
        let path = tree.join("main.nf");
        match std::fs::read_to_string(&path) {
            Ok(content) => self.add_main_nf_params(&content),
            Err(err) => tracing::debug!(path = %path.display(), "cannot read main.nf: {err}"),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_lines_and_strips_quotes() {
        let config = FlatConfig::parse(
            "process.container = 'quay.io/a/b:1'\n\
             docker.registry = \"quay.io\"\n\
             params.max_cpus = 16\n\
             not a pair\n",
        );
        assert_eq!(config.get("process.container"), Some("quay.io/a/b:1"));
        assert_eq!(config.get("docker.registry"), Some("quay.io"));
        assert_eq!(config.get("params.max_cpus"), Some("16"));
        assert_eq!(config.len(), 3);
    }

    #[test]
    fn value_may_contain_separator() {
        let config = FlatConfig::parse("params.expr = a = b");
        assert_eq!(config.get("params.expr"), Some("a = b"));
    }

    #[test]
    fn main_nf_params_are_recorded_as_null() {
        let mut config = FlatConfig::parse("params.outdir = 'results'");
        config.add_main_nf_params(
            "params.fasta = WorkflowMain.getGenomeAttribute(params, 'fasta')\n\
             params.outdir = 'elsewhere'\n\
             if (params.x == 1) {}\n\
             params.flag == true\n",
        );
        assert_eq!(config.get("params.fasta"), Some("null"));
        assert_eq!(config.get("params.outdir"), Some("results"));
        assert_eq!(config.get("params.flag"), None);
    }
}
