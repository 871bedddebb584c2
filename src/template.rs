//! Prompt template engine.
//!
//! Templates are declared in an `index.toml` under a prompt root. Each entry
//! names its source (inline text or a file relative to the root) and the
//! inputs it requires:
//!
//! ```toml
//! ["nl_to_sql.convert"]
//! file = "nl_to_sql_convert.txt"
//! inputs = ["nl_query", "sql_dialect", "schema"]
//! ```
//!
//! The prompt set under `prompts/` is also compiled in and served by
//! [`TemplateIndex::bundled`] when no prompt root is configured.
//!
//! Placeholders are written `{name}`; `{{` and `}}` produce literal braces.
//! The index is read once and never mutated afterwards, so a single
//! `TemplateIndex` can be shared freely behind an `Arc`.

use crate::error::TemplateError;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the index inside a prompt root.
pub const INDEX_FILE: &str = "index.toml";

/// Root reported for the prompt set compiled into the crate.
pub const BUNDLED_ROOT: &str = "<bundled>";

const BUNDLED_INDEX: &str = include_str!("../prompts/index.toml");

const BUNDLED_FILES: [(&str, &str); 9] = [
    ("commenter_annotate.txt", include_str!("../prompts/commenter_annotate.txt")),
    ("data_masker_detect.txt", include_str!("../prompts/data_masker_detect.txt")),
    ("data_masker_mask.txt", include_str!("../prompts/data_masker_mask.txt")),
    ("dynamic_sql_detector.txt", include_str!("../prompts/dynamic_sql_detector.txt")),
    ("nl_to_sql_convert.txt", include_str!("../prompts/nl_to_sql_convert.txt")),
    (
        "performance_benchmark_simulate.txt",
        include_str!("../prompts/performance_benchmark_simulate.txt"),
    ),
    (
        "query_validator_simulate_and_validate.txt",
        include_str!("../prompts/query_validator_simulate_and_validate.txt"),
    ),
    ("security_auditor_audit.txt", include_str!("../prompts/security_auditor_audit.txt")),
    (
        "style_enforcer_enforce_style.txt",
        include_str!("../prompts/style_enforcer_enforce_style.txt"),
    ),
];

/// One declared prompt.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TemplateEntry {
    #[serde(default)]
    pub inline: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Immutable key -> template table.
#[derive(Debug, Clone)]
pub struct TemplateIndex {
    root: PathBuf,
    entries: BTreeMap<String, TemplateEntry>,
}

impl TemplateIndex {
    /// Read `<root>/index.toml`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, TemplateError> {
        let root = root.into();
        let index_path = root.join(INDEX_FILE);
        let content = fs::read_to_string(&index_path).map_err(|e| {
            TemplateError::Index(format!("cannot read {}: {}", index_path.display(), e))
        })?;
        Self::from_toml_str(root, &content)
    }

    /// Build an index from TOML text. File sources resolve against `root`.
    pub fn from_toml_str(root: impl Into<PathBuf>, content: &str) -> Result<Self, TemplateError> {
        let entries: BTreeMap<String, TemplateEntry> =
            toml::from_str(content).map_err(|e| TemplateError::Index(e.to_string()))?;
        Ok(Self {
            root: root.into(),
            entries,
        })
    }

    /// The prompt set compiled into the crate. File-backed entries are
    /// resolved up front, so nothing is read from disk.
    pub fn bundled() -> Result<Self, TemplateError> {
        let mut index = Self::from_toml_str(BUNDLED_ROOT, BUNDLED_INDEX)?;
        for (key, entry) in index.entries.iter_mut() {
            if entry.inline.is_none()
                && let Some(file) = &entry.file
            {
                let body = BUNDLED_FILES
                    .iter()
                    .find(|(name, _)| Path::new(name) == file.as_path())
                    .map(|(_, body)| *body)
                    .ok_or_else(|| TemplateError::FileNotFound {
                        key: key.clone(),
                        path: file.clone(),
                    })?;
                entry.inline = Some(body.to_string());
            }
        }
        Ok(index)
    }

    /// Open `root` when one is configured, else the bundled prompt set.
    pub fn open_or_bundled(root: Option<&Path>) -> Result<Self, TemplateError> {
        match root {
            Some(root) => Self::open(root),
            None => Self::bundled(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entry(&self, key: &str) -> Option<&TemplateEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the template registered under `key`.
    ///
    /// Checks run in a fixed order: the key must exist, its source must
    /// resolve, and every declared input must be supplied. Substitution only
    /// happens once all three pass.
    pub fn load(&self, key: &str, inputs: &[(&str, &str)]) -> Result<String, TemplateError> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| TemplateError::KeyNotFound(key.to_string()))?;

        let template = self.source_text(key, entry)?;

        let supplied: BTreeSet<&str> = inputs.iter().map(|(name, _)| *name).collect();
        let missing: Vec<String> = entry
            .inputs
            .iter()
            .filter(|name| !supplied.contains(name.as_str()))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !missing.is_empty() {
            return Err(TemplateError::MissingInputs {
                key: key.to_string(),
                names: missing,
            });
        }

        substitute(key, &template, inputs)
    }

    fn source_text(&self, key: &str, entry: &TemplateEntry) -> Result<String, TemplateError> {
        if let Some(inline) = &entry.inline {
            return Ok(inline.clone());
        }
        let Some(file) = &entry.file else {
            return Err(TemplateError::NoSource(key.to_string()));
        };

        let path = self.root.join(file);
        let not_found = || TemplateError::FileNotFound {
            key: key.to_string(),
            path: path.clone(),
        };
        if !path.is_file() {
            return Err(not_found());
        }
        fs::read_to_string(&path).map_err(|_| not_found())
    }
}

/// Single left-to-right pass; supplied values are copied verbatim and never
/// rescanned, so JSON payloads keep their braces.
fn substitute(key: &str, template: &str, inputs: &[(&str, &str)]) -> Result<String, TemplateError> {
    let lookup = |name: &str| {
        inputs
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, value)| *value)
    };

    let mut out = String::with_capacity(template.len());
    let mut unresolved = BTreeSet::new();
    let mut rest = template;

    while let Some(pos) = rest.find(|c| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('{')
            && let Some(end) = tail[1..].find('}')
        {
            let name = &tail[1..1 + end];
            if is_placeholder_name(name) {
                match lookup(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        unresolved.insert(name.to_string());
                    }
                }
                rest = &tail[end + 2..];
                continue;
            }
        }

        // Stray brace that is not part of a placeholder.
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }
    out.push_str(rest);

    if !unresolved.is_empty() {
        return Err(TemplateError::MissingInputs {
            key: key.to_string(),
            names: unresolved.into_iter().collect(),
        });
    }
    Ok(out)
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const INDEX: &str = r#"
["pair.join"]
inline = "A={a} B={b}"
inputs = ["a", "b"]

["json.wrap"]
inline = "schema: {schema} literal {{braces}}"
inputs = ["schema"]

["undeclared.use"]
inline = "hello {who}"

["from.file"]
file = "missing_prompt.txt"
inputs = ["sql_query"]

["no.source"]
inputs = []
"#;

    fn index() -> TemplateIndex {
        TemplateIndex::from_toml_str("/nonexistent/prompts", INDEX).unwrap()
    }

    #[test]
    fn test_unknown_key() {
        let err = index().load("nope", &[]).unwrap_err();
        assert_eq!(err, TemplateError::KeyNotFound("nope".to_string()));
    }

    #[test]
    fn test_missing_required_input() {
        let err = index().load("pair.join", &[("a", "x")]).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingInputs {
                key: "pair.join".to_string(),
                names: vec!["b".to_string()],
            }
        );
    }

    #[test]
    fn test_render_all_inputs() {
        let out = index().load("pair.join", &[("a", "x"), ("b", "y")]).unwrap();
        assert_eq!(out, "A=x B=y");
        assert!(!out.contains('{'));
        assert!(!out.contains('}'));
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let schema = r#"{"tables":{"users":["id","{a}"]}}"#;
        let out = index().load("json.wrap", &[("schema", schema)]).unwrap();
        assert_eq!(out, format!("schema: {} literal {{braces}}", schema));
    }

    #[test]
    fn test_undeclared_placeholder_is_reported() {
        let err = index().load("undeclared.use", &[]).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingInputs {
                key: "undeclared.use".to_string(),
                names: vec!["who".to_string()],
            }
        );
        let out = index().load("undeclared.use", &[("who", "world")]).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn test_missing_file_precedes_input_check() {
        let err = index().load("from.file", &[]).unwrap_err();
        assert!(matches!(err, TemplateError::FileNotFound { .. }));
    }

    #[test]
    fn test_no_source() {
        let err = index().load("no.source", &[]).unwrap_err();
        assert_eq!(err, TemplateError::NoSource("no.source".to_string()));
    }

    #[test]
    fn test_stray_braces_pass_through() {
        let out = substitute("k", "{ not a name } and }", &[]).unwrap();
        assert_eq!(out, "{ not a name } and }");
    }

    #[test]
    fn test_file_source_read_lazily() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p.txt"), "Explain:\n{sql_query}").unwrap();
        let idx = TemplateIndex::from_toml_str(
            dir.path(),
            "[\"explain\"]\nfile = \"p.txt\"\ninputs = [\"sql_query\"]\n",
        )
        .unwrap();
        let out = idx.load("explain", &[("sql_query", "SELECT 1")]).unwrap();
        assert_eq!(out, "Explain:\nSELECT 1");
    }

    #[test]
    fn test_bundled_index_renders() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("prompts");
        let idx = TemplateIndex::open(&root).unwrap();
        assert!(idx.len() >= 13);
        for key in idx.keys() {
            let entry = idx.entry(key).unwrap();
            let inputs: Vec<(&str, &str)> =
                entry.inputs.iter().map(|n| (n.as_str(), "x")).collect();
            let rendered = idx.load(key, &inputs);
            assert!(rendered.is_ok(), "{key}: {rendered:?}");
        }
    }

    #[test]
    fn test_embedded_prompts_match_prompt_dir() {
        let on_disk = TemplateIndex::open(Path::new(env!("CARGO_MANIFEST_DIR")).join("prompts"))
            .unwrap();
        let embedded = TemplateIndex::bundled().unwrap();
        assert_eq!(embedded.root(), Path::new(BUNDLED_ROOT));
        assert_eq!(
            embedded.keys().collect::<Vec<_>>(),
            on_disk.keys().collect::<Vec<_>>()
        );
        for key in on_disk.keys() {
            let entry = on_disk.entry(key).unwrap();
            let inputs: Vec<(&str, &str)> =
                entry.inputs.iter().map(|n| (n.as_str(), "x")).collect();
            assert_eq!(
                embedded.load(key, &inputs).unwrap(),
                on_disk.load(key, &inputs).unwrap(),
                "{key}"
            );
        }
    }

    #[test]
    fn test_configured_root_wins_over_bundled() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(INDEX_FILE),
            "[\"explainer.explain\"]\ninline = \"local {sql_query}\"\ninputs = [\"sql_query\"]\n",
        )
        .unwrap();
        let local = TemplateIndex::open_or_bundled(Some(dir.path())).unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(
            local.load("explainer.explain", &[("sql_query", "SELECT 1")]).unwrap(),
            "local SELECT 1"
        );
        assert!(TemplateIndex::open_or_bundled(None).unwrap().len() >= 13);
    }
}
