//! Task registry.
//!
//! Every task follows the same shape: render a prompt from the template
//! index, make one completion call, sanitize the answer. `mask` additionally
//! runs the local masking engine, and `nl-to-sql` treats its input as a
//! question and carries a schema loaded once when the task is built.
//!
//! | Name                 | Template key                             | Temp |
//! |----------------------|------------------------------------------|------|
//! | `comment`            | `commenter.annotate`                     | 0.2  |
//! | `analyze`            | `analyzer.analyze`                       | 0.2  |
//! | `refactor`           | `refactorer.refactor`                    | 0.25 |
//! | `explain`            | `explainer.explain`                      | 0.3  |
//! | `audit`              | `security_auditor.audit`                 | 0.25 |
//! | `test`               | `test_generator.generate`                | 0.3  |
//! | `benchmark`          | `performance_benchmark.simulate`         | 0.3  |
//! | `validate`           | `query_validator.simulate_and_validate`  | 0.3  |
//! | `mask`               | `data_masker.*`                          | 0.3  |
//! | `style-enforce`      | `style_enforcer.enforce_style`           | 0.3  |
//! | `detect-dynamic-sql` | `dynamic_sql.detector`                   | 0.3  |
//! | `nl-to-sql`          | `nl_to_sql.convert`                      | 0.3  |

use crate::completion::CompletionClient;
use crate::error::{PilotError, PilotResult};
use crate::masking;
use crate::sanitizer;
use crate::template::TemplateIndex;
use chrono::Local;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// The closed set of task variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Comment,
    Analyze,
    Refactor,
    Explain,
    Audit,
    Test,
    Benchmark,
    Validate,
    Mask,
    StyleEnforce,
    DetectDynamicSql,
    NlToSql,
}

/// Name -> variant table used for lookup and listing.
const REGISTRY: [(&str, TaskKind); 12] = [
    ("comment", TaskKind::Comment),
    ("analyze", TaskKind::Analyze),
    ("refactor", TaskKind::Refactor),
    ("explain", TaskKind::Explain),
    ("audit", TaskKind::Audit),
    ("test", TaskKind::Test),
    ("benchmark", TaskKind::Benchmark),
    ("validate", TaskKind::Validate),
    ("mask", TaskKind::Mask),
    ("style-enforce", TaskKind::StyleEnforce),
    ("detect-dynamic-sql", TaskKind::DetectDynamicSql),
    ("nl-to-sql", TaskKind::NlToSql),
];

impl TaskKind {
    pub const ALL: [TaskKind; 12] = [
        TaskKind::Comment,
        TaskKind::Analyze,
        TaskKind::Refactor,
        TaskKind::Explain,
        TaskKind::Audit,
        TaskKind::Test,
        TaskKind::Benchmark,
        TaskKind::Validate,
        TaskKind::Mask,
        TaskKind::StyleEnforce,
        TaskKind::DetectDynamicSql,
        TaskKind::NlToSql,
    ];

    pub fn name(self) -> &'static str {
        REGISTRY
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    pub fn description(self) -> &'static str {
        match self {
            TaskKind::Comment => "Add a header block and inline comments",
            TaskKind::Analyze => "Review performance and suggest optimizations",
            TaskKind::Refactor => "Restructure into CTEs with clean formatting",
            TaskKind::Explain => "Explain the query step by step",
            TaskKind::Audit => "Audit for security and compliance risks",
            TaskKind::Test => "Generate test scenarios",
            TaskKind::Benchmark => "Simulate execution and report performance",
            TaskKind::Validate => "Validate syntax and logic",
            TaskKind::Mask => "Mask or detect sensitive literals",
            TaskKind::StyleEnforce => "Apply a dialect-aware style guide",
            TaskKind::DetectDynamicSql => "Find dynamic SQL and its risks",
            TaskKind::NlToSql => "Turn a natural language question into SQL",
        }
    }

    pub fn template_key(self, detect_only: bool) -> &'static str {
        match self {
            TaskKind::Comment => "commenter.annotate",
            TaskKind::Analyze => "analyzer.analyze",
            TaskKind::Refactor => "refactorer.refactor",
            TaskKind::Explain => "explainer.explain",
            TaskKind::Audit => "security_auditor.audit",
            TaskKind::Test => "test_generator.generate",
            TaskKind::Benchmark => "performance_benchmark.simulate",
            TaskKind::Validate => "query_validator.simulate_and_validate",
            TaskKind::Mask if detect_only => "data_masker.detect_sensitive_data",
            TaskKind::Mask => "data_masker.mask_sensitive_data",
            TaskKind::StyleEnforce => "style_enforcer.enforce_style",
            TaskKind::DetectDynamicSql => "dynamic_sql.detector",
            TaskKind::NlToSql => "nl_to_sql.convert",
        }
    }

    pub fn temperature(self) -> f32 {
        match self {
            TaskKind::Comment | TaskKind::Analyze => 0.2,
            TaskKind::Refactor | TaskKind::Audit => 0.25,
            _ => 0.3,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskKind {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        REGISTRY
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| {
                let names: Vec<&str> = REGISTRY.iter().map(|(name, _)| *name).collect();
                PilotError::Config(format!(
                    "Unknown task '{}'. Expected one of: {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}

/// Task-specific parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskParams {
    /// Target SQL dialect for `style-enforce` and `nl-to-sql`.
    pub dialect: String,
    /// Schema document for `nl-to-sql`, read when the task is built.
    pub schema_path: PathBuf,
    /// `mask` reports findings instead of rewriting.
    pub detect_only: bool,
}

impl Default for TaskParams {
    fn default() -> Self {
        Self {
            dialect: "generic".to_string(),
            schema_path: PathBuf::from("schema.json"),
            detect_only: false,
        }
    }
}

/// Per-variant state prepared once at construction.
#[derive(Debug, Clone)]
enum Context {
    Plain,
    Comment { author: String, timestamp: String },
    Schema(String),
}

/// A constructed task variant bound to its collaborators.
pub struct Task {
    kind: TaskKind,
    templates: Arc<TemplateIndex>,
    client: Arc<dyn CompletionClient>,
    context: Context,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.kind)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Build a task. For `nl-to-sql` the schema is loaded here, and a
    /// missing or malformed schema fails construction.
    pub fn new(
        kind: TaskKind,
        templates: Arc<TemplateIndex>,
        client: Arc<dyn CompletionClient>,
        params: &TaskParams,
    ) -> PilotResult<Self> {
        let context = match kind {
            TaskKind::Comment => Context::Comment {
                author: current_user(),
                timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            },
            TaskKind::NlToSql => Context::Schema(load_schema(&params.schema_path)?),
            _ => Context::Plain,
        };

        Ok(Self {
            kind,
            templates,
            client,
            context,
        })
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Render the prompt for `text` without calling the completion service.
    pub fn render(&self, text: &str, params: &TaskParams) -> PilotResult<String> {
        let key = self.kind.template_key(params.detect_only);
        let rendered = match (&self.kind, &self.context) {
            (TaskKind::Comment, Context::Comment { author, timestamp }) => self.templates.load(
                key,
                &[
                    ("author", author.as_str()),
                    ("timestamp", timestamp.as_str()),
                    ("sql_query", text),
                ],
            ),
            (TaskKind::StyleEnforce, _) => self
                .templates
                .load(key, &[("sql_code", text), ("sql_dialect", params.dialect.as_str())]),
            (TaskKind::DetectDynamicSql, _) => self.templates.load(key, &[("sql_code", text)]),
            (TaskKind::NlToSql, Context::Schema(schema)) => self.templates.load(
                key,
                &[
                    ("nl_query", text.trim()),
                    ("sql_dialect", params.dialect.as_str()),
                    ("schema", schema.as_str()),
                ],
            ),
            _ => self.templates.load(key, &[("sql_query", text)]),
        };
        Ok(rendered?)
    }

    /// Run the task over one document.
    pub async fn run(&self, text: &str, params: &TaskParams) -> PilotResult<String> {
        let prompt = self.render(text, params)?;
        debug!(task = %self.kind, prompt_len = prompt.len(), "prompt rendered");

        let raw = self.client.complete(&prompt, self.kind.temperature()).await?;
        let cleaned = sanitizer::sanitize(&raw);

        let output = match self.kind {
            TaskKind::Mask if params.detect_only => {
                format!("{}\n\n{}", cleaned, findings_report(text))
                    .trim()
                    .to_string()
            }
            TaskKind::Mask => masking::mask(&cleaned),
            _ => cleaned,
        };

        info!(task = %self.kind, output_len = output.len(), "task completed");
        Ok(output)
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn load_schema(path: &Path) -> PilotResult<String> {
    let content = fs::read_to_string(path)
        .map_err(|e| PilotError::input(path, format!("cannot read schema: {}", e)))?;
    let schema: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| PilotError::input(path, format!("invalid schema JSON: {}", e)))?;
    serde_json::to_string(&schema)
        .map_err(|e| PilotError::input(path, format!("cannot serialize schema: {}", e)))
}

/// Block comment listing local pattern findings by category and position.
/// Values are not echoed.
fn findings_report(text: &str) -> String {
    let found = masking::detect(text);
    if found.is_empty() {
        return "/*\nPattern scan: no findings\n*/".to_string();
    }

    let mut report = format!("/*\nPattern scan: {} finding(s)", found.len());
    for m in &found {
        let (line, col) = m.line_col(text);
        report.push_str(&format!("\n- {} at line {}:{}", m.category, line, col));
    }
    report.push_str("\n*/");
    report
}
