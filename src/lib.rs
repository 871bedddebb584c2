//! # sqlpilot
//!
//! Batch transformation of SQL files through prompt-driven completion tasks.
//!
//! Each `.sql` file under a path is handed to one named task (comment,
//! refactor, audit, mask, ...). The task renders a prompt, asks a completion
//! service for text, and sanitizes the answer back into SQL before it is
//! written in place or to a separate output.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use sqlpilot::prelude::*;
//! use std::sync::Arc;
//!
//! let config = Config::load(None)?;
//! let templates = Arc::new(TemplateIndex::open_or_bundled(config.prompts_dir.as_deref())?);
//! let client = Arc::new(AzureOpenAiClient::new(&config)?);
//!
//! let params = TaskParams::default();
//! let task = Task::new(TaskKind::Refactor, templates, client, &params)?;
//! let report = Orchestrator::new(task, params, BatchOptions::default())
//!     .run("queries/".as_ref())
//!     .await;
//! println!("{} ok, {} failed", report.succeeded(), report.failed());
//! ```
//!
//! ## Pieces
//!
//! | Module         | Role                                              |
//! |----------------|---------------------------------------------------|
//! | `template`     | Named prompt templates with required inputs       |
//! | `sanitizer`    | Split completion text into SQL and commentary     |
//! | `masking`      | Regex detection and masking of sensitive values   |
//! | `files`        | Source discovery, timestamped backups, writes     |
//! | `tasks`        | The closed set of task variants                   |
//! | `orchestrator` | Sequential batch driver                           |

pub mod completion;
pub mod config;
pub mod error;
pub mod files;
pub mod masking;
pub mod orchestrator;
pub mod sanitizer;
pub mod stage;
pub mod tasks;
pub mod template;

pub mod prelude {
    pub use crate::completion::{AzureOpenAiClient, CompletionClient};
    pub use crate::config::Config;
    pub use crate::error::*;
    pub use crate::masking::{Category, MaskingMatch, detect, mask};
    pub use crate::orchestrator::{
        BatchOptions, BatchReport, FileJob, JobOutcome, JobStatus, Orchestrator, Plan,
    };
    pub use crate::sanitizer::{SanitizedOutput, sanitize};
    pub use crate::stage::{GitStager, Stager};
    pub use crate::tasks::{Task, TaskKind, TaskParams};
    pub use crate::template::{TemplateEntry, TemplateIndex};
}

/// Extract SQL from completion text, parking surrounding prose in a block
/// comment.
///
/// # Example
///
/// ```
/// let out = sqlpilot::sanitize("Sure:\n```sql\nSELECT 1;\n```");
/// assert_eq!(out, "SELECT 1;\n/*\nSure:\n*/");
/// ```
pub fn sanitize(raw: &str) -> String {
    sanitizer::sanitize(raw)
}
