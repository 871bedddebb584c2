//! Output sanitizer.
//!
//! Completion output usually mixes prose with one ```sql fenced block. The
//! sanitizer keeps the code and parks the prose after it in a single
//! `/* ... */` block comment so the result can be written back as SQL.
//!
//! Only the first SQL-tagged fence counts as code. Anything after it,
//! including further fences, becomes commentary. Fence markers and comment
//! terminators inside the commentary are neutralized so the output never
//! contains a fence again, which keeps `sanitize` idempotent.

use regex::Regex;
use std::sync::LazyLock;

static SQL_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```sql\b\s*(.*?)\s*```").expect("sql fence pattern is valid")
});

/// Code extracted from a completion plus the commentary found around it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SanitizedOutput {
    pub sql: String,
    pub commentary: Option<String>,
}

impl SanitizedOutput {
    /// Render as SQL followed by the wrapped commentary, if any.
    pub fn render(&self) -> String {
        match &self.commentary {
            Some(text) => format!("{}\n/*\n{}\n*/", self.sql, text)
                .trim()
                .to_string(),
            None => self.sql.clone(),
        }
    }
}

/// Split raw completion text into code and commentary.
///
/// Without a terminated SQL fence the trimmed input is returned as the code
/// payload and nothing is wrapped.
pub fn split(raw: &str) -> SanitizedOutput {
    let raw = raw.trim();

    let Some(caps) = SQL_FENCE.captures(raw) else {
        return SanitizedOutput {
            sql: raw.to_string(),
            commentary: None,
        };
    };
    let (Some(fence), Some(body)) = (caps.get(0), caps.get(1)) else {
        return SanitizedOutput {
            sql: raw.to_string(),
            commentary: None,
        };
    };

    let before = raw[..fence.start()].trim();
    let after = raw[fence.end()..].trim();

    let commentary = match (before.is_empty(), after.is_empty()) {
        (true, true) => None,
        (false, true) => Some(before.to_string()),
        (true, false) => Some(after.to_string()),
        (false, false) => Some(format!("{}\n\n{}", before, after)),
    };

    SanitizedOutput {
        sql: body.as_str().trim().to_string(),
        commentary: commentary.map(|text| neutralize(&text)),
    }
}

/// Extract the SQL payload and append surrounding prose as a block comment.
pub fn sanitize(raw: &str) -> String {
    split(raw).render()
}

fn neutralize(commentary: &str) -> String {
    commentary.replace("```", "'''").replace("*/", "* /")
}
