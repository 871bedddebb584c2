//! Pattern-based sensitive data detection and masking.
//!
//! Four categories are checked in a fixed order: email, phone number,
//! credit-card-like digit run, social security number. The patterns work on
//! raw text; they are not a SQL grammar and make no attempt to tell a phone
//! number from any other ten-digit value.
//!
//! Precedence between categories is declaration order and nothing else. A
//! span claimed by an earlier category is never reported by a later one, and
//! masking runs one pass per category against the already-masked text. A
//! sixteen-digit run is therefore a credit card even when it was meant as a
//! phone number, and a phone number embedded in a longer digit run is masked
//! as a phone with the surrounding digits left in place.

use regex::Regex;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

/// Category of sensitive value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Email,
    Phone,
    CreditCard,
    Ssn,
}

impl Category {
    /// Every category in pass order.
    pub const ALL: [Category; 4] = [
        Category::Email,
        Category::Phone,
        Category::CreditCard,
        Category::Ssn,
    ];

    /// Token written in place of a masked value.
    pub fn placeholder(self) -> &'static str {
        match self {
            Category::Email => "[masked-email]",
            Category::Phone => "[masked-phone]",
            Category::CreditCard => "[masked-credit-card]",
            Category::Ssn => "[masked-ssn]",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Category::Email => &EMAIL,
            Category::Phone => &PHONE,
            Category::CreditCard => &CREDIT_CARD,
            Category::Ssn => &SSN,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Email => "email",
            Category::Phone => "phone",
            Category::CreditCard => "credit_card",
            Category::Ssn => "ssn",
        };
        f.write_str(name)
    }
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern is valid")
});

// Optional +country prefix, then 3-3-4 digits with optional separators.
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b")
        .expect("phone pattern is valid")
});

// 13 to 16 digits, each optionally followed by a single space or dash.
static CREDIT_CARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d[ -]?){12,15}\d\b").expect("credit card pattern is valid")
});

static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern is valid"));

/// One detected value. `span` is a byte range into the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskingMatch {
    pub category: Category,
    pub value: String,
    pub span: Range<usize>,
}

impl MaskingMatch {
    /// 1-based line and column (in chars) of the match start within `text`.
    pub fn line_col(&self, text: &str) -> (usize, usize) {
        let prefix = &text[..self.span.start.min(text.len())];
        let line = prefix.matches('\n').count() + 1;
        let col = match prefix.rfind('\n') {
            Some(nl) => prefix[nl + 1..].chars().count() + 1,
            None => prefix.chars().count() + 1,
        };
        (line, col)
    }
}

/// Find sensitive values, grouped by category in pass order and by position
/// within each category. Matches overlapping a span already claimed by an
/// earlier category are dropped.
pub fn detect(text: &str) -> Vec<MaskingMatch> {
    let mut claimed: Vec<Range<usize>> = Vec::new();
    let mut found = Vec::new();

    for category in Category::ALL {
        let mut claimed_now = Vec::new();
        for m in category.pattern().find_iter(text) {
            let span = m.range();
            if claimed.iter().any(|c| overlaps(c, &span)) {
                continue;
            }
            claimed_now.push(span.clone());
            found.push(MaskingMatch {
                category,
                value: m.as_str().to_string(),
                span,
            });
        }
        claimed.extend(claimed_now);
    }

    found
}

/// Replace every sensitive value with its category placeholder.
///
/// Each category gets one global pass over the current text. Afterwards any
/// remaining verbatim copy of a detected value is replaced as well, so no
/// detected value survives even where its surroundings stopped the pattern
/// from matching a second time.
pub fn mask(text: &str) -> String {
    let detected = detect(text);
    if detected.is_empty() {
        return text.to_string();
    }

    let mut out = text.to_string();
    for category in Category::ALL {
        out = category
            .pattern()
            .replace_all(&out, category.placeholder())
            .into_owned();
    }

    for m in &detected {
        if out.contains(&m.value) {
            out = out.replace(&m.value, m.category.placeholder());
        }
    }

    out
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}
