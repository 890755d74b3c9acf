//! Context budgeting
//!
//! Decides how many documents fit into a fixed model-input budget and how
//! many characters each may contribute, then assembles the numbered context
//! block the reasoning prompts cite from.

use crate::models::{Document, Source};
use regex::Regex;
use std::sync::OnceLock;

/// Approximate cost of the system prompt and instructions.
pub const PREAMBLE_TOKENS: usize = 250;
pub const DEFAULT_TOKEN_BUDGET: usize = 3800;
pub const DEFAULT_ANSWER_TOKENS: usize = 500;

const MIN_AVAILABLE_TOKENS: usize = 250;
const MAX_DOCS: usize = 12;
pub const MIN_PER_DOC_CHARS: usize = 220;
pub const MAX_PER_DOC_CHARS: usize = 700;
const CHARS_PER_TOKEN: usize = 4;
const TITLE_CHARS: usize = 60;
const ELLIPSIS: char = '…';

/// How many documents to keep and the character cap applied to each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocBudget {
    pub doc_count: usize,
    pub per_doc_chars: usize,
}

/// Assembled context plus its citation list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBudgetResult {
    pub sources: Vec<Source>,
    pub context: String,
    pub used_tokens: usize,
    pub per_doc_chars: usize,
}

impl ContextBudgetResult {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

pub fn approx_tokens(text: &str) -> usize {
    (text.chars().count() / CHARS_PER_TOKEN).max(1)
}

/// Pick the largest document count whose per-document allowance stays readable.
pub fn choose_doc_budget(
    candidate_count: usize,
    total_tokens: usize,
    preamble_tokens: usize,
    reserve_answer_tokens: usize,
) -> DocBudget {
    let available_tokens = total_tokens
        .saturating_sub(preamble_tokens)
        .saturating_sub(reserve_answer_tokens)
        .max(MIN_AVAILABLE_TOKENS);
    let available_chars = available_tokens * CHARS_PER_TOKEN;
    let max_docs = candidate_count.min(MAX_DOCS);

    for k in (1..=max_docs).rev() {
        let per_doc_chars = available_chars / k;
        if per_doc_chars >= MIN_PER_DOC_CHARS {
            return DocBudget {
                doc_count: k,
                per_doc_chars: per_doc_chars.min(MAX_PER_DOC_CHARS),
            };
        }
    }

    DocBudget {
        doc_count: 1,
        per_doc_chars: MIN_PER_DOC_CHARS,
    }
}

/// Build the numbered context for `docs` within `total_tokens`.
pub fn build_context(
    docs: &[Document],
    total_tokens: usize,
    reserve_answer_tokens: usize,
) -> ContextBudgetResult {
    if docs.is_empty() {
        return ContextBudgetResult::default();
    }

    let budget = choose_doc_budget(
        docs.len(),
        total_tokens,
        PREAMBLE_TOKENS,
        reserve_answer_tokens,
    );

    let mut blocks = Vec::with_capacity(budget.doc_count);
    let mut sources = Vec::with_capacity(budget.doc_count);

    for (i, doc) in docs.iter().take(budget.doc_count).enumerate() {
        let index = i + 1;
        let body = strip_noise(&doc.context);
        let title = match doc.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => body.chars().take(TITLE_CHARS).collect(),
        };
        let snippet = smart_trim(&body, budget.per_doc_chars);

        blocks.push(format!(
            "[{}] {}\n{}\nLINK: {}\n",
            index,
            title,
            snippet,
            doc.link.as_deref().unwrap_or("")
        ));
        sources.push(Source {
            index,
            id: document_id(doc, index),
            title,
            link: doc.link.clone(),
            snippet,
        });
    }

    let context = blocks.join("\n");
    let used_tokens = PREAMBLE_TOKENS + approx_tokens(&context);

    ContextBudgetResult {
        sources,
        context,
        used_tokens,
        per_doc_chars: budget.per_doc_chars,
    }
}

fn document_id(doc: &Document, index: usize) -> String {
    if let Some(id) = doc.id.as_deref().filter(|id| !id.trim().is_empty()) {
        return id.to_string();
    }

    doc.link
        .as_deref()
        .and_then(|link| link.trim_end_matches('/').rsplit('/').next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("doc{}", index))
}

fn noise_re() -> &'static Regex {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    NOISE.get_or_init(|| {
        Regex::new(r"[\x00-\x08\x0B\x0E-\x1F\x7F\p{Cf}\x{10000}-\x{10FFFF}]")
            .expect("noise pattern is valid")
    })
}

fn whitespace_re() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| {
        Regex::new(r"\s+").expect("whitespace pattern is valid")
    })
}

/// Drop control characters and emoji, collapse whitespace.
pub fn strip_noise(text: &str) -> String {
    let cleaned = noise_re().replace_all(text, "");
    whitespace_re()
        .replace_all(&cleaned, " ")
        .trim()
        .to_string()
}

/// Truncate at a word boundary to at most `limit` characters, ellipsis included.
pub fn smart_trim(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let keep = limit.saturating_sub(1);
    let head_end = text
        .char_indices()
        .nth(keep)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let head = &text[..head_end];

    let cut = if text[head_end..].starts_with(char::is_whitespace) {
        head
    } else {
        match head.rfind(char::is_whitespace) {
            Some(i) if i > 0 => &head[..i],
            _ => head,
        }
    };

    let cut = cut
        .trim_end()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '-'))
        .trim_end();
    let cut = if cut.is_empty() { head } else { cut };

    format!("{}{}", cut, ELLIPSIS)
}
