use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Normalized paragraph identifier.
///
/// Datasets carry ids either as JSON integers or as numeric strings, and the
/// search engine returns `_id` as a string. Both sides are parsed into this
/// type so relevance checks never compare `"42"` with `42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParagraphId(pub u64);

impl ParagraphId {
    /// Parse a decimal id (surrounding whitespace allowed).
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u64>().ok().map(ParagraphId)
    }

    /// Accept a non-negative JSON integer or a string holding one.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(ParagraphId),
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParagraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Corpus paragraph, keyed by `uid` in the search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub id: ParagraphId,
    /// Source Wikipedia page (`ru_wiki_pageid`).
    pub page_id: u64,
    pub text: String,
}

/// Labeled test question with its gold relevance set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCase {
    pub uid: Option<u64>,
    pub question: String,
    /// Paragraphs that contain the answer (`paragraphs_uids.with_answer`).
    pub relevant: HashSet<ParagraphId>,
    /// All paragraphs related to the question (`paragraphs_uids.all_related`).
    /// Informational only; scoring uses `relevant`.
    pub related: HashSet<ParagraphId>,
}

impl QueryCase {
    /// Cases without any gold paragraph carry no signal and are not scored.
    pub fn has_gold(&self) -> bool {
        !self.relevant.is_empty()
    }
}

#[derive(Deserialize)]
struct RawParagraph {
    uid: Value,
    ru_wiki_pageid: Value,
    text: String,
}

#[derive(Deserialize)]
struct RawQueryCase {
    #[serde(default)]
    uid: Option<Value>,
    question_text: String,
    paragraphs_uids: RawParagraphUids,
}

#[derive(Deserialize)]
struct RawParagraphUids {
    with_answer: Vec<Value>,
    #[serde(default)]
    all_related: Vec<Value>,
}

/// Read a JSON array of records from `path`.
fn read_records(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| EvalError::Load(format!("Failed to read {}: {}", path.display(), e)))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| EvalError::Load(format!("Invalid JSON in {}: {}", path.display(), e)))?;
    match value {
        Value::Array(records) => Ok(records),
        _ => Err(EvalError::Load(format!(
            "{}: expected a JSON array of records",
            path.display()
        ))),
    }
}

fn parse_id(value: &Value, field: &str, path: &Path, position: usize) -> Result<ParagraphId> {
    ParagraphId::from_json(value).ok_or_else(|| {
        EvalError::Load(format!(
            "{} record {}: field {} must be a non-negative integer, got {}",
            path.display(),
            position,
            field,
            value
        ))
    })
}

fn parse_id_set(
    values: &[Value],
    field: &str,
    path: &Path,
    position: usize,
) -> Result<HashSet<ParagraphId>> {
    values
        .iter()
        .map(|v| parse_id(v, field, path, position))
        .collect()
}

/// Load paragraph records (`uid`, `ru_wiki_pageid`, `text`).
pub fn load_paragraphs(path: &Path) -> Result<Vec<Paragraph>> {
    let records = read_records(path)?;
    let mut paragraphs = Vec::with_capacity(records.len());

    for (position, record) in records.into_iter().enumerate() {
        let raw: RawParagraph = serde_json::from_value(record).map_err(|e| {
            EvalError::Load(format!("{} record {}: {}", path.display(), position, e))
        })?;
        paragraphs.push(Paragraph {
            id: parse_id(&raw.uid, "uid", path, position)?,
            page_id: parse_id(&raw.ru_wiki_pageid, "ru_wiki_pageid", path, position)?.0,
            text: raw.text,
        });
    }

    log::info!("Loaded {} paragraphs from {}", paragraphs.len(), path.display());
    Ok(paragraphs)
}

/// Load test questions (`question_text`, `paragraphs_uids.with_answer`).
pub fn load_query_cases(path: &Path) -> Result<Vec<QueryCase>> {
    let records = read_records(path)?;
    let mut cases = Vec::with_capacity(records.len());

    for (position, record) in records.into_iter().enumerate() {
        let raw: RawQueryCase = serde_json::from_value(record).map_err(|e| {
            EvalError::Load(format!("{} record {}: {}", path.display(), position, e))
        })?;
        let uid = match raw.uid {
            Some(Value::Null) | None => None,
            Some(ref v) => Some(parse_id(v, "uid", path, position)?.0),
        };
        cases.push(QueryCase {
            uid,
            question: raw.question_text,
            relevant: parse_id_set(
                &raw.paragraphs_uids.with_answer,
                "paragraphs_uids.with_answer",
                path,
                position,
            )?,
            related: parse_id_set(
                &raw.paragraphs_uids.all_related,
                "paragraphs_uids.all_related",
                path,
                position,
            )?,
        });
    }

    let with_gold = cases.iter().filter(|c| c.has_gold()).count();
    log::info!(
        "Loaded {} query cases from {} ({} with a gold answer set)",
        cases.len(),
        path.display(),
        with_gold
    );
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_paragraph_id_from_json() {
        assert_eq!(ParagraphId::from_json(&serde_json::json!(42)), Some(ParagraphId(42)));
        assert_eq!(ParagraphId::from_json(&serde_json::json!("42")), Some(ParagraphId(42)));
        assert_eq!(ParagraphId::from_json(&serde_json::json!(" 7 ")), Some(ParagraphId(7)));
        assert_eq!(ParagraphId::from_json(&serde_json::json!(-1)), None);
        assert_eq!(ParagraphId::from_json(&serde_json::json!(1.5)), None);
        assert_eq!(ParagraphId::from_json(&serde_json::json!("abc")), None);
        assert_eq!(ParagraphId::from_json(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_load_paragraphs_mixed_id_types() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "paragraphs.json",
            r#"[
                {"uid": 1, "ru_wiki_pageid": 100, "text": "Москва - столица России."},
                {"uid": "2", "ru_wiki_pageid": "200", "text": "Второй абзац."}
            ]"#,
        );
        let paragraphs = load_paragraphs(&path).unwrap();
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].id, ParagraphId(1));
        assert_eq!(paragraphs[0].page_id, 100);
        assert_eq!(paragraphs[1].id, ParagraphId(2));
        assert_eq!(paragraphs[1].page_id, 200);
        assert_eq!(paragraphs[1].text, "Второй абзац.");
    }

    #[test]
    fn test_load_paragraphs_missing_file() {
        let err = load_paragraphs(Path::new("/nonexistent/paragraphs.json")).unwrap_err();
        assert!(matches!(err, EvalError::Load(_)));
    }

    #[test]
    fn test_load_paragraphs_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.json", "[{\"uid\": 1,");
        let err = load_paragraphs(&path).unwrap_err();
        assert!(matches!(err, EvalError::Load(ref msg) if msg.contains("Invalid JSON")));
    }

    #[test]
    fn test_load_paragraphs_not_an_array() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "object.json", r#"{"uid": 1}"#);
        let err = load_paragraphs(&path).unwrap_err();
        assert!(matches!(err, EvalError::Load(ref msg) if msg.contains("JSON array")));
    }

    #[test]
    fn test_load_paragraphs_missing_field() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "p.json", r#"[{"uid": 1, "ru_wiki_pageid": 5}]"#);
        let err = load_paragraphs(&path).unwrap_err();
        assert!(matches!(err, EvalError::Load(ref msg) if msg.contains("record 0") && msg.contains("text")));
    }

    #[test]
    fn test_load_paragraphs_bad_id() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "p.json",
            r#"[{"uid": 1, "ru_wiki_pageid": 5, "text": "a"}, {"uid": "x1", "ru_wiki_pageid": 5, "text": "b"}]"#,
        );
        let err = load_paragraphs(&path).unwrap_err();
        assert!(matches!(err, EvalError::Load(ref msg) if msg.contains("record 1") && msg.contains("uid")));
    }

    #[test]
    fn test_load_query_cases() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "test.json",
            r#"[
                {
                    "uid": 0,
                    "question_text": "Что является столицей России?",
                    "answer_text": "Москва",
                    "paragraphs_uids": {"with_answer": [1, "2", 2], "all_related": [1, 2, 3]}
                },
                {
                    "question_text": "Без ответа",
                    "paragraphs_uids": {"with_answer": []}
                }
            ]"#,
        );
        let cases = load_query_cases(&path).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].uid, Some(0));
        assert_eq!(cases[0].relevant.len(), 2);
        assert!(cases[0].relevant.contains(&ParagraphId(1)));
        assert!(cases[0].relevant.contains(&ParagraphId(2)));
        assert_eq!(cases[0].related.len(), 3);
        assert!(cases[0].has_gold());
        assert_eq!(cases[1].uid, None);
        assert!(!cases[1].has_gold());
        assert!(cases[1].related.is_empty());
    }

    #[test]
    fn test_load_query_cases_missing_gold_field() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "test.json", r#"[{"question_text": "q"}]"#);
        let err = load_query_cases(&path).unwrap_err();
        assert!(matches!(err, EvalError::Load(ref msg) if msg.contains("paragraphs_uids")));
    }

    #[test]
    fn test_load_query_cases_bad_gold_id() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "test.json",
            r#"[{"question_text": "q", "paragraphs_uids": {"with_answer": [true]}}]"#,
        );
        let err = load_query_cases(&path).unwrap_err();
        assert!(matches!(err, EvalError::Load(ref msg) if msg.contains("with_answer")));
    }
}
