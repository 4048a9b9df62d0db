//! Index creation bodies (settings + mappings) for both analysis modes.

use crate::search::{Analysis, IndexConfig, MorphologySettings};
use serde_json::{json, Value};

/// Name of the custom analyzer installed on morphological indices.
pub const MORPH_ANALYZER: &str = "rebuilt_russian";

fn properties(text_analyzer: Option<&str>) -> Value {
    let text = match text_analyzer {
        Some(analyzer) => json!({ "type": "text", "analyzer": analyzer }),
        None => json!({ "type": "text" }),
    };
    json!({
        "ru_wiki_pageid": { "type": "integer" },
        "text": text
    })
}

fn analysis_settings(settings: &MorphologySettings) -> Value {
    json!({
        "analysis": {
            "filter": {
                "russian_stop": {
                    "type": "stop",
                    "stopwords": settings.stopwords
                },
                "russian_keywords": {
                    "type": "keyword_marker",
                    "keywords": settings.keywords
                },
                "russian_stemmer": {
                    "type": "stemmer",
                    "language": settings.language
                }
            },
            "analyzer": {
                MORPH_ANALYZER: {
                    "tokenizer": "standard",
                    "filter": [
                        "lowercase",
                        "russian_stop",
                        "russian_keywords",
                        "russian_stemmer"
                    ]
                }
            }
        }
    })
}

/// Request body for `PUT /{index}`.
pub fn index_definition(index: &IndexConfig) -> Value {
    match &index.analysis {
        Analysis::Standard => json!({
            "mappings": { "properties": properties(None) }
        }),
        Analysis::Morphological(settings) => json!({
            "settings": analysis_settings(settings),
            "mappings": { "properties": properties(Some(MORPH_ANALYZER)) }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn morph() -> IndexConfig {
        IndexConfig {
            name: "wikipedia_morphologic".to_string(),
            analysis: Analysis::Morphological(MorphologySettings {
                language: "russian".to_string(),
                stopwords: "_russian_".to_string(),
                keywords: vec!["пример".to_string()],
            }),
        }
    }

    #[test]
    fn plain_index_uses_default_analyzer() {
        let index = IndexConfig {
            name: "wikipedia_paragraphs".to_string(),
            analysis: Analysis::Standard,
        };
        let body = index_definition(&index);
        assert!(body.get("settings").is_none());
        assert_eq!(body["mappings"]["properties"]["text"], json!({ "type": "text" }));
        assert_eq!(body["mappings"]["properties"]["ru_wiki_pageid"]["type"], "integer");
    }

    #[test]
    fn morphological_index_installs_pipeline() {
        let body = index_definition(&morph());
        let analysis = &body["settings"]["analysis"];
        assert_eq!(analysis["filter"]["russian_stop"]["stopwords"], "_russian_");
        assert_eq!(analysis["filter"]["russian_keywords"]["keywords"], json!(["пример"]));
        assert_eq!(analysis["filter"]["russian_stemmer"]["language"], "russian");
        assert_eq!(
            analysis["analyzer"][MORPH_ANALYZER]["filter"],
            json!(["lowercase", "russian_stop", "russian_keywords", "russian_stemmer"])
        );
        assert_eq!(analysis["analyzer"][MORPH_ANALYZER]["tokenizer"], "standard");
        assert_eq!(body["mappings"]["properties"]["text"]["analyzer"], MORPH_ANALYZER);
    }
}
