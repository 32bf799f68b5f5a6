//! Prompt templates and output schemas.

use coursemind_core::ResponseSchema;
use serde_json::json;

const GROUNDING_RULES: &str = "\
Rules:
1. Answer ONLY from the context below. Do not use outside knowledge.
2. If the context does not contain enough information, say so plainly and name what is missing.
3. Cite every claim with the source label it came from, e.g. (Source 2).
4. Present tables as markdown tables.";

const THEORY_TONE: &str = "\
You are a tutoring assistant for a university course. The retrieved material is mostly \
theory. Explain concepts step by step in clear prose, define terms before using them, \
and finish with a one-sentence recap.";

const LAB_TONE: &str = "\
You are a tutoring assistant for a university course. The retrieved material includes lab \
work and source code. Walk through code line by line where it helps, keep code in fenced \
blocks with the language tag, and point out common mistakes a student might make.";

/// System instruction for a grounded answer.
pub fn answer_system(has_lab_content: bool) -> String {
    let tone = if has_lab_content { LAB_TONE } else { THEORY_TONE };
    format!("{tone}\n\n{GROUNDING_RULES}")
}

/// User turn for a grounded answer.
pub fn answer_prompt(context: &str, question: &str) -> String {
    format!("Context:\n\n{context}\n\nQuestion: {question}")
}

/// System instruction for content synthesis.
pub fn synthesis_system() -> String {
    "You are an expert educational content creator. Write only from the supplied course \
     context, cite source labels where you use them, and reply with JSON matching the \
     given schema."
        .to_string()
}

/// User turn asking for a short `{title, description}` piece.
pub fn short_prompt(context: &str, request: &str) -> String {
    format!(
        "Context:\n\n{context}\n\nRequest: {request}\n\n\
         Write a title and a description of 2 to 4 paragraphs."
    )
}

/// User turn asking for a document-length piece.
pub fn long_prompt(context: &str, request: &str) -> String {
    format!(
        "Context:\n\n{context}\n\nRequest: {request}\n\n\
         Write a structured study document: a title, an introduction, the main content \
         in markdown with headings, a list of summary points and a list of references \
         naming the source materials and pages used."
    )
}

/// Schema for the short form.
pub fn short_schema() -> ResponseSchema {
    ResponseSchema {
        name: "short_content".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "description": {"type": "string"}
            },
            "required": ["title", "description"],
            "additionalProperties": false
        }),
    }
}

/// Schema for the long form.
pub fn long_schema() -> ResponseSchema {
    ResponseSchema {
        name: "long_content".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "introduction": {"type": "string"},
                "main_content": {"type": "string"},
                "summary": {"type": "array", "items": {"type": "string"}},
                "references": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["title", "introduction", "main_content", "summary", "references"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_system_adapts_tone() {
        let lab = answer_system(true);
        let theory = answer_system(false);
        assert!(lab.contains("line by line"));
        assert!(!theory.contains("line by line"));
        assert!(lab.contains("ONLY from the context"));
        assert!(theory.contains("ONLY from the context"));
    }

    #[test]
    fn test_schemas_are_closed() {
        for schema in [short_schema(), long_schema()] {
            assert_eq!(schema.schema["additionalProperties"], false);
            let required = schema.schema["required"].as_array().unwrap();
            let properties = schema.schema["properties"].as_object().unwrap();
            assert_eq!(required.len(), properties.len());
        }
    }
}
