//! Heuristic code detection.
//!
//! [`classify_chunk`] is the single entry point. Signatures are tried in
//! order and the first match decides the language, so more specific
//! languages come before the ones whose syntax they overlap (C++ before C,
//! TypeScript before JavaScript). A generic C-style control structure is the
//! last resort.

use std::sync::LazyLock;

use coursemind_core::CodeClassification;
use regex::Regex;

struct Signature {
    language: &'static str,
    pattern: Regex,
}

fn signature(language: &'static str, pattern: &str) -> Signature {
    Signature {
        language,
        pattern: Regex::new(pattern).expect("code signature must compile"),
    }
}

static SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    vec![
        signature(
            "python",
            r"(?m)^\s*(def \w+\s*\(.*\)\s*(->\s*[\w\[\], .]+)?:|class \w+(\(.*\))?:|from [\w.]+ import \w|import [\w.]+(\s+as\s+\w+)?\s*$|for \w+(, \w+)* in .+:\s*$|while .+:\s*$|if __name__ == )",
        ),
        signature(
            "rust",
            r"(?m)^\s*((pub(\(crate\))?\s+)?fn \w+\s*(<[^>]*>)?\s*\(|use \w+(::[\w{}*, ]+)+;|(pub\s+)?(struct|enum|trait)\s+\w+|impl(<[^>]*>)?\s+\w+)|\blet\s+mut\s+\w+|\bprintln!\(",
        ),
        signature(
            "go",
            r"(?m)^\s*(func (\(\w+ \*?\w+\) )?\w+\(|package \w+\s*$)|\bfmt\.Print|\w+ := ",
        ),
        signature(
            "java",
            r"(?m)\b(public|private|protected)\s+(static\s+)?(final\s+)?(class|interface|void|int|String|boolean)\b|System\.out\.print|^\s*import java\.",
        ),
        signature(
            "typescript",
            r"(?m)^\s*(export\s+)?(interface\s+\w+\s*\{|type\s+\w+\s*=)|\b(let|const)\s+\w+\s*:\s*(string|number|boolean)\b",
        ),
        signature(
            "javascript",
            r#"(?m)\bfunction\s*\w*\s*\([^)]*\)\s*\{|\b(const|let|var)\s+\w+\s*=\s*(\([^)]*\)|\w+)\s*=>|console\.log\(|require\(['"]|^\s*import .+ from ['"]|^\s*export (default|const|function)\b"#,
        ),
        signature(
            "cpp",
            r"(?m)^\s*#include\s*<(iostream|vector|string|map|algorithm|memory)>|\bstd::\w+|\bcout\s*<<|\bcin\s*>>|^\s*using namespace std;|^\s*template\s*<",
        ),
        signature(
            "c",
            r#"(?m)^\s*#include\s*[<"][\w/]+\.h[>"]|\bprintf\s*\(|\bint\s+main\s*\(|\bmalloc\s*\(|\bscanf\s*\("#,
        ),
        signature(
            "sql",
            r"\bSELECT\s+.+?\s+FROM\s+\w+|\bINSERT\s+INTO\s+\w+|\bCREATE\s+TABLE\s+\w+|\bUPDATE\s+\w+\s+SET\s",
        ),
    ]
});

/// Brace-delimited control structures and C-style `for` headers.
static CONTROL_STRUCTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(for|while|if|switch)\s*\([^)]*\)\s*\{|\bfor\s*\([^;)]*;[^;)]*;[^)]*\)|\}\s*else\s*\{",
    )
    .expect("control structure pattern must compile")
});

const FALLBACK_LANGUAGE: &str = "c";

/// Decide whether a chunk of text is code, and in which language.
///
/// This is a heuristic. Misclassification is harmless: it only affects
/// metadata and prompt tone, never whether a chunk gets indexed.
pub fn classify_chunk(text: &str) -> CodeClassification {
    if let Some(sig) = SIGNATURES.iter().find(|s| s.pattern.is_match(text)) {
        return CodeClassification::code(sig.language);
    }

    if CONTROL_STRUCTURE.is_match(text) {
        return CodeClassification::code(FALLBACK_LANGUAGE);
    }

    CodeClassification::default()
}
