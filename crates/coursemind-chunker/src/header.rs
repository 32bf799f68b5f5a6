//! Context header prepended to chunk content before embedding.

use coursemind_core::MaterialSnapshot;

/// `[<title> - <CATEGORY> - Page <n>]`
pub fn context_header(material: &MaterialSnapshot, page_number: u32) -> String {
    format!(
        "[{} - {} - Page {}]",
        material.title.trim(),
        material.category.as_str().to_uppercase(),
        page_number
    )
}
