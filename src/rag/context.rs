use crate::retrieval::Document;

/// `来源\n正文` 块，以空行分隔；空集合得到空串。
pub fn format_docs(docs: &[Document]) -> String {
    docs.iter()
        .map(|d| format!("{}\n{}", d.source, d.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
