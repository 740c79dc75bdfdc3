//! 固定提示词。系统提示词来自配置，不在这里。

use crate::rag::HistoryItem;

pub const REWRITE_INSTRUCTIONS: &str = "\
You rewrite follow-up queries for a document search engine.
Given a chat history and the latest user query, return a single standalone query.
Rules:
- If the query is already self-contained, return it unchanged.
- If the query depends on earlier turns (pronouns, \"it\", \"that\", omitted subjects), \
rewrite it so it can be understood without the history. Resolve references against the \
MOST RECENT turn that discusses a matching topic, never an older unrelated one.
- Never answer the query.
- Never invent connections between unrelated topics.
- Output only the query text, with no quotes, labels or explanations.";

pub const REWRITE_QUERY_MARKER: &str = "Standalone query:";

pub const ANSWER_MARKER: &str = "Answer:";

pub fn rewrite_prompt(query: &str, history: &[&HistoryItem]) -> String {
    let mut rendered = String::new();
    for item in history {
        rendered.push_str("User: ");
        rendered.push_str(&item.query);
        rendered.push_str("\nAssistant: ");
        rendered.push_str(&item.answer);
        rendered.push('\n');
    }
    if rendered.is_empty() {
        rendered.push_str("(empty)\n");
    }
    format!("Chat history:\n{rendered}\nFollow-up query: {query}\n{REWRITE_QUERY_MARKER}")
}

pub fn multi_query_prompt(question: &str, count: usize) -> String {
    format!(
        "You are an AI language model assistant. Your task is to generate {count} different \
versions of the given user question to retrieve relevant documents from a vector database. \
By generating multiple perspectives on the user question, your goal is to help the user \
overcome some of the limitations of the distance-based similarity search. Provide these \
alternative questions separated by newlines.\nOriginal question: {question}"
    )
}

pub fn answer_prompt(question: &str, context: &str) -> String {
    format!("Question: {question}\nContext: {context}\n{ANSWER_MARKER}")
}
