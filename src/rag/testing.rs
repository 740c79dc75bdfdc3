//! 测试用的假模型与假检索器。

use crate::error::RagError;
use crate::rag::prompts::{ANSWER_MARKER, REWRITE_QUERY_MARKER};
use crate::rag::{ChatModel, CompletionRequest};
use crate::retrieval::{Document, Retriever};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Rewrite,
    MultiQuery,
    Answer,
}

impl Stage {
    pub(crate) fn of(req: &CompletionRequest) -> Self {
        if req.prompt.starts_with("Question: ") && req.prompt.ends_with(ANSWER_MARKER) {
            Self::Answer
        } else if req.prompt.ends_with(REWRITE_QUERY_MARKER) {
            Self::Rewrite
        } else {
            Self::MultiQuery
        }
    }
}

fn line_after<'a>(prompt: &'a str, prefix: &str) -> &'a str {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix(prefix))
        .unwrap_or_default()
}

type Reply = Box<dyn Fn(&CompletionRequest) -> Result<String, RagError> + Send + Sync>;

pub(crate) struct FakeModel {
    name: String,
    reply: Reply,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeModel {
    pub(crate) fn new(
        name: &str,
        reply: impl Fn(&CompletionRequest) -> Result<String, RagError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 改写与扩展阶段原样回显查询，作答阶段返回 `answer`。
    pub(crate) fn answering(name: &str, answer: &str) -> Self {
        let answer = answer.to_string();
        Self::new(name, move |req| match Stage::of(req) {
            Stage::Rewrite => Ok(line_after(&req.prompt, "Follow-up query: ").to_string()),
            Stage::MultiQuery => Ok(line_after(&req.prompt, "Original question: ").to_string()),
            Stage::Answer => Ok(answer.clone()),
        })
    }

    pub(crate) fn failing(name: &str, err: RagError) -> Self {
        Self::new(name, move |_| Err(err.clone()))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<String, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req.clone());
        (self.reply)(req)
    }
}

#[derive(Default)]
pub(crate) struct FakeRetriever {
    docs: HashMap<String, Vec<Document>>,
    error: Option<String>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl FakeRetriever {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, query: &str, docs: Vec<Document>) -> Self {
        self.docs.insert(query.to_string(), docs);
        self
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn search(&self, query: &str) -> Result<Vec<Document>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(message) = &self.error {
            return Err(RagError::retrieval(message.clone()));
        }
        Ok(self.docs.get(query).cloned().unwrap_or_default())
    }
}
