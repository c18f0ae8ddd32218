#![allow(dead_code)]

use fieldscrape::catalog::ModelSpec;
use fieldscrape::dispatch::{PreparedRequest, ProviderFactory};
use fieldscrape::error::DispatchError;
use llm::{
    chat::{ChatMessage, ChatProvider, ChatResponse, Tool, Usage},
    error::LLMError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One scripted backend reply.
#[derive(Clone, Debug)]
pub enum Reply {
    Text {
        text: String,
        usage: Option<(u32, u32)>,
    },
    Failure(String),
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Reply::Text {
            text: text.to_owned(),
            usage: None,
        }
    }

    pub fn with_usage(text: &str, input: u32, output: u32) -> Self {
        Reply::Text {
            text: text.to_owned(),
            usage: Some((input, output)),
        }
    }
}

/// Provider factory handing out stub providers that share one reply script
/// and record every request they receive.
#[derive(Clone, Default)]
pub struct StubFactory {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<PreparedRequest>>>,
}

impl StubFactory {
    pub fn new(replies: Vec<Reply>) -> Self {
        StubFactory {
            replies: Arc::new(Mutex::new(replies.into())),
            requests: Arc::default(),
        }
    }

    /// Every reply is the same text.
    pub fn repeating(text: &str, times: usize) -> Self {
        Self::new(vec![Reply::text(text); times])
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ProviderFactory for StubFactory {
    fn build(
        &self,
        _model: &ModelSpec,
        request: &PreparedRequest,
    ) -> Result<Box<dyn ChatProvider>, DispatchError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        Ok(Box::new(StubLlmProvider {
            replies: Arc::clone(&self.replies),
        }))
    }
}

pub(crate) struct StubLlmProvider {
    replies: Arc<Mutex<VecDeque<Reply>>>,
}

#[derive(Debug)]
struct StringResponse {
    text: String,
    usage: Option<(u32, u32)>,
}

impl ChatResponse for StringResponse {
    fn text(&self) -> Option<String> {
        Some(self.text.clone())
    }

    fn tool_calls(&self) -> Option<Vec<llm::ToolCall>> {
        None
    }

    fn thinking(&self) -> Option<String> {
        None
    }

    fn usage(&self) -> Option<Usage> {
        let (input, output) = self.usage?;
        serde_json::from_value(serde_json::json!({
            "prompt_tokens": input,
            "completion_tokens": output,
            "total_tokens": input + output,
        }))
        .ok()
    }
}

impl std::fmt::Display for StringResponse {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.text)
    }
}

impl ChatProvider for StubLlmProvider {
    fn chat<'life0, 'life1, 'async_trait>(
        &'life0 self,
        _messages: &'life1 [ChatMessage],
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Box<dyn ChatResponse>, LLMError>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        let reply = self.replies.lock().expect("replies lock").pop_front();
        Box::pin(async move {
            match reply {
                Some(Reply::Text { text, usage }) => {
                    Ok(Box::new(StringResponse { text, usage }) as Box<dyn ChatResponse>)
                }
                Some(Reply::Failure(message)) => Err(LLMError::HttpError(message)),
                None => Err(LLMError::HttpError("no scripted reply left".to_owned())),
            }
        })
    }

    fn chat_with_tools<'life0, 'life1, 'life2, 'async_trait>(
        &'life0 self,
        messages: &'life1 [ChatMessage],
        _tools: Option<&'life2 [Tool]>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Box<dyn ChatResponse>, LLMError>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        'life2: 'async_trait,
        Self: 'async_trait,
    {
        self.chat(messages)
    }
}
