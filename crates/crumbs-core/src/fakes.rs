//! In-memory fakes for the external service (testing only)
//!
//! [`ScriptedClient`] answers each request according to the first rule whose
//! marker occurs in the prompt, so tests can script per-batch behaviour
//! without a network. [`LogCapture`] records emitted events for assertions.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::client::{CompletionClient, CompletionRequest};
use crate::domain::ClientError;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Error(ClientError),
    Panic,
}

#[derive(Debug, Clone)]
struct Rule {
    marker: String,
    reply: Reply,
    delay: Option<Duration>,
}

/// Scripted [`CompletionClient`] that records every prompt it receives.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    rules: Vec<Rule>,
    fallback: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(mut self, marker: impl Into<String>, reply: Reply, delay: Option<Duration>) -> Self {
        self.rules.push(Rule {
            marker: marker.into(),
            reply,
            delay,
        });
        self
    }

    /// Answer prompts containing `marker` with `body`.
    pub fn respond(self, marker: impl Into<String>, body: impl Into<String>) -> Self {
        self.rule(marker, Reply::Text(body.into()), None)
    }

    /// Like [`ScriptedClient::respond`], after sleeping for `delay`.
    pub fn respond_after(
        self,
        marker: impl Into<String>,
        body: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.rule(marker, Reply::Text(body.into()), Some(delay))
    }

    /// Fail prompts containing `marker` with `error`.
    pub fn fail(self, marker: impl Into<String>, error: ClientError) -> Self {
        self.rule(marker, Reply::Error(error), None)
    }

    /// Panic on prompts containing `marker`.
    pub fn panic_on(self, marker: impl Into<String>) -> Self {
        self.rule(marker, Reply::Panic, None)
    }

    /// Like [`ScriptedClient::panic_on`], after sleeping for `delay`.
    pub fn panic_after(self, marker: impl Into<String>, delay: Duration) -> Self {
        self.rule(marker, Reply::Panic, Some(delay))
    }

    /// Answer every unmatched prompt with `body` instead of an error.
    pub fn otherwise(mut self, body: impl Into<String>) -> Self {
        self.fallback = Some(body.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in arrival order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request.prompt.into_inner();
        self.prompts.lock().unwrap().push(prompt.clone());

        let Some(rule) = self
            .rules
            .iter()
            .find(|rule| prompt.contains(&rule.marker))
            .cloned()
        else {
            return self.fallback.clone().ok_or(ClientError::EmptyResponse);
        };

        if let Some(delay) = rule.delay {
            tokio::time::sleep(delay).await;
        }
        match rule.reply {
            Reply::Text(body) => Ok(body),
            Reply::Error(err) => Err(err),
            Reply::Panic => panic!("scripted panic for marker '{}'", rule.marker),
        }
    }
}

/// Formatted tracing output collected in memory.
///
/// [`LogCapture::install`] makes it the current thread's subscriber, which
/// also covers tasks polled by a current-thread runtime.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture every event at any level until the guard drops.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }

    /// Captured lines mentioning `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.contents().lines().filter(|line| line.contains(needle)).count()
    }
}

/// Writer handed out per event by [`LogCapture`].
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}
