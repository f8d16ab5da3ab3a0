//! Shared deterministic types for the build steps.
//!
//! These types define stable contracts between core logic and the step
//! orchestration. They do not depend on external state or I/O.

use crate::exit_codes;

/// Final verdict of a build step.
///
/// `Warnings` is a degraded success: the step completed without a fatal error
/// but surfaced something worth operator attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Success,
    Warnings,
    Failure,
    Cancelled,
}

impl StepResult {
    pub fn exit_code(self) -> i32 {
        match self {
            StepResult::Success => exit_codes::OK,
            StepResult::Failure => exit_codes::FAILURE,
            StepResult::Warnings => exit_codes::WARNINGS,
            StepResult::Cancelled => exit_codes::CANCELLED,
        }
    }
}

/// Channel a chunk of log text was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogChannel {
    Stdout,
    Stderr,
    Header,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    pub channel: LogChannel,
    pub text: String,
}

/// A named, append-only text log with typed channels.
///
/// Steps build a log in memory and hand it to a
/// [`LogSink`](crate::io::logs::LogSink) once it is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedLog {
    name: String,
    chunks: Vec<LogChunk>,
}

impl NamedLog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chunks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chunks(&self) -> &[LogChunk] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn add_stdout(&mut self, text: impl Into<String>) {
        self.push(LogChannel::Stdout, text.into());
    }

    pub fn add_stderr(&mut self, text: impl Into<String>) {
        self.push(LogChannel::Stderr, text.into());
    }

    pub fn add_header(&mut self, text: impl Into<String>) {
        self.push(LogChannel::Header, text.into());
    }

    pub fn add(&mut self, channel: LogChannel, text: impl Into<String>) {
        self.push(channel, text.into());
    }

    /// All text in write order, regardless of channel.
    pub fn text(&self) -> String {
        self.chunks.iter().map(|chunk| chunk.text.as_str()).collect()
    }

    /// Text written to a single channel, in write order.
    pub fn channel_text(&self, channel: LogChannel) -> String {
        self.chunks
            .iter()
            .filter(|chunk| chunk.channel == channel)
            .map(|chunk| chunk.text.as_str())
            .collect()
    }

    fn push(&mut self, channel: LogChannel, text: String) {
        if text.is_empty() {
            return;
        }
        self.chunks.push(LogChunk { channel, text });
    }
}
