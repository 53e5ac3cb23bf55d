//! Opaque, stacked continuation tokens.
//!
//! A token encodes a stack of [`PageFrame`]s, one per level of the walk that is
//! still in progress (enterprise at the bottom, the workspace currently being
//! paged on top). Callers treat the string as a black box and pass back exactly
//! what they were given.
//!
//! The empty string means both "start" and "done": [`decode`] seeds a single
//! frame from the caller's scope, and [`encode`] returns `""` once the stack is
//! empty. Which of the two applies is known to the caller (first call or not).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids::Scope;
use crate::{SlackError, SlackResult};

/// One level of a page walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFrame {
    /// Scope the frame pages under.
    pub scope: Scope,
    /// Upstream cursor for the next page; empty for the first page or for a
    /// local enumeration.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cursor: String,
    /// Ids already emitted in this logical pass.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub found: BTreeSet<String>,
}

impl PageFrame {
    /// A fresh frame at the first page of `scope`.
    #[must_use]
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            cursor: String::new(),
            found: BTreeSet::new(),
        }
    }

    /// Sets the cursor.
    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = cursor.into();
        self
    }

    /// Sets the found set.
    #[must_use]
    pub fn with_found(mut self, found: BTreeSet<String>) -> Self {
        self.found = found;
        self
    }

    /// Records `id` as emitted; returns false if it was emitted before.
    pub fn mark_found(&mut self, id: &str) -> bool {
        if self.found.contains(id) {
            return false;
        }
        self.found.insert(id.to_string())
    }
}

/// Stack of in-progress page frames, bottom first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStack {
    frames: Vec<PageFrame>,
}

impl FrameStack {
    /// An exhausted stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A stack holding one fresh frame for `scope`.
    #[must_use]
    pub fn seeded(scope: Scope) -> Self {
        Self {
            frames: vec![PageFrame::new(scope)],
        }
    }

    /// Pushes a frame on top.
    pub fn push(&mut self, frame: PageFrame) {
        self.frames.push(frame);
    }

    /// Pops the top frame.
    pub fn pop(&mut self) -> Option<PageFrame> {
        self.frames.pop()
    }

    /// The top frame.
    #[must_use]
    pub fn current(&self) -> Option<&PageFrame> {
        self.frames.last()
    }

    /// The top frame, mutably.
    pub fn current_mut(&mut self) -> Option<&mut PageFrame> {
        self.frames.last_mut()
    }

    /// Moves the top frame to `next_cursor`, or pops it when the upstream
    /// reported no further page.
    pub fn advance(&mut self, next_cursor: Option<String>) {
        match next_cursor.filter(|c| !c.is_empty()) {
            Some(cursor) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.cursor = cursor;
                }
            }
            None => {
                self.frames.pop();
            }
        }
    }

    /// Returns true once every frame is exhausted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Frames, bottom first.
    #[must_use]
    pub fn frames(&self) -> &[PageFrame] {
        &self.frames
    }
}

/// Decodes a continuation token.
///
/// `""` yields a stack with one frame seeded from `default_scope`, so a first
/// call never needs a prior token.
///
/// # Errors
///
/// Returns [`SlackError::MalformedToken`] when the token is not one this codec
/// produced.
pub fn decode(token: &str, default_scope: &Scope) -> SlackResult<FrameStack> {
    if token.is_empty() {
        return Ok(FrameStack::seeded(default_scope.clone()));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| SlackError::MalformedToken(format!("not base64: {e}")))?;
    let frames: Vec<PageFrame> = serde_json::from_slice(&bytes)
        .map_err(|e| SlackError::MalformedToken(format!("invalid frame stack: {e}")))?;

    if frames.is_empty() {
        return Err(SlackError::MalformedToken(
            "token holds no frames".to_string(),
        ));
    }

    Ok(FrameStack { frames })
}

/// Encodes a frame stack; `""` once the stack is exhausted.
///
/// Deterministic: equal stacks always produce equal tokens.
#[must_use]
pub fn encode(stack: &FrameStack) -> String {
    if stack.is_empty() {
        return String::new();
    }

    serde_json::to_vec(&stack.frames)
        .map(|json| URL_SAFE_NO_PAD.encode(json))
        .unwrap_or_default()
}
