//! Streaming token matcher
//!
//! Finds a token in a byte stream delivered in arbitrary chunks.

use heapless::Vec;

use crate::config::MAX_TOKEN_LEN;

/// Sliding window over the most recent bytes
#[derive(Debug, Clone, Default)]
pub struct TokenMatcher {
    window: Vec<u8, MAX_TOKEN_LEN>,
}

impl TokenMatcher {
    /// Create an empty matcher
    pub fn new() -> Self {
        Self { window: Vec::new() }
    }

    /// Forget every byte seen so far
    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Push one byte; returns `true` when the window ends with `token`
    pub fn push(&mut self, byte: u8, token: &[u8]) -> bool {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return false;
        }

        while self.window.len() >= token.len() {
            self.window.remove(0);
        }
        // Cannot fail: the window was trimmed below token.len()
        let _ = self.window.push(byte);

        self.window.as_slice() == token
    }
}
