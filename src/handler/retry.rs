//! Bounded resubmission after a "nonce too low" rejection

use crate::downstream::DownstreamResponse;
use crate::jsonrpc::JsonRpcErrorCode;
use axum::http::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Armed,
    Exhausted,
}

/// Per-request retry counter
#[derive(Debug)]
pub struct RetryController {
    attempts: usize,
    max_attempts: usize,
}

impl RetryController {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn state(&self) -> RetryState {
        if self.attempts < self.max_attempts {
            RetryState::Armed
        } else {
            RetryState::Exhausted
        }
    }

    /// Whether `response` warrants another submission; counts the attempt if so
    pub fn should_retry(&mut self, response: &DownstreamResponse) -> bool {
        if !is_nonce_too_low(response) || self.state() == RetryState::Exhausted {
            return false;
        }
        self.attempts += 1;
        true
    }
}

/// HTTP 400 carrying the "nonce too low" JSON-RPC error
pub fn is_nonce_too_low(response: &DownstreamResponse) -> bool {
    response.status == StatusCode::BAD_REQUEST
        && response.json().and_then(|body| body.error_code())
            == Some(JsonRpcErrorCode::NonceTooLow.code())
}
