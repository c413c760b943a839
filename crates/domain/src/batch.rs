//! Best-effort batch results.

use common::ProductId;
use serde::Serialize;

use crate::error::ErrorKind;

/// One item of a batch that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// Position of the item in the request.
    pub index: usize,
    pub product_id: Option<ProductId>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a batch where every item is attempted independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport<T> {
    pub successful: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            successful: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&mut self, item: T) {
        self.successful.push(item);
    }

    pub fn failed(
        &mut self,
        index: usize,
        product_id: Option<ProductId>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) {
        self.failed.push(BatchFailure {
            index,
            product_id,
            kind,
            message: message.into(),
        });
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.successful.len() + self.failed.len()
    }
}
