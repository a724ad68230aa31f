//! The per-order processing seam.
//!
//! Workers know nothing about what happens to an order; they hand it to an
//! [`OrderProcessor`] and only look at the returned [`Result`]. A failure for
//! one order is logged by the worker and never stops it.

use crate::{Order, Result};
use tracing::Span;

/// Context handed to a processor alongside each order.
///
/// Carries the id of the invoking worker and the span of the `ProcessOrder`
/// stage. Processors should parent their own spans on [`ProcessContext::span`]
/// rather than rely on ambient state.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    worker_id: usize,
    span: Span,
}

impl ProcessContext {
    pub const fn new(worker_id: usize, span: Span) -> Self {
        Self { worker_id, span }
    }

    /// Context with no worker and a disabled span, for calling a processor
    /// outside the pipeline.
    pub fn detached() -> Self {
        Self::new(0, Span::none())
    }

    pub const fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub const fn span(&self) -> &Span {
        &self.span
    }
}

/// Performs the effect of a single order.
///
/// Implementations are shared by every worker (`&self`) and must therefore be
/// `Send + Sync`. The returned future runs to completion once started; the
/// pipeline's cancellation signal never interrupts it.
pub trait OrderProcessor: Send + Sync + 'static {
    /// Processes `order`.
    ///
    /// # Errors
    ///
    /// Returns an error if the order could not be processed. The error is
    /// observed and logged by the caller and does not affect other orders.
    fn process(
        &self,
        ctx: &ProcessContext,
        order: Order,
    ) -> impl Future<Output = Result<()>> + Send;
}
