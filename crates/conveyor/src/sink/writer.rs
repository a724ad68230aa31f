//! Line-oriented output sink.
//!
//! [`WriterSink`] turns every order into a single human-readable line on an
//! [`std::io::Write`]. The binary uses it over stdout; tests use it over a
//! `Vec<u8>`.

use conveyor_core::{Error, Order, OrderProcessor, ProcessContext, Result};
use core::time::Duration;
use parking_lot::Mutex;
use std::io::{self, Write};
use tracing::Instrument;

/// Writes one line per processed order.
///
/// Lines from concurrent workers never interleave: each write happens under
/// a short-lived lock, and the lock is never held across an await point.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
    delay: Duration,
}

/// The sink used by the `conveyor` binary.
pub type StdoutSink = WriterSink<io::Stdout>;

impl StdoutSink {
    pub fn stdout(delay: Duration) -> Self {
        Self::new(io::stdout(), delay)
    }
}

impl<W> WriterSink<W> {
    /// `delay` simulates the cost of the I/O and is paid before every write.
    pub fn new(writer: W, delay: Duration) -> Self {
        Self {
            writer: Mutex::new(writer),
            delay,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

/// Formats the line written for `order`.
pub fn render(order: &Order) -> String {
    format!(
        "Order processed successfully: ID {}, Value {}",
        order.id, order.value
    )
}

impl<W> WriterSink<W>
where
    W: Write,
{
    fn write_line(&self, order: &Order, line: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|e| Error::processing(order.id, e.to_string()))
    }
}

impl<W> OrderProcessor for WriterSink<W>
where
    W: Write + Send + 'static,
{
    async fn process(&self, ctx: &ProcessContext, order: Order) -> Result<()> {
        let span = tracing::info_span!(
            parent: ctx.span(),
            "LogToStdout",
            log.message = tracing::field::Empty,
        );

        async {
            tokio::time::sleep(self.delay).await;

            let line = render(&order);
            self.write_line(&order, &line)?;
            tracing::Span::current().record("log.message", line.as_str());

            Ok(())
        }
        .instrument(span)
        .await
    }
}
