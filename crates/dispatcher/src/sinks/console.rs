//! ConsoleSink - writes one line per envelope

use std::io::{self, Write};

use contracts::{ContractError, DataSink, DeliveryError, Envelope};
use tracing::{info, instrument, warn};

/// Sink printing `<timestamp> <topic> => <payload>`
///
/// Never fails delivery; write errors are logged and the envelope is
/// considered handled.
pub struct ConsoleSink {
    name: String,
    writer: Box<dyn Write + Send>,
}

impl ConsoleSink {
    /// Console sink on stdout
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_writer(name, Box::new(io::stdout()))
    }

    pub fn with_writer(name: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }

    pub fn format_line(envelope: &Envelope) -> String {
        format!(
            "{} {} => {}",
            envelope.received_at(),
            envelope.topic(),
            envelope.payload_str()
        )
    }
}

impl DataSink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "console_sink_write",
        skip(self, envelope),
        fields(sink = %self.name, topic = envelope.topic())
    )]
    async fn write(&mut self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let line = Self::format_line(envelope);
        if let Err(e) = writeln!(self.writer, "{line}").and_then(|()| self.writer.flush()) {
            warn!(sink = %self.name, error = %e, "Console write failed");
        }
        Ok(())
    }

    #[instrument(name = "console_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.writer.flush()?;
        info!(sink = %self.name, "ConsoleSink closed");
        Ok(())
    }
}
