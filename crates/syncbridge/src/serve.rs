//! Line-oriented serve loop.
//!
//! Each input line carries one packet: a request object or an array of
//! requests. Each packet is answered with exactly one output line. Payload
//! errors are answered with a parse-error envelope and the loop continues;
//! a [`ConfigurationError`] stops the loop, since no later packet could
//! succeed either.

use std::io::{self, BufRead, Write};

use syncbridge_core::{ConfigurationError, Dispatcher, Packet, RpcResponse};
use thiserror::Error;
use tracing::debug;

use crate::health::HealthReporter;
use crate::payload::{self, Entry, PayloadError};

const SERVE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::serve");

/// Errors that stop the serve loop.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Reading a packet or writing a response failed.
    #[error("transport failed: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The dispatcher is missing a collaborator or saw a foreign envelope.
    #[error("dispatcher configuration error: {source}")]
    Configuration {
        /// Error reported by the dispatcher preflight.
        #[source]
        source: ConfigurationError,
    },
    /// A response could not be serialised.
    #[error("failed to encode response: {source}")]
    Encode {
        /// Underlying serialiser error.
        #[source]
        source: serde_json::Error,
    },
}

impl From<io::Error> for ServeError {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

/// Outcome of one answered packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSummary {
    /// Whether the packet was a batch.
    pub batch: bool,
    /// Number of requests answered.
    pub requests: usize,
    /// Number of responses carrying an error.
    pub errors: usize,
}

impl PacketSummary {
    fn of(responses: &Packet<RpcResponse>) -> Self {
        Self {
            batch: responses.is_batch(),
            requests: responses.len(),
            errors: responses
                .as_slice()
                .iter()
                .filter(|response| response.error().is_some())
                .count(),
        }
    }
}

/// Totals for one run of the serve loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Packets dispatched.
    pub packets: usize,
    /// Payloads answered with a parse error.
    pub rejected: usize,
}

/// Serves packets from `reader` until end of input.
///
/// # Errors
///
/// Returns [`ServeError`] when I/O fails, a response cannot be encoded, or
/// the dispatcher refuses a packet for a configuration problem.
pub fn serve<R, W>(
    dispatcher: &mut Dispatcher,
    reporter: &dyn HealthReporter,
    max_request_bytes: usize,
    mut reader: R,
    mut writer: W,
) -> Result<ServeSummary, ServeError>
where
    R: BufRead,
    W: Write,
{
    let mut summary = ServeSummary::default();
    let result = loop {
        let line = match read_line(&mut reader, max_request_bytes) {
            Ok(Line::End) => break Ok(summary),
            Ok(Line::Complete(bytes)) => payload::decode(&bytes, max_request_bytes),
            Ok(Line::Oversized(size)) => Err(PayloadError::TooLarge {
                size,
                limit: max_request_bytes,
            }),
            Err(error) => break Err(ServeError::from(error)),
        };
        let step = match line {
            Ok(packet) => answer(dispatcher, reporter, packet, &mut writer),
            Err(error) => reject(reporter, &error, &mut writer),
        };
        match step {
            Ok(Answer::Dispatched) => summary.packets += 1,
            Ok(Answer::Rejected) => summary.rejected += 1,
            Err(error) => break Err(error),
        }
    };
    if let Err(error) = &result {
        reporter.serve_failed(error);
    }
    result
}

enum Answer {
    Dispatched,
    Rejected,
}

fn answer<W: Write>(
    dispatcher: &mut Dispatcher,
    reporter: &dyn HealthReporter,
    packet: Packet<Entry>,
    writer: &mut W,
) -> Result<Answer, ServeError> {
    let responses = dispatch_entries(dispatcher, packet)
        .map_err(|source| ServeError::Configuration { source })?;
    let encoded = payload::encode(&responses).map_err(|source| ServeError::Encode { source })?;
    writer.write_all(&encoded)?;
    writer.flush()?;
    reporter.packet_completed(&PacketSummary::of(&responses));
    Ok(Answer::Dispatched)
}

/// Dispatches the well-formed requests of a packet and slots the envelopes
/// of rejected elements back in at their original positions.
fn dispatch_entries(
    dispatcher: &mut Dispatcher,
    packet: Packet<Entry>,
) -> Result<Packet<RpcResponse>, ConfigurationError> {
    let entries = match packet {
        Packet::Single(Entry::Request(request)) => {
            return dispatcher.dispatch(Packet::Single(request));
        }
        Packet::Single(Entry::Invalid(response)) => return Ok(Packet::Single(response)),
        Packet::Batch(entries) => entries,
    };
    let mut requests = Vec::with_capacity(entries.len());
    let mut slots = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Entry::Request(request) => {
                requests.push(request);
                slots.push(None);
            }
            Entry::Invalid(response) => slots.push(Some(response)),
        }
    }
    let mut answered = dispatcher.dispatch(Packet::Batch(requests))?.into_vec().into_iter();
    Ok(Packet::Batch(
        slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| answered.next()))
            .collect(),
    ))
}

fn reject<W: Write>(
    reporter: &dyn HealthReporter,
    error: &PayloadError,
    writer: &mut W,
) -> Result<Answer, ServeError> {
    reporter.packet_rejected(error);
    let encoded = payload::encode_value(&error.to_response())
        .map_err(|source| ServeError::Encode { source })?;
    writer.write_all(&encoded)?;
    writer.flush()?;
    Ok(Answer::Rejected)
}

enum Line {
    End,
    Complete(Vec<u8>),
    Oversized(usize),
}

/// Reads one line, buffering at most `limit` bytes plus the delimiter.
///
/// The rest of an oversized line is consumed and discarded so the next read
/// starts on a packet boundary.
fn read_line<R: BufRead>(reader: &mut R, limit: usize) -> io::Result<Line> {
    let mut buffer = Vec::new();
    let mut size = 0_usize;
    let mut terminated = false;
    loop {
        let available = match reader.fill_buf() {
            Ok(available) => available,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        if available.is_empty() {
            if size == 0 {
                return Ok(Line::End);
            }
            break;
        }
        let (chunk, complete) = match available.iter().position(|byte| *byte == b'\n') {
            Some(position) => (available.split_at(position + 1).0, true),
            None => (available, false),
        };
        let consumed = chunk.len();
        size += consumed;
        if size <= limit.saturating_add(1) {
            buffer.extend_from_slice(chunk);
        }
        reader.consume(consumed);
        if complete {
            terminated = true;
            break;
        }
    }

    let content = if terminated { size - 1 } else { size };
    if content > limit {
        debug!(target: SERVE_TARGET, size = content, limit, "discarded oversized payload");
        return Ok(Line::Oversized(content));
    }
    Ok(Line::Complete(buffer))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reads_lines_until_end_of_input() {
        let mut reader = Cursor::new(b"first\nsecond".to_vec());

        assert!(matches!(read_line(&mut reader, 64), Ok(Line::Complete(line)) if line == b"first\n"));
        assert!(matches!(read_line(&mut reader, 64), Ok(Line::Complete(line)) if line == b"second"));
        assert!(matches!(read_line(&mut reader, 64), Ok(Line::End)));
    }

    #[test]
    fn oversized_lines_are_skipped_whole() {
        let mut reader = Cursor::new(b"0123456789\nok\n".to_vec());

        assert!(matches!(read_line(&mut reader, 4), Ok(Line::Oversized(10))));
        assert!(matches!(read_line(&mut reader, 4), Ok(Line::Complete(line)) if line == b"ok\n"));
    }

    #[test]
    fn a_line_at_the_limit_is_accepted() {
        let mut reader = Cursor::new(b"abcd\n".to_vec());

        assert!(matches!(read_line(&mut reader, 4), Ok(Line::Complete(line)) if line == b"abcd\n"));
    }
}
