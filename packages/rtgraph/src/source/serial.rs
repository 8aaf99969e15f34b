// Serial port sample source (Unix-only)
//
// Opens a device (e.g. /dev/ttyUSB0, /dev/ttyACM0) at 8N1 and reads
// comma-separated numeric lines terminated by LF or CRLF, one sample per line:
//
//   0.12,3.4,-1.0
//
// Lines that do not parse, and lines longer than MAX_LINE_BYTES, are skipped
// and counted.

use super::SampleSource;
use crate::types::{SampleTuple, StreamError, StreamResult};
use async_trait::async_trait;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

/// Longest accepted line, terminator included
pub const MAX_LINE_BYTES: usize = 4096;

pub struct SerialSampleSource {
    port: String,
    baud_rate: u32,
    channel_count: usize,
    reader: Option<BufReader<SerialStream>>,
    opened_at: Option<Instant>,
    line: Vec<u8>,
    malformed_lines: u64,
}

impl SerialSampleSource {
    pub fn new(port: String, baud_rate: u32, channel_count: usize) -> Self {
        Self {
            port,
            baud_rate,
            channel_count,
            reader: None,
            opened_at: None,
            line: Vec::with_capacity(128),
            malformed_lines: 0,
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.opened_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Parse one line of comma-separated values into exactly `channel_count` floats
pub fn parse_line(line: &[u8], channel_count: usize) -> StreamResult<Vec<f64>> {
    let text = std::str::from_utf8(line)
        .map_err(|e| StreamError::Parse(format!("Invalid UTF-8: {}", e)))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(StreamError::Parse("Empty line".to_string()));
    }

    let values = trimmed
        .split(',')
        .map(|field| {
            let field = field.trim();
            field
                .parse::<f64>()
                .map_err(|_| StreamError::Parse(format!("Invalid number '{}'", field)))
        })
        .collect::<StreamResult<Vec<f64>>>()?;

    if values.len() != channel_count {
        return Err(StreamError::Parse(format!(
            "Expected {} fields, got {}",
            channel_count,
            values.len()
        )));
    }

    Ok(values)
}

/// Outcome of one bounded line read
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// A line (possibly without terminator at end of stream) is in the buffer
    Line,
    /// The line exceeded the limit; it was consumed up to its LF and dropped
    Overlong,
    /// End of stream, nothing read
    Eof,
}

/// Read up to and including the next LF, keeping at most `max_len` bytes
///
/// Bytes past the limit are consumed without being stored, so a device that
/// never sends a terminator cannot grow the buffer.
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>, max_len: usize) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut overlong = false;

    loop {
        let (found_newline, used) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(if overlong {
                    LineRead::Overlong
                } else if buf.is_empty() {
                    LineRead::Eof
                } else {
                    LineRead::Line
                });
            }

            let (found_newline, used) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, available.len()),
            };

            if !overlong {
                if buf.len() + used <= max_len {
                    buf.extend_from_slice(&available[..used]);
                } else {
                    overlong = true;
                    buf.clear();
                }
            }
            (found_newline, used)
        };
        reader.consume(used);

        if found_newline {
            return Ok(if overlong { LineRead::Overlong } else { LineRead::Line });
        }
    }
}

#[async_trait]
impl SampleSource for SerialSampleSource {
    async fn open(&mut self) -> StreamResult<()> {
        if self.reader.is_some() {
            return Ok(());
        }

        log::info!(
            "Opening serial port: {} at {} baud",
            self.port,
            self.baud_rate
        );

        let port = tokio_serial::new(&self.port, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| StreamError::Connection(format!("Failed to open {}: {}", self.port, e)))?;

        self.reader = Some(BufReader::new(port));
        self.opened_at = Some(Instant::now());
        self.malformed_lines = 0;
        log::info!("Serial port opened successfully");

        Ok(())
    }

    async fn read_next(&mut self) -> StreamResult<SampleTuple> {
        loop {
            let reader = self.reader.as_mut().ok_or(StreamError::SourceClosed)?;
            self.line.clear();

            match read_bounded_line(reader, &mut self.line, MAX_LINE_BYTES).await {
                Ok(LineRead::Eof) => {
                    log::warn!("Serial port {} closed unexpectedly", self.port);
                    self.reader = None;
                    return Err(StreamError::SourceClosed);
                }
                Ok(LineRead::Overlong) => {
                    self.malformed_lines += 1;
                    log::debug!("Skipping serial line longer than {} bytes", MAX_LINE_BYTES);
                }
                Ok(LineRead::Line) => {
                    let timestamp = self.elapsed_secs();
                    match parse_line(&self.line, self.channel_count) {
                        Ok(values) => return Ok(SampleTuple::new(timestamp, values)),
                        Err(e) => {
                            self.malformed_lines += 1;
                            log::debug!(
                                "Skipping serial line: {} (line: {:?})",
                                e,
                                String::from_utf8_lossy(&self.line).trim()
                            );
                        }
                    }
                }
                Err(e) => {
                    log::error!("Serial read error on {}: {}", self.port, e);
                    self.reader = None;
                    return Err(StreamError::Serial(format!("Read failed: {}", e)));
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.reader.take().is_some() {
            log::info!(
                "Closed serial port {} ({} malformed lines skipped)",
                self.port,
                self.malformed_lines
            );
        }
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn describe(&self) -> String {
        format!("serial {} @ {} baud", self.port, self.baud_rate)
    }
}
