//! Incremental parsing of a streamed JSON dataset array.
//!
//! The upstream serves listing responses as one top-level JSON array that can
//! run to hundreds of megabytes. The scanner cuts complete elements out of the
//! byte stream as chunks arrive, so the consumer sees one record at a time and
//! the whole body is never buffered.

use crate::error::{UpstreamError, UpstreamResult};
use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, PartialEq, Eq)]
enum State {
    /// Before the opening bracket.
    Start,
    /// Inside the array, between elements.
    Between,
    /// Inside one element.
    Element,
    /// After the closing bracket.
    Done,
}

/// Splits a byte stream containing a JSON array into its top-level elements.
pub struct ArrayScanner {
    state: State,
    depth: usize,
    in_string: bool,
    escaped: bool,
    buf: Vec<u8>,
}

impl ArrayScanner {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            depth: 0,
            in_string: false,
            escaped: false,
            buf: Vec::new(),
        }
    }

    /// Feed a chunk; returns the elements completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> UpstreamResult<Vec<Vec<u8>>> {
        let mut complete = Vec::new();
        for &b in chunk {
            match self.state {
                State::Start => match b {
                    b'[' => self.state = State::Between,
                    b if b.is_ascii_whitespace() => {}
                    other => {
                        return Err(UpstreamError::MalformedResponse(format!(
                            "expected array, got byte 0x{other:02x}"
                        )));
                    }
                },
                State::Between => match b {
                    b']' => self.state = State::Done,
                    b',' => {}
                    b if b.is_ascii_whitespace() => {}
                    b'"' => {
                        self.state = State::Element;
                        self.in_string = true;
                        self.buf.push(b);
                    }
                    b'{' | b'[' => {
                        self.state = State::Element;
                        self.depth = 1;
                        self.buf.push(b);
                    }
                    other => {
                        // bare scalar element (number, true, null)
                        self.state = State::Element;
                        self.buf.push(other);
                    }
                },
                State::Element => {
                    if self.in_string {
                        self.buf.push(b);
                        if self.escaped {
                            self.escaped = false;
                        } else if b == b'\\' {
                            self.escaped = true;
                        } else if b == b'"' {
                            self.in_string = false;
                            if self.depth == 0 {
                                complete.push(std::mem::take(&mut self.buf));
                                self.state = State::Between;
                            }
                        }
                        continue;
                    }
                    match b {
                        b'"' => {
                            self.in_string = true;
                            self.buf.push(b);
                        }
                        b'{' | b'[' => {
                            self.depth += 1;
                            self.buf.push(b);
                        }
                        b'}' => {
                            self.depth = self.depth.saturating_sub(1);
                            self.buf.push(b);
                            if self.depth == 0 {
                                complete.push(std::mem::take(&mut self.buf));
                                self.state = State::Between;
                            }
                        }
                        b']' if self.depth == 0 => {
                            // closes the outer array after a scalar element
                            complete.push(std::mem::take(&mut self.buf));
                            self.state = State::Done;
                        }
                        b']' => {
                            self.depth -= 1;
                            self.buf.push(b);
                            if self.depth == 0 {
                                complete.push(std::mem::take(&mut self.buf));
                                self.state = State::Between;
                            }
                        }
                        b',' if self.depth == 0 => {
                            complete.push(std::mem::take(&mut self.buf));
                            self.state = State::Between;
                        }
                        b if b.is_ascii_whitespace() && self.depth == 0 => {
                            complete.push(std::mem::take(&mut self.buf));
                            self.state = State::Between;
                        }
                        other => self.buf.push(other),
                    }
                }
                State::Done => {
                    if !b.is_ascii_whitespace() {
                        return Err(UpstreamError::MalformedResponse(
                            "trailing data after array".to_string(),
                        ));
                    }
                }
            }
        }
        Ok(complete)
    }

    /// Assert the stream ended with a complete array.
    pub fn finish(&self) -> UpstreamResult<()> {
        if self.state == State::Done {
            Ok(())
        } else {
            Err(UpstreamError::MalformedResponse(
                "truncated array stream".to_string(),
            ))
        }
    }
}

impl Default for ArrayScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the response body to completion, pushing one record at a time.
///
/// Stops early when the consumer drops its receiver; stream-level failures go
/// to the error channel and end the task.
pub(crate) async fn produce(
    mut response: reqwest::Response,
    records: mpsc::Sender<Value>,
    errors: mpsc::Sender<UpstreamError>,
) {
    let mut scanner = ArrayScanner::new();
    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                let _ = errors.send(err.into()).await;
                return;
            }
        };
        let elements = match scanner.feed(&chunk) {
            Ok(elements) => elements,
            Err(err) => {
                let _ = errors.send(err).await;
                return;
            }
        };
        for raw in elements {
            let value: Value = match serde_json::from_slice(&raw) {
                Ok(value) => value,
                Err(err) => {
                    let _ = errors
                        .send(UpstreamError::MalformedResponse(err.to_string()))
                        .await;
                    return;
                }
            };
            if records.send(value).await.is_err() {
                // consumer hung up; stop reading
                return;
            }
        }
    }
    if let Err(err) = scanner.finish() {
        let _ = errors.send(err).await;
    }
}
