//! Streaming codec for files holding one top-level JSON array.
//!
//! [`JsonArrayWriter`] emits `[`, the elements separated by `,`, then `]`.
//! [`JsonArrayReader`] yields one element at a time without holding more
//! than the element being scanned in memory.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::PipelineError;

const READ_CHUNK: usize = 8 * 1024;

pub struct JsonArrayWriter<W> {
    inner: W,
    started: bool,
    scratch: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> JsonArrayWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            started: false,
            scratch: Vec::new(),
        }
    }

    pub async fn write(&mut self, value: &Value) -> Result<(), PipelineError> {
        self.scratch.clear();
        self.scratch.push(if self.started { b',' } else { b'[' });
        serde_json::to_writer(&mut self.scratch, value)
            .map_err(|e| PipelineError::encode(format!("json: {e}")))?;
        self.started = true;
        self.inner.write_all(&self.scratch).await?;
        Ok(())
    }

    /// Closes the array and shuts the writer down.
    pub async fn finish(mut self) -> Result<W, PipelineError> {
        let tail: &[u8] = if self.started { b"]" } else { b"[]" };
        self.inner.write_all(tail).await?;
        self.inner.shutdown().await?;
        Ok(self.inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the opening `[`.
    Start,
    /// After `[` or `,`; `after_comma` rejects `,]`.
    BeforeElement { after_comma: bool },
    /// Inside an element that began at buffer offset `start`.
    InElement {
        start: usize,
        depth: usize,
        in_string: bool,
        escaped: bool,
    },
    /// After an element, expecting `,` or `]`.
    AfterElement,
    /// After the closing `]`; only whitespace may follow.
    Trailing,
    Done,
}

/// Incremental parser over a reader that yields a JSON array.
///
/// [`next_value`](Self::next_value) is cancel safe: all progress lives in
/// the struct and the only await point is a read into the internal buffer,
/// so dropping the future loses nothing.
pub struct JsonArrayReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
    /// Bytes discarded from the front of `buf`, for error offsets.
    consumed: usize,
    state: State,
}

enum Step {
    Element(Value),
    End,
    NeedInput,
}

impl<R: AsyncRead + Unpin> JsonArrayReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
            pos: 0,
            consumed: 0,
            state: State::Start,
        }
    }

    /// Returns the next element, or `None` once the array is closed and the
    /// input is exhausted.
    pub async fn next_value(&mut self) -> Result<Option<Value>, PipelineError> {
        loop {
            match self.scan()? {
                Step::Element(value) => return Ok(Some(value)),
                Step::End => return Ok(None),
                Step::NeedInput => {}
            }

            self.compact();
            self.buf.reserve(READ_CHUNK);
            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                return match self.state {
                    State::Trailing | State::Done => {
                        self.state = State::Done;
                        Ok(None)
                    }
                    State::Start => Err(PipelineError::decode(
                        "expected a JSON array, found end of input",
                    )),
                    _ => Err(PipelineError::decode(format!(
                        "unexpected end of input at byte {}",
                        self.offset()
                    ))),
                };
            }
        }
    }

    fn offset(&self) -> usize {
        self.consumed + self.pos
    }

    /// Drops bytes no longer needed, keeping a partially scanned element.
    fn compact(&mut self) {
        let keep_from = match self.state {
            State::InElement { start, .. } => start,
            _ => self.pos,
        };
        if keep_from == 0 {
            return;
        }
        self.buf.drain(..keep_from);
        self.consumed += keep_from;
        self.pos -= keep_from;
        if let State::InElement { start, .. } = &mut self.state {
            *start -= keep_from;
        }
    }

    fn skip_whitespace(&mut self) -> Option<u8> {
        while let Some(&b) = self.buf.get(self.pos) {
            if !b.is_ascii_whitespace() {
                return Some(b);
            }
            self.pos += 1;
        }
        None
    }

    fn unexpected(&self, found: u8, expected: &str) -> PipelineError {
        PipelineError::decode(format!(
            "expected {expected} at byte {}, found '{}'",
            self.offset(),
            char::from(found).escape_default()
        ))
    }

    fn scan(&mut self) -> Result<Step, PipelineError> {
        loop {
            match self.state {
                State::Done => return Ok(Step::End),
                State::Start => {
                    if self.buf[self.pos..].starts_with(b"\xEF\xBB\xBF") {
                        self.pos += 3;
                    }
                    match self.skip_whitespace() {
                        None => return Ok(Step::NeedInput),
                        Some(b'[') => {
                            self.pos += 1;
                            self.state = State::BeforeElement { after_comma: false };
                        }
                        Some(b) => return Err(self.unexpected(b, "a JSON array")),
                    }
                }
                State::BeforeElement { after_comma } => match self.skip_whitespace() {
                    None => return Ok(Step::NeedInput),
                    Some(b']') if !after_comma => {
                        self.pos += 1;
                        self.state = State::Trailing;
                    }
                    Some(b @ (b']' | b',')) => return Err(self.unexpected(b, "an array element")),
                    Some(_) => {
                        self.state = State::InElement {
                            start: self.pos,
                            depth: 0,
                            in_string: false,
                            escaped: false,
                        };
                    }
                },
                State::InElement { .. } => match self.scan_element()? {
                    Some(value) => {
                        self.state = State::AfterElement;
                        return Ok(Step::Element(value));
                    }
                    None => return Ok(Step::NeedInput),
                },
                State::AfterElement => match self.skip_whitespace() {
                    None => return Ok(Step::NeedInput),
                    Some(b',') => {
                        self.pos += 1;
                        self.state = State::BeforeElement { after_comma: true };
                    }
                    Some(b']') => {
                        self.pos += 1;
                        self.state = State::Trailing;
                    }
                    Some(b) => return Err(self.unexpected(b, "',' or ']'")),
                },
                State::Trailing => match self.skip_whitespace() {
                    // End of input is confirmed by `next_value`.
                    None => return Ok(Step::NeedInput),
                    Some(b) => return Err(self.unexpected(b, "end of input after ']'")),
                },
            }
        }
    }

    /// Advances through the current element; returns it once its last byte
    /// has been seen.
    fn scan_element(&mut self) -> Result<Option<Value>, PipelineError> {
        let State::InElement {
            start,
            mut depth,
            mut in_string,
            mut escaped,
        } = self.state
        else {
            return Ok(None);
        };

        let mut end = None;
        while let Some(&b) = self.buf.get(self.pos) {
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                    if depth == 0 {
                        end = Some(self.pos + 1);
                        self.pos += 1;
                        break;
                    }
                }
                self.pos += 1;
                continue;
            }

            match b {
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(self.pos + 1);
                        self.pos += 1;
                        break;
                    }
                }
                // Delimiters end a bare scalar without being part of it.
                b',' | b']' | b'}' if depth == 0 => {
                    end = Some(self.pos);
                    break;
                }
                b if depth == 0 && b.is_ascii_whitespace() => {
                    end = Some(self.pos);
                    break;
                }
                _ => {}
            }
            self.pos += 1;
        }

        let Some(end) = end else {
            self.state = State::InElement {
                start,
                depth,
                in_string,
                escaped,
            };
            return Ok(None);
        };

        serde_json::from_slice(&self.buf[start..end])
            .map(Some)
            .map_err(|e| {
                PipelineError::decode(format!(
                    "malformed element at byte {}: {e}",
                    self.consumed + start
                ))
            })
    }
}
