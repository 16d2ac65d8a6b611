//! JSONL framing over a split TCP stream.
//!
//! One JSON-RPC message per line. Reading and writing are separate halves
//! so a connection can read the next request while earlier calls are
//! still completing.

use std::io;

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use crate::rpc::error;
use crate::rpc::protocol::{RpcId, RpcRequest, RpcResponse};

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One decoded line.
#[derive(Debug)]
pub enum Frame {
    Request(RpcRequest),
    /// The line could not be used; the response explains why.
    Rejected(RpcResponse),
}

/// A line as cut by [`RequestLineCodec`].
#[derive(Debug, PartialEq, Eq)]
enum RawLine {
    Text(String),
    /// Longer than the frame limit; the rest of it is being discarded.
    TooLong,
    NotUtf8,
}

/// `LinesCodec` that reports bad lines as items instead of errors.
///
/// `FramedRead` stops yielding after the first decoder error, so an
/// over-long or non-UTF-8 line must not surface as one. `LinesCodec` has
/// already consumed the bad line (or switched to discarding) when it
/// reports these, so decoding can simply continue.
struct RequestLineCodec {
    lines: LinesCodec,
}

impl RequestLineCodec {
    fn new(max_frame_bytes: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_frame_bytes),
        }
    }

    fn classify(result: Result<Option<String>, LinesCodecError>) -> Result<Option<RawLine>, io::Error> {
        match result {
            Ok(line) => Ok(line.map(RawLine::Text)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(RawLine::TooLong)),
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => Ok(Some(RawLine::NotUtf8)),
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for RequestLineCodec {
    type Item = RawLine;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Self::classify(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Self::classify(self.lines.decode_eof(src))
    }
}

/// Reads JSON-RPC requests line by line.
pub struct FrameReader<R> {
    frames: FramedRead<R, RequestLineCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            frames: FramedRead::new(reader, RequestLineCodec::new(max_frame_bytes)),
        }
    }

    /// Read the next frame. Returns `Ok(None)` on EOF and skips empty lines.
    ///
    /// Over-long and non-UTF-8 lines come back as [`Frame::Rejected`] and
    /// reading continues with the next line.
    ///
    /// Cancel safe: nothing is consumed unless a whole line was decoded.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let line = match self.frames.next().await {
                None => return Ok(None),
                Some(Ok(RawLine::Text(line))) => line,
                Some(Ok(RawLine::TooLong)) => {
                    return Ok(Some(Frame::Rejected(RpcResponse::error(
                        None,
                        error::INVALID_REQUEST,
                        "Invalid request: frame too large",
                    ))));
                }
                Some(Ok(RawLine::NotUtf8)) => {
                    return Ok(Some(Frame::Rejected(RpcResponse::error(
                        None,
                        error::PARSE_ERROR,
                        "Parse error: line is not valid UTF-8",
                    ))));
                }
                Some(Err(e)) => return Err(TransportError::Io(e)),
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(decode(trimmed)));
        }
    }
}

fn decode(line: &str) -> Frame {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return Frame::Rejected(RpcResponse::error(
                None,
                error::PARSE_ERROR,
                format!("Parse error: {e}"),
            ))
        }
    };

    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RpcId>(id.clone()).ok());
    match serde_json::from_value::<RpcRequest>(value) {
        Ok(request) => Frame::Request(request),
        Err(e) => Frame::Rejected(RpcResponse::error(
            id,
            error::INVALID_REQUEST,
            format!("Invalid request: {e}"),
        )),
    }
}

/// Writes JSON-RPC responses as single lines.
pub struct FrameWriter<W> {
    sink: FramedWrite<W, LinesCodec>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            sink: FramedWrite::new(writer, LinesCodec::new()),
        }
    }

    pub async fn write_response(&mut self, response: &RpcResponse) -> Result<(), TransportError> {
        let json = serde_json::to_string(response)?;
        self.sink.send(json).await.map_err(|e| match e {
            LinesCodecError::Io(e) => TransportError::Io(e),
            LinesCodecError::MaxLineLengthExceeded => {
                TransportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, "line too long"))
            }
        })
    }

    /// Flush and close the write half.
    pub async fn close(mut self) -> Result<(), TransportError> {
        self.sink.get_mut().shutdown().await?;
        Ok(())
    }
}
