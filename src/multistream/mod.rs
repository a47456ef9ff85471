// Copyright 2023 litep2p developers
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! `/multistream/1.0.0` protocol negotiation.
//!
//! Selects one protocol from an ordered list proposed by the dialer against
//! the set offered by the listener. Messages are varint-length-prefixed ASCII
//! lines terminated by `\n`; `na` and `ls` are reserved in-band control
//! strings.

use crate::{
    codec,
    error::{Error, FramingError, NegotiationError},
    types::{ProtocolName, MULTISTREAM_PROTOCOL},
};

use futures::{AsyncRead, AsyncWrite, AsyncWriteExt};

use std::io;

/// Logging target for the file.
const LOG_TARGET: &str = "multistream-select";

/// Maximum length of a negotiation line, terminating newline included.
const MAX_LINE_LENGTH: usize = 1024;

/// Listener's rejection of the proposed protocol.
const MSG_NA: &str = "na";

/// Dialer's request for the listener's protocol list.
const MSG_LS: &str = "ls";

/// Encode `line` as a length-prefixed, newline-terminated message.
fn encode_line(line: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(line.len() + 1);
    message.extend_from_slice(line.as_bytes());
    message.push(b'\n');

    codec::encode_length_prefixed(&message)
}

/// Read one negotiation line, verifying it is ASCII and newline-terminated.
async fn read_line<S: AsyncRead + Unpin>(io: &mut S) -> crate::Result<String> {
    let frame = codec::read_length_prefixed(io, MAX_LINE_LENGTH)
        .await
        .map_err(|error| match error {
            Error::Io(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                Error::Negotiation(NegotiationError::UnexpectedEof)
            }
            Error::Framing(FramingError::OversizedFrame { .. }) => {
                Error::Negotiation(NegotiationError::MalformedLine)
            }
            error => error,
        })?;

    match frame.split_last() {
        Some((b'\n', line)) if line.is_ascii() => String::from_utf8(line.to_vec())
            .map_err(|_| Error::Negotiation(NegotiationError::MalformedLine)),
        _ => Err(Error::Negotiation(NegotiationError::MalformedLine)),
    }
}

/// Negotiate a protocol as the dialer, proposing `protocols` in order.
///
/// The header and the first candidate are sent in a single write without
/// waiting for the listener's header, eliminating one round-trip on the
/// common path.
pub async fn dialer_select<S: AsyncRead + AsyncWrite + Unpin>(
    io: &mut S,
    protocols: &[ProtocolName],
) -> crate::Result<ProtocolName> {
    let (first, rest) = protocols
        .split_first()
        .ok_or(Error::InvalidArgument("no protocols to propose"))?;

    tracing::trace!(target: LOG_TARGET, ?protocols, "propose protocols");

    let mut initial = encode_line(MULTISTREAM_PROTOCOL);
    initial.extend_from_slice(&encode_line(first.as_str()));
    io.write_all(&initial).await?;
    io.flush().await?;

    if read_line(io).await? != MULTISTREAM_PROTOCOL {
        return Err(Error::Negotiation(NegotiationError::HeaderMismatch));
    }

    let mut candidates = rest.iter();
    let mut current = first.clone();

    loop {
        let response = read_line(io).await?;

        match response.as_str() {
            response if response == current.as_str() => {
                tracing::trace!(target: LOG_TARGET, protocol = ?current, "protocol negotiated");
                return Ok(current);
            }
            MSG_NA => match candidates.next() {
                Some(next) => {
                    tracing::trace!(
                        target: LOG_TARGET,
                        rejected = ?current,
                        next = ?next,
                        "listener rejected protocol, try next",
                    );

                    current = next.clone();
                    io.write_all(&encode_line(current.as_str())).await?;
                    io.flush().await?;
                }
                None => return Err(Error::Negotiation(NegotiationError::NoMutualProtocol)),
            },
            // A list response is not meaningful to an outbound-only dialer.
            MSG_LS => continue,
            _ => return Err(Error::Negotiation(NegotiationError::MalformedLine)),
        }
    }
}

/// Negotiate a protocol as the listener, accepting the first proposal found
/// in `protocols`.
pub async fn listener_select<S: AsyncRead + AsyncWrite + Unpin>(
    io: &mut S,
    protocols: &[ProtocolName],
) -> crate::Result<ProtocolName> {
    if read_line(io).await? != MULTISTREAM_PROTOCOL {
        return Err(Error::Negotiation(NegotiationError::HeaderMismatch));
    }

    io.write_all(&encode_line(MULTISTREAM_PROTOCOL)).await?;
    io.flush().await?;

    loop {
        let proposal = read_line(io).await?;

        if proposal == MSG_LS {
            let mut listing = Vec::new();
            for protocol in protocols {
                listing.extend_from_slice(&encode_line(protocol.as_str()));
            }
            io.write_all(&listing).await?;
            io.flush().await?;
            continue;
        }

        if !proposal.starts_with('/') {
            return Err(Error::Negotiation(NegotiationError::MalformedLine));
        }

        match protocols.iter().find(|protocol| protocol.as_str() == proposal) {
            Some(protocol) => {
                tracing::trace!(target: LOG_TARGET, ?protocol, "protocol negotiated");

                io.write_all(&encode_line(protocol.as_str())).await?;
                io.flush().await?;
                return Ok(protocol.clone());
            }
            None => {
                tracing::trace!(target: LOG_TARGET, ?proposal, "unsupported protocol");

                io.write_all(&encode_line(MSG_NA)).await?;
                io.flush().await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_ringbuf::Endpoint;

    fn protocols(names: &[&str]) -> Vec<ProtocolName> {
        names.iter().map(|name| ProtocolName::from(*name)).collect()
    }

    #[tokio::test]
    async fn first_mutual_protocol_selected() {
        let (mut dialer, mut listener) = Endpoint::pair(8192, 8192);
        let offered = protocols(&["/noise", "/tls/1.0.0"]);

        let handle =
            tokio::spawn(async move { listener_select(&mut listener, &offered).await });

        let selected = dialer_select(&mut dialer, &protocols(&["/noise"])).await.unwrap();
        assert_eq!(selected.as_str(), "/noise");
        assert_eq!(handle.await.unwrap().unwrap().as_str(), "/noise");
    }

    #[tokio::test]
    async fn dialer_falls_back_in_preference_order() {
        let (mut dialer, mut listener) = Endpoint::pair(8192, 8192);
        let offered = protocols(&["/mplex/6.7.0"]);

        let handle =
            tokio::spawn(async move { listener_select(&mut listener, &offered).await });

        let selected = dialer_select(&mut dialer, &protocols(&["/yamux/1.0.0", "/mplex/6.7.0"]))
            .await
            .unwrap();
        assert_eq!(selected.as_str(), "/mplex/6.7.0");
        assert_eq!(handle.await.unwrap().unwrap().as_str(), "/mplex/6.7.0");
    }

    #[tokio::test]
    async fn disjoint_sets_fail_negotiation() {
        let (mut dialer, mut listener) = Endpoint::pair(8192, 8192);
        let offered = protocols(&["/tls/1.0.0"]);

        let _handle =
            tokio::spawn(async move { listener_select(&mut listener, &offered).await });

        match dialer_select(&mut dialer, &protocols(&["/noise"])).await {
            Err(Error::Negotiation(NegotiationError::NoMutualProtocol)) => {}
            result => panic!("expected no mutual protocol, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn bad_header_fails_negotiation() {
        let (mut dialer, mut listener) = Endpoint::pair(8192, 8192);

        tokio::spawn(async move {
            let _ = read_line(&mut listener).await;
            let _ = read_line(&mut listener).await;
            listener.write_all(&encode_line("/multistream/2.0.0")).await.unwrap();
            listener.flush().await.unwrap();
        });

        match dialer_select(&mut dialer, &protocols(&["/noise"])).await {
            Err(Error::Negotiation(NegotiationError::HeaderMismatch)) => {}
            result => panic!("expected header mismatch, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn line_length_boundary() {
        // 1023 bytes of protocol plus the newline is exactly the 1024-byte cap.
        let max_protocol = format!("/{}", "a".repeat(1022));
        let encoded = encode_line(&max_protocol);

        let (mut dialer, mut listener) = Endpoint::pair(8192, 8192);
        tokio::spawn(async move {
            listener.write_all(&encoded).await.unwrap();
            listener.flush().await.unwrap();
        });
        assert_eq!(read_line(&mut dialer).await.unwrap(), max_protocol);

        let over_protocol = format!("/{}", "a".repeat(1023));
        let encoded = encode_line(&over_protocol);

        let (mut dialer, mut listener) = Endpoint::pair(8192, 8192);
        tokio::spawn(async move {
            listener.write_all(&encoded).await.unwrap();
            listener.flush().await.unwrap();
        });
        match read_line(&mut dialer).await {
            Err(Error::Negotiation(NegotiationError::MalformedLine)) => {}
            result => panic!("expected malformed line, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn missing_newline_is_malformed() {
        let (mut dialer, mut listener) = Endpoint::pair(8192, 8192);

        tokio::spawn(async move {
            listener
                .write_all(&codec::encode_length_prefixed(b"/noise"))
                .await
                .unwrap();
            listener.flush().await.unwrap();
        });

        match read_line(&mut dialer).await {
            Err(Error::Negotiation(NegotiationError::MalformedLine)) => {}
            result => panic!("expected malformed line, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn eof_mid_negotiation() {
        let (mut dialer, listener) = Endpoint::pair(8192, 8192);
        drop(listener);

        match dialer_select(&mut dialer, &protocols(&["/noise"])).await {
            Err(Error::Negotiation(NegotiationError::UnexpectedEof)) => {}
            // Writing the optimistic proposal may also observe the closed pipe.
            Err(Error::Io(_)) => {}
            result => panic!("expected eof, got {result:?}"),
        }
    }
}
