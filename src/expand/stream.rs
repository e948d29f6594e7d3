//! Streaming text consumer

use std::pin::{Pin, pin};

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::cancel::CancelScope;
use super::decoder::{DecodeError, Utf8Decoder};

/// Raw response body as delivered by the network layer
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Why a generation stream did not produce a complete text
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The owning scope was revoked. Not a failure.
    #[error("request cancelled")]
    Cancelled,

    #[error("{}", transport_message(.status, .detail))]
    Transport { status: Option<u16>, detail: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

fn transport_message(status: &Option<u16>, detail: &str) -> String {
    match status {
        Some(status) => format!("backend returned HTTP {status}: {detail}"),
        None => format!("transport error: {detail}"),
    }
}

impl StreamError {
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            detail: detail.into(),
        }
    }

    pub fn status(status: u16, detail: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

struct FragmentState<S> {
    stream: S,
    scope: CancelScope,
    decoder: Utf8Decoder,
    done: bool,
}

enum Step {
    Cancelled,
    Next(Option<Result<Bytes, StreamError>>),
}

/// Turn a byte stream into decoded text fragments in arrival order.
///
/// The sequence is lazy and ends after the first error. Once `scope` is
/// cancelled no further chunk is read and a single
/// [`StreamError::Cancelled`] is yielded.
pub fn fragments<S>(stream: S, scope: CancelScope) -> impl Stream<Item = Result<String, StreamError>>
where
    S: Stream<Item = Result<Bytes, StreamError>> + Unpin,
{
    let state = FragmentState {
        stream,
        scope,
        decoder: Utf8Decoder::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        loop {
            let step = tokio::select! {
                biased;
                () = st.scope.cancelled() => Step::Cancelled,
                next = st.stream.next() => Step::Next(next),
            };

            match step {
                Step::Cancelled => {
                    st.done = true;
                    return Some((Err(StreamError::Cancelled), st));
                }
                Step::Next(Some(Ok(chunk))) => match st.decoder.decode(&chunk) {
                    Ok(text) if text.is_empty() => {}
                    Ok(text) => return Some((Ok(text), st)),
                    Err(e) => {
                        st.done = true;
                        return Some((Err(e.into()), st));
                    }
                },
                Step::Next(Some(Err(e))) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                Step::Next(None) => {
                    st.done = true;
                    let decoder = std::mem::take(&mut st.decoder);
                    return match decoder.finish() {
                        Ok(()) => None,
                        Err(e) => Some((Err(e.into()), st)),
                    };
                }
            }
        }
    })
}

/// Read `stream` to the end, calling `on_fragment` for every decoded piece.
///
/// Returns the assembled text on normal close. After cancellation the
/// callback is never invoked again.
pub async fn consume_stream<S, F>(
    stream: S,
    scope: &CancelScope,
    mut on_fragment: F,
) -> Result<String, StreamError>
where
    S: Stream<Item = Result<Bytes, StreamError>> + Unpin,
    F: FnMut(&str),
{
    let mut pieces = pin!(fragments(stream, scope.clone()));
    let mut assembled = String::new();

    while let Some(piece) = pieces.next().await {
        let text = piece?;
        if scope.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        on_fragment(&text);
        assembled.push_str(&text);
    }

    Ok(assembled)
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn text_chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, StreamError>> + Unpin {
        let items: Vec<_> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        stream::iter(items)
    }

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes, StreamError>> + Unpin {
        let items: Vec<_> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(items)
    }

    #[tokio::test]
    async fn fragments_arrive_in_order() {
        let scope = CancelScope::new();
        let mut seen = Vec::new();

        let text = consume_stream(text_chunks(&["A", "B", "C"]), &scope, |f| {
            seen.push(f.to_string())
        })
        .await
        .unwrap();

        assert_eq!(text, "ABC");
        assert_eq!(seen, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn multibyte_split_across_chunks() {
        let bytes = "¿qué?".as_bytes();
        let scope = CancelScope::new();
        let mut seen = Vec::new();

        let text = consume_stream(chunks(&[&bytes[..1], &bytes[1..4], &bytes[4..]]), &scope, |f| {
            seen.push(f.to_string())
        })
        .await
        .unwrap();

        assert_eq!(text, "¿qué?");
        // First chunk holds only half of '¿', so no fragment is emitted for it
        assert_eq!(seen.concat(), "¿qué?");
        assert!(seen.iter().all(|f| !f.is_empty()));
    }

    #[tokio::test]
    async fn cancelled_scope_stops_before_reading() {
        let scope = CancelScope::new();
        scope.cancel();
        let mut calls = 0;

        let result = consume_stream(text_chunks(&["A"]), &scope, |_| calls += 1).await;

        assert!(matches!(result, Err(StreamError::Cancelled)));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn cancellation_mid_stream_silences_callback() {
        let (tx, rx) = flume::unbounded::<Result<Bytes, StreamError>>();
        let scope = CancelScope::new();
        let canceller = scope.clone();
        tx.send(Ok(Bytes::from_static(b"first"))).unwrap();

        let mut seen = Vec::new();
        let result = consume_stream(Box::pin(rx.into_stream()), &scope, |f| {
            seen.push(f.to_string());
            canceller.cancel();
            let _ = tx.send(Ok(Bytes::from_static(b"second")));
        })
        .await;

        assert!(result.unwrap_err().is_cancellation());
        assert_eq!(seen, vec!["first"]);
    }

    #[tokio::test]
    async fn transport_error_is_surfaced() {
        let scope = CancelScope::new();
        let items = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(StreamError::transport("connection reset")),
        ];

        let result = consume_stream(stream::iter(items), &scope, |_| {}).await;

        match result {
            Err(StreamError::Transport { status, detail }) => {
                assert_eq!(status, None);
                assert_eq!(detail, "connection reset");
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_character_is_a_decode_error() {
        let scope = CancelScope::new();
        let result = consume_stream(chunks(&[&"é".as_bytes()[..1]]), &scope, |_| {}).await;
        assert!(matches!(
            result,
            Err(StreamError::Decode(DecodeError::Truncated { pending: 1 }))
        ));
    }

    #[test]
    fn transport_display_includes_status() {
        let err = StreamError::status(502, "bad gateway");
        assert_eq!(err.to_string(), "backend returned HTTP 502: bad gateway");
        assert!(!err.is_cancellation());
    }
}
