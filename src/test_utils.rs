pub mod test_helpers {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, PoisonError};

    use async_trait::async_trait;
    use bytes::Bytes;
    use flume::{Receiver, Sender};
    use tokio::sync::Notify;

    use crate::deck::{BoundingBox, Deck, Element, Slide, SlideCache, SlideNumber};
    use crate::expand::{ByteStream, ExpandRequest, ExpansionBackend, StreamError};

    /// Deck of `count` plain slides numbered from 1
    pub fn deck_of(count: u32) -> Deck {
        let slides = (1..=count)
            .map(|n| Slide::new(n, format!("Slide {n} source")))
            .collect();
        // Numbers are contiguous and unique
        Deck::new(slides).unwrap_or_else(|e| panic!("invalid test deck: {e}"))
    }

    pub fn cache_of(count: u32) -> SlideCache {
        SlideCache::new(deck_of(count))
    }

    /// Elements with ids 0.. and small boxes stacked down the slide
    pub fn elements(texts: &[&str]) -> Vec<Element> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let top = i as f64 * 100.0;
                Element {
                    id: i as u32,
                    text: (*text).to_string(),
                    bounding_box: BoundingBox::new(top, 50.0, top + 80.0, 950.0),
                }
            })
            .collect()
    }

    enum Script {
        Chunks(Vec<Bytes>),
        Status(u16, String),
        Live(Receiver<Result<Bytes, StreamError>>),
    }

    /// Handle feeding a response that stays open until told otherwise
    pub struct LiveResponse {
        tx: Sender<Result<Bytes, StreamError>>,
    }

    impl LiveResponse {
        pub fn send(&self, text: &str) {
            let _ = self.tx.send(Ok(Bytes::copy_from_slice(text.as_bytes())));
        }

        pub fn send_bytes(&self, bytes: &[u8]) {
            let _ = self.tx.send(Ok(Bytes::copy_from_slice(bytes)));
        }

        /// Break the connection mid-body
        pub fn fail(self, detail: &str) {
            let _ = self.tx.send(Err(StreamError::transport(detail)));
        }

        /// Close the body normally
        pub fn finish(self) {}
    }

    /// Backend answering from per-slide scripts.
    ///
    /// Slides without a script get a one-chunk default explanation.
    #[derive(Default)]
    pub struct ScriptedBackend {
        scripts: Mutex<HashMap<SlideNumber, VecDeque<Script>>>,
        requests: Mutex<Vec<ExpandRequest>>,
        requested: Notify,
    }

    impl ScriptedBackend {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        #[must_use]
        pub fn default_text(slide: SlideNumber) -> String {
            format!("Explanation for slide {slide}")
        }

        fn push(&self, slide: SlideNumber, script: Script) {
            self.scripts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(slide)
                .or_default()
                .push_back(script);
        }

        /// Next request for `slide` streams these chunks then closes
        pub fn respond(&self, slide: SlideNumber, chunks: &[&str]) {
            let chunks = chunks
                .iter()
                .map(|c| Bytes::copy_from_slice(c.as_bytes()))
                .collect();
            self.push(slide, Script::Chunks(chunks));
        }

        pub fn respond_bytes(&self, slide: SlideNumber, chunks: &[&[u8]]) {
            let chunks = chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect();
            self.push(slide, Script::Chunks(chunks));
        }

        /// Next request for `slide` is rejected with an HTTP status
        pub fn fail(&self, slide: SlideNumber, status: u16) {
            self.push(slide, Script::Status(status, "scripted failure".to_string()));
        }

        /// Next request for `slide` is driven by the returned handle
        pub fn live(&self, slide: SlideNumber) -> LiveResponse {
            let (tx, rx) = flume::unbounded();
            self.push(slide, Script::Live(rx));
            LiveResponse { tx }
        }

        pub fn requests(&self) -> Vec<ExpandRequest> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn requested_slides(&self) -> Vec<SlideNumber> {
            self.requests().iter().map(|r| r.slide_number).collect()
        }

        /// Wait until at least `count` requests have been opened
        pub async fn wait_for_requests(&self, count: usize) {
            loop {
                let notified = self.requested.notified();
                if self.requests().len() >= count {
                    return;
                }
                notified.await;
            }
        }
    }

    #[async_trait]
    impl ExpansionBackend for ScriptedBackend {
        async fn open_stream(&self, request: &ExpandRequest) -> Result<ByteStream, StreamError> {
            let slide = request.slide_number;
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());
            self.requested.notify_waiters();

            let script = self
                .scripts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_mut(&slide)
                .and_then(VecDeque::pop_front);

            match script {
                None => {
                    let body = Bytes::from(Self::default_text(slide));
                    Ok(Box::pin(futures::stream::iter([Ok::<_, StreamError>(body)])))
                }
                Some(Script::Chunks(chunks)) => {
                    Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok::<_, StreamError>))))
                }
                Some(Script::Status(status, detail)) => Err(StreamError::status(status, detail)),
                Some(Script::Live(rx)) => Ok(Box::pin(rx.into_stream())),
            }
        }
    }
}
