//! Expansion service - owns the slide cache and schedules generation work

use std::sync::Arc;

use flume::{Receiver, Sender};
use log::{debug, error, info, warn};
use tokio::runtime::Handle;

use super::backend::ExpansionBackend;
use super::cancel::CancelScope;
use super::prefetch::{DEFAULT_LOOKAHEAD, InFlight, PrefetchBatch};
use super::request::{
    ExpandRequest, GenerationEvent, GenerationPreferences, RequestId, RequestKind,
};
use super::state::{Command, Effect, ExpansionState, RequestState};
use super::stream::{StreamError, consume_stream};
use crate::deck::{FieldUpdate, SlideCache, SlideNumber, SlideRecord, derive_annotations};

/// Shown in place of the explanation when the active request fails
pub const ERROR_DOCUMENT: &str = "# Explanation unavailable\n\n\
The explanation for this slide could not be generated. \
Check that the backend is reachable, then revisit the slide to try again.\n";

/// Static configuration of the service
#[derive(Clone, Debug)]
pub struct ExpansionConfig {
    /// Topic label sent with every request
    pub topic: String,
    /// Slides prefetched after the active one
    pub lookahead: usize,
    pub preferences: GenerationPreferences,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            topic: "General".to_string(),
            lookahead: DEFAULT_LOOKAHEAD,
            preferences: GenerationPreferences::default(),
        }
    }
}

/// Transient render state for the displayed slide. Never cached.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub slide: Option<SlideNumber>,
    pub content: String,
    pub loading: bool,
    pub is_error: bool,
}

/// Result of a navigation request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Content served from cache, no request issued
    Cached,
    /// Streaming request issued
    Requested(RequestId),
}

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("no slide numbered {0}")]
    UnknownSlide(SlideNumber),
}

/// Change applied to the service, reported to the caller for rendering
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    /// Text appended to the display
    Fragment { slide: SlideNumber, text: String },
    /// Active request finished and its result was cached
    Completed { slide: SlideNumber },
    /// Active request failed; the display shows [`ERROR_DOCUMENT`]
    Failed { slide: SlideNumber, message: String },
    /// Background request filled the cache
    Prefetched { slide: SlideNumber },
    /// Background request failed; the batch moved on
    PrefetchFailed { slide: SlideNumber, message: String },
}

#[derive(Debug)]
struct ActiveRequest {
    id: RequestId,
    slide: SlideNumber,
    scope: CancelScope,
}

/// Orchestrates streamed generation requests against the slide cache.
///
/// All cache and display mutation happens on the owner's side, inside
/// [`navigate`](Self::navigate), [`edit_notes`](Self::edit_notes) and while
/// applying events in [`poll_updates`](Self::poll_updates) /
/// [`next_update`](Self::next_update). Spawned tasks only perform I/O and
/// report back through a channel tagged with their [`RequestId`]; events
/// for requests that are no longer active are dropped.
pub struct ExpansionService<B: ExpansionBackend> {
    backend: Arc<B>,
    cache: SlideCache,
    config: ExpansionConfig,
    state: ExpansionState,
    display: DisplayState,
    active: Option<ActiveRequest>,
    background: Option<PrefetchBatch>,
    event_tx: Sender<GenerationEvent>,
    event_rx: Receiver<GenerationEvent>,
    next_request_id: u64,
    runtime: Handle,
}

impl<B: ExpansionBackend> ExpansionService<B> {
    /// Create a service; requests are spawned on `runtime`
    #[must_use]
    pub fn new(cache: SlideCache, backend: Arc<B>, config: ExpansionConfig, runtime: Handle) -> Self {
        let (event_tx, event_rx) = flume::unbounded();
        Self {
            backend,
            cache,
            config,
            state: ExpansionState::new(),
            display: DisplayState::default(),
            active: None,
            background: None,
            event_tx,
            event_rx,
            next_request_id: 1,
            runtime,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &SlideCache {
        &self.cache
    }

    #[must_use]
    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    #[must_use]
    pub fn current_slide(&self) -> Option<SlideNumber> {
        self.state.current
    }

    #[must_use]
    pub fn current_record(&self) -> Option<&Arc<SlideRecord>> {
        self.state.current.and_then(|n| self.cache.get(n))
    }

    #[must_use]
    pub fn request_state(&self) -> RequestState {
        self.state.request
    }

    #[must_use]
    pub fn is_prefetching(&self) -> bool {
        self.background
            .as_ref()
            .is_some_and(|b| b.in_flight().is_some())
    }

    /// True while a request whose result will be applied is outstanding
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.active.is_some() || self.is_prefetching()
    }

    /// Slide number `offset` positions away from the current one in deck order.
    /// With no current slide only a forward step resolves, to the first slide.
    #[must_use]
    pub fn neighbour(&self, offset: isize) -> Option<SlideNumber> {
        let index = match self.state.current {
            Some(current) => self.cache.index_of(current)?.checked_add_signed(offset)?,
            None if offset > 0 => 0,
            None => return None,
        };
        self.cache.get_at(index).map(|r| r.number())
    }

    /// Navigate to a slide.
    ///
    /// Outstanding active and background work is cancelled before anything
    /// else happens. A cached slide is rendered synchronously; otherwise a
    /// streaming request is issued.
    pub fn navigate(&mut self, slide: SlideNumber) -> Result<NavigationOutcome, NavigationError> {
        let record = self
            .cache
            .get(slide)
            .ok_or(NavigationError::UnknownSlide(slide))?;
        let cmd = Command::Navigate {
            slide,
            cached: record.is_expanded(),
            needs_backfill: record.needs_annotation_backfill(),
        };
        info!("Navigate to slide {slide}");

        let effects = self.state.apply(cmd);
        self.execute_effects(effects);

        Ok(match &self.active {
            Some(active) if active.slide == slide && self.state.request.is_in_flight() => {
                NavigationOutcome::Requested(active.id)
            }
            _ => NavigationOutcome::Cached,
        })
    }

    /// Replace a slide's explanation with hand-edited notes.
    ///
    /// The edit wins over generation: an active request for the same slide
    /// is cancelled, and a prefetch batch currently fetching it is restarted
    /// so the late result is never written.
    pub fn edit_notes(&mut self, slide: SlideNumber, content: String) -> Result<(), NavigationError> {
        let elements = self
            .cache
            .get(slide)
            .ok_or(NavigationError::UnknownSlide(slide))?
            .slide
            .elements
            .clone();

        let effects = self.state.apply(Command::Edited(slide));
        self.execute_effects(effects);

        let batch_hit = self
            .background
            .as_ref()
            .and_then(PrefetchBatch::in_flight)
            .is_some_and(|f| f.slide == slide);

        self.cache.update_fields(
            slide,
            FieldUpdate::expansion(content.clone(), derive_annotations(&elements)),
        );
        info!("Notes for slide {slide} edited by hand");

        if self.display.slide == Some(slide) {
            self.display = DisplayState {
                slide: Some(slide),
                content,
                loading: false,
                is_error: false,
            };
        }

        if batch_hit {
            if let Some(old) = self.background.take() {
                old.cancel();
                debug!("Restarting prefetch batch after edit of slide {slide}");
                self.background = Some(old.restarted());
                self.advance_prefetch();
            }
        }
        Ok(())
    }

    /// Apply every event that has already arrived, without waiting
    pub fn poll_updates(&mut self) -> Vec<Update> {
        let mut updates = vec![];
        while let Ok(event) = self.event_rx.try_recv() {
            if let Some(update) = self.apply_event(event) {
                updates.push(update);
            }
        }
        updates
    }

    /// Wait for the next event that changes state.
    ///
    /// Returns `None` once nothing relevant is outstanding. Cancel-safe:
    /// dropping the future loses no event.
    pub async fn next_update(&mut self) -> Option<Update> {
        loop {
            while let Ok(event) = self.event_rx.try_recv() {
                if let Some(update) = self.apply_event(event) {
                    return Some(update);
                }
            }
            if !self.has_pending_work() {
                return None;
            }
            let event = self.event_rx.recv_async().await.ok()?;
            if let Some(update) = self.apply_event(event) {
                return Some(update);
            }
        }
    }

    /// Cancel everything outstanding
    pub fn shutdown(&mut self) {
        let effects = self.state.apply(Command::Shutdown);
        self.execute_effects(effects);
    }

    fn apply_event(&mut self, event: GenerationEvent) -> Option<Update> {
        let id = event.id();
        if self.active.as_ref().is_some_and(|a| a.id == id) {
            return self.apply_active_event(event);
        }
        if self
            .background
            .as_ref()
            .and_then(PrefetchBatch::in_flight)
            .is_some_and(|f| f.id == id)
        {
            return self.apply_prefetch_event(event);
        }
        debug!("Dropping event for stale request {id}");
        None
    }

    fn apply_active_event(&mut self, event: GenerationEvent) -> Option<Update> {
        let slide = self.active.as_ref()?.slide;
        match event {
            GenerationEvent::Fragment { text, .. } => {
                let effects = self.state.apply(Command::FragmentReceived);
                self.execute_effects(effects);
                self.display.content.push_str(&text);
                Some(Update::Fragment { slide, text })
            }
            GenerationEvent::Completed { text, .. } => {
                self.display.content = text;
                let effects = self.state.apply(Command::ActiveCompleted);
                self.execute_effects(effects);
                Some(Update::Completed { slide })
            }
            GenerationEvent::Failed { id, error } => {
                error!("Request {id} for slide {slide} failed: {error}");
                let effects = self.state.apply(Command::ActiveFailed);
                self.execute_effects(effects);
                Some(Update::Failed {
                    slide,
                    message: error.to_string(),
                })
            }
            GenerationEvent::Cancelled(id) => {
                // Only reachable if the scope was revoked outside the service
                debug!("Request {id} for slide {slide} cancelled");
                self.active = None;
                self.state.request = RequestState::Cancelled;
                self.display.loading = false;
                None
            }
        }
    }

    fn apply_prefetch_event(&mut self, event: GenerationEvent) -> Option<Update> {
        let flight = self.background.as_mut()?.settle(event.id())?;
        let update = match event {
            GenerationEvent::Fragment { .. } => {
                // Prefetch is silent; put the marker back and keep waiting
                if let Some(batch) = self.background.as_mut() {
                    batch.begin(flight);
                }
                return None;
            }
            GenerationEvent::Completed { text, .. } => {
                let elements = &self.cache.get_at(flight.index)?.slide.elements;
                let annotations = derive_annotations(elements);
                self.cache
                    .update_fields(flight.slide, FieldUpdate::expansion(text, annotations));
                info!("Prefetched slide {}", flight.slide);
                Some(Update::Prefetched { slide: flight.slide })
            }
            GenerationEvent::Failed { id, error } => {
                warn!("Prefetch {id} for slide {} failed: {error}", flight.slide);
                Some(Update::PrefetchFailed {
                    slide: flight.slide,
                    message: error.to_string(),
                })
            }
            GenerationEvent::Cancelled(_) => {
                self.background = None;
                return None;
            }
        };
        self.advance_prefetch();
        update
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::CancelActive => {
                    if let Some(active) = self.active.take() {
                        active.scope.cancel();
                        debug!(
                            "Cancelled request {} for slide {}",
                            active.id, active.slide
                        );
                    }
                }

                Effect::CancelBackground => {
                    if let Some(batch) = self.background.take() {
                        batch.cancel();
                        debug!("Cancelled prefetch batch");
                    }
                }

                Effect::RenderCached(slide) => {
                    let content = self
                        .cache
                        .get(slide)
                        .and_then(|r| r.expanded_content.clone())
                        .unwrap_or_default();
                    self.display = DisplayState {
                        slide: Some(slide),
                        content,
                        loading: false,
                        is_error: false,
                    };
                }

                Effect::BackfillAnnotations(slide) => {
                    if let Some(record) = self.cache.get(slide) {
                        let annotations = derive_annotations(&record.slide.elements);
                        debug!("Backfilled {} annotations for slide {slide}", annotations.len());
                        self.cache
                            .update_fields(slide, FieldUpdate::annotations(annotations));
                    }
                }

                Effect::ShowLoading(slide) => {
                    self.display = DisplayState {
                        slide: Some(slide),
                        content: String::new(),
                        loading: true,
                        is_error: false,
                    };
                }

                Effect::StartActive(slide) => {
                    let scope = CancelScope::new();
                    let Some(index) = self.cache.index_of(slide) else {
                        continue;
                    };
                    if let Some(id) = self.spawn_generation(index, &scope, RequestKind::Active) {
                        self.active = Some(ActiveRequest { id, slide, scope });
                    }
                }

                Effect::CommitActive => {
                    if let Some(active) = self.active.take() {
                        let content = self.display.content.clone();
                        let annotations = self
                            .cache
                            .get(active.slide)
                            .map(|r| derive_annotations(&r.slide.elements))
                            .unwrap_or_default();
                        self.cache.update_fields(
                            active.slide,
                            FieldUpdate::expansion(content, annotations),
                        );
                        self.display.loading = false;
                        info!("Cached explanation for slide {}", active.slide);
                    }
                }

                Effect::ShowError => {
                    self.active = None;
                    self.display.content = ERROR_DOCUMENT.to_string();
                    self.display.loading = false;
                    self.display.is_error = true;
                }

                Effect::StartPrefetchAfter(slide) => {
                    if let Some(batch) = self.background.take() {
                        batch.cancel();
                    }
                    let Some(index) = self.cache.index_of(slide) else {
                        continue;
                    };
                    let batch =
                        PrefetchBatch::new(index + 1, self.config.lookahead, self.cache.len());
                    self.background = Some(batch);
                    self.advance_prefetch();
                }
            }
        }
    }

    /// Issue the next request of the background batch, or retire the batch
    fn advance_prefetch(&mut self) {
        let Some(mut batch) = self.background.take() else {
            return;
        };
        if batch.in_flight().is_some() {
            self.background = Some(batch);
            return;
        }

        let Some(index) = batch.next_target(&self.cache) else {
            debug!("Prefetch batch finished");
            return;
        };
        let scope = batch.scope().clone();
        if let Some(id) = self.spawn_generation(index, &scope, RequestKind::Prefetch) {
            if let Some(record) = self.cache.get_at(index) {
                batch.begin(InFlight {
                    id,
                    slide: record.number(),
                    index,
                });
            }
        }
        self.background = Some(batch);
    }

    fn spawn_generation(
        &mut self,
        index: usize,
        scope: &CancelScope,
        kind: RequestKind,
    ) -> Option<RequestId> {
        let request = ExpandRequest::for_index(
            &self.cache,
            index,
            &self.config.topic,
            &self.config.preferences,
        )?;
        let id = self.next_id();
        debug!(
            "Request {id} ({kind:?}) for slide {}",
            request.slide_number
        );

        self.runtime.spawn(run_generation(
            Arc::clone(&self.backend),
            request,
            id,
            scope.clone(),
            self.event_tx.clone(),
            kind,
        ));
        Some(id)
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl<B: ExpansionBackend> Drop for ExpansionService<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_generation<B: ExpansionBackend>(
    backend: Arc<B>,
    request: ExpandRequest,
    id: RequestId,
    scope: CancelScope,
    tx: Sender<GenerationEvent>,
    kind: RequestKind,
) {
    let result = generate(backend.as_ref(), &request, id, &scope, &tx, kind).await;
    let event = match result {
        Ok(text) => GenerationEvent::Completed { id, text },
        Err(e) if e.is_cancellation() => GenerationEvent::Cancelled(id),
        Err(error) => GenerationEvent::Failed { id, error },
    };
    // Receiver is gone once the service is dropped
    let _ = tx.send(event);
}

async fn generate<B: ExpansionBackend>(
    backend: &B,
    request: &ExpandRequest,
    id: RequestId,
    scope: &CancelScope,
    tx: &Sender<GenerationEvent>,
    kind: RequestKind,
) -> Result<String, StreamError> {
    let stream = tokio::select! {
        biased;
        () = scope.cancelled() => return Err(StreamError::Cancelled),
        opened = backend.open_stream(request) => opened?,
    };

    consume_stream(stream, scope, |text| {
        if kind == RequestKind::Active {
            let _ = tx.send(GenerationEvent::Fragment {
                id,
                text: text.to_string(),
            });
        }
    })
    .await
}
