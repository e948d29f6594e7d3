//! Navigation and request state management

use crate::deck::SlideNumber;

/// Lifecycle of the request tied to the displayed slide
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestState {
    /// No request for the current slide (nothing shown yet, or served from cache)
    #[default]
    Idle,
    /// Request issued, no text received yet
    Requesting,
    /// At least one fragment rendered
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl RequestState {
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Requesting | Self::Streaming)
    }
}

/// Current navigation state of the orchestrator
#[derive(Clone, Debug, Default)]
pub struct ExpansionState {
    /// Slide being displayed
    pub current: Option<SlideNumber>,

    /// State of the active request for `current`
    pub request: RequestState,
}

impl ExpansionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::Navigate {
                slide,
                cached,
                needs_backfill,
            } => {
                let mut effects = Vec::with_capacity(5);
                if self.request.is_in_flight() {
                    effects.push(Effect::CancelActive);
                }
                effects.push(Effect::CancelBackground);
                self.current = Some(slide);

                if cached {
                    self.request = RequestState::Idle;
                    effects.push(Effect::RenderCached(slide));
                    if needs_backfill {
                        effects.push(Effect::BackfillAnnotations(slide));
                    }
                    effects.push(Effect::StartPrefetchAfter(slide));
                } else {
                    self.request = RequestState::Requesting;
                    effects.push(Effect::ShowLoading(slide));
                    effects.push(Effect::StartActive(slide));
                }
                effects
            }

            Command::FragmentReceived => {
                if self.request == RequestState::Requesting {
                    self.request = RequestState::Streaming;
                }
                vec![]
            }

            Command::ActiveCompleted => match (self.request.is_in_flight(), self.current) {
                (true, Some(slide)) => {
                    self.request = RequestState::Completed;
                    vec![Effect::CommitActive, Effect::StartPrefetchAfter(slide)]
                }
                _ => vec![],
            },

            Command::ActiveFailed => {
                if self.request.is_in_flight() {
                    self.request = RequestState::Failed;
                    vec![Effect::ShowError]
                } else {
                    vec![]
                }
            }

            Command::Edited(slide) => {
                if self.current == Some(slide) && self.request.is_in_flight() {
                    self.request = RequestState::Cancelled;
                    vec![Effect::CancelActive]
                } else {
                    vec![]
                }
            }

            Command::Shutdown => {
                let mut effects = Vec::with_capacity(2);
                if self.request.is_in_flight() {
                    self.request = RequestState::Cancelled;
                    effects.push(Effect::CancelActive);
                }
                effects.push(Effect::CancelBackground);
                effects
            }
        }
    }
}

/// Commands that drive the orchestrator state
#[derive(Clone, Debug)]
pub enum Command {
    /// User navigated to a slide
    Navigate {
        slide: SlideNumber,
        cached: bool,
        needs_backfill: bool,
    },
    /// Active stream delivered text
    FragmentReceived,
    /// Active stream closed normally
    ActiveCompleted,
    /// Active stream failed (not cancelled)
    ActiveFailed,
    /// Notes for a slide were edited by hand
    Edited(SlideNumber),
    /// Service is being torn down
    Shutdown,
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Revoke the active scope
    CancelActive,
    /// Revoke the background scope
    CancelBackground,
    /// Show cached content for a slide
    RenderCached(SlideNumber),
    /// Derive annotations for a cached slide that lacks them
    BackfillAnnotations(SlideNumber),
    /// Clear the display and raise the loading indicator
    ShowLoading(SlideNumber),
    /// Issue a streaming request for a slide
    StartActive(SlideNumber),
    /// Write the finished active result to the cache
    CommitActive,
    /// Replace the display with the error document
    ShowError,
    /// Begin a prefetch batch after a slide
    StartPrefetchAfter(SlideNumber),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn navigate(slide: SlideNumber, cached: bool) -> Command {
        Command::Navigate {
            slide,
            cached,
            needs_backfill: false,
        }
    }

    #[test]
    fn cache_miss_requests_and_shows_loading() {
        let mut state = ExpansionState::new();

        let effects = state.apply(navigate(1, false));

        assert_eq!(state.current, Some(1));
        assert_eq!(state.request, RequestState::Requesting);
        assert_eq!(
            effects,
            vec![
                Effect::CancelBackground,
                Effect::ShowLoading(1),
                Effect::StartActive(1)
            ]
        );
    }

    #[test]
    fn cache_hit_renders_and_prefetches_without_loading() {
        let mut state = ExpansionState::new();

        let effects = state.apply(Command::Navigate {
            slide: 2,
            cached: true,
            needs_backfill: true,
        });

        assert_eq!(state.request, RequestState::Idle);
        assert_eq!(
            effects,
            vec![
                Effect::CancelBackground,
                Effect::RenderCached(2),
                Effect::BackfillAnnotations(2),
                Effect::StartPrefetchAfter(2)
            ]
        );
    }

    #[test]
    fn navigation_cancels_in_flight_request_first() {
        let mut state = ExpansionState::new();
        let _ = state.apply(navigate(1, false));
        let _ = state.apply(Command::FragmentReceived);
        assert_eq!(state.request, RequestState::Streaming);

        let effects = state.apply(navigate(2, true));

        assert_eq!(effects[0], Effect::CancelActive);
        assert_eq!(effects[1], Effect::CancelBackground);
        assert_eq!(state.current, Some(2));
    }

    #[test]
    fn completion_commits_then_prefetches() {
        let mut state = ExpansionState::new();
        let _ = state.apply(navigate(3, false));

        let effects = state.apply(Command::ActiveCompleted);

        assert_eq!(state.request, RequestState::Completed);
        assert_eq!(
            effects,
            vec![Effect::CommitActive, Effect::StartPrefetchAfter(3)]
        );
    }

    #[test]
    fn failure_shows_error_without_prefetch() {
        let mut state = ExpansionState::new();
        let _ = state.apply(navigate(1, false));

        let effects = state.apply(Command::ActiveFailed);

        assert_eq!(state.request, RequestState::Failed);
        assert_eq!(effects, vec![Effect::ShowError]);
    }

    #[test]
    fn settled_request_ignores_late_outcomes() {
        let mut state = ExpansionState::new();
        let _ = state.apply(navigate(1, true));

        assert!(state.apply(Command::ActiveCompleted).is_empty());
        assert!(state.apply(Command::ActiveFailed).is_empty());
        assert_eq!(state.request, RequestState::Idle);
    }

    #[test]
    fn edit_cancels_only_matching_in_flight_slide() {
        let mut state = ExpansionState::new();
        let _ = state.apply(navigate(1, false));

        assert!(state.apply(Command::Edited(2)).is_empty());
        assert_eq!(state.apply(Command::Edited(1)), vec![Effect::CancelActive]);
        assert_eq!(state.request, RequestState::Cancelled);
    }

    #[test]
    fn shutdown_revokes_both_scopes() {
        let mut state = ExpansionState::new();
        let _ = state.apply(navigate(1, false));

        assert_eq!(
            state.apply(Command::Shutdown),
            vec![Effect::CancelActive, Effect::CancelBackground]
        );
        assert_eq!(state.apply(Command::Shutdown), vec![Effect::CancelBackground]);
    }
}
