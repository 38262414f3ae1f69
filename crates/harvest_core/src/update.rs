use crate::{Effect, Msg, PaginationState, Pause, Phase, Resume};

/// Pure update function: applies a message to state and returns any effects.
///
/// Messages that do not fit the current phase are ignored and produce no effects.
pub fn update(mut state: PaginationState, msg: Msg) -> (PaginationState, Vec<Effect>) {
    let effects = match msg {
        Msg::Start => {
            if state.phase() == Phase::Idle {
                state.set_phase(Phase::Discovering);
                vec![Effect::DiscoverPages]
            } else {
                Vec::new()
            }
        }
        Msg::TotalPagesKnown(total) => {
            if state.phase() != Phase::Discovering {
                return (state, Vec::new());
            }
            state.set_total_pages(total);
            next_fetch_or_finish(&mut state)
        }
        Msg::PageDecoded {
            page,
            result,
            from_cache,
        } => {
            if state.phase() != Phase::Fetching || page != state.page() {
                return (state, Vec::new());
            }
            state.append_page(result);
            let mut effects = Vec::with_capacity(2);
            if !from_cache && !state.past_end() {
                effects.push(Effect::Pause(Pause::Polite));
            }
            effects.extend(next_fetch_or_finish(&mut state));
            effects
        }
        Msg::SoftFailure { reason } => {
            let resume = match state.phase() {
                Phase::Discovering => Resume::Discovering,
                Phase::Fetching => Resume::Fetching,
                _ => return (state, Vec::new()),
            };
            if state.record_soft_failure(reason) {
                state.set_phase(Phase::SoftErrorBackoff { resume });
                vec![Effect::Pause(Pause::Backoff {
                    attempt: state.attempts(),
                })]
            } else {
                state.set_phase(Phase::Failed);
                vec![Effect::GiveUp {
                    page: state.page(),
                    attempts: state.attempts(),
                }]
            }
        }
        Msg::BackoffElapsed => match state.phase() {
            Phase::SoftErrorBackoff {
                resume: Resume::Discovering,
            } => {
                state.set_phase(Phase::Discovering);
                vec![Effect::DiscoverPages]
            }
            Phase::SoftErrorBackoff {
                resume: Resume::Fetching,
            } => {
                state.set_phase(Phase::Fetching);
                vec![Effect::FetchPage { page: state.page() }]
            }
            _ => Vec::new(),
        },
    };

    (state, effects)
}

fn next_fetch_or_finish(state: &mut PaginationState) -> Vec<Effect> {
    if state.past_end() {
        state.set_phase(Phase::Done);
        vec![Effect::Finished]
    } else {
        state.set_phase(Phase::Fetching);
        vec![Effect::FetchPage { page: state.page() }]
    }
}
