use std::collections::HashSet;

use crate::discover;
use crate::fingerprint;
use crate::{Effect, ExternalDecl, Msg, Notice, WatcherState};

/// Re-arm delay used while draining the list after a successful advance, so
/// the whole list is swept quickly once any movement starts. A wrap back to
/// the start waits the full configured interval.
const DRAIN_DELAY_MS: u64 = 4;

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: WatcherState, msg: Msg) -> (WatcherState, Vec<Effect>) {
    let effects = match msg {
        Msg::Bootstrapped { stored, stopped_at } => {
            if let Some(options) = stored {
                state.replace_options(options);
            }
            state.set_stopped(stopped_at);
            // A watcher stopped in a previous session stays dormant until
            // an explicit start.
            if state.is_stopped() {
                Vec::new()
            } else {
                vec![Effect::ScanDom]
            }
        }
        Msg::StartRequested { declared } => {
            if state.is_stopped() {
                state.set_stopped(None);
                let mut effects = vec![Effect::ClearStopped];
                if let Some(decl) = declared {
                    effects.extend(declare_effects(&mut state, decl));
                }
                // A stopped watcher restarts as a fresh session.
                effects.push(Effect::ScanDom);
                effects
            } else {
                let mut effects = Vec::new();
                if let Some(decl) = declared {
                    effects.extend(declare_effects(&mut state, decl));
                }
                effects.push(tick_effect(&state));
                effects
            }
        }
        Msg::StopRequested { at_ms } => {
            state.set_stopped(Some(at_ms));
            vec![Effect::CancelTimers, Effect::PersistStopped { at_ms }]
        }
        Msg::Declared { decl } => declare_effects(&mut state, decl),
        Msg::DomScanned { resources } => {
            if state.is_stopped() {
                return (state, Vec::new());
            }
            let mut effects = Vec::new();
            let mut queued: HashSet<String> = HashSet::new();
            let default_method = state.options().default_method;
            for resource in &resources {
                let Some(url) = discover::candidate_path(state.location(), resource, state.options())
                else {
                    continue;
                };
                if !state.knows(&url) && queued.insert(url.clone()) {
                    effects.push(Effect::Probe {
                        url,
                        method: default_method,
                        external: false,
                        alternate: false,
                    });
                }
            }
            if state.options().watch_doc {
                let url = discover::document_path(state.location());
                if !state.knows(&url) && queued.insert(url.clone()) {
                    effects.push(Effect::Probe {
                        url,
                        method: default_method,
                        external: false,
                        alternate: false,
                    });
                }
            }
            state.reset_cursor();
            if state.options().rescan_ms > 0 {
                effects.push(Effect::ArmRescan {
                    delay_ms: state.options().rescan_ms,
                });
            }
            effects.push(Effect::ArmPoll {
                delay_ms: state.options().interval_ms,
            });
            effects
        }
        Msg::ProbeCompleted {
            url,
            external,
            alternate,
            reply,
        } => {
            // A failed acquisition leaves the URL untracked for this cycle.
            let Some(reply) = reply else {
                return (state, Vec::new());
            };
            match fingerprint::compute(&reply) {
                Some(fingerprint) => {
                    let method_override = alternate.then_some(state.options().alternate_method);
                    let added = state.track(&url, fingerprint.clone(), method_override, external);
                    if added {
                        vec![Effect::Emit(Notice::Tracked { url, fingerprint })]
                    } else {
                        Vec::new()
                    }
                }
                None if !alternate => vec![Effect::Probe {
                    url,
                    method: state.options().alternate_method,
                    external,
                    alternate: true,
                }],
                None => {
                    // The alternate method produced nothing usable either;
                    // track with an empty baseline rather than retry forever.
                    let method_override = Some(state.options().alternate_method);
                    let added = state.track(&url, String::new(), method_override, external);
                    if added {
                        vec![Effect::Emit(Notice::Tracked {
                            url,
                            fingerprint: String::new(),
                        })]
                    } else {
                        Vec::new()
                    }
                }
            }
        }
        Msg::PollDue => {
            if state.is_stopped() {
                Vec::new()
            } else {
                vec![tick_effect(&state)]
            }
        }
        Msg::RescanDue => {
            if state.is_stopped() {
                Vec::new()
            } else {
                vec![Effect::ScanDom]
            }
        }
        Msg::PollCompleted { url, cursor, reply } => {
            // A stopped watcher never reloads, even when the stop raced an
            // in-flight request.
            if state.is_stopped() {
                return (state, Vec::new());
            }
            let interval = state.options().interval_ms;
            let Some(reply) = reply else {
                // Transport error: assume changed.
                return (state, vec![Effect::Reload { delay_ms: 0 }]);
            };
            let Some(stored) = state.fingerprint_of(&url).map(str::to_string) else {
                // Entry excluded or dropped while the request was in flight.
                return (state, vec![Effect::ArmPoll { delay_ms: interval }]);
            };
            let fresh = fingerprint::compute(&reply).unwrap_or_default();
            if stored != fresh {
                let mut effects = vec![Effect::Emit(Notice::ChangeDetected {
                    url: url.clone(),
                    previous: stored,
                    fresh: fresh.clone(),
                })];
                if discover::is_stylesheet(&url) {
                    effects.push(Effect::QueryStylesheets {
                        url,
                        fingerprint: fresh,
                    });
                } else {
                    // Delay the reload for externally declared resources,
                    // giving priority to an open document containing them.
                    let delay_ms = if state.is_external(&url) { interval } else { 0 };
                    effects.push(Effect::Reload { delay_ms });
                }
                effects
            } else {
                // Only advance if the cursor still sits where this poll
                // started; the list may have been mutated mid-flight.
                let delay_ms = if state.cursor() == cursor {
                    if state.advance_cursor() {
                        interval
                    } else {
                        DRAIN_DELAY_MS
                    }
                } else {
                    interval
                };
                vec![Effect::ArmPoll { delay_ms }]
            }
        }
        Msg::StylesheetLinks {
            url,
            fingerprint,
            links,
        } => {
            if state.is_stopped() {
                return (state, Vec::new());
            }
            let interval = state.options().interval_ms;
            if state.fingerprint_of(&url).is_none() {
                return (state, vec![Effect::ArmPoll { delay_ms: interval }]);
            }
            let matches =
                discover::matching_stylesheets(state.location(), &url, &links, state.options());
            if matches.len() == 1 {
                let link = matches[0];
                let effect = Effect::SwapStylesheet {
                    id: link.id,
                    href: link.href.clone(),
                };
                state.set_fingerprint(&url, fingerprint);
                vec![effect, Effect::ArmPoll { delay_ms: interval }]
            } else {
                // Zero or ambiguous matches: cannot safely target the swap.
                vec![Effect::Reload { delay_ms: 0 }]
            }
        }
        Msg::Reloaded => {
            if state.is_stopped() {
                Vec::new()
            } else {
                state.reset_tracking();
                vec![Effect::ScanDom]
            }
        }
        Msg::OptionsPatched { patch, persist } => {
            patch.apply(state.options_mut());
            if persist {
                vec![Effect::PersistOptions {
                    options: state.options().clone(),
                }]
            } else {
                Vec::new()
            }
        }
        Msg::SaveOptionsRequested => vec![Effect::PersistOptions {
            options: state.options().clone(),
        }],
        Msg::OptionsLoaded { stored, stopped_at } => {
            if let Some(options) = stored {
                state.replace_options(options);
            }
            state.set_stopped(stopped_at);
            Vec::new()
        }
    };

    (state, effects)
}

/// One poll tick: a request for the cursor URL, or a doubled-interval
/// re-arm while there is nothing to watch yet.
fn tick_effect(state: &WatcherState) -> Effect {
    if state.tracked().is_empty() {
        return Effect::ArmPoll {
            delay_ms: state.options().interval_ms * 2,
        };
    }
    let cursor = state.cursor();
    let url = state.tracked()[cursor].clone();
    let method = state.method_for(&url);
    Effect::Poll {
        url,
        method,
        cursor,
    }
}

fn declare_effects(state: &mut WatcherState, decl: ExternalDecl) -> Vec<Effect> {
    let mut effects = Vec::new();
    let mut queued: HashSet<String> = HashSet::new();
    let default_method = state.options().default_method;

    let mut enqueue = |state: &WatcherState, effects: &mut Vec<Effect>, raw: &str| {
        let Some(url) = discover::normalize(state.location(), raw, state.options()) else {
            return;
        };
        if !state.knows(&url) && queued.insert(url.clone()) {
            effects.push(Effect::Probe {
                url,
                method: default_method,
                external: true,
                alternate: false,
            });
        }
    };

    match decl {
        ExternalDecl::List(urls) => {
            for raw in &urls {
                enqueue(state, &mut effects, raw);
            }
        }
        ExternalDecl::Toggle(pairs) => {
            for (raw, enabled) in &pairs {
                if *enabled {
                    enqueue(state, &mut effects, raw);
                } else if let Some(url) =
                    discover::normalize(state.location(), raw, state.options())
                {
                    state.exclude(&url);
                }
            }
        }
    }
    effects
}
