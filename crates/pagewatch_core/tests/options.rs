use std::sync::Once;

use pagewatch_core::{update, Effect, Msg, Options, OptionsPatch, ProbeMethod, WatcherState};
use url::Url;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(watch_logging::initialize_for_tests);
}

fn new_state() -> WatcherState {
    WatcherState::new(
        Options::for_host("example.com"),
        Url::parse("http://example.com/index.html").expect("origin url"),
    )
}

#[test]
fn defaults_match_the_documented_values() {
    init_logging();
    let options = Options::default();
    assert_eq!(options.interval_ms, 700);
    assert_eq!(options.rescan_ms, 7_000);
    assert!(options.watch_doc && options.watch_css && options.watch_js);
    assert!(options.ignore_minified);
    assert!(options.watch_hosts.is_empty());
    assert_eq!(options.default_method, ProbeMethod::Head);
    assert_eq!(options.alternate_method, ProbeMethod::Get);
    assert_eq!(
        options.headers.get("X-Requested-With").map(String::as_str),
        Some("pagewatch")
    );
}

#[test]
fn patch_merges_only_set_fields() {
    init_logging();
    let mut options = Options::for_host("example.com");
    let patch = OptionsPatch {
        interval_ms: Some(250),
        watch_js: Some(false),
        ..OptionsPatch::default()
    };
    patch.apply(&mut options);

    assert_eq!(options.interval_ms, 250);
    assert!(!options.watch_js);
    // Untouched fields keep their values.
    assert_eq!(options.rescan_ms, 7_000);
    assert_eq!(options.watch_hosts, vec!["example.com".to_string()]);
}

#[test]
fn patched_options_can_be_persisted() {
    init_logging();
    let state = new_state();
    let patch = OptionsPatch {
        interval_ms: Some(100),
        ..OptionsPatch::default()
    };

    let (state, effects) = update(
        state,
        Msg::OptionsPatched {
            patch: patch.clone(),
            persist: false,
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.options().interval_ms, 100);

    let (state, effects) = update(state, Msg::OptionsPatched { patch, persist: true });
    assert_eq!(
        effects,
        vec![Effect::PersistOptions {
            options: state.options().clone(),
        }]
    );
}

#[test]
fn save_request_persists_the_current_options() {
    init_logging();
    let state = new_state();
    let (state, effects) = update(state, Msg::SaveOptionsRequested);
    assert_eq!(
        effects,
        vec![Effect::PersistOptions {
            options: state.options().clone(),
        }]
    );
}

#[test]
fn bootstrap_applies_stored_options() {
    init_logging();
    let stored = Options {
        interval_ms: 150,
        ..Options::for_host("example.com")
    };
    let (state, effects) = update(
        new_state(),
        Msg::Bootstrapped {
            stored: Some(stored),
            stopped_at: None,
        },
    );
    assert_eq!(state.options().interval_ms, 150);
    assert_eq!(effects, vec![Effect::ScanDom]);
}

#[test]
fn runtime_load_refreshes_options_and_stopped_marker() {
    init_logging();
    let stored = Options {
        interval_ms: 150,
        ..Options::for_host("example.com")
    };
    let (state, effects) = update(
        new_state(),
        Msg::OptionsLoaded {
            stored: Some(stored),
            stopped_at: Some(7),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.options().interval_ms, 150);
    assert!(state.is_stopped());
}

#[test]
fn new_interval_applies_to_the_next_rearm() {
    init_logging();
    let state = new_state();
    let patch = OptionsPatch {
        interval_ms: Some(50),
        ..OptionsPatch::default()
    };
    let (state, _) = update(state, Msg::OptionsPatched { patch, persist: false });

    let (_state, effects) = update(state, Msg::PollDue);
    // Empty list re-arms at twice the (new) interval.
    assert_eq!(effects, vec![Effect::ArmPoll { delay_ms: 100 }]);
}
