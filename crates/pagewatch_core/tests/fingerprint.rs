use std::sync::Once;

use pagewatch_core::{cache_busted, compute, strip_cache_param, to_base36, ProbeReply};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(watch_logging::initialize_for_tests);
}

fn reply() -> ProbeReply {
    ProbeReply {
        status: 200,
        etag: None,
        last_modified: Some("Tue, 15 Nov 1994 08:12:31 GMT".to_string()),
        content_type: Some("text/css".to_string()),
        content_length: Some("10".to_string()),
        body: None,
    }
}

#[test]
fn etag_alone_is_the_fingerprint() {
    init_logging();
    let reply = ProbeReply {
        etag: Some("abc".to_string()),
        ..reply()
    };
    assert_eq!(compute(&reply), Some("abc".to_string()));
}

#[test]
fn header_composite_has_a_fixed_order() {
    init_logging();
    // Content-Type, Content-Length, compacted Last-Modified.
    // 1994-11-15T08:12:31Z is 784887151 seconds, "czausv" in base 36.
    assert_eq!(compute(&reply()), Some("text/css~10~czausv".to_string()));
}

#[test]
fn header_composite_is_idempotent() {
    init_logging();
    assert_eq!(compute(&reply()), compute(&reply()));
}

#[test]
fn partial_headers_still_form_a_composite() {
    init_logging();
    let reply = ProbeReply {
        content_type: Some("text/css".to_string()),
        ..ProbeReply::default()
    };
    assert_eq!(compute(&reply), Some("text/css~~".to_string()));
}

#[test]
fn unparseable_last_modified_passes_through() {
    init_logging();
    let reply = ProbeReply {
        last_modified: Some("not a date".to_string()),
        ..ProbeReply::default()
    };
    assert_eq!(compute(&reply), Some("~~not a date".to_string()));
}

#[test]
fn body_is_the_last_resort() {
    init_logging();
    let reply = ProbeReply {
        body: Some("body text".to_string()),
        ..ProbeReply::default()
    };
    assert_eq!(compute(&reply), Some("body text".to_string()));

    // A headerless HEAD response yields nothing usable, which is what
    // forces the GET retry.
    assert_eq!(compute(&ProbeReply::default()), None);
    let empty_body = ProbeReply {
        body: Some(String::new()),
        ..ProbeReply::default()
    };
    assert_eq!(compute(&empty_body), None);
}

#[test]
fn base36_spot_checks() {
    init_logging();
    assert_eq!(to_base36(784_887_151), "czausv");
    assert_eq!(to_base36(1), "1");
}

#[test]
fn cache_busting_round_trips_through_strip() {
    init_logging();
    let busted = cache_busted("http://example.com/app.js?x=1", 123_456);
    assert_ne!(busted, "http://example.com/app.js?x=1");
    assert_eq!(
        strip_cache_param(&busted),
        "http://example.com/app.js?x=1"
    );
}
