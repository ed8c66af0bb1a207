//! End-to-end driver tests: a real requester against a mock server, with a
//! scripted document environment.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pagewatch_core::{LinkId, StylesheetLink};
use pagewatch_engine::{
    Environment, FileStore, NullStore, RequestSettings, ReqwestRequester, StateStore, WatchEvent,
    WatcherConfig, WatcherHandle, STOPPED_KEY,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FakeEnvironment {
    page: Url,
    scripts: Vec<String>,
    stylesheets: Vec<StylesheetLink>,
    swaps: Mutex<Vec<(LinkId, String)>>,
}

impl FakeEnvironment {
    fn new(page: Url) -> Self {
        Self {
            page,
            scripts: Vec::new(),
            stylesheets: Vec::new(),
            swaps: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl Environment for FakeEnvironment {
    fn current_location(&self) -> Url {
        self.page.clone()
    }

    async fn list_scripts(&self) -> Vec<String> {
        self.scripts.clone()
    }

    async fn list_stylesheets(&self) -> Vec<StylesheetLink> {
        self.stylesheets.clone()
    }

    async fn reload(&self) {}

    async fn swap_stylesheet(&self, id: LinkId, href: &str) -> bool {
        self.swaps
            .lock()
            .expect("swaps lock")
            .push((id, href.to_string()));
        true
    }
}

fn test_config(server: &MockServer) -> WatcherConfig {
    let mut config =
        WatcherConfig::new(format!("{}/index.html", server.uri())).expect("page url");
    config.options.interval_ms = 25;
    config.options.rescan_ms = 0;
    config.options.watch_doc = false;
    config
}

fn handle_with(
    config: WatcherConfig,
    environment: Arc<FakeEnvironment>,
    store: Arc<dyn StateStore>,
) -> WatcherHandle {
    let requester = Arc::new(ReqwestRequester::new(RequestSettings::default()).expect("client"));
    WatcherHandle::with_parts(config, requester, environment, store)
}

async fn wait_for(
    handle: &WatcherHandle,
    deadline: Duration,
    mut matches: impl FnMut(&WatchEvent) -> bool,
) -> Option<WatchEvent> {
    let start = Instant::now();
    while start.elapsed() < deadline {
        match handle.try_recv() {
            Some(event) if matches(&event) => return Some(event),
            Some(_) => {}
            None => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    None
}

/// Collects events until one matches, returning everything seen on the way.
async fn collect_until(
    handle: &WatcherHandle,
    deadline: Duration,
    mut matches: impl FnMut(&WatchEvent) -> bool,
) -> Vec<WatchEvent> {
    let start = Instant::now();
    let mut seen = Vec::new();
    while start.elapsed() < deadline {
        match handle.try_recv() {
            Some(event) => {
                let done = matches(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
            None => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    seen
}

async fn mount_versioned_head(server: &MockServer, route: &str, initial_polls: u64) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"v1\""))
        .up_to_n_times(initial_polls)
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"v2\""))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn script_change_triggers_a_reload() {
    let server = MockServer::start().await;
    mount_versioned_head(&server, "/app.js", 2).await;

    let config = test_config(&server);
    let mut environment = FakeEnvironment::new(config.page.clone());
    environment.scripts = vec!["/app.js".to_string()];
    let handle = handle_with(config, Arc::new(environment), Arc::new(NullStore));

    let tracked = wait_for(&handle, Duration::from_secs(5), |event| {
        matches!(event, WatchEvent::Tracked { url, .. } if url == "/app.js")
    })
    .await;
    assert!(tracked.is_some(), "script never tracked");

    let reload = wait_for(&handle, Duration::from_secs(5), |event| {
        matches!(event, WatchEvent::ReloadRequested { delay_ms: 0 })
    })
    .await;
    assert!(reload.is_some(), "change never triggered a reload");

    handle.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn stylesheet_change_swaps_the_link_without_reloading() {
    let server = MockServer::start().await;
    mount_versioned_head(&server, "/style.css", 2).await;

    let config = test_config(&server);
    let mut environment = FakeEnvironment::new(config.page.clone());
    environment.stylesheets = vec![StylesheetLink {
        id: 0,
        href: "/style.css".to_string(),
    }];
    let environment = Arc::new(environment);
    let handle = handle_with(config, environment.clone(), Arc::new(NullStore));

    let seen = collect_until(&handle, Duration::from_secs(5), |event| {
        matches!(event, WatchEvent::StylesheetSwapped { .. })
    })
    .await;

    assert!(
        seen.iter()
            .any(|event| matches!(event, WatchEvent::StylesheetSwapped { .. })),
        "stylesheet never swapped: {seen:?}"
    );
    assert!(
        !seen
            .iter()
            .any(|event| matches!(event, WatchEvent::ReloadRequested { .. })),
        "unexpected full reload: {seen:?}"
    );

    let swaps = environment.swaps.lock().expect("swaps lock");
    assert_eq!(swaps.len(), 1);
    assert_eq!(swaps[0].0, 0);
    // The swapped href carries a fresh cache-busting parameter.
    assert!(swaps[0].1.contains("_w_="), "no cache bust in {}", swaps[0].1);

    drop(swaps);
    handle.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_persists_and_the_next_session_stays_dormant() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/app.js"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"v1\""))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let store_dir = dir.path().to_path_buf();

    let config = test_config(&server);
    let page = config.page.clone();
    let mut environment = FakeEnvironment::new(page.clone());
    environment.scripts = vec!["/app.js".to_string()];
    let handle = handle_with(
        config,
        Arc::new(environment),
        Arc::new(FileStore::new(store_dir.clone())),
    );

    let tracked = wait_for(&handle, Duration::from_secs(5), |event| {
        matches!(event, WatchEvent::Tracked { .. })
    })
    .await;
    assert!(tracked.is_some(), "script never tracked");

    handle.stop();
    let marker = store_dir.join(STOPPED_KEY);
    let deadline = Instant::now() + Duration::from_secs(5);
    while !marker.exists() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(marker.exists(), "stopped marker never written");
    handle.close();

    // A new session over the same store bootstraps stopped and dormant.
    let config = test_config(&server);
    let mut environment = FakeEnvironment::new(page);
    environment.scripts = vec!["/app.js".to_string()];
    let handle = handle_with(
        config,
        Arc::new(environment),
        Arc::new(FileStore::new(store_dir.clone())),
    );

    let early = wait_for(&handle, Duration::from_millis(400), |event| {
        matches!(event, WatchEvent::Tracked { .. })
    })
    .await;
    assert!(early.is_none(), "stopped watcher resumed on its own");

    // An explicit start clears the marker and rediscovers.
    handle.start();
    let tracked = wait_for(&handle, Duration::from_secs(5), |event| {
        matches!(event, WatchEvent::Tracked { .. })
    })
    .await;
    assert!(tracked.is_some(), "start after stop never rediscovered");

    let deadline = Instant::now() + Duration::from_secs(5);
    while marker.exists() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!marker.exists(), "stopped marker never cleared");

    handle.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn options_can_be_persisted_at_runtime() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store_dir = dir.path().to_path_buf();

    let config = test_config(&server);
    let environment = FakeEnvironment::new(config.page.clone());
    let handle = handle_with(
        config,
        Arc::new(environment),
        Arc::new(FileStore::new(store_dir.clone())),
    );

    let patch = pagewatch_core::OptionsPatch {
        interval_ms: Some(123),
        ..pagewatch_core::OptionsPatch::default()
    };
    handle.set_options(patch, true);

    let options_file = store_dir.join(pagewatch_engine::OPTIONS_KEY);
    let deadline = Instant::now() + Duration::from_secs(5);
    while !options_file.exists() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let text = std::fs::read_to_string(&options_file).expect("options file");
    let stored: pagewatch_core::Options = serde_json::from_str(&text).expect("options json");
    assert_eq!(stored.interval_ms, 123);

    handle.close();
}
