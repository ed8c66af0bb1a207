use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use pagewatch_core::{
    update, Effect, ExternalDecl, Msg, Notice, OptionsPatch, RawResource, ResourceKind,
    WatcherState,
};
use tokio::sync::mpsc as async_mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use watch_logging::{watch_debug, watch_info, watch_warn};

use crate::environment::{Environment, PageEnvironment};
use crate::request::{Requester, ReqwestRequester, RequestSettings};
use crate::store::{self, FileStore, NullStore, StateStore, OPTIONS_KEY, STOPPED_KEY};
use crate::types::{Clock, WatchEvent, WatcherConfig, WatcherError};

enum Command {
    Start { declared: Option<ExternalDecl> },
    Stop,
    Watch { decl: ExternalDecl },
    SetOptions { patch: OptionsPatch, persist: bool },
    SaveOptions,
    LoadOptions,
}

/// Handle to a running watcher. Commands go in, [`WatchEvent`]s come out;
/// the polling loop itself lives on a dedicated thread and owns the core
/// state.
pub struct WatcherHandle {
    cmd_tx: async_mpsc::UnboundedSender<Command>,
    event_rx: mpsc::Receiver<WatchEvent>,
    cancel: CancellationToken,
    join: Option<thread::JoinHandle<()>>,
}

impl WatcherHandle {
    /// Creates a watcher with the production collaborators: a reqwest HTTP
    /// requester, a live page environment and a file store (or no store).
    pub fn new(config: WatcherConfig) -> Result<Self, WatcherError> {
        let requester: Arc<dyn Requester> =
            Arc::new(ReqwestRequester::new(RequestSettings::default())?);
        let environment: Arc<dyn Environment> = Arc::new(PageEnvironment::new(
            config.page.clone(),
            requester.clone(),
        ));
        let store: Arc<dyn StateStore> = match &config.store_dir {
            Some(dir) => Arc::new(FileStore::new(dir.clone())),
            None => Arc::new(NullStore),
        };
        Ok(Self::with_parts(config, requester, environment, store))
    }

    /// Assembles a watcher from explicit collaborators; the seam tests use
    /// to substitute fakes.
    pub fn with_parts(
        config: WatcherConfig,
        requester: Arc<dyn Requester>,
        environment: Arc<dyn Environment>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = async_mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();

        let join = thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
            runtime.block_on(run_driver(
                config,
                requester,
                environment,
                store,
                loop_cancel,
                cmd_rx,
                event_tx,
            ));
        });

        Self {
            cmd_tx,
            event_rx,
            cancel,
            join: Some(join),
        }
    }

    /// Starts a stopped watcher (fresh discovery) or triggers one immediate
    /// poll tick on a running one.
    pub fn start(&self) {
        let _ = self.cmd_tx.send(Command::Start { declared: None });
    }

    /// Like [`start`](Self::start), also declaring extra resources.
    pub fn start_with(&self, declared: ExternalDecl) {
        let _ = self.cmd_tx.send(Command::Start {
            declared: Some(declared),
        });
    }

    /// Pauses polling and persists the stopped marker so a restart does not
    /// silently resume.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop);
    }

    /// Declares extra resources to watch or exclude.
    pub fn watch(&self, decl: ExternalDecl) {
        let _ = self.cmd_tx.send(Command::Watch { decl });
    }

    pub fn set_options(&self, patch: OptionsPatch, persist: bool) {
        let _ = self.cmd_tx.send(Command::SetOptions { patch, persist });
    }

    pub fn save_options(&self) {
        let _ = self.cmd_tx.send(Command::SaveOptions);
    }

    pub fn load_options(&self) {
        let _ = self.cmd_tx.send(Command::LoadOptions);
    }

    pub fn try_recv(&self) -> Option<WatchEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<WatchEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Shuts the watcher down and waits for its thread to finish.
    pub fn close(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Driver {
    requester: Arc<dyn Requester>,
    environment: Arc<dyn Environment>,
    store: Arc<dyn StateStore>,
    clock: Clock,
    msg_tx: async_mpsc::UnboundedSender<Msg>,
    event_tx: mpsc::Sender<WatchEvent>,
    poll_timer: Option<JoinHandle<()>>,
    rescan_timer: Option<JoinHandle<()>>,
}

async fn run_driver(
    config: WatcherConfig,
    requester: Arc<dyn Requester>,
    environment: Arc<dyn Environment>,
    store: Arc<dyn StateStore>,
    cancel: CancellationToken,
    mut cmd_rx: async_mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<WatchEvent>,
) {
    let (msg_tx, mut msg_rx) = async_mpsc::unbounded_channel();
    let mut driver = Driver {
        requester,
        environment,
        store,
        clock: config.clock,
        msg_tx,
        event_tx,
        poll_timer: None,
        rescan_timer: None,
    };

    let mut state = WatcherState::new(config.options, driver.environment.current_location());

    // Durable state is read once at bootstrap; a watcher stopped in a
    // previous session stays dormant until the host starts it.
    let (stored, stopped_at) = store::read_persisted(driver.store.as_ref());
    state = driver.dispatch(state, Msg::Bootstrapped { stored, stopped_at });
    if let Some(decl) = config.declared {
        state = driver.dispatch(state, Msg::Declared { decl });
    }

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            command = cmd_rx.recv() => match command {
                Some(command) => match driver.translate(command) {
                    Some(msg) => msg,
                    None => continue,
                },
                None => break,
            },
            message = msg_rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        state = driver.dispatch(state, msg);
    }

    driver.cancel_timers();
}

impl Driver {
    fn translate(&self, command: Command) -> Option<Msg> {
        match command {
            Command::Start { declared } => {
                self.emit(WatchEvent::Started);
                Some(Msg::StartRequested { declared })
            }
            Command::Stop => {
                self.emit(WatchEvent::Stopped);
                Some(Msg::StopRequested {
                    at_ms: (self.clock)(),
                })
            }
            Command::Watch { decl } => Some(Msg::Declared { decl }),
            Command::SetOptions { patch, persist } => Some(Msg::OptionsPatched { patch, persist }),
            Command::SaveOptions => Some(Msg::SaveOptionsRequested),
            Command::LoadOptions => {
                let (stored, stopped_at) = store::read_persisted(self.store.as_ref());
                Some(Msg::OptionsLoaded { stored, stopped_at })
            }
        }
    }

    fn dispatch(&mut self, state: WatcherState, msg: Msg) -> WatcherState {
        let (state, effects) = update(state, msg);
        for effect in effects {
            self.run_effect(&state, effect);
        }
        state
    }

    fn run_effect(&mut self, state: &WatcherState, effect: Effect) {
        match effect {
            Effect::Probe {
                url,
                method,
                external,
                alternate,
            } => {
                // A candidate that cannot be resolved or requested is simply
                // left untracked for this cycle.
                let Some(target) = self.absolute(state, &url) else {
                    return;
                };
                let busted = pagewatch_core::cache_busted(&target, (self.clock)());
                let headers = state.options().headers.clone();
                let requester = self.requester.clone();
                let msg_tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let reply = match requester.request(method, &busted, &headers).await {
                        Ok(reply) => Some(reply),
                        Err(err) => {
                            watch_debug!("probe {} failed: {}", url, err);
                            None
                        }
                    };
                    let _ = msg_tx.send(Msg::ProbeCompleted {
                        url,
                        external,
                        alternate,
                        reply,
                    });
                });
            }
            Effect::Poll {
                url,
                method,
                cursor,
            } => {
                let target = self.absolute(state, &url);
                let headers = state.options().headers.clone();
                let requester = self.requester.clone();
                let msg_tx = self.msg_tx.clone();
                let now_ms = (self.clock)();
                tokio::spawn(async move {
                    let reply = match target {
                        Some(target) => {
                            let busted = pagewatch_core::cache_busted(&target, now_ms);
                            match requester.request(method, &busted, &headers).await {
                                Ok(reply) => Some(reply),
                                Err(err) => {
                                    watch_warn!("poll {} failed: {}", url, err);
                                    None
                                }
                            }
                        }
                        None => None,
                    };
                    let _ = msg_tx.send(Msg::PollCompleted { url, cursor, reply });
                });
            }
            Effect::ArmPoll { delay_ms } => {
                if let Some(timer) = self.poll_timer.take() {
                    timer.abort();
                }
                let msg_tx = self.msg_tx.clone();
                self.poll_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    let _ = msg_tx.send(Msg::PollDue);
                }));
            }
            Effect::ArmRescan { delay_ms } => {
                if let Some(timer) = self.rescan_timer.take() {
                    timer.abort();
                }
                let msg_tx = self.msg_tx.clone();
                self.rescan_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    let _ = msg_tx.send(Msg::RescanDue);
                }));
            }
            Effect::CancelTimers => self.cancel_timers(),
            Effect::ScanDom => {
                let environment = self.environment.clone();
                let msg_tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let mut resources: Vec<RawResource> = environment
                        .list_stylesheets()
                        .await
                        .into_iter()
                        .map(|link| RawResource {
                            kind: ResourceKind::Stylesheet,
                            href: link.href,
                        })
                        .collect();
                    resources.extend(environment.list_scripts().await.into_iter().map(|href| {
                        RawResource {
                            kind: ResourceKind::Script,
                            href,
                        }
                    }));
                    let _ = msg_tx.send(Msg::DomScanned { resources });
                });
            }
            Effect::QueryStylesheets { url, fingerprint } => {
                let environment = self.environment.clone();
                let msg_tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let links = environment.list_stylesheets().await;
                    let _ = msg_tx.send(Msg::StylesheetLinks {
                        url,
                        fingerprint,
                        links,
                    });
                });
            }
            Effect::SwapStylesheet { id, href } => {
                let Some(target) = self.absolute(state, &href) else {
                    return;
                };
                let busted = pagewatch_core::cache_busted(&target, (self.clock)());
                let environment = self.environment.clone();
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    if environment.swap_stylesheet(id, &busted).await {
                        let _ = event_tx.send(WatchEvent::StylesheetSwapped { href: busted });
                    } else {
                        watch_warn!("stylesheet link {} vanished before swap", id);
                    }
                });
            }
            Effect::Reload { delay_ms } => {
                self.emit(WatchEvent::ReloadRequested { delay_ms });
                let environment = self.environment.clone();
                let msg_tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    environment.reload().await;
                    let _ = msg_tx.send(Msg::Reloaded);
                });
            }
            Effect::PersistOptions { options } => match serde_json::to_string(&options) {
                Ok(json) => {
                    if let Err(err) = self.store.save(OPTIONS_KEY, &json) {
                        watch_warn!("Failed to persist options: {}", err);
                    }
                }
                Err(err) => watch_warn!("Failed to serialize options: {}", err),
            },
            Effect::PersistStopped { at_ms } => {
                if let Err(err) = self.store.save(STOPPED_KEY, &at_ms.to_string()) {
                    watch_warn!("Failed to persist stopped marker: {}", err);
                }
            }
            Effect::ClearStopped => {
                if let Err(err) = self.store.remove(STOPPED_KEY) {
                    watch_warn!("Failed to clear stopped marker: {}", err);
                }
            }
            Effect::Emit(notice) => match notice {
                Notice::Tracked { url, fingerprint } => {
                    watch_debug!(
                        "tracking {}: \"{}\"",
                        url,
                        fingerprint_preview(&fingerprint)
                    );
                    self.emit(WatchEvent::Tracked { url, fingerprint });
                }
                Notice::ChangeDetected {
                    url,
                    previous,
                    fresh,
                } => {
                    watch_info!(
                        "change detected in {}: \"{}\" != \"{}\"",
                        url,
                        fingerprint_preview(&previous),
                        fingerprint_preview(&fresh)
                    );
                    self.emit(WatchEvent::ChangeDetected { url });
                }
            },
        }
    }

    fn absolute(&self, state: &WatcherState, url: &str) -> Option<String> {
        match state.location().join(url) {
            Ok(resolved) => Some(resolved.to_string()),
            Err(err) => {
                watch_warn!("cannot resolve {}: {}", url, err);
                None
            }
        }
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.poll_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.rescan_timer.take() {
            timer.abort();
        }
    }

    fn emit(&self, event: WatchEvent) {
        let _ = self.event_tx.send(event);
    }
}

fn fingerprint_preview(fingerprint: &str) -> String {
    let flat = fingerprint.replace(['\r', '\n'], " ");
    flat.chars().take(64).collect()
}
