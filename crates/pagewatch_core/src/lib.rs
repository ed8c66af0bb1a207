//! Pagewatch core: pure watcher state machine.
//!
//! No IO lives here. The driver feeds [`Msg`]s into [`update`] and executes
//! the returned [`Effect`]s; everything that decides *what* to do —
//! discovery filtering, fingerprint comparison, round-robin polling, reload
//! and swap decisions, stop/start semantics — is a pure state transition.
mod discover;
mod effect;
mod fingerprint;
mod msg;
mod options;
mod state;
mod update;
mod view_model;

pub use discover::{
    candidate_path, document_path, is_stylesheet, matching_stylesheets, normalize, LinkId,
    RawResource, ResourceKind, StylesheetLink,
};
pub use effect::{Effect, Notice};
pub use fingerprint::{
    cache_busted, cache_token, compact_http_date, compute, strip_cache_param, to_base36,
    ProbeReply, NO_CACHE_PARAM,
};
pub use msg::{ExternalDecl, Msg};
pub use options::{Options, OptionsPatch, ProbeMethod};
pub use state::{EntryState, WatcherState};
pub use update::update;
pub use view_model::WatcherView;
