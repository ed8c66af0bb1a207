use crate::discover::{RawResource, StylesheetLink};
use crate::fingerprint::ProbeReply;
use crate::options::{Options, OptionsPatch};

/// Extra resources declared by the host rather than discovered from the
/// document: either a plain list (all enabled) or per-URL toggles, where
/// `false` excludes the URL from watching entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalDecl {
    List(Vec<String>),
    Toggle(Vec<(String, bool)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Durable state read back once at startup.
    Bootstrapped {
        stored: Option<Options>,
        stopped_at: Option<u64>,
    },
    /// Host called start. A previously stopped watcher re-runs full
    /// discovery; a running one performs one immediate poll tick.
    StartRequested { declared: Option<ExternalDecl> },
    /// Host called stop.
    StopRequested { at_ms: u64 },
    /// Host declared extra resources to watch or exclude.
    Declared { decl: ExternalDecl },
    /// Candidates gathered from the document, stylesheets first.
    DomScanned { resources: Vec<RawResource> },
    /// Acquisition request resolved; `None` means a transport error, which
    /// leaves the URL untracked for this cycle.
    ProbeCompleted {
        url: String,
        external: bool,
        alternate: bool,
        reply: Option<ProbeReply>,
    },
    /// Poll timer fired.
    PollDue,
    /// Rediscovery timer fired.
    RescanDue,
    /// Poll request resolved; `None` means a transport error, which is
    /// treated as "assume changed".
    PollCompleted {
        url: String,
        cursor: usize,
        reply: Option<ProbeReply>,
    },
    /// Live stylesheet links, listed after a stylesheet change was
    /// detected.
    StylesheetLinks {
        url: String,
        fingerprint: String,
        links: Vec<StylesheetLink>,
    },
    /// A reload completed; the next document is a fresh session.
    Reloaded,
    /// Host patched options, optionally persisting them.
    OptionsPatched { patch: OptionsPatch, persist: bool },
    /// Host asked to persist the current options.
    SaveOptionsRequested,
    /// Durable state re-read at host request.
    OptionsLoaded {
        stored: Option<Options>,
        stopped_at: Option<u64>,
    },
}
