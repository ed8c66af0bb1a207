//! Pagewatch engine: effect driver and IO.
mod driver;
mod environment;
mod request;
mod store;
mod types;

pub use driver::WatcherHandle;
pub use environment::{Environment, PageEnvironment};
pub use request::{Requester, ReqwestRequester, RequestSettings};
pub use store::{
    read_persisted, FileStore, NullStore, StateStore, StoreError, OPTIONS_KEY, STOPPED_KEY,
};
pub use types::{Clock, RequestError, WatchEvent, WatcherConfig, WatcherError};
