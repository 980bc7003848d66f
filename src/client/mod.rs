mod apply;
mod error;
mod poller;
mod render;
mod source;
mod store;

pub use apply::ViewMode;
pub use poller::PollingClient;
pub use render::{GeoJsonRenderer, LogRenderer, Renderer};
pub use source::HttpSource;
pub use store::{FileStore, HeadingStore, MemoryStore};
