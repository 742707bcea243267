pub mod console;
pub mod event_archive;
pub mod status_server;

pub use console::render_snapshot;
pub use event_archive::{read_archive, EventArchive, EventArchiveRecord};
pub use status_server::{SnapshotSource, StatusServer};
