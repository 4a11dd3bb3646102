pub mod capture;
pub mod compression;
pub mod export;
pub mod har;
pub mod http;
pub mod importer;
pub mod progress;
pub mod reconstruct;
pub mod session;
pub mod tree;

pub use export::HarExporter;
pub use har::Har;
pub use importer::{import_capture, import_sessions, ImportError, ImportOptions, ImportReport, ImportSource, Notice};
pub use progress::{NoProgress, ProgressSink};
pub use session::{SessionFlags, SessionRecord};
