pub mod catalog;
pub mod models;
pub mod traits;
pub mod ytdlp;

pub use catalog::{FormatCatalog, FormatEntry, FormatKind};
pub use models::{MediaInfo, RawMediaInfo, DEFAULT_TITLE};
pub use traits::MediaExtractor;
pub use ytdlp::{ExtractorOptions, FetchPlan, YtDlp};
