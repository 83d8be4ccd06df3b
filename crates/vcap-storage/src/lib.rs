//! Result cache for the caption pipeline.
//!
//! Maps a content identifier to its finished caption artifact. The
//! filesystem implementation keeps one JSON document per identifier in the
//! caption root, so an entry's existence signals a completed pipeline run.

pub mod error;
pub mod result_cache;

pub use error::{StorageError, StorageResult};
pub use result_cache::{FsResultCache, ResultCache};
