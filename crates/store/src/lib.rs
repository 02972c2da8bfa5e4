pub mod checkpoint;
pub mod error;
mod fs;
pub mod history;
pub mod media;

pub use checkpoint::{
    Checkpoint, CheckpointStoreConfig, FlowCheckpointStore, PersistedFlowState, SavedStateInfo,
    CHECKPOINT_SCHEMA_VERSION, DEFAULT_CHECKPOINT_TTL,
};
pub use error::StoreError;
pub use history::{
    HistoryStoreConfig, MediaBlob, ResultsHistoryStore, StoredMedia, StoredResult,
    DEFAULT_MAX_RESULTS, HISTORY_SCHEMA_VERSION,
};
pub use media::MediaDirectory;
