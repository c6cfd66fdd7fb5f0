mod record;

pub use record::{list_checkpoints, load_checkpoint, read_metadata, save_checkpoint, CheckpointData, LoadedCheckpoint};
