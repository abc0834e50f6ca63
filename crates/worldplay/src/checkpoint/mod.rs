mod container;
mod loader;
mod tensor;

pub use container::{
    decode_checkpoint, encode_checkpoint, read_checkpoint, write_checkpoint, Checkpoint,
    CheckpointEntry, CheckpointError, CHECKPOINT_FORMAT_VERSION,
};
pub use loader::{
    load_checkpoint_into, reconcile, CheckpointLoadError, LoadOutcome, LoadReport,
    ParameterApplyError, ParameterStore, EMA_VARIANT,
};
pub use tensor::{ParamSet, Tensor, TensorError};
