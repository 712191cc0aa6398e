//! Inference backend abstraction: opaque networks, shape-aware tensors, and
//! the submit/poll-until-ready protocol shared by every pipeline stage.

pub mod backend;
pub mod tensor;

pub use backend::{
    DEFAULT_INPUT, DEFAULT_OUTPUT, InferenceBackend, MockBackend, MockNetwork, ModelKind, Network,
    await_default_output, await_output,
};
pub use tensor::{NamedTensors, Tensor, single_input};
