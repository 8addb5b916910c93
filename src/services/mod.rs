pub mod color;
pub mod compositor;
pub mod engine;
pub mod grid;
pub mod onnx_engine;
pub mod orchestrator;
pub mod session_registry;
pub mod suggestions;
