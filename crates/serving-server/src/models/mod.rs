//! Request/response types.

pub mod common;
pub mod generate;
pub mod model_list;
pub mod streaming;

pub use common::Usage;
pub use generate::{GenerateRequest, GenerateResponse};
pub use model_list::{ModelInfo, ModelList};
pub use streaming::{StreamFinal, StreamToken};
