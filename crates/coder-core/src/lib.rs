pub mod aggregate;
pub mod dictionary;
pub mod error;
pub mod http;
pub mod infer;
pub mod llm;
pub mod matcher;
pub mod pipeline;
pub mod processor;
pub mod rules;
pub mod summary;
pub mod table;
pub mod types;

pub use error::*;
pub use types::*;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
