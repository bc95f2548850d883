pub mod error;
pub mod sink;

pub use error::StoreError;
pub use sink::{persist, JsonSink, Payload};
