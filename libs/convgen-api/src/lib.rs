pub mod error;
pub mod model;
pub mod naming;
pub mod plan;
pub mod record;
pub mod sink;
pub mod value;

pub use convgen_api_derive::Record;
