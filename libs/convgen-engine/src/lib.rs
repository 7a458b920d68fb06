pub mod config;
pub mod context;
pub mod directive;
pub mod driver;
pub mod emit;
pub mod error;
pub mod matcher;
pub mod mode;
pub mod overrides;
pub mod pairing;

pub use config::{ConfigParser, GenConfig};
pub use driver::Generator;
pub use error::GenError;
