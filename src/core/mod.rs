pub mod error;
pub mod types;
pub mod value;

pub use error::{ErrorKind, OgmError, Result};
pub use types::PropertyKind;
pub use value::{GraphId, Value};
