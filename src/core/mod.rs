pub mod error;
pub mod value;

pub use error::{ListError, Result};
pub use value::{Attributes, attrs, compare_values, id_key, value_to_text};
