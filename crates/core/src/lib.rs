pub mod query;
pub mod record;
pub mod report;
pub mod validate;

pub use query::{PageRequest, PageResult, QueryError};
pub use record::{Industry, Record, Status};
pub use validate::{DuplicateField, Field, FieldError};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
