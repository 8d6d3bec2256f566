mod field;
mod table;

pub use field::{BqType, Field, FieldMode};
pub use table::Schema;
