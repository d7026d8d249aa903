pub mod coerce;
pub mod datatype;
pub mod scalar;
pub mod schema;

pub use datatype::{DataType, RecordField, RecordType};
pub use scalar::{ListValue, RecordValue, ScalarValue};
pub use schema::{ColumnDef, ColumnSchema};
