//! Safe SQL builder: identifiers checked against the table's columns, values as parameters.

mod builder;
pub mod row;
pub mod value;
pub use builder::*;
pub use row::*;
pub use value::*;
