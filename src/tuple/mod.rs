mod field_type;
mod tuple;
mod tuple_desc;
mod value;

pub use field_type::FieldType;
pub use tuple::{Tuple, TupleBuilder};
pub use tuple_desc::{FieldDesc, TupleDesc, TupleDescBuilder};
pub use value::Value;
