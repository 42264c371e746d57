pub mod enums;
pub mod lab;
pub mod schema;

pub use enums::*;
pub use lab::*;
pub use schema::*;
