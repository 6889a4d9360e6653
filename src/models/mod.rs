pub mod prediction;
pub mod student;

pub use prediction::*;
pub use student::*;
