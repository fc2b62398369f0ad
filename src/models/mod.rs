pub mod enums;
pub mod exam;
pub mod patient;

pub use exam::*;
pub use patient::*;
