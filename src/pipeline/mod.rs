pub mod import;
pub mod extraction;
pub mod structuring;
pub mod reference;
pub mod processor;
