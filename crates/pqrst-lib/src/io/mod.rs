pub mod leads;
pub mod patient;
pub mod text;

pub use leads::*;
pub use patient::*;
pub use text::*;
