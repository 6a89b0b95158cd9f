pub mod axis;
pub mod hrv;
pub mod measurements;

pub use axis::*;
pub use hrv::*;
pub use measurements::*;
