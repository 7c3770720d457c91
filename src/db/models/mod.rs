pub mod productivity;

pub use productivity::ProductivityRecord;
