pub mod productivity;

pub use productivity::ProductivityRepository;
