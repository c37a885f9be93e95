pub mod network;
pub mod size;

pub use size::Gigabytes;
