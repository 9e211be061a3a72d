//! 通用工具

pub mod delay;

pub use delay::StdDelay;
