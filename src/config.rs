//! 显示屏配置模块
//! 
//! 提供引脚分配和板型（寄存器物理地址）的配置定义

pub mod board;
pub mod pins;

// 重新导出常用类型
pub use board::{BoardLayout, BoardType, GpioMemConfig};
pub use pins::{DisplayPins, DISPLAY_PINS};
