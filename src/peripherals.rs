//! 外设驱动模块
//! 
//! GPIO 寄存器映射和四位七段数码管

pub mod four_digit;
pub mod gpio_mem;
#[cfg(test)]
pub mod mock;
pub mod seven_segment;

// 重新导出常用类型
pub use four_digit::{DisplayError, FourDigitDisplay, RenderHandle};
pub use gpio_mem::{GpioMem, GpioMemError, GpioRegisters, MappedWindow, RegisterWindow};
pub use seven_segment::{Digit, DigitOutOfRange};
