//! 四位七段数码管驱动
//!
//! 通过 `/dev/mem` 直接映射树莓派的 GPIO 寄存器，在后台线程里动态扫描
//! 四位共阴/共阳七段数码管。
//!
//! - [`config`]: 引脚分配和板型（GPIO 物理地址）
//! - [`peripherals::gpio_mem`]: 寄存器映射和引脚置位/清零
//! - [`peripherals::four_digit`]: 刷新线程、显示内容和诊断操作

pub mod config;
pub mod peripherals;
pub mod utils;

pub use config::{BoardType, DisplayPins, GpioMemConfig, DISPLAY_PINS};
pub use peripherals::{Digit, DisplayError, FourDigitDisplay, GpioMem, GpioMemError, RenderHandle};
