//! 板型配置
//!
//! 不同代的 SoC 把 GPIO 控制器放在不同的物理地址上，
//! 这里只是一个查表，映射本身由 `GpioMem` 完成

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// 默认的物理内存设备
pub const DEV_MEM: &str = "/dev/mem";

/// 仅暴露 GPIO 寄存器页的设备，不需要 root 权限，映射偏移为 0
pub const DEV_GPIOMEM: &str = "/dev/gpiomem";

/// 映射窗口大小，一页 4 KiB（实际只用到前几十个字节）
pub const PAGE_SIZE: usize = 4 * 1024;

/// 支持的板型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoardType {
    /// Raspberry Pi Zero / 1 (BCM2835)
    #[default]
    PiZero,
    /// Raspberry Pi 2 / 3 (BCM2836 / BCM2837)
    Pi2And3,
    /// Raspberry Pi 4 (BCM2711)
    Pi4,
}

/// GPIO 寄存器块的物理位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardLayout {
    /// 外设基地址 + 0x200000 (GPIO 偏移)
    pub gpio_offset: u64,
    /// 映射长度（字节）
    pub page_size: usize,
}

const BOARD_TABLE: [(BoardType, BoardLayout); 3] = [
    (
        BoardType::PiZero,
        BoardLayout {
            gpio_offset: 0x2020_0000,
            page_size: PAGE_SIZE,
        },
    ),
    (
        BoardType::Pi2And3,
        BoardLayout {
            gpio_offset: 0x3F20_0000,
            page_size: PAGE_SIZE,
        },
    ),
    (
        BoardType::Pi4,
        BoardLayout {
            gpio_offset: 0xFE20_0000,
            page_size: PAGE_SIZE,
        },
    ),
];

/// 查询板型对应的 GPIO 物理偏移和页大小
pub fn board_layout(board: BoardType) -> BoardLayout {
    BOARD_TABLE
        .iter()
        .find(|(b, _)| *b == board)
        .map(|(_, layout)| *layout)
        .unwrap_or(BOARD_TABLE[0].1)
}

impl fmt::Display for BoardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoardType::PiZero => "zero",
            BoardType::Pi2And3 => "pi3",
            BoardType::Pi4 => "pi4",
        };
        f.write_str(name)
    }
}

impl FromStr for BoardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero" | "pi0" | "pi1" | "bcm2835" => Ok(BoardType::PiZero),
            "pi2" | "pi3" | "bcm2836" | "bcm2837" => Ok(BoardType::Pi2And3),
            "pi4" | "bcm2711" => Ok(BoardType::Pi4),
            other => Err(format!("未知板型: {other}（可选: zero, pi3, pi4）")),
        }
    }
}

/// 寄存器映射配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioMemConfig {
    /// 内存设备路径
    pub path: PathBuf,
    /// 物理偏移（必须按页对齐）
    pub offset: u64,
    /// 映射长度（字节）
    pub page_size: usize,
}

impl Default for GpioMemConfig {
    fn default() -> Self {
        Self::for_board(BoardType::default())
    }
}

impl GpioMemConfig {
    /// 使用 `/dev/mem` 和板型对应的物理偏移
    pub fn for_board(board: BoardType) -> Self {
        let layout = board_layout(board);
        Self {
            path: PathBuf::from(DEV_MEM),
            offset: layout.gpio_offset,
            page_size: layout.page_size,
        }
    }

    /// 使用 `/dev/gpiomem`，该设备从偏移 0 开始就是 GPIO 寄存器
    pub fn gpiomem() -> Self {
        Self {
            path: PathBuf::from(DEV_GPIOMEM),
            offset: 0,
            page_size: PAGE_SIZE,
        }
    }

    /// 覆盖内存设备路径
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }
}
