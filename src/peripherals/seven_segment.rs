//! 七段码表
//!
//! 段的顺序与 [`DisplayPins::segments`](crate::config::pins::DisplayPins) 一致：
//! 上、右上、右下、下、左下、左上、中。

use core::fmt;

use thiserror::Error;

use crate::config::pins::{DIGIT_COUNT, SEGMENT_COUNT};

/// 一个数字的段点亮图案
pub type SegmentPattern = [bool; SEGMENT_COUNT];

const O: bool = false;
const X: bool = true;

/// 十进制数字 0~9 的段码
pub const SEGMENT_TABLE: [SegmentPattern; 10] = [
    [X, X, X, X, X, X, O], // 0
    [O, X, X, O, O, O, O], // 1
    [X, X, O, X, X, O, X], // 2
    [X, X, X, X, O, O, X], // 3
    [O, X, X, O, O, X, X], // 4
    [X, O, X, X, O, X, X], // 5
    [X, O, X, X, X, X, X], // 6
    [X, X, X, O, O, O, O], // 7
    [X, X, X, X, X, X, X], // 8
    [X, X, X, O, O, X, X], // 9
];

/// 全部熄灭
pub const BLANK_PATTERN: SegmentPattern = [O; SEGMENT_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("数字 {0} 超出 0..=9 范围")]
pub struct DigitOutOfRange(pub u32);

/// 0~9 之间的十进制数字
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Digit(u8);

impl Digit {
    pub const ZERO: Digit = Digit(0);
    pub const EIGHT: Digit = Digit(8);

    pub fn new(value: u32) -> Result<Self, DigitOutOfRange> {
        match u8::try_from(value) {
            Ok(v) if v <= 9 => Ok(Digit(v)),
            _ => Err(DigitOutOfRange(value)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// 该数字的段码
    pub fn pattern(self) -> SegmentPattern {
        pattern_for(self.0)
    }

    /// 把 `n % 10000` 拆成四个槽位
    ///
    /// 槽位 0 是最左边的一位（千位），槽位 3 是个位，与
    /// [`DisplayPins::digits`](crate::config::pins::DisplayPins) 的顺序一致。
    pub fn digits_of(n: u32) -> [Digit; DIGIT_COUNT] {
        std::array::from_fn(|slot| {
            let place = 10u32.pow((DIGIT_COUNT - 1 - slot) as u32);
            Digit((n / place % 10) as u8)
        })
    }
}

impl TryFrom<u32> for Digit {
    type Error = DigitOutOfRange;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Digit::new(value)
    }
}

impl From<Digit> for u8 {
    fn from(digit: Digit) -> Self {
        digit.0
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 按原始槽位值查表，表外的值（包括空白标记）返回全灭
pub fn pattern_for(raw: u8) -> SegmentPattern {
    SEGMENT_TABLE
        .get(usize::from(raw))
        .copied()
        .unwrap_or(BLANK_PATTERN)
}
