//! 引脚配置定义
//!
//! 定义四位七段数码管使用的 GPIO 引脚配置

/// 段引脚数量（上、右上、右下、下、左下、左上、中）
pub const SEGMENT_COUNT: usize = 7;

/// 位（数字）引脚数量
pub const DIGIT_COUNT: usize = 4;

/// GPIO 控制器上的引脚总数 (GPIO0 ~ GPIO53)
pub const GPIO_PIN_COUNT: u8 = 54;

/// 引脚配置结构体
///
/// 包含数码管使用的全部 GPIO 引脚编号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayPins {
    /// 段引脚，顺序为：上、右上、右下、下、左下、左上、中
    ///
    /// 段引脚作为电流源，高电平点亮
    pub segments: [u8; SEGMENT_COUNT],

    /// 位选引脚，从左到右排列，下标与显示内容的槽位一一对应
    ///
    /// 位选引脚作为电流沉，低电平点亮
    pub digits: [u8; DIGIT_COUNT],

    /// 小数点引脚（所有位共用）
    pub dot: u8,
}

impl DisplayPins {
    /// 按配置顺序遍历全部 12 个引脚
    pub fn all(&self) -> impl Iterator<Item = u8> + '_ {
        self.segments
            .iter()
            .chain(self.digits.iter())
            .chain(std::iter::once(&self.dot))
            .copied()
    }
}

/// 默认引脚配置
///
/// 使用项目当前的接线：
/// - 段引脚: GPIO9, GPIO13, GPIO17, GPIO3, GPIO2, GPIO11, GPIO27
/// - 位选引脚: GPIO10, GPIO5, GPIO6, GPIO22
/// - 小数点: GPIO4
pub const DISPLAY_PINS: DisplayPins = DisplayPins {
    segments: [9, 13, 17, 3, 2, 11, 27],
    digits: [10, 5, 6, 22],
    dot: 4,
};

/// 验证引脚配置的有效性
///
/// # 参数
/// * `config` - 要验证的引脚配置
///
/// # 返回
/// * `Ok(())` - 配置有效
/// * `Err(String)` - 配置无效，包含错误信息
pub fn validate_config(config: &DisplayPins) -> Result<(), String> {
    let pins: Vec<u8> = config.all().collect();

    // 检查是否有重复的引脚
    for i in 0..pins.len() {
        for j in (i + 1)..pins.len() {
            if pins[i] == pins[j] {
                return Err(format!("引脚 {} 被重复使用", pins[i]));
            }
        }
    }

    // 检查引脚编号是否在 GPIO 控制器范围内
    for &pin in &pins {
        if pin >= GPIO_PIN_COUNT {
            return Err(format!(
                "引脚 {pin} 不是有效的 GPIO 引脚。有效范围: 0..{GPIO_PIN_COUNT}"
            ));
        }
    }

    Ok(())
}
