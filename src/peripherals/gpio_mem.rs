//! 内存映射 GPIO 寄存器
//!
//! 通过 `/dev/mem`（或 `/dev/gpiomem`）把 GPIO 控制器的一页寄存器映射到进程地址空间，
//! 不经过内核驱动直接读写。
//!
//! 寄存器布局（按 32 位字索引）：
//! - `GPFSEL0..=GPFSEL5` (0..=5): 功能选择，每个引脚 3 位，一个字放 10 个引脚
//! - `GPSET0/1` (7, 8): 写 1 置高，写 0 无效果
//! - `GPCLR0/1` (10, 11): 写 1 置低，写 0 无效果

use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::ptr::NonNull;

use thiserror::Error;

use crate::config::board::{BoardType, GpioMemConfig};
use crate::config::pins::GPIO_PIN_COUNT;

/// 功能选择寄存器 0 的字索引
pub const GPFSEL0: usize = 0;
/// 输出置位寄存器 0 的字索引
pub const GPSET0: usize = 7;
/// 输出清零寄存器 0 的字索引
pub const GPCLR0: usize = 10;

/// 窗口至少要覆盖到 GPCLR1
pub const REQUIRED_WORDS: usize = GPCLR0 + 2;

const FSEL_MASK: u32 = 0b111;
const FSEL_OUTPUT: u32 = 0b001;

/// GPIO 寄存器映射错误类型
#[derive(Debug, Error)]
pub enum GpioMemError {
    #[error("无法打开内存设备 {}: {source}（通常需要 root 权限）", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("映射物理地址 0x{offset:08x} 失败: {source}")]
    Map { offset: u64, source: io::Error },

    #[error("解除寄存器映射失败: {0}")]
    Unmap(io::Error),

    #[error("关闭内存设备失败: {0}")]
    Close(io::Error),

    #[error("物理偏移 0x{0:x} 超出当前平台 off_t 的范围")]
    InvalidOffset(u64),

    #[error("映射窗口过小: {0} 字节，至少需要 {min} 字节", min = REQUIRED_WORDS * 4)]
    WindowTooSmall(usize),

    #[error("寄存器窗口已经映射")]
    AlreadyMapped,

    #[error("寄存器字索引越界: {index} >= {len}")]
    OutOfWindow { index: usize, len: usize },
}

/// 以 32 位字为单位访问的寄存器窗口
///
/// 所有访问都带边界检查，越界返回 [`GpioMemError::OutOfWindow`]。
pub trait RegisterWindow: Send + Sync {
    /// 窗口内 32 位字的数量
    fn word_count(&self) -> usize;

    /// 读取一个字
    fn read_word(&self, index: usize) -> Result<u32, GpioMemError>;

    /// 写入一个字
    fn write_word(&self, index: usize, value: u32) -> Result<(), GpioMemError>;
}

/// GPIO 寄存器映射
///
/// 生命周期由 [`init`](Self::init) / [`deinit`](Self::deinit) 显式控制，
/// 引脚操作只需要 `&self`，可以在刷新线程和调用线程之间共享。
///
/// 功能选择字里挤着 10 个引脚，所以 [`configure_output`](Self::configure_output)
/// 必须读-改-写；置位/清零寄存器由硬件忽略 0 位，
/// [`set_pin`](Self::set_pin) / [`clear_pin`](Self::clear_pin) 只写不读。
pub trait GpioRegisters: Send + Sync + 'static {
    /// 映射后的寄存器窗口类型
    type Window: RegisterWindow;

    /// 打开设备并映射寄存器窗口
    fn init(&mut self) -> Result<(), GpioMemError>;

    /// 解除映射并关闭设备，未映射时什么也不做
    fn deinit(&mut self) -> Result<(), GpioMemError>;

    /// 当前映射的窗口，未初始化时为 `None`
    fn window(&self) -> Option<&Self::Window>;

    /// 将引脚配置为输出，不影响同一个字里其它引脚的功能位
    fn configure_output(&self, pin: u8) {
        let Some(window) = pin_window(self, pin) else {
            return;
        };

        let index = GPFSEL0 + usize::from(pin / 10);
        let shift = u32::from(pin % 10) * 3;
        let result = window.read_word(index).and_then(|current| {
            let value = (current & !(FSEL_MASK << shift)) | (FSEL_OUTPUT << shift);
            window.write_word(index, value)
        });

        match result {
            Ok(()) => log::debug!("GPIO{pin} 已配置为输出"),
            Err(e) => log::error!("配置 GPIO{pin} 为输出失败: {e}"),
        }
    }

    /// 通过 GPSET 寄存器将引脚置高
    fn set_pin(&self, pin: u8) {
        write_level(self, GPSET0, pin);
    }

    /// 通过 GPCLR 寄存器将引脚置低
    fn clear_pin(&self, pin: u8) {
        write_level(self, GPCLR0, pin);
    }
}

fn pin_window<R: GpioRegisters + ?Sized>(regs: &R, pin: u8) -> Option<&R::Window> {
    if pin >= GPIO_PIN_COUNT {
        log::error!("无效的引脚编号: {pin}");
        return None;
    }
    let window = regs.window();
    if window.is_none() {
        log::error!("GPIO 寄存器尚未映射，忽略 GPIO{pin} 的操作");
    }
    window
}

fn write_level<R: GpioRegisters + ?Sized>(regs: &R, bank0: usize, pin: u8) {
    let Some(window) = pin_window(regs, pin) else {
        return;
    };

    let index = bank0 + usize::from(pin / 32);
    if let Err(e) = window.write_word(index, 1 << (pin % 32)) {
        log::error!("写 GPIO{pin} 电平失败: {e}");
    }
}

/// 通过 mmap 映射的一页物理内存
pub struct MappedWindow {
    base: NonNull<u32>,
    len: usize,
    fd: Option<OwnedFd>,
}

// SAFETY: 映射在 `MappedWindow` 存活期间一直有效，
// 所有访问都是对齐的 32 位 volatile 读写。
unsafe impl Send for MappedWindow {}
unsafe impl Sync for MappedWindow {}

impl MappedWindow {
    /// 打开设备并映射 `config` 描述的窗口
    pub fn map(config: &GpioMemConfig) -> Result<Self, GpioMemError> {
        if config.page_size < REQUIRED_WORDS * 4 || config.page_size % 4 != 0 {
            return Err(GpioMemError::WindowTooSmall(config.page_size));
        }
        let offset = libc::off_t::try_from(config.offset)
            .map_err(|_| GpioMemError::InvalidOffset(config.offset))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&config.path)
            .map_err(|source| GpioMemError::Open {
                path: config.path.clone(),
                source,
            })?;

        // SAFETY: 参数均已校验，返回值在下面检查 MAP_FAILED
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                config.page_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            // file 在这里被 drop，设备随之关闭
            return Err(GpioMemError::Map {
                offset: config.offset,
                source: io::Error::last_os_error(),
            });
        }

        let base = NonNull::new(ptr.cast::<u32>()).ok_or_else(|| GpioMemError::Map {
            offset: config.offset,
            source: io::Error::other("mmap 返回空指针"),
        })?;

        Ok(Self {
            base,
            len: config.page_size,
            fd: Some(OwnedFd::from(file)),
        })
    }

    /// 解除映射并关闭设备
    pub fn unmap(mut self) -> Result<(), GpioMemError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), GpioMemError> {
        let Some(fd) = self.fd.take() else {
            return Ok(());
        };

        // SAFETY: base/len 与 mmap 时一致，且 fd 只会被取出一次
        if unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) } != 0 {
            return Err(GpioMemError::Unmap(io::Error::last_os_error()));
        }
        // SAFETY: into_raw_fd 之后由这里负责关闭
        if unsafe { libc::close(fd.into_raw_fd()) } != 0 {
            return Err(GpioMemError::Close(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl RegisterWindow for MappedWindow {
    fn word_count(&self) -> usize {
        self.len / 4
    }

    fn read_word(&self, index: usize) -> Result<u32, GpioMemError> {
        let len = self.word_count();
        if index >= len {
            return Err(GpioMemError::OutOfWindow { index, len });
        }
        // SAFETY: index 在映射范围内
        Ok(unsafe { self.base.as_ptr().add(index).read_volatile() })
    }

    fn write_word(&self, index: usize, value: u32) -> Result<(), GpioMemError> {
        let len = self.word_count();
        if index >= len {
            return Err(GpioMemError::OutOfWindow { index, len });
        }
        // SAFETY: index 在映射范围内
        unsafe { self.base.as_ptr().add(index).write_volatile(value) };
        Ok(())
    }
}

impl Drop for MappedWindow {
    fn drop(&mut self) {
        if self.fd.is_some() {
            log::warn!("寄存器窗口在 deinit 之前被释放，自动解除映射");
            if let Err(e) = self.release() {
                log::error!("{e}");
            }
        }
    }
}

/// 基于 `/dev/mem` 的 GPIO 寄存器映射
pub struct GpioMem {
    config: GpioMemConfig,
    window: Option<MappedWindow>,
}

impl GpioMem {
    /// 创建未映射的寄存器映射，需要调用 [`init`](GpioRegisters::init)
    pub fn new(config: GpioMemConfig) -> Self {
        Self {
            config,
            window: None,
        }
    }

    /// 使用板型默认的物理偏移
    pub fn for_board(board: BoardType) -> Self {
        Self::new(GpioMemConfig::for_board(board))
    }

    /// 覆盖内存设备路径，只在下一次 `init` 时生效
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.config.path = path.into();
    }

    pub fn config(&self) -> &GpioMemConfig {
        &self.config
    }

    pub fn is_mapped(&self) -> bool {
        self.window.is_some()
    }
}

impl GpioRegisters for GpioMem {
    type Window = MappedWindow;

    fn init(&mut self) -> Result<(), GpioMemError> {
        if self.window.is_some() {
            return Err(GpioMemError::AlreadyMapped);
        }
        let window = MappedWindow::map(&self.config)?;
        log::info!(
            "已映射 GPIO 寄存器: device={}, offset=0x{:08x}, size={}",
            self.config.path.display(),
            self.config.offset,
            self.config.page_size
        );
        self.window = Some(window);
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), GpioMemError> {
        match self.window.take() {
            Some(window) => {
                window.unmap()?;
                log::info!("已解除 GPIO 寄存器映射");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn window(&self) -> Option<&MappedWindow> {
        self.window.as_ref()
    }
}
