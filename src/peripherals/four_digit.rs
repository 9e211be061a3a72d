//! 四位七段数码管（动态扫描）
//!
//! 四个位共用 7 根段线和 1 根小数点线，刷新线程轮流点亮每一位并停留一小段时间，
//! 依靠视觉暂留看起来四位同时显示。
//!
//! 电平约定：
//! - 段和小数点是电流源，高电平（GPSET）点亮，低电平（GPCLR）熄灭
//! - 位选是电流沉，低电平（GPCLR）点亮，高电平（GPSET）熄灭
//!
//! 显示内容按槽位独立原子更新，刷新线程读到的一轮画面可能新旧混合，
//! 下一轮即全部为新内容。
//!
//! 运行状态和停止请求都是原子计数，不加锁：
//! - `run` 是刷新线程的代数，奇数表示第 `run` 代正在运行，偶数表示空闲
//! - `stop` 是已请求停止的最高代数，第 `n` 代在 `stop >= n` 时退出
//!
//! 空闲时的停止请求落在下一代上，下一次 `start` 的线程一开始就会退出。

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use embedded_hal::delay::DelayNs;
use thiserror::Error;

use super::gpio_mem::{GpioMem, GpioMemError, GpioRegisters};
use super::seven_segment::{pattern_for, Digit, SegmentPattern};
use crate::config::pins::{self, DisplayPins, DIGIT_COUNT};
use crate::utils::delay::StdDelay;

/// 槽位里的空白标记，不点亮任何段
const BLANK: u8 = u8::MAX;

/// 数码管错误类型
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("引脚配置无效: {0}")]
    InvalidPins(String),

    #[error(transparent)]
    Gpio(#[from] GpioMemError),

    #[error("数码管尚未初始化")]
    NotInitialized,

    #[error("刷新线程正在运行")]
    Busy,

    #[error("无法启动刷新线程: {0}")]
    Spawn(io::Error),

    #[error("刷新线程异常退出")]
    RenderPanicked,
}

/// 四个槽位的显示内容；调用方只写，刷新线程只读
struct DisplayState {
    digits: [AtomicU8; DIGIT_COUNT],
    dots: [AtomicBool; DIGIT_COUNT],
    run: AtomicU64,
    stop: AtomicU64,
}

impl DisplayState {
    fn new() -> Self {
        Self {
            digits: std::array::from_fn(|_| AtomicU8::new(BLANK)),
            dots: std::array::from_fn(|_| AtomicBool::new(false)),
            run: AtomicU64::new(0),
            stop: AtomicU64::new(0),
        }
    }

    fn clear(&self) {
        for slot in &self.digits {
            slot.store(BLANK, Ordering::Release);
        }
        for slot in &self.dots {
            slot.store(false, Ordering::Release);
        }
    }

    fn pattern(&self, position: usize) -> SegmentPattern {
        pattern_for(self.digits[position].load(Ordering::Acquire))
    }

    fn dot(&self, position: usize) -> bool {
        self.dots[position].load(Ordering::Acquire)
    }

    fn is_running(&self) -> bool {
        self.run.load(Ordering::Acquire) % 2 == 1
    }

    /// 空闲时进入下一代，返回新的代数；已有线程在运行时返回 `None`
    fn begin_run(&self) -> Option<u64> {
        let current = self.run.load(Ordering::Acquire);
        if current % 2 == 1 {
            return None;
        }
        self.run
            .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| current + 1)
    }

    fn end_run(&self) {
        self.run.fetch_add(1, Ordering::AcqRel);
    }

    /// 停止正在运行的一代；空闲时停止下一代
    fn request_stop(&self) {
        let current = self.run.load(Ordering::Acquire);
        let target = if current % 2 == 1 { current } else { current + 1 };
        self.stop_generation(target);
    }

    /// 停止请求只增不减，重复请求没有额外效果
    fn stop_generation(&self, generation: u64) {
        self.stop.fetch_max(generation, Ordering::AcqRel);
    }

    fn stop_requested(&self, generation: u64) -> bool {
        self.stop.load(Ordering::Acquire) >= generation
    }
}

/// 刷新线程退出（包括 panic）时回到空闲代
struct RunningGuard<'a>(&'a DisplayState);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.end_run();
    }
}

/// 四位七段数码管
///
/// 典型用法：
///
/// ```no_run
/// use four_seg_display::config::{BoardType, DISPLAY_PINS};
/// use four_seg_display::peripherals::{Digit, FourDigitDisplay, GpioMem};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut display = FourDigitDisplay::new(GpioMem::for_board(BoardType::PiZero));
/// display.init(DISPLAY_PINS)?;
///
/// display.set_content(Digit::digits_of(1234), [false, true, false, false]);
/// let handle = display.start(2_000)?;
/// std::thread::sleep(std::time::Duration::from_secs(5));
/// display.request_stop();
/// handle.wait()?;
///
/// display.all_off();
/// display.deinit()?;
/// # Ok(())
/// # }
/// ```
pub struct FourDigitDisplay<R: GpioRegisters = GpioMem> {
    regs: Arc<R>,
    pins: Option<DisplayPins>,
    state: Arc<DisplayState>,
}

impl<R: GpioRegisters> FourDigitDisplay<R> {
    /// 创建数码管，内容为空白，需要调用 [`init`](Self::init)
    pub fn new(regs: R) -> Self {
        Self {
            regs: Arc::new(regs),
            pins: None,
            state: Arc::new(DisplayState::new()),
        }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn pins(&self) -> Option<&DisplayPins> {
        self.pins.as_ref()
    }

    /// 映射寄存器并把 12 个引脚配置为输出
    ///
    /// 引脚配置先于映射校验，校验失败时不会打开设备。显示内容被重置为空白。
    pub fn init(&mut self, pins: DisplayPins) -> Result<(), DisplayError> {
        pins::validate_config(&pins).map_err(DisplayError::InvalidPins)?;

        let regs = Arc::get_mut(&mut self.regs).ok_or(DisplayError::Busy)?;
        regs.init()?;
        for pin in pins.all() {
            regs.configure_output(pin);
        }

        self.pins = Some(pins);
        self.state.clear();
        log::info!(
            "数码管初始化完成: 段引脚 {:?}, 位选引脚 {:?}, 小数点 GPIO{}",
            pins.segments,
            pins.digits,
            pins.dot
        );
        Ok(())
    }

    /// 解除寄存器映射
    ///
    /// 刷新线程还持有寄存器时返回 [`DisplayError::Busy`]，需要先等待 [`RenderHandle`]。
    pub fn deinit(&mut self) -> Result<(), DisplayError> {
        let regs = Arc::get_mut(&mut self.regs).ok_or(DisplayError::Busy)?;
        regs.deinit()?;
        self.pins = None;
        Ok(())
    }

    /// 替换四个槽位的数字和小数点，可以在刷新期间从任意线程调用
    pub fn set_content(&self, digits: [Digit; DIGIT_COUNT], dots: [bool; DIGIT_COUNT]) {
        for (slot, digit) in self.state.digits.iter().zip(digits) {
            slot.store(digit.value(), Ordering::Release);
        }
        for (slot, dot) in self.state.dots.iter().zip(dots) {
            slot.store(dot, Ordering::Release);
        }
    }

    /// 当前显示内容，空白槽位为 `None`
    pub fn content(&self) -> ([Option<Digit>; DIGIT_COUNT], [bool; DIGIT_COUNT]) {
        let digits = std::array::from_fn(|i| {
            Digit::new(u32::from(self.state.digits[i].load(Ordering::Acquire))).ok()
        });
        let dots = std::array::from_fn(|i| self.state.dot(i));
        (digits, dots)
    }

    /// 启动刷新线程，每一位停留 `dwell_us` 微秒
    pub fn start(&self, dwell_us: u32) -> Result<RenderHandle, DisplayError> {
        self.start_with_delay(dwell_us, StdDelay)
    }

    /// 使用指定的延时实现启动刷新线程
    pub fn start_with_delay<D>(&self, dwell_us: u32, mut delay: D) -> Result<RenderHandle, DisplayError>
    where
        D: DelayNs + Send + 'static,
    {
        let pins = self.pins.ok_or(DisplayError::NotInitialized)?;
        let generation = self.state.begin_run().ok_or(DisplayError::Busy)?;

        let regs = Arc::clone(&self.regs);
        let state = Arc::clone(&self.state);
        let spawned = thread::Builder::new()
            .name("seg-mux".to_string())
            .spawn(move || {
                let _running = RunningGuard(&state);
                let passes = render_loop(&*regs, &pins, &state, generation, dwell_us, &mut delay);
                // 先释放寄存器再清除运行标记，等待结束后即可 deinit
                drop(regs);
                log::info!("数码管刷新已停止，共刷新 {passes} 轮");
                passes
            });

        match spawned {
            Ok(thread) => {
                log::info!("数码管刷新已启动: 每位停留 {dwell_us} us");
                Ok(RenderHandle {
                    state: Arc::clone(&self.state),
                    generation,
                    thread: Some(thread),
                })
            }
            Err(e) => {
                self.state.end_run();
                Err(DisplayError::Spawn(e))
            }
        }
    }

    /// 请求当前刷新线程停止，不阻塞
    ///
    /// 刷新线程在每一轮开始时检查停止标志，最多再刷新一轮后退出。
    /// 没有线程在运行时，请求作用于下一次 [`start`](Self::start)。
    pub fn request_stop(&self) {
        self.state.request_stop();
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// 同时点亮四个位（硬件检查用，四位显示同一个数字）
    pub fn all_on(&self) -> Result<(), DisplayError> {
        let pins = self.idle_pins()?;
        for pin in pins.digits {
            self.regs.clear_pin(pin);
        }
        Ok(())
    }

    /// 直接驱动段线显示一个数字，配合 [`all_on`](Self::all_on) 使用
    pub fn show_digit(&self, digit: Digit) -> Result<(), DisplayError> {
        let pins = self.idle_pins()?;
        drive_segments(&*self.regs, &pins, digit.pattern());
        Ok(())
    }

    /// 熄灭所有位并清空显示内容
    pub fn all_off(&self) {
        match self.pins {
            Some(pins) => blank_digits(&*self.regs, &pins),
            None => log::warn!("数码管尚未初始化，只清空显示内容"),
        }
        self.state.clear();
    }

    fn idle_pins(&self) -> Result<DisplayPins, DisplayError> {
        let pins = self.pins.ok_or(DisplayError::NotInitialized)?;
        if self.is_running() {
            return Err(DisplayError::Busy);
        }
        Ok(pins)
    }
}

/// 刷新线程的句柄
///
/// 线程只有在观察到停止请求并完全退出后才算结束。
/// 没有 `wait` 就被丢弃时会请求停止并等待线程退出。
#[must_use = "刷新线程需要通过 wait 回收"]
pub struct RenderHandle {
    state: Arc<DisplayState>,
    generation: u64,
    thread: Option<JoinHandle<u64>>,
}

impl RenderHandle {
    /// 只停止这个句柄对应的刷新线程
    pub fn request_stop(&self) {
        self.state.stop_generation(self.generation);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// 等待刷新线程退出，返回刷新的轮数
    ///
    /// 需要先调用 `request_stop`，否则会一直阻塞。
    pub fn wait(mut self) -> Result<u64, DisplayError> {
        self.join()
    }

    fn join(&mut self) -> Result<u64, DisplayError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| DisplayError::RenderPanicked),
            None => Ok(0),
        }
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            log::warn!("刷新句柄在 wait 之前被丢弃，停止刷新线程");
            self.request_stop();
            if let Err(e) = self.join() {
                log::error!("{e}");
            }
        }
    }
}

fn blank_digits<R: GpioRegisters + ?Sized>(regs: &R, pins: &DisplayPins) {
    for &pin in &pins.digits {
        regs.set_pin(pin);
    }
}

fn drive_segments<R: GpioRegisters + ?Sized>(regs: &R, pins: &DisplayPins, pattern: SegmentPattern) {
    for (&pin, lit) in pins.segments.iter().zip(pattern) {
        if lit {
            regs.set_pin(pin);
        } else {
            regs.clear_pin(pin);
        }
    }
}

fn render_loop<R, D>(
    regs: &R,
    pins: &DisplayPins,
    state: &DisplayState,
    generation: u64,
    dwell_us: u32,
    delay: &mut D,
) -> u64
where
    R: GpioRegisters + ?Sized,
    D: DelayNs,
{
    blank_digits(regs, pins);

    let mut previous = DIGIT_COUNT - 1;
    let mut passes = 0;
    while !state.stop_requested(generation) {
        for position in 0..DIGIT_COUNT {
            // 先灭上一位再点亮这一位，两位同时导通会把段线短在一起
            regs.set_pin(pins.digits[previous]);

            drive_segments(regs, pins, state.pattern(position));
            if state.dot(position) {
                regs.set_pin(pins.dot);
            } else {
                regs.clear_pin(pins.dot);
            }

            regs.clear_pin(pins.digits[position]);
            previous = position;

            delay.delay_us(dwell_us);
        }
        passes += 1;
    }
    passes
}
