//! 测试用的模拟寄存器
//!
//! `MockGpio` 用内存数组代替映射窗口，把每一次字读写和每一次停留都记录到同一条
//! [`Trace`] 里；[`frames`] 按写入顺序重建引脚电平，用来检查刷新时序。

#![cfg(test)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;

use super::gpio_mem::{GpioMemError, GpioRegisters, RegisterWindow, GPCLR0, GPSET0, REQUIRED_WORDS};
use crate::config::pins::{DisplayPins, DIGIT_COUNT, SEGMENT_COUNT};

/// 记录的一次硬件交互
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Read { index: usize, value: u32 },
    Write { index: usize, value: u32 },
    Dwell { us: u32 },
}

/// 共享的交互记录
#[derive(Debug, Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<Event>>>);

impl Trace {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn dwell_count(&self) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::Dwell { .. }))
            .count()
    }

    /// 轮询直到记录里至少有 `count` 次停留
    pub fn wait_for_dwells(&self, count: usize, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.dwell_count() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }
}

pub struct MockWindow {
    words: Vec<AtomicU32>,
    trace: Trace,
}

impl RegisterWindow for MockWindow {
    fn word_count(&self) -> usize {
        self.words.len()
    }

    fn read_word(&self, index: usize) -> Result<u32, GpioMemError> {
        let len = self.words.len();
        let value = self
            .words
            .get(index)
            .ok_or(GpioMemError::OutOfWindow { index, len })?
            .load(Ordering::SeqCst);
        self.trace.push(Event::Read { index, value });
        Ok(value)
    }

    fn write_word(&self, index: usize, value: u32) -> Result<(), GpioMemError> {
        let len = self.words.len();
        self.words
            .get(index)
            .ok_or(GpioMemError::OutOfWindow { index, len })?
            .store(value, Ordering::SeqCst);
        self.trace.push(Event::Write { index, value });
        Ok(())
    }
}

/// 内存里的 GPIO 寄存器，`init` 之后才有窗口
pub struct MockGpio {
    window: Option<MockWindow>,
    trace: Trace,
    init_count: usize,
}

impl MockGpio {
    pub fn new() -> Self {
        Self {
            window: None,
            trace: Trace::default(),
            init_count: 0,
        }
    }

    pub fn trace(&self) -> Trace {
        self.trace.clone()
    }

    pub fn init_count(&self) -> usize {
        self.init_count
    }

    /// 不记录地读一个字
    pub fn peek(&self, index: usize) -> u32 {
        self.window.as_ref().unwrap().words[index].load(Ordering::SeqCst)
    }

    /// 不记录地写一个字
    pub fn poke(&self, index: usize, value: u32) {
        self.window.as_ref().unwrap().words[index].store(value, Ordering::SeqCst);
    }
}

impl GpioRegisters for MockGpio {
    type Window = MockWindow;

    fn init(&mut self) -> Result<(), GpioMemError> {
        if self.window.is_some() {
            return Err(GpioMemError::AlreadyMapped);
        }
        self.window = Some(MockWindow {
            words: (0..REQUIRED_WORDS).map(|_| AtomicU32::new(0)).collect(),
            trace: self.trace.clone(),
        });
        self.init_count += 1;
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), GpioMemError> {
        self.window = None;
        Ok(())
    }

    fn window(&self) -> Option<&MockWindow> {
        self.window.as_ref()
    }
}

/// 记录每次停留并真实休眠
pub struct MockDelay {
    trace: Trace,
}

impl MockDelay {
    pub fn new(trace: Trace) -> Self {
        Self { trace }
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.delay_us(ns / 1000);
    }

    fn delay_us(&mut self, us: u32) {
        self.trace.push(Event::Dwell { us });
        std::thread::sleep(Duration::from_micros(u64::from(us)));
    }
}

/// 按 GPSET/GPCLR 写入重建的 54 个引脚电平，初始全部为低
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinLevels(u64);

impl PinLevels {
    pub fn apply(&mut self, event: &Event) {
        if let Event::Write { index, value } = *event {
            let value = u64::from(value);
            match index {
                i if i == GPSET0 => self.0 |= value,
                i if i == GPSET0 + 1 => self.0 |= value << 32,
                i if i == GPCLR0 => self.0 &= !value,
                i if i == GPCLR0 + 1 => self.0 &= !(value << 32),
                _ => {}
            }
        }
    }

    pub fn is_high(&self, pin: u8) -> bool {
        self.0 & (1 << pin) != 0
    }

    /// 位选低电平有效
    pub fn active_digits(&self, pins: &DisplayPins) -> Vec<usize> {
        (0..DIGIT_COUNT)
            .filter(|&i| !self.is_high(pins.digits[i]))
            .collect()
    }

    pub fn segments(&self, pins: &DisplayPins) -> [bool; SEGMENT_COUNT] {
        pins.segments.map(|pin| self.is_high(pin))
    }
}

/// 一次停留期间数码管上的画面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 对应 `Dwell` 事件在记录里的下标
    pub event_index: usize,
    pub active_digits: Vec<usize>,
    pub segments: [bool; SEGMENT_COUNT],
    pub dot: bool,
}

/// 回放记录，每个 `Dwell` 产生一帧
pub fn frames(events: &[Event], pins: &DisplayPins) -> Vec<Frame> {
    let mut levels = PinLevels::default();
    let mut frames = Vec::new();
    for (event_index, event) in events.iter().enumerate() {
        levels.apply(event);
        if let Event::Dwell { .. } = event {
            frames.push(Frame {
                event_index,
                active_digits: levels.active_digits(pins),
                segments: levels.segments(pins),
                dot: levels.is_high(pins.dot),
            });
        }
    }
    frames
}

/// 从所有位选第一次全部熄灭开始，任意时刻同时点亮的位数的最大值
///
/// 记录里从未出现全灭状态时返回 `None`。
pub fn max_overlap_after_blank(events: &[Event], pins: &DisplayPins) -> Option<usize> {
    let mut levels = PinLevels::default();
    let mut max = None;
    for event in events {
        levels.apply(event);
        let active = levels.active_digits(pins).len();
        match max {
            None if active == 0 => max = Some(0),
            Some(m) if active > m => max = Some(active),
            _ => {}
        }
    }
    max
}
