use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use four_seg_display::config::{BoardType, GpioMemConfig, DISPLAY_PINS};
use four_seg_display::peripherals::{Digit, FourDigitDisplay, GpioMem};

#[derive(Parser)]
#[command(name = "four-seg")]
#[command(about = "通过内存映射 GPIO 驱动四位七段数码管", long_about = None)]
#[command(version)]
struct Cli {
    /// 板型: zero, pi3, pi4
    #[arg(long, default_value_t = BoardType::PiZero)]
    board: BoardType,

    /// 使用 /dev/gpiomem（不需要 root）
    #[arg(long, conflicts_with = "board")]
    gpiomem: bool,

    /// 覆盖内存设备路径
    #[arg(long)]
    mem: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 四位同时点亮并显示同一个数字，用于检查接线
    Segment {
        /// 要显示的数字 (0-9)
        digit: u32,
    },
    /// 显示 1 2.3 4 一段时间
    Run {
        /// 每一位的停留时间（微秒）
        #[arg(long, default_value_t = 2_000)]
        dwell_us: u32,
        /// 运行时长（秒）
        #[arg(long, default_value_t = 5)]
        secs: u64,
    },
    /// 每秒加一，从 0 数到给定的数
    Count {
        /// 每一位的停留时间（微秒）
        #[arg(long, default_value_t = 2_000)]
        dwell_us: u32,
        /// 数到多少
        to: u32,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = if cli.gpiomem {
        GpioMemConfig::gpiomem()
    } else {
        GpioMemConfig::for_board(cli.board)
    };
    if let Some(path) = cli.mem {
        config = config.with_path(path);
    }

    let mut display = FourDigitDisplay::new(GpioMem::new(config));
    display.init(DISPLAY_PINS).context("数码管初始化失败")?;

    let result = match cli.command {
        Commands::Segment { digit } => segment_test(&display, digit),
        Commands::Run { dwell_us, secs } => run_fixed(&display, dwell_us, secs),
        Commands::Count { dwell_us, to } => count_up(&display, dwell_us, to),
    };

    display.deinit().context("释放 GPIO 映射失败")?;
    result
}

/// 点亮后直接退出，GPIO 输出会保持
fn segment_test(display: &FourDigitDisplay, digit: u32) -> Result<()> {
    let digit = Digit::new(digit)?;
    display.all_on()?;
    display.show_digit(digit)?;
    log::info!("四位同时显示 {digit}");
    Ok(())
}

fn run_fixed(display: &FourDigitDisplay, dwell_us: u32, secs: u64) -> Result<()> {
    // 从左到右 1 2. 3 4
    display.set_content(Digit::digits_of(1234), [false, true, false, false]);

    let handle = display.start(dwell_us)?;
    sleep(Duration::from_secs(secs));
    display.request_stop();
    handle.wait()?;

    display.all_off();
    Ok(())
}

fn count_up(display: &FourDigitDisplay, dwell_us: u32, to: u32) -> Result<()> {
    let handle = display.start(dwell_us)?;
    for n in 0..=to {
        display.set_content(Digit::digits_of(n), [false; 4]);
        log::info!("计数: {n}");
        sleep(Duration::from_secs(1));
    }
    display.request_stop();
    handle.wait()?;

    display.all_off();
    Ok(())
}
