use std::io::Write;

/// 应用程序使用的日志初始化
///
/// 默认级别为 Info，可以通过 `RUST_LOG` 覆盖。重复调用会 panic。
pub fn init_log() {
    builder(log::LevelFilter::Info).parse_default_env().init();
}

/// 测试使用的日志初始化
///
/// 输出交给 test harness 捕获；多个测试重复调用是安全的。
pub fn init_test_log() {
    let _ = builder(log::LevelFilter::Debug).is_test(true).parse_default_env().try_init();
}

fn builder(level: log::LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            let line = record.line().unwrap_or(!0);
            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();
            let target = record.target();

            writeln!(
                buf,
                "{level_style}[{time}] {level}{level_style:#} {grey_style}[{target} {file}:{line}]{grey_style:#} {}",
                record.args()
            )
        })
        .filter(None, level);
    builder
}
