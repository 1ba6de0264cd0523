use log::{Level, LevelFilter, Metadata, Record};

struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        println!(
            "\x1b[{}m[{:>5}][{}] {}\x1b[0m",
            level_to_color_code(record.level()),
            record.level(),
            subsystem(record.target()),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// install the kernel logger; the level comes from the `LOG` variable at build time
pub fn init() {
    static LOGGER: SimpleLogger = SimpleLogger;
    if log::set_logger(&LOGGER).is_err() {
        // a logger is already installed (host test binaries call `init` repeatedly)
        return;
    }
    log::set_max_level(match option_env!("LOG") {
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    })
}

/// `vmcore::mm::swap` -> `mm::swap`
fn subsystem(target: &str) -> &str {
    target.strip_prefix("vmcore::").unwrap_or(target)
}

fn level_to_color_code(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 34,  // Blue
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}
