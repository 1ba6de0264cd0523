//! Kernel console output
//!
//! Formatting goes through [`print!`] / [`println!`]; the bytes land in
//! whatever [`Console`] sink was installed at boot (SBI putchar on the board,
//! a capture buffer on the host).

use core::fmt::{self, Write};

use spin::Once;

/// Byte sink behind the console macros.
pub trait Console: Sync {
    fn put_str(&self, s: &str);
}

static CONSOLE: Once<&'static dyn Console> = Once::new();

/// install the console sink, only the first call wins
pub fn set_console(console: &'static dyn Console) {
    CONSOLE.call_once(|| console);
}

struct Stdout;

impl Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(console) = CONSOLE.get() {
            console.put_str(s);
        }
        Ok(())
    }
}

pub fn print(args: fmt::Arguments) {
    // `Stdout` never reports an error
    let _ = Stdout.write_fmt(args);
}

/// print string macro
#[macro_export]
macro_rules! print {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!($fmt $(, $($arg)+)?))
    }
}

/// println string macro
#[macro_export]
macro_rules! println {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!(concat!($fmt, "\n") $(, $($arg)+)?))
    }
}
