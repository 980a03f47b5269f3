//! Logger initialization and identity-prefixed logging macros.

use std::io::Write;
use std::sync::RwLock;

use lazy_static::lazy_static;

use log::LevelFilter;

lazy_static! {
    /// Identity string of this process (e.g. "p3", "reg"), prefixed to
    /// every log record.
    pub static ref ME: RwLock<String> = RwLock::new("?".into());
}

/// Returns a copy of the current process identity string.
pub fn me() -> String {
    match ME.read() {
        Ok(me) => me.clone(),
        Err(_) => "?".into(),
    }
}

/// Sets the process identity string once it is known (a peer learns its id
/// only after registration).
pub fn set_me(me: impl ToString) {
    if let Ok(mut slot) = ME.write() {
        *slot = me.to_string();
    }
}

/// Maps the `VERBOSE` environment convention onto a log level filter:
/// `""` -> Info, `"1"` -> Debug, `"2"` -> Trace.
pub fn verbose_level(verbose: &str) -> LevelFilter {
    match verbose {
        "2" => LevelFilter::Trace,
        "1" => LevelFilter::Debug,
        _ => LevelFilter::Info,
    }
}

/// Initializes the global logger with the given identity and level.
pub fn logger_init(me: impl ToString, level: LevelFilter) {
    set_me(me);
    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{:<5}] {}",
                record.level(),
                record.args()
            )
        })
        .init();
}

/// Log a trace-level message prefixed with my identity string.
#[macro_export]
macro_rules! pf_trace {
    ($($arg:tt)*) => {
        log::trace!("({}) {}", $crate::me(), format!($($arg)*))
    };
}

/// Log a debug-level message prefixed with my identity string.
#[macro_export]
macro_rules! pf_debug {
    ($($arg:tt)*) => {
        log::debug!("({}) {}", $crate::me(), format!($($arg)*))
    };
}

/// Log an info-level message prefixed with my identity string.
#[macro_export]
macro_rules! pf_info {
    ($($arg:tt)*) => {
        log::info!("({}) {}", $crate::me(), format!($($arg)*))
    };
}

/// Log a warn-level message prefixed with my identity string.
#[macro_export]
macro_rules! pf_warn {
    ($($arg:tt)*) => {
        log::warn!("({}) {}", $crate::me(), format!($($arg)*))
    };
}

/// Log an error-level message prefixed with my identity string.
#[macro_export]
macro_rules! pf_error {
    ($($arg:tt)*) => {
        log::error!("({}) {}", $crate::me(), format!($($arg)*))
    };
}

/// Log an error-level message and make a `CoronetError` out of it.
#[macro_export]
macro_rules! logged_err {
    ($($arg:tt)*) => {{
        $crate::pf_error!($($arg)*);
        Err($crate::CoronetError::msg(format!($($arg)*)))
    }};
}
