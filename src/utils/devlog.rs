//! Developer timing lines ("level 6"): one JSON object per compile, store call and query.
//!
//! Lines go to the `nexuslite_repository::dev6` log target at trace level. Tests can capture
//! them per thread with [`enable_thread_sink`] instead of configuring a logger.

use std::cell::RefCell;
use std::time::Duration;

pub const DEV_TARGET: &str = "nexuslite_repository::dev6";

thread_local! {
    static CAPTURED: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Stops capturing on the owning thread when dropped.
pub struct DevSinkGuard(());

impl Drop for DevSinkGuard {
    fn drop(&mut self) {
        CAPTURED.with(|c| c.borrow_mut().take());
    }
}

/// Start capturing dev lines emitted on this thread.
#[must_use = "capturing stops when the guard is dropped"]
pub fn enable_thread_sink() -> DevSinkGuard {
    CAPTURED.with(|c| *c.borrow_mut() = Some(Vec::new()));
    DevSinkGuard(())
}

pub fn write_str(line: &str) {
    CAPTURED.with(|c| {
        if let Some(lines) = c.borrow_mut().as_mut() {
            lines.push(line.to_owned());
        }
    });
}

/// Take the captured lines, leaving capture enabled.
pub fn drain() -> Vec<String> {
    CAPTURED.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

pub fn snapshot() -> Vec<String> {
    CAPTURED.with(|c| c.borrow().clone().unwrap_or_default())
}

/// Emit a timing line tagged `"bench": kind`. `fields` must be a JSON object.
pub fn bench(kind: &str, elapsed: Duration, mut fields: serde_json::Value) {
    if let Some(obj) = fields.as_object_mut() {
        obj.insert("bench".into(), kind.into());
        obj.insert("duration_us".into(), super::num::u128_to_u64_saturating(elapsed.as_micros()).into());
    }
    crate::dev6!("{fields}");
}

/// Format, capture and log one dev line.
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let __line = format!($($arg)*);
        $crate::utils::devlog::write_str(&__line);
        log::trace!(target: $crate::utils::devlog::DEV_TARGET, "{}", __line);
    }};
}
