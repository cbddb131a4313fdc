//! Panic isolation for task code.

use crate::error::Error;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `f`, turning an unwinding panic into a [`PanicInfo`].
pub(crate) fn catch_panic<F, R>(f: F) -> Result<R, PanicInfo>
where
    F: FnOnce() -> R,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(PanicInfo::from_payload)
}

/// A caught panic.
#[derive(Debug, Clone)]
pub struct PanicInfo {
    /// Panic message, or `"Unknown panic"` for non-string payloads.
    pub message: String,
}

impl PanicInfo {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        Self { message }
    }
}

impl From<PanicInfo> for Error {
    fn from(info: PanicInfo) -> Self {
        Error::TaskPanicked(info.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_success() {
        let result = catch_panic(|| 42);
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_catch_str_panic() {
        let info = catch_panic(|| panic!("test panic")).unwrap_err();
        assert_eq!(info.message, "test panic");
    }

    #[test]
    fn test_catch_formatted_panic() {
        let n = 7;
        let info = catch_panic(|| panic!("bad value {}", n)).unwrap_err();
        assert_eq!(info.message, "bad value 7");

        let err: Error = info.into();
        assert!(err.is_panic());
    }

    #[test]
    fn test_catch_opaque_payload() {
        let info = catch_panic(|| std::panic::panic_any(13u8)).unwrap_err();
        assert_eq!(info.message, "Unknown panic");
    }
}
