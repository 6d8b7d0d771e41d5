//! C ABI.
//!
//! Every export takes NUL-terminated UTF-8 paths and returns a newly
//! allocated NUL-terminated message. The caller owns the returned pointer
//! and must hand it back to [`vidcompress_release`] exactly once.

use std::ffi::{CStr, CString, c_char};
use std::path::PathBuf;

use crate::report;

/// Probe a file and return its summary or an error message.
///
/// # Safety
///
/// `path` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vidcompress_probe(path: *const c_char) -> *mut c_char {
    let message = match unsafe { path_arg(path, "input") } {
        Ok(path) => report::probe(path),
        Err(message) => message,
    };
    into_raw_message(message)
}

/// Transcode `input` to `output` and return a success or error message.
///
/// # Safety
///
/// Both pointers must be null or point to NUL-terminated strings that stay
/// valid for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vidcompress_transcode(
    input: *const c_char,
    output: *const c_char,
) -> *mut c_char {
    let paths = unsafe { path_arg(input, "input") }
        .and_then(|input| unsafe { path_arg(output, "output") }.map(|output| (input, output)));
    let message = match paths {
        Ok((input, output)) => report::transcode(input, output),
        Err(message) => message,
    };
    into_raw_message(message)
}

/// Free a message returned by this library. Null is ignored.
///
/// # Safety
///
/// `message` must be null or a pointer returned by one of the exports above
/// that has not been released yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vidcompress_release(message: *mut c_char) {
    if message.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(message) });
}

unsafe fn path_arg(pointer: *const c_char, role: &str) -> Result<PathBuf, String> {
    if pointer.is_null() {
        return Err(format!("Invalid {role} path: null pointer"));
    }
    let raw = unsafe { CStr::from_ptr(pointer) };
    raw.to_str()
        .map(PathBuf::from)
        .map_err(|_| format!("Invalid {role} path: not valid UTF-8"))
}

fn into_raw_message(message: String) -> *mut c_char {
    let bytes: Vec<u8> = message.into_bytes().into_iter().filter(|&b| b != 0).collect();
    // Interior NULs were stripped above, so this cannot fail.
    CString::new(bytes).unwrap_or_default().into_raw()
}
