//! FFI bindings for the trial engine
//!
//! This module lets a host UI (browser shell, native app) drive a session
//! through a C ABI. The host forwards its pointer, click and key events; each
//! call returns the render commands to apply as a JSON array. All returned
//! strings are allocated here and must be freed with `fnl_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::ExperimentConfig;
use crate::error::SessionError;
use crate::render::RecordingRenderer;
use crate::session::{MemorySink, Session, SessionEvent};
use crate::stimulus::StimulusGenerator;
use crate::types::TrainingSet;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn to_json_cstr<T: serde::Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn build_session(
    training_json: &str,
    config: ExperimentConfig,
) -> Result<Session<RecordingRenderer, MemorySink>, SessionError> {
    let training = TrainingSet::from_json(training_json)?;
    let stimuli = StimulusGenerator::generate(training, &config)?;
    Session::with_stimuli(config, stimuli, RecordingRenderer::new(), MemorySink::new())
}

/// Opaque handle to a running session
pub struct SessionHandle {
    session: Session<RecordingRenderer, MemorySink>,
}

impl SessionHandle {
    fn dispatch(&mut self, event: SessionEvent) -> *mut c_char {
        self.session.dispatch(event);
        let commands = self.session.renderer_mut().take_log();
        to_json_cstr(&commands)
    }
}

/// Create a session from a `{"x": [..], "y": [..]}` training set.
///
/// # Safety
/// - `training_json` must be a valid null-terminated C string.
/// - `config_json` may be NULL for defaults, otherwise a valid C string.
/// - Returns a handle that must be freed with `fnl_session_free`, or NULL on
///   error; call `fnl_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fnl_session_new(
    training_json: *const c_char,
    config_json: *const c_char,
) -> *mut SessionHandle {
    clear_last_error();

    let training_str = match cstr_to_string(training_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid training JSON string pointer");
            return ptr::null_mut();
        }
    };

    let config = if config_json.is_null() {
        ExperimentConfig::default()
    } else {
        let parsed = cstr_to_string(config_json)
            .ok_or_else(|| "Invalid config JSON string pointer".to_string())
            .and_then(|s| ExperimentConfig::from_json(&s).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => config,
            Err(msg) => {
                set_last_error(&msg);
                return ptr::null_mut();
            }
        }
    };

    match build_session(&training_str, config) {
        Ok(session) => Box::into_raw(Box::new(SessionHandle { session })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session.
///
/// # Safety
/// - `handle` must be a pointer returned by `fnl_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fnl_session_free(handle: *mut SessionHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Render commands produced while loading the session (the first trial's setup).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `fnl_session_new`.
#[no_mangle]
pub unsafe extern "C" fn fnl_session_initial_commands(handle: *mut SessionHandle) -> *mut c_char {
    clear_last_error();
    let Some(handle) = handle.as_mut() else {
        set_last_error("Null session handle");
        return ptr::null_mut();
    };
    let commands = handle.session.renderer_mut().take_log();
    to_json_cstr(&commands)
}

/// Forward a pointer move at vertical page coordinate `page_y`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `fnl_session_new`.
/// - Returns a JSON array of render commands to be freed with `fnl_free_string`.
#[no_mangle]
pub unsafe extern "C" fn fnl_session_pointer_move(
    handle: *mut SessionHandle,
    page_y: f64,
) -> *mut c_char {
    clear_last_error();
    match handle.as_mut() {
        Some(handle) => handle.dispatch(SessionEvent::PointerMove { page_y }),
        None => {
            set_last_error("Null session handle");
            ptr::null_mut()
        }
    }
}

/// Forward a commit (click).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `fnl_session_new`.
/// - Returns a JSON array of render commands to be freed with `fnl_free_string`.
#[no_mangle]
pub unsafe extern "C" fn fnl_session_commit(handle: *mut SessionHandle) -> *mut c_char {
    clear_last_error();
    match handle.as_mut() {
        Some(handle) => handle.dispatch(SessionEvent::Commit),
        None => {
            set_last_error("Null session handle");
            ptr::null_mut()
        }
    }
}

/// Forward a proceed trigger (key press).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `fnl_session_new`.
/// - Returns a JSON array of render commands to be freed with `fnl_free_string`.
#[no_mangle]
pub unsafe extern "C" fn fnl_session_proceed(handle: *mut SessionHandle) -> *mut c_char {
    clear_last_error();
    match handle.as_mut() {
        Some(handle) => handle.dispatch(SessionEvent::Proceed),
        None => {
            set_last_error("Null session handle");
            ptr::null_mut()
        }
    }
}

/// Current session progress as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `fnl_session_new`.
#[no_mangle]
pub unsafe extern "C" fn fnl_session_snapshot(handle: *const SessionHandle) -> *mut c_char {
    clear_last_error();
    match handle.as_ref() {
        Some(handle) => to_json_cstr(&handle.session.snapshot()),
        None => {
            set_last_error("Null session handle");
            ptr::null_mut()
        }
    }
}

/// The finished session report as JSON, or NULL while the session is running.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `fnl_session_new`.
#[no_mangle]
pub unsafe extern "C" fn fnl_session_report(handle: *const SessionHandle) -> *mut c_char {
    clear_last_error();
    let Some(handle) = handle.as_ref() else {
        set_last_error("Null session handle");
        return ptr::null_mut();
    };
    match handle.session.report() {
        Some(report) => to_json_cstr(report),
        None => {
            set_last_error("Session is not complete");
            ptr::null_mut()
        }
    }
}

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a static string that is valid until the next FFI call.
/// - Do NOT free this pointer.
/// - Returns NULL if there was no error.
#[no_mangle]
pub unsafe extern "C" fn fnl_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Free a string returned by any `fnl_*` function.
///
/// # Safety
/// - `s` must be a pointer returned by a `fnl_*` function, or NULL.
#[no_mangle]
pub unsafe extern "C" fn fnl_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
