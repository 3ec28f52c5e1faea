//! C ABI, the surface the game mod calls through P/Invoke.
//!
//! Functions are `#[no_mangle] extern "C"`. A handle owns its own tokio
//! runtime, so callers need no async machinery; every speak call returns
//! immediately. Panics are caught at the boundary and reported as failures.
//!
//! ## Memory contract
//!
//! | Function                           | Caller frees with          |
//! |------------------------------------|----------------------------|
//! | [`speechmod_create`]               | [`speechmod_destroy`]      |
//! | [`speechmod_status_message`]       | [`speechmod_free_string`]  |
//! | [`speechmod_available_voices`]     | [`speechmod_free_string`]  |
//!
//! ## Return codes
//!
//! Speak functions return the number of chunks queued (`0` when there was
//! nothing to say) or `-1` on a bad argument. [`speechmod_status`] returns
//! `0` idle, `1` synthesising, `2` playing, `-1` on a bad handle.

use std::{
    ffi::{c_char, CStr, CString},
    panic::{catch_unwind, AssertUnwindSafe},
    time::Duration,
};

use tokio::runtime::Runtime;
use tracing::{error, warn};

use crate::{
    config::{Settings, SettingsHandle},
    speech::Speech,
    status::QueueStatus,
    voice::{Gender, VoiceRole},
};

/// Opaque handle to a running speech pipeline.
pub struct SpeechModHandle {
    runtime: Runtime,
    speech: Speech,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Convert a `*const c_char` to an owned `String`; `None` if `ptr` is null.
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Heap-allocate an owned C string. Returns null on interior nul bytes.
fn to_c_str(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Run `f`, turning a panic into `fallback`.
fn guarded<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error!(function = name, "panic caught at the C boundary");
            fallback
        }
    }
}

/// Install a stderr subscriber unless the host process already has one.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("speechmod=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_settings(json: Option<String>) -> Option<Settings> {
    match json {
        None => Some(Settings::default()),
        Some(json) => match Settings::from_json(&json) {
            Ok(settings) => Some(settings),
            Err(e) => {
                error!(error = %e, "rejecting settings");
                None
            }
        },
    }
}

fn speak_result(chunks: usize) -> i32 {
    i32::try_from(chunks).unwrap_or(i32::MAX)
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Start the pipeline.
///
/// @param settings_json  UTF-8 settings JSON, or `NULL` for defaults.
/// @return               Handle, or `NULL` when the settings are invalid or no
///                       speech backend is available (the host should then
///                       disable speech). Free with [`speechmod_destroy`].
#[no_mangle]
pub unsafe extern "C" fn speechmod_create(settings_json: *const c_char) -> *mut SpeechModHandle {
    init_logging();
    let json = unsafe { cstr_to_string(settings_json) };
    guarded("speechmod_create", std::ptr::null_mut(), move || {
        let Some(settings) = parse_settings(json) else {
            return std::ptr::null_mut();
        };
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("speechmod")
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!(error = %e, "cannot start runtime");
                return std::ptr::null_mut();
            }
        };
        match runtime.block_on(Speech::start_detected(SettingsHandle::new(settings))) {
            Ok(speech) => Box::into_raw(Box::new(SpeechModHandle { runtime, speech })),
            Err(e) => {
                error!(error = %e, "speech disabled");
                std::ptr::null_mut()
            }
        }
    })
}

/// Replace the settings. A settings object without a voice list keeps the
/// current one. Only speech requested afterwards is affected.
///
/// @return `0` on success, `-1` on a bad handle or invalid JSON.
#[no_mangle]
pub unsafe extern "C" fn speechmod_update_settings(
    handle: *const SpeechModHandle,
    settings_json: *const c_char,
) -> i32 {
    if handle.is_null() {
        return -1;
    }
    let h = unsafe { &*handle };
    let Some(mut settings) = parse_settings(unsafe { cstr_to_string(settings_json) }) else {
        return -1;
    };
    guarded("speechmod_update_settings", -1, || {
        let current = h.speech.settings();
        if settings.available_voices.is_empty() {
            settings.available_voices = current.snapshot().available_voices;
        }
        current.replace(settings);
        0
    })
}

/// Narrate `text` after `delay_ms`.
#[no_mangle]
pub unsafe extern "C" fn speechmod_speak(
    handle: *const SpeechModHandle,
    text: *const c_char,
    delay_ms: u64,
) -> i32 {
    let (false, Some(text)) = (handle.is_null(), unsafe { cstr_to_string(text) }) else {
        return -1;
    };
    let h = unsafe { &*handle };
    guarded("speechmod_speak", -1, || {
        speak_result(h.speech.speak(&text, Duration::from_millis(delay_ms)))
    })
}

/// Speak a dialog line.
///
/// @param gender  `"female"`, `"male"` or anything else / `NULL` when the
///                speaker's gender is unknown.
#[no_mangle]
pub unsafe extern "C" fn speechmod_speak_dialog(
    handle: *const SpeechModHandle,
    text: *const c_char,
    delay_ms: u64,
    gender: *const c_char,
) -> i32 {
    let (false, Some(text)) = (handle.is_null(), unsafe { cstr_to_string(text) }) else {
        return -1;
    };
    let h = unsafe { &*handle };
    let gender = unsafe { cstr_to_string(gender) }.map(|g| Gender::parse(&g));
    guarded("speechmod_speak_dialog", -1, || {
        speak_result(h.speech.speak_dialog(&text, Duration::from_millis(delay_ms), gender))
    })
}

/// Preview a voice from the settings screen.
///
/// @param role  `"narrator"`, `"female"` or `"male"`; anything else previews
///              the narrator.
#[no_mangle]
pub unsafe extern "C" fn speechmod_speak_preview(
    handle: *const SpeechModHandle,
    text: *const c_char,
    role: *const c_char,
) -> i32 {
    let (false, Some(text)) = (handle.is_null(), unsafe { cstr_to_string(text) }) else {
        return -1;
    };
    let h = unsafe { &*handle };
    let role = match unsafe { cstr_to_string(role) }.map(|r| r.parse::<VoiceRole>()) {
        Some(Ok(role)) => role,
        Some(Err(e)) => {
            warn!(error = %e, "previewing narrator instead");
            VoiceRole::Narrator
        }
        None => VoiceRole::Narrator,
    };
    guarded("speechmod_speak_preview", -1, || speak_result(h.speech.speak_preview(&text, role)))
}

/// Cancel everything queued or playing.
#[no_mangle]
pub unsafe extern "C" fn speechmod_stop(handle: *const SpeechModHandle) {
    if handle.is_null() {
        return;
    }
    let h = unsafe { &*handle };
    guarded("speechmod_stop", (), || h.speech.stop());
}

#[no_mangle]
pub unsafe extern "C" fn speechmod_status(handle: *const SpeechModHandle) -> i32 {
    if handle.is_null() {
        return -1;
    }
    let h = unsafe { &*handle };
    match h.speech.status() {
        QueueStatus::Idle => 0,
        QueueStatus::Synthesizing => 1,
        QueueStatus::Playing => 2,
    }
}

/// Human-readable status line. Free with [`speechmod_free_string`].
#[no_mangle]
pub unsafe extern "C" fn speechmod_status_message(handle: *const SpeechModHandle) -> *mut c_char {
    if handle.is_null() {
        return std::ptr::null_mut();
    }
    let h = unsafe { &*handle };
    guarded("speechmod_status_message", std::ptr::null_mut(), || {
        to_c_str(&h.speech.status_message())
    })
}

/// JSON array of `"voiceId#gender"` strings, e.g.
/// `["en-IE-EmilyNeural#Female","en-GB-RyanNeural#Male"]`.
/// Free with [`speechmod_free_string`].
#[no_mangle]
pub unsafe extern "C" fn speechmod_available_voices(handle: *const SpeechModHandle) -> *mut c_char {
    if handle.is_null() {
        return std::ptr::null_mut();
    }
    let h = unsafe { &*handle };
    guarded("speechmod_available_voices", std::ptr::null_mut(), || {
        let voices = h.runtime.block_on(h.speech.available_voices());
        match serde_json::to_string(&voices) {
            Ok(json) => to_c_str(&json),
            Err(e) => {
                error!(error = %e, "cannot encode voice list");
                std::ptr::null_mut()
            }
        }
    })
}

/// Free a string returned by this library.
#[no_mangle]
pub unsafe extern "C" fn speechmod_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

/// Stop all speech, remove transient audio files and release the handle.
#[no_mangle]
pub unsafe extern "C" fn speechmod_destroy(handle: *mut SpeechModHandle) {
    if handle.is_null() {
        return;
    }
    let SpeechModHandle { runtime, speech } = *unsafe { Box::from_raw(handle) };
    guarded("speechmod_destroy", (), move || {
        runtime.block_on(speech.shutdown());
        runtime.shutdown_timeout(Duration::from_secs(2));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handles() {
        unsafe {
            assert_eq!(speechmod_speak(std::ptr::null(), std::ptr::null(), 0), -1);
            assert_eq!(speechmod_status(std::ptr::null()), -1);
            assert!(speechmod_status_message(std::ptr::null()).is_null());
            assert!(speechmod_available_voices(std::ptr::null()).is_null());
            speechmod_stop(std::ptr::null());
            speechmod_free_string(std::ptr::null_mut());
            speechmod_destroy(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_create_rejects_bad_settings() {
        let json = CString::new("not json").unwrap();
        assert!(unsafe { speechmod_create(json.as_ptr()) }.is_null());
    }

    #[test]
    fn test_create_without_backend() {
        let json =
            CString::new(r#"{"synthesizer_program": "definitely-not-a-real-tts-xyz"}"#).unwrap();
        assert!(unsafe { speechmod_create(json.as_ptr()) }.is_null());
    }

    #[test]
    fn test_string_round_trip() {
        let s = to_c_str("Ready");
        assert_eq!(unsafe { cstr_to_string(s) }.as_deref(), Some("Ready"));
        unsafe { speechmod_free_string(s) };
        assert!(to_c_str("nul\0inside").is_null());
    }

    #[test]
    fn test_guarded_catches_panic() {
        assert_eq!(guarded("t", 7, || panic!("boom")), 7);
        assert_eq!(guarded("t", 7, || 1), 1);
    }
}
