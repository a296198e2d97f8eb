//! Text → IPA phoneme conversion.
//!
//! The orchestrator only sees the [`Phonemizer`] trait. The production
//! implementation, [`EspeakPhonemizer`] (feature `espeak`), calls
//! `libespeak-ng` in-process.

use super::error::{PhonemizeError, VoiceError};

/// Converts text to a phoneme string using a selectable voice.
pub trait Phonemizer: Send {
    /// Switch the phonetic ruleset (an espeak voice such as `"en-us"`).
    fn set_voice(&mut self, voice: &str) -> Result<(), VoiceError>;

    /// Convert `text` to a phoneme string.
    fn phonemize(&mut self, text: &str) -> Result<String, PhonemizeError>;
}

/// Split a phoneme string into one unit per Unicode scalar value.
///
/// Piper vocabularies are keyed by single code points, so combining marks
/// such as stress (`ˈ`) and length (`ː`) become units of their own.
pub fn phoneme_units(phonemes: &str) -> Vec<String> {
    phonemes.trim().chars().map(String::from).collect()
}

#[cfg(feature = "espeak")]
pub use self::espeak::EspeakPhonemizer;

#[cfg(feature = "espeak")]
mod espeak {
    use std::ffi::{CStr, CString};
    use std::os::raw::c_void;
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use super::Phonemizer;
    use crate::engines::piper::error::{InitError, PhonemizeError, VoiceError};

    mod ffi {
        use std::os::raw::{c_char, c_int, c_void};

        /// Synthesis output goes nowhere; only the phoneme API is used.
        pub const AUDIO_OUTPUT_SYNCHRONOUS: c_int = 2;
        /// Let espeak detect the text encoding (UTF-8 for our buffers).
        pub const CHARS_AUTO: c_int = 0;
        /// Bit 1 of `phonememode`: emit IPA as UTF-8.
        pub const PHONEMES_IPA: c_int = 0x02;
        pub const EE_OK: c_int = 0;
        /// Return an error status instead of calling `exit(1)` when the data
        /// directory cannot be loaded.
        pub const INITIALIZE_DONT_EXIT: c_int = 0x8000;

        #[link(name = "espeak-ng")]
        extern "C" {
            pub fn espeak_Initialize(
                output: c_int,
                buflength: c_int,
                path: *const c_char,
                options: c_int,
            ) -> c_int;
            pub fn espeak_SetVoiceByName(name: *const c_char) -> c_int;
            pub fn espeak_TextToPhonemes(
                textptr: *mut *const c_void,
                textmode: c_int,
                phonememode: c_int,
            ) -> *const c_char;
        }
    }

    /// Data path espeak-ng was initialized with. The mutex also serializes
    /// every native call: the library keeps its active voice and translator
    /// in globals and is not reentrant.
    static ESPEAK: Mutex<Option<PathBuf>> = Mutex::new(None);

    fn lock_espeak() -> MutexGuard<'static, Option<PathBuf>> {
        ESPEAK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle to the process-wide espeak-ng instance.
    ///
    /// Several handles may exist; they all drive the same library state, so
    /// the active voice is whatever was set last.
    #[derive(Debug, Clone)]
    pub struct EspeakPhonemizer {
        data_path: PathBuf,
    }

    impl EspeakPhonemizer {
        /// Initialize espeak-ng against `data_dir` (the `espeak-ng-data`
        /// directory or its parent).
        ///
        /// Calling this again with the same directory returns another handle;
        /// a different directory is rejected, since espeak-ng cannot be
        /// re-initialized within a process.
        pub fn initialize(data_dir: &Path) -> Result<Self, InitError> {
            if !has_phoneme_tables(data_dir) {
                return Err(InitError::MissingData(data_dir.to_path_buf()));
            }

            let mut initialized = lock_espeak();
            match initialized.as_deref() {
                Some(current) if current == data_dir => {
                    log::debug!("espeak-ng already initialized with {}", current.display());
                    return Ok(Self {
                        data_path: data_dir.to_path_buf(),
                    });
                }
                Some(current) => {
                    return Err(InitError::AlreadyInitialized {
                        current: current.to_path_buf(),
                        requested: data_dir.to_path_buf(),
                    });
                }
                None => {}
            }

            let c_path = data_dir
                .to_str()
                .and_then(|s| CString::new(s).ok())
                .ok_or_else(|| InitError::InvalidPath(data_dir.to_path_buf()))?;

            // SAFETY: `c_path` is a valid NUL-terminated string that outlives
            // the call, and the ESPEAK lock is held.
            let status = unsafe {
                ffi::espeak_Initialize(
                    ffi::AUDIO_OUTPUT_SYNCHRONOUS,
                    0,
                    c_path.as_ptr(),
                    ffi::INITIALIZE_DONT_EXIT,
                )
            };
            if status <= 0 {
                return Err(InitError::Native {
                    status,
                    path: data_dir.to_path_buf(),
                });
            }

            log::info!(
                "espeak-ng initialized (data path: {}, sample rate {status} Hz)",
                data_dir.display()
            );
            *initialized = Some(data_dir.to_path_buf());
            Ok(Self {
                data_path: data_dir.to_path_buf(),
            })
        }

        pub fn data_path(&self) -> &Path {
            &self.data_path
        }
    }

    /// espeak-ng accepts either its data directory or the parent holding it.
    /// With `INITIALIZE_DONT_EXIT` a failed load is not always visible in the
    /// returned status, so the tables are checked up front.
    fn has_phoneme_tables(data_dir: &Path) -> bool {
        data_dir.join("phontab").is_file()
            || data_dir.join("espeak-ng-data").join("phontab").is_file()
    }

    impl Phonemizer for EspeakPhonemizer {
        fn set_voice(&mut self, voice: &str) -> Result<(), VoiceError> {
            let c_voice =
                CString::new(voice).map_err(|_| VoiceError::InvalidName(voice.to_string()))?;

            let _guard = lock_espeak();
            // SAFETY: `c_voice` is NUL-terminated and lives past the call.
            let code = unsafe { ffi::espeak_SetVoiceByName(c_voice.as_ptr()) };
            if code != ffi::EE_OK {
                return Err(VoiceError::Rejected {
                    voice: voice.to_string(),
                    code,
                });
            }

            log::info!("espeak-ng voice set to '{voice}'");
            Ok(())
        }

        fn phonemize(&mut self, text: &str) -> Result<String, PhonemizeError> {
            let c_text =
                CString::new(text).map_err(|e| PhonemizeError::InvalidInput(e.to_string()))?;

            let _guard = lock_espeak();

            // espeak_TextToPhonemes translates one clause per call and advances
            // the cursor, setting it to null once the text is consumed.
            let mut cursor: *const c_void = c_text.as_ptr().cast();
            let mut clauses: Vec<String> = Vec::new();
            let max_calls = text.len() + 1;

            while !cursor.is_null() && clauses.len() < max_calls {
                // SAFETY: `cursor` points into `c_text`, which is alive and
                // NUL-terminated for the whole loop. The returned buffer is
                // owned by espeak and only valid until the next call, so it is
                // copied before anything else touches the library.
                let result = unsafe {
                    ffi::espeak_TextToPhonemes(&mut cursor, ffi::CHARS_AUTO, ffi::PHONEMES_IPA)
                };
                if result.is_null() {
                    if clauses.is_empty() {
                        log::error!("espeak_TextToPhonemes returned null for {text:?}");
                        return Err(PhonemizeError::NullResult);
                    }
                    break;
                }
                // SAFETY: non-null results are NUL-terminated strings.
                let clause = unsafe { CStr::from_ptr(result) }
                    .to_string_lossy()
                    .into_owned();
                clauses.push(clause);
            }

            let phonemes = clauses.join(" ");
            log::debug!("Phonemes for {text:?}: {phonemes}");
            Ok(phonemes)
        }
    }

}
