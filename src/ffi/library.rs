//! Native shared library loading
//!
//! Thin RAII wrapper over `dlopen`/`dlsym`/`dlclose`.

use crate::error::{EarToolsError, Result};
use std::ffi::c_void;
use std::path::{Path, PathBuf};

/// A loaded shared library, closed on drop
#[derive(Debug)]
pub struct NativeLibrary {
    handle: *mut c_void,
    path: PathBuf,
}

impl NativeLibrary {
    /// Load `path` with immediate binding.
    ///
    /// With `global` set, the library's symbols become available to
    /// libraries loaded afterwards.
    #[cfg(unix)]
    pub fn open(path: &Path, global: bool) -> Result<Self> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| EarToolsError::config(format!("Library path contains NUL: {:?}", path)))?;

        let mut flags = libc::RTLD_NOW;
        if global {
            flags |= libc::RTLD_GLOBAL;
        } else {
            flags |= libc::RTLD_LOCAL;
        }

        // SAFETY: c_path is a valid NUL-terminated string for the call.
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), flags) };
        if handle.is_null() {
            return Err(EarToolsError::LibraryLoad {
                path: path.to_path_buf(),
                message: last_dl_error(),
            });
        }

        tracing::debug!("Loaded {:?} (global: {})", path, global);
        Ok(Self {
            handle,
            path: path.to_path_buf(),
        })
    }

    #[cfg(not(unix))]
    pub fn open(path: &Path, _global: bool) -> Result<Self> {
        Err(EarToolsError::LibraryLoad {
            path: path.to_path_buf(),
            message: "dynamic loading requires a Unix platform".to_string(),
        })
    }

    /// Path the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve an exported function.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type whose signature matches the
    /// exported symbol exactly.
    #[cfg(unix)]
    pub unsafe fn function<F: Copy>(&self, symbol: &str) -> Result<F> {
        use std::ffi::CString;

        assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<*mut c_void>(),
            "function pointer types must be pointer sized"
        );

        let c_symbol = CString::new(symbol)
            .map_err(|_| EarToolsError::config(format!("Symbol name contains NUL: {}", symbol)))?;

        // Clear any stale error so a NULL symbol can be told apart from a failure
        libc::dlerror();
        let address = libc::dlsym(self.handle, c_symbol.as_ptr());
        if address.is_null() {
            return Err(EarToolsError::SymbolNotFound {
                path: self.path.clone(),
                symbol: symbol.to_string(),
                message: last_dl_error(),
            });
        }

        Ok(std::mem::transmute_copy::<*mut c_void, F>(&address))
    }

    #[cfg(not(unix))]
    pub unsafe fn function<F: Copy>(&self, symbol: &str) -> Result<F> {
        Err(EarToolsError::SymbolNotFound {
            path: self.path.clone(),
            symbol: symbol.to_string(),
            message: "dynamic loading requires a Unix platform".to_string(),
        })
    }
}

impl Drop for NativeLibrary {
    fn drop(&mut self) {
        #[cfg(unix)]
        // SAFETY: handle came from a successful dlopen and is closed once.
        unsafe {
            if libc::dlclose(self.handle) != 0 {
                tracing::warn!("dlclose failed for {:?}: {}", self.path, last_dl_error());
            }
        }
    }
}

#[cfg(unix)]
fn last_dl_error() -> String {
    // SAFETY: dlerror returns NULL or a NUL-terminated thread-local string.
    unsafe {
        let message = libc::dlerror();
        if message.is_null() {
            "unknown dynamic loader error".to_string()
        } else {
            std::ffi::CStr::from_ptr(message).to_string_lossy().into_owned()
        }
    }
}
