//! Native EARD API interop
//!
//! Provides:
//! - `#[repr(C)]` job records matching the native layout
//! - Shared library loading via the dynamic loader
//! - A job notification smoke test over the remote API

pub mod check;
pub mod library;
pub mod record;

pub use check::{build_request, run_job_check, JobCheckReport, JobEndpoint, NativeEndpoint};
pub use library::NativeLibrary;
pub use record::{EndJobRequest, JobId, JobRecord, NewJobRequest};
