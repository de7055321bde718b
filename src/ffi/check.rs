//! Job notification smoke test
//!
//! Builds a job record, hands it to the EARD remote API by reference and
//! checks that the record survives the trip unchanged.

use super::library::NativeLibrary;
use super::record::{EndJobRequest, JobId, JobRecord, NewJobRequest};
use crate::config::JobCheckSettings;
use crate::error::{EarToolsError, Result};
use serde::Serialize;
use std::ffi::{c_char, c_int, c_uint};
use std::path::Path;

/// Exported connect function name
pub const CONNECT_SYMBOL: &str = "eards_remote_connect";
/// Exported disconnect function name
pub const DISCONNECT_SYMBOL: &str = "eards_remote_disconnect";
/// Exported new-job function name
pub const NEW_JOB_SYMBOL: &str = "eards_new_job";
/// Exported end-job function name
pub const END_JOB_SYMBOL: &str = "eards_end_job";

type ConnectFn = unsafe extern "C" fn(*mut c_char, c_uint) -> c_int;
type DisconnectFn = unsafe extern "C" fn() -> c_int;
type NewJobFn = unsafe extern "C" fn(*mut NewJobRequest) -> c_int;
type EndJobFn = unsafe extern "C" fn(JobId, JobId) -> c_int;

/// Something that accepts job notifications
pub trait JobEndpoint {
    /// Open a connection to the daemon on `node`
    fn connect(&mut self, node: &str, port: u16) -> Result<i32>;
    /// Announce a new job; the request is passed by reference
    fn new_job(&mut self, request: &mut NewJobRequest) -> Result<i32>;
    /// Announce the end of a job
    fn end_job(&mut self, request: &EndJobRequest) -> Result<i32>;
    /// Close the connection
    fn disconnect(&mut self) -> Result<i32>;
}

/// Endpoint backed by the native remote API libraries.
///
/// Field order matters: the API library is dropped (closed) before the
/// dependency it was resolved against.
pub struct NativeEndpoint {
    connect: ConnectFn,
    disconnect: DisconnectFn,
    new_job: NewJobFn,
    end_job: EndJobFn,
    _api: NativeLibrary,
    _dependency: NativeLibrary,
}

impl NativeEndpoint {
    /// Load the dependency library globally, then the API library
    pub fn load(dependency_lib: &Path, api_lib: &Path) -> Result<Self> {
        let dependency = NativeLibrary::open(dependency_lib, true)?;
        let api = NativeLibrary::open(api_lib, false)?;

        // SAFETY: the function pointer types mirror the C prototypes of the
        // EARD remote API.
        let (connect, disconnect, new_job, end_job) = unsafe {
            (
                api.function::<ConnectFn>(CONNECT_SYMBOL)?,
                api.function::<DisconnectFn>(DISCONNECT_SYMBOL)?,
                api.function::<NewJobFn>(NEW_JOB_SYMBOL)?,
                api.function::<EndJobFn>(END_JOB_SYMBOL)?,
            )
        };

        tracing::info!("Remote API resolved from {:?}", api.path());
        Ok(Self {
            connect,
            disconnect,
            new_job,
            end_job,
            _api: api,
            _dependency: dependency,
        })
    }
}

impl JobEndpoint for NativeEndpoint {
    fn connect(&mut self, node: &str, port: u16) -> Result<i32> {
        let c_node = std::ffi::CString::new(node)
            .map_err(|_| EarToolsError::config(format!("Node name contains NUL: {}", node)))?;
        let mut bytes = c_node.into_bytes_with_nul();
        // SAFETY: bytes is a NUL-terminated buffer alive for the call.
        Ok(unsafe { (self.connect)(bytes.as_mut_ptr() as *mut c_char, c_uint::from(port)) })
    }

    fn new_job(&mut self, request: &mut NewJobRequest) -> Result<i32> {
        // SAFETY: request is a valid repr(C) struct alive for the call.
        Ok(unsafe { (self.new_job)(request as *mut NewJobRequest) })
    }

    fn end_job(&mut self, request: &EndJobRequest) -> Result<i32> {
        // SAFETY: plain integer arguments.
        Ok(unsafe { (self.end_job)(request.jid, request.sid) })
    }

    fn disconnect(&mut self) -> Result<i32> {
        // SAFETY: no arguments; the API tolerates a disconnect without connection.
        Ok(unsafe { (self.disconnect)() })
    }
}

/// Outcome of a smoke test run
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobCheckReport {
    /// Job id sent
    pub job_id: JobId,
    /// Step id sent
    pub step_id: JobId,
    /// User name sent
    pub user: String,
    /// Group name sent
    pub group: String,
    /// Return code of the connect call
    pub connect_rc: Option<i32>,
    /// Return code of the new-job call
    pub new_job_rc: Option<i32>,
    /// Return code of the end-job call
    pub end_job_rc: Option<i32>,
    /// Return code of the disconnect call
    pub disconnect_rc: Option<i32>,
}

impl JobCheckReport {
    /// True when every call that was made returned a non-negative code
    pub fn is_success(&self) -> bool {
        [self.connect_rc, self.new_job_rc, self.end_job_rc, self.disconnect_rc]
            .iter()
            .flatten()
            .all(|&rc| rc >= 0)
    }

    /// Print a human-readable summary
    pub fn print_summary(&self) {
        println!("=== Job Check ===");
        println!("Job:        {}.{}", self.job_id, self.step_id);
        println!("User/group: {}/{}", self.user, self.group);
        let show = |rc: Option<i32>| rc.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
        println!("Connect:    {}", show(self.connect_rc));
        println!("New job:    {}", show(self.new_job_rc));
        println!("End job:    {}", show(self.end_job_rc));
        println!("Disconnect: {}", show(self.disconnect_rc));
        println!("Result:     {}", if self.is_success() { "OK" } else { "FAILED" });
    }
}

/// Build the new-job request described by `settings`
pub fn build_request(settings: &JobCheckSettings) -> Result<NewJobRequest> {
    let mut record = JobRecord::from_environment(&settings.job_id_var, settings.job_id, settings.step_id)?;
    record.set_policy(&settings.policy);
    record.set_energy_tag(&settings.energy_tag);
    record.th = settings.threshold;
    record.procs = settings.procs;
    Ok(NewJobRequest::new(record))
}

/// Send the configured notifications through `endpoint`.
///
/// A connect failure or a corrupted record stops the run; once connected,
/// the disconnect is always attempted.
pub fn run_job_check<E: JobEndpoint>(
    settings: &JobCheckSettings,
    mut request: NewJobRequest,
    endpoint: &mut E,
) -> Result<JobCheckReport> {
    let mut report = JobCheckReport {
        job_id: request.job.id,
        step_id: request.job.step_id,
        user: request.job.user_id(),
        group: request.job.group_id(),
        ..Default::default()
    };

    if let Some(node) = &settings.node {
        let rc = endpoint.connect(node, settings.port)?;
        report.connect_rc = Some(rc);
        if rc < 0 {
            tracing::error!("Error connecting with EARD in node {} port {}", node, settings.port);
            report.disconnect_rc = Some(endpoint.disconnect()?);
            return Ok(report);
        }
        tracing::info!("Connected with EARD in node {} port {}", node, settings.port);
    }

    let notified = notify(settings, &mut request, endpoint, &mut report);
    let disconnected = settings.node.as_ref().map(|_| endpoint.disconnect());
    notified?;
    if let Some(rc) = disconnected {
        report.disconnect_rc = Some(rc?);
    }

    Ok(report)
}

fn notify<E: JobEndpoint>(
    settings: &JobCheckSettings,
    request: &mut NewJobRequest,
    endpoint: &mut E,
    report: &mut JobCheckReport,
) -> Result<()> {
    if settings.action.sends_new_job() {
        let sent = *request;
        let rc = endpoint.new_job(request)?;
        report.new_job_rc = Some(rc);
        if rc < 0 {
            tracing::error!("Error notifying new job {}.{}", request.job.id, request.job.step_id);
        }
        if let Some((field, before, after)) = sent.first_difference(request) {
            tracing::error!(
                "Field '{}' changed across the native call: {} -> {}",
                field,
                hex::encode(&before),
                hex::encode(&after)
            );
            return Err(EarToolsError::RecordCorrupted {
                field: field.to_string(),
            });
        }
    }

    if settings.action.sends_end_job() {
        let end = EndJobRequest::for_record(&request.job);
        let rc = endpoint.end_job(&end)?;
        report.end_job_rc = Some(rc);
        if rc < 0 {
            tracing::error!("Error notifying end job {}.{}", end.jid, end.sid);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobAction;

    #[derive(Default)]
    struct RecordingEndpoint {
        calls: Vec<String>,
        connect_rc: i32,
        corrupt: bool,
        seen_user: Option<String>,
    }

    impl JobEndpoint for RecordingEndpoint {
        fn connect(&mut self, node: &str, port: u16) -> Result<i32> {
            self.calls.push(format!("connect {}:{}", node, port));
            Ok(self.connect_rc)
        }

        fn new_job(&mut self, request: &mut NewJobRequest) -> Result<i32> {
            self.calls.push(format!("new {}", request.job.id));
            self.seen_user = Some(request.job.user_id());
            if self.corrupt {
                request.job.procs += 1;
            }
            Ok(0)
        }

        fn end_job(&mut self, request: &EndJobRequest) -> Result<i32> {
            self.calls.push(format!("end {}.{}", request.jid, request.sid));
            Ok(0)
        }

        fn disconnect(&mut self) -> Result<i32> {
            self.calls.push("disconnect".to_string());
            Ok(0)
        }
    }

    fn request() -> NewJobRequest {
        let mut record = JobRecord::new(1234, 2);
        record.set_user_id("alice");
        record.set_group_id("hpc");
        NewJobRequest::new(record)
    }

    #[test]
    fn test_full_sequence() {
        let settings = JobCheckSettings {
            node: Some("node01".to_string()),
            ..Default::default()
        };
        let mut endpoint = RecordingEndpoint::default();
        let report = run_job_check(&settings, request(), &mut endpoint).unwrap();

        assert_eq!(
            endpoint.calls,
            vec!["connect node01:50001", "new 1234", "end 1234.2", "disconnect"]
        );
        assert_eq!(endpoint.seen_user.as_deref(), Some("alice"));
        assert!(report.is_success());
        assert_eq!(report.group, "hpc");
    }

    #[test]
    fn test_no_connect_only_end_job() {
        let settings = JobCheckSettings {
            node: None,
            action: JobAction::EndJob,
            ..Default::default()
        };
        let mut endpoint = RecordingEndpoint::default();
        let report = run_job_check(&settings, request(), &mut endpoint).unwrap();

        assert_eq!(endpoint.calls, vec!["end 1234.2"]);
        assert!(report.new_job_rc.is_none());
        assert!(report.connect_rc.is_none());
    }

    #[test]
    fn test_connect_failure_stops_run() {
        let settings = JobCheckSettings {
            node: Some("node01".to_string()),
            ..Default::default()
        };
        let mut endpoint = RecordingEndpoint {
            connect_rc: -1,
            ..Default::default()
        };
        let report = run_job_check(&settings, request(), &mut endpoint).unwrap();

        assert_eq!(endpoint.calls, vec!["connect node01:50001", "disconnect"]);
        assert!(!report.is_success());
    }

    #[test]
    fn test_corrupted_record_detected() {
        let settings = JobCheckSettings::default();
        let mut endpoint = RecordingEndpoint {
            corrupt: true,
            ..Default::default()
        };
        let err = run_job_check(&settings, request(), &mut endpoint).unwrap_err();
        match err {
            EarToolsError::RecordCorrupted { field } => assert_eq!(field, "procs"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_corrupted_record_still_disconnects() {
        let settings = JobCheckSettings {
            node: Some("n1".to_string()),
            ..Default::default()
        };
        let mut endpoint = RecordingEndpoint {
            corrupt: true,
            ..Default::default()
        };
        let err = run_job_check(&settings, request(), &mut endpoint).unwrap_err();
        assert!(matches!(err, EarToolsError::RecordCorrupted { .. }));
        assert_eq!(endpoint.calls, vec!["connect n1:50001", "new 1234", "disconnect"]);
    }

    #[test]
    fn test_build_request_applies_settings() {
        let settings = JobCheckSettings {
            job_id: Some(55),
            policy: "min_time".to_string(),
            threshold: 0.7,
            energy_tag: "turbo".to_string(),
            procs: 48,
            ..Default::default()
        };
        let request = build_request(&settings).unwrap();
        assert_eq!(request.job.id, 55);
        assert_eq!(request.job.policy(), "min_time");
        assert_eq!(request.job.energy_tag(), "turbo");
        assert_eq!(request.job.th, 0.7);
        assert_eq!(request.job.procs, 48);
        assert_eq!(request.is_mpi, 1);
        assert_eq!(request.is_learning, 0);
    }
}
