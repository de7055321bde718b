//! Fixed-layout job records shared with the native EARD API
//!
//! These structs mirror the C definitions byte for byte. Strings live in
//! fixed `char` buffers that are always NUL-terminated.

use crate::error::{EarToolsError, Result};
use std::ffi::c_char;

/// Capacity of user, group and account name buffers
pub const GENERIC_NAME: usize = 256;
/// Capacity of the energy tag buffer
pub const ENERGY_TAG_SIZE: usize = 32;
/// Capacity of the policy name buffer
pub const POLICY_NAME_SIZE: usize = 32;

/// Native job identifier (`unsigned long` on LP64)
pub type JobId = u64;

/// Job description as laid out by the native library
#[repr(C)]
#[derive(Clone, Copy, PartialEq)]
pub struct JobRecord {
    /// Scheduler job id
    pub id: JobId,
    /// Step id within the job
    pub step_id: JobId,
    /// Submitting user name
    pub user_id: [c_char; GENERIC_NAME],
    /// Primary group name
    pub group_id: [c_char; GENERIC_NAME],
    /// Accounting string
    pub user_acc: [c_char; GENERIC_NAME],
    /// Requested energy tag
    pub energy_tag: [c_char; ENERGY_TAG_SIZE],
    /// Job start (`time_t`)
    pub start_time: i64,
    /// Job end (`time_t`)
    pub end_time: i64,
    /// MPI init time (`time_t`)
    pub start_mpi_time: i64,
    /// MPI finalize time (`time_t`)
    pub end_mpi_time: i64,
    /// Power policy name
    pub policy: [c_char; POLICY_NAME_SIZE],
    /// Policy threshold
    pub th: f64,
    /// Number of processes
    pub procs: u64,
}

/// New-job notification payload
#[repr(C)]
#[derive(Clone, Copy, PartialEq)]
pub struct NewJobRequest {
    /// Job description
    pub job: JobRecord,
    /// Non-zero when the job uses MPI
    pub is_mpi: u8,
    /// Non-zero for learning-phase jobs
    pub is_learning: u8,
}

/// End-job notification payload
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndJobRequest {
    /// Job id
    pub jid: JobId,
    /// Step id
    pub sid: JobId,
}

/// Copy `value` into `buf`, truncating on a char boundary so that the
/// last byte is always NUL. The unused tail is zeroed.
pub fn write_c_string(buf: &mut [c_char], value: &str) {
    if buf.is_empty() {
        return;
    }
    let mut len = value.len().min(buf.len() - 1);
    while !value.is_char_boundary(len) {
        len -= 1;
    }
    // Interior NULs would silently cut the string on the native side
    if let Some(nul) = value.as_bytes()[..len].iter().position(|&b| b == 0) {
        len = nul;
    }
    for (dst, &src) in buf.iter_mut().zip(value.as_bytes()[..len].iter()) {
        *dst = src as c_char;
    }
    for dst in buf[len..].iter_mut() {
        *dst = 0;
    }
}

/// Read a NUL-terminated string out of a fixed buffer
pub fn read_c_string(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn buffer_bytes(buf: &[c_char]) -> Vec<u8> {
    buf.iter().map(|&c| c as u8).collect()
}

impl Default for JobRecord {
    fn default() -> Self {
        Self {
            id: 0,
            step_id: 0,
            user_id: [0; GENERIC_NAME],
            group_id: [0; GENERIC_NAME],
            user_acc: [0; GENERIC_NAME],
            energy_tag: [0; ENERGY_TAG_SIZE],
            start_time: 0,
            end_time: 0,
            start_mpi_time: 0,
            end_mpi_time: 0,
            policy: [0; POLICY_NAME_SIZE],
            th: 0.0,
            procs: 0,
        }
    }
}

impl JobRecord {
    /// Create a record for a job step
    pub fn new(id: JobId, step_id: JobId) -> Self {
        Self {
            id,
            step_id,
            ..Default::default()
        }
    }

    /// Set the user name
    pub fn set_user_id(&mut self, value: &str) {
        write_c_string(&mut self.user_id, value);
    }

    /// Set the group name
    pub fn set_group_id(&mut self, value: &str) {
        write_c_string(&mut self.group_id, value);
    }

    /// Set the accounting string
    pub fn set_user_acc(&mut self, value: &str) {
        write_c_string(&mut self.user_acc, value);
    }

    /// Set the energy tag
    pub fn set_energy_tag(&mut self, value: &str) {
        write_c_string(&mut self.energy_tag, value);
    }

    /// Set the policy name
    pub fn set_policy(&mut self, value: &str) {
        write_c_string(&mut self.policy, value);
    }

    /// User name
    pub fn user_id(&self) -> String {
        read_c_string(&self.user_id)
    }

    /// Group name
    pub fn group_id(&self) -> String {
        read_c_string(&self.group_id)
    }

    /// Accounting string
    pub fn user_acc(&self) -> String {
        read_c_string(&self.user_acc)
    }

    /// Energy tag
    pub fn energy_tag(&self) -> String {
        read_c_string(&self.energy_tag)
    }

    /// Policy name
    pub fn policy(&self) -> String {
        read_c_string(&self.policy)
    }

    /// Native bytes of every field, in declaration order.
    ///
    /// Padding is left out, so two records compare equal here exactly when
    /// the native side would read the same values.
    pub fn field_bytes(&self) -> Vec<(&'static str, Vec<u8>)> {
        vec![
            ("id", self.id.to_ne_bytes().to_vec()),
            ("step_id", self.step_id.to_ne_bytes().to_vec()),
            ("user_id", buffer_bytes(&self.user_id)),
            ("group_id", buffer_bytes(&self.group_id)),
            ("user_acc", buffer_bytes(&self.user_acc)),
            ("energy_tag", buffer_bytes(&self.energy_tag)),
            ("start_time", self.start_time.to_ne_bytes().to_vec()),
            ("end_time", self.end_time.to_ne_bytes().to_vec()),
            ("start_mpi_time", self.start_mpi_time.to_ne_bytes().to_vec()),
            ("end_mpi_time", self.end_mpi_time.to_ne_bytes().to_vec()),
            ("policy", buffer_bytes(&self.policy)),
            ("th", self.th.to_ne_bytes().to_vec()),
            ("procs", self.procs.to_ne_bytes().to_vec()),
        ]
    }

    /// Build a record for the current process from the scheduler environment.
    ///
    /// The job id comes from `job_id` when given, otherwise from the
    /// environment variable `job_id_var`. User and group names are resolved
    /// from the effective uid and the gid.
    pub fn from_environment(job_id_var: &str, job_id: Option<JobId>, step_id: JobId) -> Result<Self> {
        let id = match job_id {
            Some(id) => id,
            None => {
                let raw = std::env::var(job_id_var).map_err(|_| {
                    EarToolsError::JobEnvironment(format!("Error accessing {}", job_id_var))
                })?;
                raw.trim().parse::<JobId>().map_err(|_| {
                    EarToolsError::JobEnvironment(format!("{} is not a job id: '{}'", job_id_var, raw))
                })?
            }
        };

        let (user, group) = current_user_and_group()?;
        let mut record = Self::new(id, step_id);
        record.set_user_id(&user);
        record.set_group_id(&group);
        Ok(record)
    }
}

impl std::fmt::Debug for JobRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRecord")
            .field("id", &self.id)
            .field("step_id", &self.step_id)
            .field("user_id", &self.user_id())
            .field("group_id", &self.group_id())
            .field("user_acc", &self.user_acc())
            .field("energy_tag", &self.energy_tag())
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("policy", &self.policy())
            .field("th", &self.th)
            .field("procs", &self.procs)
            .finish()
    }
}

impl std::fmt::Debug for NewJobRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewJobRequest")
            .field("job", &self.job)
            .field("is_mpi", &self.is_mpi)
            .field("is_learning", &self.is_learning)
            .finish()
    }
}

impl NewJobRequest {
    /// Wrap a job record; jobs are announced as MPI, non-learning
    pub fn new(job: JobRecord) -> Self {
        Self {
            job,
            is_mpi: 1,
            is_learning: 0,
        }
    }

    /// First field whose native bytes differ from `other`, with both byte views
    pub fn first_difference(&self, other: &Self) -> Option<(&'static str, Vec<u8>, Vec<u8>)> {
        let mut ours = self.job.field_bytes();
        ours.push(("is_mpi", vec![self.is_mpi]));
        ours.push(("is_learning", vec![self.is_learning]));
        let mut theirs = other.job.field_bytes();
        theirs.push(("is_mpi", vec![other.is_mpi]));
        theirs.push(("is_learning", vec![other.is_learning]));

        ours.into_iter()
            .zip(theirs)
            .find(|((_, a), (_, b))| a != b)
            .map(|((name, a), (_, b))| (name, a, b))
    }
}

impl EndJobRequest {
    /// End notification for the job described by `record`
    pub fn for_record(record: &JobRecord) -> Self {
        Self {
            jid: record.id,
            sid: record.step_id,
        }
    }
}

#[cfg(unix)]
fn current_user_and_group() -> Result<(String, String)> {
    use std::ffi::CStr;

    // SAFETY: getpwuid/getgrgid return pointers into static storage that stay
    // valid until the next call; the names are copied out immediately.
    unsafe {
        let uid = libc::geteuid();
        let gid = libc::getgid();
        let pw = libc::getpwuid(uid);
        let gr = libc::getgrgid(gid);
        if pw.is_null() || gr.is_null() {
            return Err(EarToolsError::JobEnvironment(
                "Error converting EUID and group".to_string(),
            ));
        }
        let user = CStr::from_ptr((*pw).pw_name).to_string_lossy().into_owned();
        let group = CStr::from_ptr((*gr).gr_name).to_string_lossy().into_owned();
        Ok((user, group))
    }
}

#[cfg(not(unix))]
fn current_user_and_group() -> Result<(String, String)> {
    Err(EarToolsError::UnsupportedOperation(
        "user and group lookup requires a Unix platform".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, offset_of, size_of};

    #[test]
    fn test_job_record_layout() {
        assert_eq!(offset_of!(JobRecord, id), 0);
        assert_eq!(offset_of!(JobRecord, step_id), 8);
        assert_eq!(offset_of!(JobRecord, user_id), 16);
        assert_eq!(offset_of!(JobRecord, group_id), 272);
        assert_eq!(offset_of!(JobRecord, user_acc), 528);
        assert_eq!(offset_of!(JobRecord, energy_tag), 784);
        assert_eq!(offset_of!(JobRecord, start_time), 816);
        assert_eq!(offset_of!(JobRecord, end_mpi_time), 840);
        assert_eq!(offset_of!(JobRecord, policy), 848);
        assert_eq!(offset_of!(JobRecord, th), 880);
        assert_eq!(offset_of!(JobRecord, procs), 888);
        assert_eq!(size_of::<JobRecord>(), 896);
        assert_eq!(align_of::<JobRecord>(), 8);
    }

    #[test]
    fn test_request_layouts() {
        assert_eq!(offset_of!(NewJobRequest, is_mpi), 896);
        assert_eq!(offset_of!(NewJobRequest, is_learning), 897);
        assert_eq!(size_of::<NewJobRequest>(), 904);
        assert_eq!(size_of::<EndJobRequest>(), 16);
    }

    #[test]
    fn test_string_round_trip() {
        let mut record = JobRecord::new(7, 1);
        record.set_user_id("alice");
        record.set_policy("min_energy");
        assert_eq!(record.user_id(), "alice");
        assert_eq!(record.policy(), "min_energy");
        assert_eq!(record.group_id(), "");
    }

    #[test]
    fn test_string_truncation_keeps_nul() {
        let mut record = JobRecord::default();
        let long = "x".repeat(100);
        record.set_energy_tag(&long);
        assert_eq!(record.energy_tag().len(), ENERGY_TAG_SIZE - 1);
        assert_eq!(record.energy_tag[ENERGY_TAG_SIZE - 1], 0);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut buf = [0 as c_char; 4];
        write_c_string(&mut buf, "aéé");
        // 'a' (1 byte) + 'é' (2 bytes) fits in 3 bytes, second 'é' does not
        assert_eq!(read_c_string(&buf), "aé");
    }

    #[test]
    fn test_shorter_value_clears_tail() {
        let mut record = JobRecord::default();
        record.set_user_acc("project-long-name");
        record.set_user_acc("p1");
        assert_eq!(record.user_acc(), "p1");
        assert!(record.user_acc[2..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_interior_nul_cuts_string() {
        let mut buf = [1 as c_char; 8];
        write_c_string(&mut buf, "ab\0cd");
        assert_eq!(read_c_string(&buf), "ab");
        assert!(buf[2..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_explicit_job_id_wins() {
        let record = JobRecord::from_environment("EAR_TOOLS_TEST_UNSET_VAR", Some(99), 3).unwrap();
        assert_eq!(record.id, 99);
        assert_eq!(record.step_id, 3);
        assert!(!record.user_id().is_empty());
    }

    #[test]
    fn test_missing_job_id_var() {
        let err = JobRecord::from_environment("EAR_TOOLS_TEST_UNSET_VAR", None, 0).unwrap_err();
        assert!(matches!(err, EarToolsError::JobEnvironment(_)));
    }

    #[test]
    fn test_first_difference() {
        let a = NewJobRequest::new(JobRecord::new(1, 0));
        let mut b = a;
        assert!(a.first_difference(&b).is_none());
        b.job.th = 0.5;
        let (field, _, _) = a.first_difference(&b).unwrap();
        assert_eq!(field, "th");
    }

    #[test]
    fn test_end_request_for_record() {
        let record = JobRecord::new(12, 4);
        assert_eq!(EndJobRequest::for_record(&record), EndJobRequest { jid: 12, sid: 4 });
    }
}
