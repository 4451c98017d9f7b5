//! Key schema shared by the persistent store adapters
//!
//! The RocksDB store uses one column family per record kind; the file store
//! uses the same names as subdirectories.

/// Column family for job descriptions
pub const CF_JOBS: &str = "jobs";

/// Column family for workflow snapshots
pub const CF_WORKFLOWS: &str = "workflows";

/// Column family for the feedback log
pub const CF_FEEDBACK: &str = "feedback";

/// Column family for candidate batches
pub const CF_CANDIDATES: &str = "candidates";

/// Column family for the refinement history
pub const CF_REFINEMENTS: &str = "refinements";

/// All column family names
pub const ALL_CFS: &[&str] = &[CF_JOBS, CF_WORKFLOWS, CF_FEEDBACK, CF_CANDIDATES, CF_REFINEMENTS];

/// Key builders. Iterations are zero-padded so lexical order is numeric order.
pub mod keys {
    pub fn job(job_id: &str) -> String {
        format!("job:{}", job_id)
    }

    pub fn workflow(job_id: &str) -> String {
        format!("wf:{}", job_id)
    }

    /// Prefix covering every per-iteration record of a job.
    pub fn job_prefix(kind: &str, job_id: &str) -> String {
        format!("{}:{}:", kind, job_id)
    }

    pub fn feedback(job_id: &str, iteration: u32, candidate_id: &str) -> String {
        format!("fb:{}:{:010}:{}", job_id, iteration, candidate_id)
    }

    pub fn candidates(job_id: &str, iteration: u32) -> String {
        format!("cand:{}:{:010}", job_id, iteration)
    }

    pub fn refinement(job_id: &str, iteration: u32) -> String {
        format!("ref:{}:{:010}", job_id, iteration)
    }

    /// Percent-encode a job id into a single, collision-free path component.
    pub fn file_safe(job_id: &str) -> String {
        let mut out = String::with_capacity(job_id.len());
        for byte in job_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                out.push(byte as char);
            } else {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        assert_eq!(keys::job("abc"), "job:abc");
        assert_eq!(keys::workflow("abc"), "wf:abc");
        assert_eq!(keys::candidates("abc", 3), "cand:abc:0000000003");
        assert_eq!(keys::feedback("abc", 1, "c1"), "fb:abc:0000000001:c1");
        assert!(keys::feedback("abc", 1, "c1").starts_with(&keys::job_prefix("fb", "abc")));
    }

    #[test]
    fn test_iteration_key_ordering() {
        assert!(keys::candidates("j", 2) < keys::candidates("j", 10));
        assert!(keys::refinement("j", 9) < keys::refinement("j", 11));
    }

    #[test]
    fn test_file_safe() {
        assert_eq!(keys::file_safe("job-1_a"), "job-1_a");
        assert_eq!(keys::file_safe("../etc"), "%2E%2E%2Fetc");
        assert_ne!(keys::file_safe("a/b"), keys::file_safe("a_b"));
    }
}
