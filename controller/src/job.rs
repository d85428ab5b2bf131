use frappe_operator::k8s_openapi::api::batch::v1::Job;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Only the success and failure counters are read; job output is opaque.
    pub fn of(job: &Job) -> Self {
        let Some(status) = job.status.as_ref() else {
            return Self::Running;
        };
        if status.succeeded.unwrap_or(0) > 0 {
            Self::Succeeded
        } else if status.failed.unwrap_or(0) > 0 {
            Self::Failed
        } else {
            Self::Running
        }
    }
}
