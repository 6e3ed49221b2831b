//! Routing queues and the jobs they own

use crate::config::QueueSettings;
use crate::job::{Job, JobState};
use chrono::{DateTime, Utc};

/// A routing queue: its settings plus its jobs in arrival order
#[derive(Debug, Clone)]
pub struct RouteQueue {
    settings: QueueSettings,
    jobs: Vec<Job>,
}

impl RouteQueue {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            settings,
            jobs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut QueueSettings {
        &mut self.settings
    }

    /// Admit a job, starting a fresh routing stay.
    ///
    /// The job becomes queued, eligible at `now`, with its destination cursor
    /// and rejection memory reset. A job already in the queue is replaced.
    pub fn enqueue(&mut self, id: impl Into<String>, now: DateTime<Utc>) -> &mut Job {
        let job = Job::new(id, now);
        self.jobs.retain(|j| j.id != job.id);
        self.jobs.push(job);
        let last = self.jobs.len() - 1;
        &mut self.jobs[last]
    }

    /// Admit a job exactly as given (e.g. reloaded from persistent storage)
    pub fn restore(&mut self, job: Job) {
        self.jobs.retain(|j| j.id != job.id);
        self.jobs.push(job);
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Job> {
        let index = self.jobs.iter().position(|j| j.id == id)?;
        Some(self.jobs.remove(index))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs with a move attempt in flight
    pub fn transit_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.state == JobState::Transit)
            .count()
    }

    /// Record the end of an asynchronous move.
    ///
    /// On success the job leaves the queue and is returned in the moved state;
    /// on failure it goes back to queued and will be routed again.
    pub fn transit_finished(&mut self, id: &str, succeeded: bool) -> Option<Job> {
        if succeeded {
            let mut job = self.remove(id)?;
            job.state = JobState::Moved;
            Some(job)
        } else {
            if let Some(job) = self.job_mut(id) {
                if job.state == JobState::Transit {
                    job.state = JobState::Queued;
                }
            }
            None
        }
    }

    pub(crate) fn split_mut(&mut self) -> (&QueueSettings, &mut Vec<Job>) {
        (&self.settings, &mut self.jobs)
    }
}
