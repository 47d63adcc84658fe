//! Cron-driven webhook channel renewal.
//!
//! Each tick runs one `SyncEngine::renew_due_channels` pass under a
//! timeout. A pass that fails or times out is logged and the next tick
//! starts from the registry again, so nothing is carried between runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use calsync_core::SyncEngine;
use calsync_domain::{RenewalReport, Result, SyncConfig};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the renewal scheduler.
#[derive(Debug, Clone)]
pub struct RenewalSchedulerConfig {
    /// Six-field cron expression (seconds first).
    pub cron_expression: String,
    /// Upper bound for one renewal pass.
    pub job_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub join_timeout: Duration,
}

impl Default for RenewalSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 */10 * * * *".into(),
            job_timeout: Duration::from_secs(120),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&SyncConfig> for RenewalSchedulerConfig {
    fn from(sync: &SyncConfig) -> Self {
        Self {
            cron_expression: sync.renewal_cron.clone(),
            job_timeout: sync.renewal_timeout(),
            ..Self::default()
        }
    }
}

/// Periodic channel renewal with explicit lifecycle management.
pub struct ChannelRenewalScheduler {
    scheduler: Option<JobScheduler>,
    config: RenewalSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    engine: Arc<SyncEngine>,
}

impl ChannelRenewalScheduler {
    /// Create a new scheduler; nothing runs until [`Self::start`].
    pub fn new(engine: Arc<SyncEngine>, config: RenewalSchedulerConfig) -> Self {
        Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            engine,
        }
    }

    /// Register the renewal job and start ticking.
    #[instrument(skip(self), fields(cron = %self.config.cron_expression))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;
        tokio::time::timeout(start_timeout, scheduler.start())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?
            .map_err(|source| SchedulerError::StartFailed { source })?;

        self.scheduler = Some(scheduler);

        let cancel = self.cancellation.clone();
        self.monitor_handle = Some(tokio::spawn(async move {
            cancel.cancelled().await;
            debug!("renewal scheduler monitor cancelled");
        }));

        info!("channel renewal scheduler started");
        Ok(())
    }

    /// Shut the scheduler down and wait for the monitor task.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let Some(mut scheduler) = self.scheduler.take() else {
            return Err(SchedulerError::NotRunning);
        };

        self.cancellation.cancel();

        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, scheduler.shutdown())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?
            .map_err(|source| SchedulerError::StopFailed { source })?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??;
        }

        info!("channel renewal scheduler stopped");
        Ok(())
    }

    /// Whether the cron job is currently registered.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Run one renewal pass immediately, outside the cron schedule.
    ///
    /// # Errors
    /// Fails if the pass itself fails or exceeds the job timeout.
    pub async fn run_now(&self) -> Result<RenewalReport> {
        let job_timeout = self.config.job_timeout;
        tokio::time::timeout(job_timeout, self.engine.renew_due_channels())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: job_timeout, source })?
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler =
            JobScheduler::new().await.map_err(|source| SchedulerError::CreationFailed { source })?;
        let engine = Arc::clone(&self.engine);
        let job_timeout = self.config.job_timeout;

        let job = Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                run_renewal_pass(&engine, job_timeout).await;
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        let job_id = job.guid();
        scheduler
            .add(job)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        debug!(cron = %self.config.cron_expression, %job_id, "registered channel renewal job");
        Ok(scheduler)
    }
}

async fn run_renewal_pass(engine: &SyncEngine, job_timeout: Duration) {
    let started = Instant::now();
    match tokio::time::timeout(job_timeout, engine.renew_due_channels()).await {
        Ok(Ok(report)) => {
            for failure in &report.failures {
                warn!(calendar_id = %failure.calendar_id, error = %failure.error, "channel renewal failed");
            }
            debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                renewed = report.renewed,
                "renewal job finished"
            );
        }
        Ok(Err(err)) => error!(error = %err, "renewal job failed"),
        Err(_) => warn!(timeout_secs = job_timeout.as_secs(), "renewal job timed out"),
    }
}

impl Drop for ChannelRenewalScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("ChannelRenewalScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
