use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use drip_core::config::EngineConfig;
use drip_store::JobStore;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::dispatch;
use crate::error::Result;
use crate::timer::WakeTimer;

/// Per-instance execution engine: Idle → Draining → Idle.
///
/// Exactly one drain task runs at a time, guarded by the `draining` flag.
/// The flag is owned here and flipped only by [`Engine::trigger`] and the
/// drain task itself, never by other components. Cloning the engine clones
/// a handle to the same instance state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    store: JobStore,
    timer: WakeTimer,
    client: reqwest::Client,
    draining: AtomicBool,
    grace: Duration,
    retry: Duration,
}

impl Engine {
    pub fn new(store: JobStore, timer: WakeTimer, cfg: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                timer,
                client,
                draining: AtomicBool::new(false),
                grace: Duration::from_secs(cfg.grace_secs),
                retry: Duration::from_secs(cfg.retry_secs),
            }),
        })
    }

    /// Enter Draining. A no-op when a drain task is already running: the
    /// running loop re-reads the queue and will pick up whatever was added.
    pub fn trigger(&self) {
        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("drain already running, trigger ignored");
            return;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner.drain().await;
            if let Err(e) = result {
                // Arm the timer before surfacing the failure so the watch
                // loop guarantees a future recovery attempt.
                let fire_at = Utc::now() + chrono::Duration::milliseconds(inner.retry.as_millis() as i64);
                if let Err(arm_err) = inner.timer.arm(fire_at) {
                    error!(error = %arm_err, "failed to arm retry timer after drain failure");
                }
                error!(error = %e, retry_secs = inner.retry.as_secs(), "drain loop failed, retry armed");
            }
            inner.draining.store(false, Ordering::SeqCst);
        });
    }

    /// Crash-recovery check on instance activation.
    ///
    /// An armed wake timer means a drain was interrupted mid-flight; simply
    /// re-entering the drain is safe because `pending_requests` excludes
    /// everything already resolved.
    pub fn recover(&self) -> Result<()> {
        if let Some(fire_at) = self.inner.timer.pending()? {
            info!(fire_at = %fire_at.to_rfc3339(), "armed wake timer found on activation, resuming drain");
            self.trigger();
        }
        Ok(())
    }

    /// Wake-timer watch loop. Polls every second until `shutdown`
    /// broadcasts `true`; re-enters Draining whenever the armed fire time
    /// has passed and the engine is Idle. This is what makes a failed or
    /// killed drain self-heal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.inner.draining.load(Ordering::SeqCst) {
                        continue;
                    }
                    match self.inner.timer.pending() {
                        Ok(Some(fire_at)) if fire_at <= Utc::now() => {
                            debug!("wake timer fired, re-entering drain");
                            self.trigger();
                        }
                        Ok(_) => {}
                        Err(e) => error!("wake timer poll failed: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("engine watch loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Test/diagnostic visibility of the state machine.
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }
}

impl Inner {
    /// One Draining cycle: consume queued jobs oldest-first until none
    /// remain, dispatching each job's pending requests strictly in
    /// submission order with the job's rate spacing.
    async fn drain(&self) -> Result<()> {
        loop {
            let Some(job) = self.store.next_queued_job()? else {
                // Queue drained, nothing left that could need waking.
                self.timer.clear()?;
                info!("queue empty, engine idle");
                return Ok(());
            };

            let delay = job.delay();
            info!(
                job_id = %job.id,
                rate_limit = job.rate_limit,
                rate_unit = %job.rate_unit,
                delay_ms = delay.as_millis() as u64,
                "draining job"
            );

            for request in self.store.pending_requests(&job.id)? {
                let outcome = dispatch::execute(&self.client, &request.spec).await;
                debug!(job_id = %job.id, request_id = request.id, ?outcome, "request resolved");

                self.store
                    .record_outcome(request.id, &outcome, &Utc::now().to_rfc3339())?;
                if let Err(e) = self.store.advance_progress(&job.id) {
                    // Display-only counter; a failed bump must not stall the drain.
                    warn!(job_id = %job.id, error = %e, "progress counter update failed");
                }

                // Arm before sleeping: if the process dies during the
                // suspension, a restart finds the timer and resumes.
                self.arm_wake(delay)?;
                tokio::time::sleep(delay).await;
            }

            self.store.complete_job(&job.id)?;
            info!(job_id = %job.id, "job complete");
        }
    }

    fn arm_wake(&self, delay: Duration) -> Result<()> {
        let margin = delay + self.grace;
        let fire_at = Utc::now() + chrono::Duration::milliseconds(margin.as_millis() as i64);
        self.timer.arm(fire_at)
    }
}
