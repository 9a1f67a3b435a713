//! Startup/shutdown bracket around the dispatch loop.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio_util::task::TaskTracker;

use crate::{
    commands::CommandRegistry, domain::Locale, messaging::port::ProfilePort,
    offload::OffloadPool, texts, Result,
};

pub struct Lifecycle {
    profile: Arc<dyn ProfilePort>,
    commands: CommandRegistry,
    pool: Arc<OffloadPool>,
    tasks: TaskTracker,
    shutdown_timeout: Option<Duration>,
    stopped: AtomicBool,
}

/// Locales whose profile could not be published during `start`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartReport {
    pub failed_locales: Vec<Option<Locale>>,
}

impl Lifecycle {
    pub fn new(
        profile: Arc<dyn ProfilePort>,
        commands: CommandRegistry,
        pool: Arc<OffloadPool>,
        shutdown_timeout: Option<Duration>,
    ) -> Self {
        Self {
            profile,
            commands,
            pool,
            tasks: TaskTracker::new(),
            shutdown_timeout,
            stopped: AtomicBool::new(false),
        }
    }

    /// In-flight update handlers that `stop` waits for.
    pub fn with_tasks(mut self, tasks: TaskTracker) -> Self {
        self.tasks = tasks;
        self
    }

    /// Publish command lists and descriptions for every locale.
    ///
    /// Best-effort per locale: a failure is logged and the remaining locales
    /// are still published.
    pub async fn start(&self) -> StartReport {
        tracing::info!("initialize begin");
        let mut report = StartReport::default();

        for locale in Locale::all() {
            if let Err(e) = self.publish(locale).await {
                tracing::warn!(
                    locale = locale.map(Locale::code).unwrap_or("default"),
                    error = %e,
                    "failed to publish bot profile"
                );
                report.failed_locales.push(locale);
            }
        }

        tracing::info!(failed = report.failed_locales.len(), "initialize end");
        report
    }

    async fn publish(&self, locale: Option<Locale>) -> Result<()> {
        self.profile
            .set_commands(locale, &self.commands.menu(locale))
            .await?;
        self.profile
            .set_description(locale, texts::description(locale))
            .await?;
        self.profile
            .set_short_description(locale, texts::short_description(locale))
            .await?;
        Ok(())
    }

    /// Drain the offload pool, then wait for in-flight updates to send their
    /// replies. Each step is bounded by the shutdown timeout. Only the first
    /// call does anything.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(in_flight = self.tasks.len(), "shutdown begin");
        self.tasks.close();
        self.pool.drain_and_stop(self.shutdown_timeout).await;

        match self.shutdown_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, self.tasks.wait()).await.is_err() {
                    tracing::warn!(
                        abandoned = self.tasks.len(),
                        "updates still in flight at shutdown"
                    );
                }
            }
            None => self.tasks.wait().await,
        }
        tracing::info!("shutdown end");
    }
}
