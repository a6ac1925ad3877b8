use std::fmt;
use std::time::Duration;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::store::StoreConfig;

use crate::Config;

/// Time in-flight pod requests get to finish after SIGTERM.
const REQUEST_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Why the pod server is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    Interrupt,
    Terminate,
    Requested,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownCause::Interrupt => f.write_str("SIGINT"),
            ShutdownCause::Terminate => f.write_str("SIGTERM"),
            ShutdownCause::Requested => f.write_str("shutdown handle"),
        }
    }
}

impl ShutdownCause {
    /// SIGTERM lets requests drain, everything else stops at once.
    pub fn grace_period(&self) -> Duration {
        match self {
            ShutdownCause::Terminate => REQUEST_GRACE_PERIOD,
            _ => Duration::ZERO,
        }
    }
}

async fn next_cause(
    sigint: &mut Signal,
    sigterm: &mut Signal,
    requested: &mut watch::Receiver<()>,
) -> ShutdownCause {
    tokio::select! {
        _ = sigint.recv() => ShutdownCause::Interrupt,
        _ = sigterm.recv() => ShutdownCause::Terminate,
        _ = requested.changed() => ShutdownCause::Requested,
    }
}

/// Spawns the task that turns SIGINT, SIGTERM or a programmatic request
/// into one broadcast on the returned watch channel.
///
/// Returns the task handle, the sender used by `ShutdownHandle::shutdown`,
/// and the receiver every server task watches.
pub fn graceful_shutdown_blocker(
) -> std::io::Result<(JoinHandle<()>, watch::Sender<()>, watch::Receiver<()>)> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let (tx, rx) = watch::channel(());
    let broadcast = tx.clone();
    let mut requested = rx.clone();

    let handle = tokio::spawn(async move {
        let cause = next_cause(&mut sigint, &mut sigterm, &mut requested).await;
        let grace = cause.grace_period();
        tracing::info!(%cause, grace_secs = grace.as_secs(), "pod server shutting down");
        tokio::time::sleep(grace).await;
        let _ = broadcast.send(());
    });

    Ok((handle, tx, rx))
}

/// Routes panics through `tracing` so they land in the pod log files.
pub fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| {
        let thread = std::thread::current();
        let thread = thread.name().unwrap_or("unnamed");
        match panic.location() {
            Some(loc) => tracing::error!(
                message = %panic,
                thread,
                panic.file = loc.file(),
                panic.line = loc.line(),
            ),
            None => tracing::error!(message = %panic, thread),
        }
    }));
}

/// Logs the build and the pod this process is about to serve.
pub fn report_build_info(config: &Config) {
    let build = common::prelude::build_info();
    let store = match &config.store {
        StoreConfig::Memory => "memory".to_string(),
        StoreConfig::Filesystem { path } => path.display().to_string(),
    };
    let base = config
        .base_url()
        .map(|url| url.to_string())
        .unwrap_or_else(|e| format!("invalid ({})", e));

    tracing::info!(
        version = ?build.version,
        build_profile = ?build.build_profile,
        features = ?build.build_features,
        %base,
        %store,
        acl_suffix = %config.acl_suffix,
        "pod server starting up"
    );
}
