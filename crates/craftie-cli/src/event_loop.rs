//! The live session loop.
//!
//! One task owns the session and the sink states. It saves once up front,
//! then waits on whichever comes first of a shutdown signal, the optional end
//! timer, or the next sync tick. Once the wait loop exits the session is
//! stopped and saved one final time.

use std::future::Future;
use std::io;
use std::time::Duration;

use craftie_core::{EndTimer, SaveReport, Session, SheetsApi, SyncOrchestrator};
use tokio::time::{Instant, MissedTickBehavior};

/// Why the wait loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal,
    Timer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub reason: StopReason,
    /// Tick-driven saves between the initial and final save.
    pub ticks: u32,
    pub final_report: SaveReport,
}

/// Installs interrupt and terminate listeners immediately.
///
/// The returned future resolves on the first signal. Listeners are already
/// registered when this returns, so a signal delivered before the future is
/// first polled is not lost.
#[cfg(unix)]
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => tracing::debug!("received SIGINT"),
            _ = terminate.recv() => tracing::debug!("received SIGTERM"),
        }
    })
}

#[cfg(windows)]
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
    Ok(async move {
        ctrl_c.recv().await;
        tracing::debug!("received Ctrl-C");
    })
}

async fn timer_expired(timer: Option<&EndTimer>) {
    match timer {
        Some(timer) => timer.wait().await,
        None => std::future::pending().await,
    }
}

/// Runs the session until `shutdown` resolves or `timer` fires.
///
/// `on_save` sees every save report, including the initial and final ones.
pub async fn run_session<A, F>(
    session: &mut Session,
    orchestrator: &mut SyncOrchestrator<A>,
    timer: Option<&EndTimer>,
    tick_period: Duration,
    shutdown: F,
    mut on_save: impl FnMut(&SaveReport),
) -> LoopOutcome
where
    A: SheetsApi,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let initial = orchestrator.save_session(session).await;
    on_save(&initial);

    let mut ticker = tokio::time::interval_at(Instant::now() + tick_period, tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks = 0;
    let reason = loop {
        tokio::select! {
            () = &mut shutdown => break StopReason::Signal,
            () = timer_expired(timer) => break StopReason::Timer,
            _ = ticker.tick() => {
                ticks += 1;
                let report = orchestrator.save_session(session).await;
                on_save(&report);
            }
        }
    };
    tracing::debug!(?reason, ticks, "session loop exited");

    session.stop();
    let final_report = orchestrator.save_session(session).await;
    on_save(&final_report);

    LoopOutcome {
        reason,
        ticks,
        final_report,
    }
}
