//! Live view of running sessions. Redraws the primary clock every second and
//! reprints the session list whenever the store reports a change, including
//! commits made by other processes.

use crate::cli::Context;
use crate::core::reconciler::ActiveSessionReconciler;
use crate::errors::AppResult;
use crate::ui::messages::{info, warning};
use crate::ui::render;
use chrono::Utc;
use std::io::Write;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tokio_util::sync::CancellationToken;

pub async fn handle(ctx: &Context, seconds: Option<u64>) -> AppResult<()> {
    let backend = ctx.backend()?;
    let mut rec = ctx.reconciler(&backend).await?;

    let cancel = CancellationToken::new();
    let poller = backend.watch_external_changes(ctx.poll_interval(), cancel.clone());

    let deadline = deadline_after(Instant::now(), seconds);
    let mut clock = interval(Duration::from_secs(1));
    clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

    print_sessions(&rec);

    let outcome: AppResult<()> = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            _ = wait_until(deadline) => break Ok(()),
            change = rec.next_change() => match change {
                Some(Ok(_)) => {
                    println!();
                    print_sessions(&rec);
                }
                Some(Err(e)) => {
                    warning(format!("Could not refresh running sessions: {e}"));
                }
                None => break Ok(()),
            },
            _ = clock.tick() => {
                if let Some(tick) = rec.tick() {
                    print!("\r⏱  {}  ", tick.clock);
                    if let Err(e) = std::io::stdout().flush() {
                        break Err(e.into());
                    }
                }
            }
        }
    };

    println!();
    cancel.cancel();
    if let Some(handle) = poller {
        let _ = handle.await;
    }
    rec.shutdown();
    outcome
}

/// `None` when no limit was asked for, or when the limit lies beyond what
/// the clock can represent.
fn deadline_after(now: Instant, seconds: Option<u64>) -> Option<Instant> {
    seconds.and_then(|s| now.checked_add(Duration::from_secs(s)))
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn print_sessions(rec: &ActiveSessionReconciler) {
    let sessions = rec.active_sessions();
    if sessions.is_empty() {
        info("No running sessions.");
        return;
    }
    let now = Utc::now();
    for s in &sessions {
        println!("{}", render::session_line(s, now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huge_limits_mean_no_deadline() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Some(5)), Some(now + Duration::from_secs(5)));
        assert_eq!(deadline_after(now, Some(u64::MAX)), None);
        assert_eq!(deadline_after(now, None), None);
    }
}
