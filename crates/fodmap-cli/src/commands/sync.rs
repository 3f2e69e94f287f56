use fodmap_core::sync::{SkipReason, SyncOutcome, SyncTrigger};

use crate::commands::common::{describe_outcome, format_timestamp};
use crate::context::AppContext;
use crate::error::CliError;

/// `--initial` runs the first-connection variant, where a local document
/// that was never edited defers to the remote copy.
pub async fn run_sync(ctx: &mut AppContext, initial: bool) -> Result<(), CliError> {
    if !ctx.connectivity.is_online() {
        println!("{}", describe_outcome(SyncOutcome::Skipped(SkipReason::Offline)));
        return Ok(());
    }

    let reconciler = ctx.reconciler()?;
    if !reconciler.tokens().restore().await {
        ctx.report_events();
        return Err(CliError::NotSignedIn);
    }

    let trigger = if initial {
        SyncTrigger::Connected
    } else {
        SyncTrigger::Manual
    };
    let result = reconciler.handle_trigger(trigger).await;
    ctx.report_events();

    if let Some(result) = result {
        println!("{}", describe_outcome(result?));
    }
    if let Some(last_sync) = reconciler.last_sync_time() {
        println!("Last synced at {}", format_timestamp(last_sync));
    }
    Ok(())
}
