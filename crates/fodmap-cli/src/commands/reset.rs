use crate::context::{document_path, AppContext};
use crate::error::CliError;

/// Wipe the profile back to a fresh install: local document and stored
/// Google credential. The remote file is left alone.
pub fn run_reset(ctx: &mut AppContext, confirmed: bool) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ResetNotConfirmed);
    }

    ctx.store.clear()?;
    ctx.credential_store().clear();
    ctx.report_events();
    println!("Removed {}", document_path(&ctx.data_dir).display());
    println!(
        "Cleared local data and credentials for profile '{}'",
        ctx.profile_name
    );
    Ok(())
}
