use fodmap_core::sync::SyncTrigger;

use crate::cli::AuthCommands;
use crate::commands::common::{describe_outcome, format_timestamp};
use crate::context::AppContext;
use crate::error::CliError;

pub async fn run_auth(ctx: &mut AppContext, command: AuthCommands) -> Result<(), CliError> {
    match command {
        AuthCommands::Login => run_login(ctx).await,
        AuthCommands::Status => run_status(ctx).await,
        AuthCommands::Logout => run_logout(ctx),
    }
}

async fn run_login(ctx: &mut AppContext) -> Result<(), CliError> {
    let reconciler = ctx.reconciler()?;
    reconciler.tokens().authenticate_interactively().await?;
    println!("Connected profile '{}' to Google Drive", ctx.profile_name);

    let result = reconciler.handle_trigger(SyncTrigger::Connected).await;
    ctx.report_events();
    if let Some(result) = result {
        println!("{}", describe_outcome(result?));
    }
    Ok(())
}

async fn run_status(ctx: &mut AppContext) -> Result<(), CliError> {
    if ctx.oauth.is_none() {
        if ctx.credential_store().load().is_some() {
            println!(
                "Profile '{}' has a stored Google credential, but sign-in is not configured.",
                ctx.profile_name
            );
        } else {
            println!("Profile '{}' is not connected.", ctx.profile_name);
        }
        return Ok(());
    }

    let reconciler = ctx.reconciler()?;
    let tokens = reconciler.tokens();
    if tokens.restore().await {
        let expires = tokens
            .expires_at()
            .map_or_else(|| "unknown".to_string(), format_timestamp);
        println!(
            "Profile '{}' is connected to Google Drive (access token valid until {expires})",
            ctx.profile_name
        );
    } else {
        println!("Profile '{}' is not connected.", ctx.profile_name);
    }
    ctx.report_events();
    Ok(())
}

pub fn run_logout(ctx: &mut AppContext) -> Result<(), CliError> {
    if ctx.oauth.is_some() {
        ctx.reconciler()?.tokens().logout();
    } else {
        ctx.credential_store().clear();
    }
    ctx.report_events();
    println!("Disconnected profile '{}' from Google Drive", ctx.profile_name);
    Ok(())
}
