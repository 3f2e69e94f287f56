use std::path::Path;

use fodmap_core::config::{ENV_CLIENT_ID, MIN_EXPIRY_BUFFER_SECONDS};

use crate::cli::ConfigCommands;
use crate::config_profiles::{default_config_path, normalize_text_option, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            client_id,
            push_on_mutation,
            expiry_buffer_seconds,
            no_activate,
        } => {
            let path = default_config_path().map_err(CliError::Config)?;
            run_config_init(
                &path,
                global_profile,
                client_id,
                push_on_mutation,
                expiry_buffer_seconds,
                no_activate,
            )
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
pub fn run_config_init(
    path: &Path,
    profile_name: Option<&str>,
    client_id: Option<String>,
    push_on_mutation: Option<bool>,
    expiry_buffer_seconds: Option<i64>,
    no_activate: bool,
) -> Result<(), CliError> {
    if let Some(seconds) = expiry_buffer_seconds {
        validate_expiry_buffer(seconds)?;
    }

    let mut config = CliProfilesConfig::load_from_path(path).map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    if let Some(value) = normalize_text_option(client_id) {
        profile.client_id = Some(value);
    }
    if let Some(value) = push_on_mutation {
        profile.push_on_mutation = Some(value);
    }
    if let Some(value) = expiry_buffer_seconds {
        profile.expiry_buffer_seconds = Some(value);
    }
    let has_client_id = profile.client_id.is_some();

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    config.save_to_path(path).map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    if has_client_id || std::env::var(ENV_CLIENT_ID).is_ok() {
        println!("Run `myfodmap auth login` to connect Google Drive.");
    } else {
        println!(
            "Profile '{profile_name}' is missing: client_id (set {ENV_CLIENT_ID} or pass --client-id)"
        );
    }

    Ok(())
}

pub fn validate_expiry_buffer(seconds: i64) -> Result<(), CliError> {
    if seconds < MIN_EXPIRY_BUFFER_SECONDS {
        return Err(CliError::Config(format!(
            "expiry_buffer_seconds must be at least {MIN_EXPIRY_BUFFER_SECONDS}"
        )));
    }
    Ok(())
}
