//! Maps validated CLI arguments to an action and the settings shared by all
//! actions (configuration, token state file, current location).

use crate::{
    cli::{actions::Action, commands, globals::GlobalArgs},
    config::{AppConfig, ConfigOverrides},
    provider::Registration,
    roles::Role,
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use url::Url;

fn string_arg(matches: &clap::ArgMatches, id: &str) -> Option<String> {
    matches.get_one::<String>(id).cloned()
}

fn required(matches: &clap::ArgMatches, id: &str) -> Result<String> {
    string_arg(matches, id).with_context(|| format!("missing required argument: --{id}"))
}

fn globals(matches: &clap::ArgMatches) -> Result<GlobalArgs> {
    let config = AppConfig::load(ConfigOverrides {
        api_base_url: string_arg(matches, commands::ARG_API_URL),
        auth_base_url: string_arg(matches, commands::ARG_AUTH_URL),
        client_id: string_arg(matches, commands::ARG_CLIENT_ID),
        login_path: string_arg(matches, commands::ARG_LOGIN_PATH),
        public_routes: matches
            .get_many::<String>(commands::ARG_PUBLIC_ROUTES)
            .map(|routes| routes.cloned().collect()),
    });

    let state_file = string_arg(matches, commands::ARG_STATE_FILE)
        .unwrap_or_else(|| commands::DEFAULT_STATE_FILE.to_string());
    let mut globals = GlobalArgs::new(config, state_file);

    if let Some(location) = string_arg(matches, commands::ARG_LOCATION) {
        let location = Url::parse(&location).context("invalid --location URL")?;
        globals = globals.with_location(location);
    }

    Ok(globals)
}

fn parse_role(role: &str) -> Result<Role> {
    match role {
        "client" => Ok(Role::Client),
        "teacher" => Ok(Role::Teacher),
        "admin" => Ok(Role::Admin),
        other => Err(anyhow!("unknown role: {other}")),
    }
}

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or malformed.
pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let globals = globals(matches)?;

    let action = match matches.subcommand() {
        Some(("login", sub)) => Action::Login {
            username: required(sub, "username")?,
            password: SecretString::from(required(sub, "password")?),
        },
        Some(("register", sub)) => {
            let password = required(sub, "password")?;
            let confirm_password = string_arg(sub, "confirm-password").unwrap_or_else(|| password.clone());
            Action::Register(Registration {
                username: required(sub, "username")?,
                email: required(sub, "email")?,
                password: SecretString::from(password),
                confirm_password: SecretString::from(confirm_password),
                first_name: required(sub, "first-name")?,
                last_name: required(sub, "last-name")?,
                role: parse_role(&string_arg(sub, "role").unwrap_or_else(|| "client".to_string()))?,
            })
        }
        Some(("status", _)) => Action::Status,
        Some(("whoami", _)) => Action::Whoami,
        Some(("refresh", sub)) => Action::Refresh {
            min_validity: if sub.get_flag("force") {
                i64::MAX
            } else {
                sub.get_one::<i64>("min-validity").copied().unwrap_or(30)
            },
        },
        Some(("logout", _)) => Action::Logout,
        Some(("get", sub)) => Action::Get {
            path: required(sub, "path")?,
        },
        Some((other, _)) => return Err(anyhow!("unknown command: {other}")),
        None => return Err(anyhow!("missing command")),
    };

    Ok((action, globals))
}
