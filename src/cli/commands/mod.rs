pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};

pub const ARG_API_URL: &str = "api-url";
pub const ARG_AUTH_URL: &str = "auth-url";
pub const ARG_CLIENT_ID: &str = "client-id";
pub const ARG_LOGIN_PATH: &str = "login-path";
pub const ARG_PUBLIC_ROUTES: &str = "public-routes";
pub const ARG_STATE_FILE: &str = "state-file";
pub const ARG_LOCATION: &str = "location";

pub const DEFAULT_STATE_FILE: &str = ".edusession.json";

fn global_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_API_URL)
                .long(ARG_API_URL)
                .help("Base URL of the resource APIs, example: http://localhost:8083/api")
                .env("EDUSESSION_API_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_AUTH_URL)
                .long(ARG_AUTH_URL)
                .help("Base URL of the auth service (login, refresh, logout, register)")
                .env("EDUSESSION_AUTH_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_CLIENT_ID)
                .long(ARG_CLIENT_ID)
                .help("Client id whose client roles are merged with realm roles")
                .env("EDUSESSION_CLIENT_ID")
                .global(true),
        )
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Path of the public login view")
                .env("EDUSESSION_LOGIN_PATH")
                .global(true),
        )
        .arg(
            Arg::new(ARG_PUBLIC_ROUTES)
                .long(ARG_PUBLIC_ROUTES)
                .help("Comma separated public routes, example: /login,/register")
                .env("EDUSESSION_PUBLIC_ROUTES")
                .value_delimiter(',')
                .global(true),
        )
        .arg(
            Arg::new(ARG_STATE_FILE)
                .long(ARG_STATE_FILE)
                .help("File holding the persisted tokens between runs")
                .env("EDUSESSION_STATE_FILE")
                .default_value(DEFAULT_STATE_FILE)
                .global(true),
        )
        .arg(
            Arg::new(ARG_LOCATION)
                .long(ARG_LOCATION)
                .help("Current location, e.g. a provider redirect carrying a callback")
                .env("EDUSESSION_LOCATION")
                .global(true),
        )
}

fn subcommands(command: Command) -> Command {
    command
        .subcommand(
            Command::new("login")
                .about("Log in with username and password")
                .arg(
                    Arg::new("username")
                        .short('u')
                        .long("username")
                        .env("EDUSESSION_USERNAME")
                        .required(true),
                )
                .arg(
                    Arg::new("password")
                        .short('p')
                        .long("password")
                        .env("EDUSESSION_PASSWORD")
                        .hide_env_values(true)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("register")
                .about("Create an account (does not log in)")
                .arg(Arg::new("username").long("username").required(true))
                .arg(Arg::new("email").long("email").required(true))
                .arg(
                    Arg::new("password")
                        .long("password")
                        .env("EDUSESSION_PASSWORD")
                        .hide_env_values(true)
                        .required(true),
                )
                .arg(
                    Arg::new("confirm-password")
                        .long("confirm-password")
                        .help("Must match --password"),
                )
                .arg(Arg::new("first-name").long("first-name").required(true))
                .arg(Arg::new("last-name").long("last-name").required(true))
                .arg(
                    Arg::new("role")
                        .long("role")
                        .value_parser(["client", "teacher", "admin"])
                        .default_value("client"),
                ),
        )
        .subcommand(Command::new("status").about("Show the session state as JSON"))
        .subcommand(Command::new("whoami").about("Show the profile of the logged in user"))
        .subcommand(
            Command::new("refresh")
                .about("Renew the access token if it expires soon")
                .arg(
                    Arg::new("min-validity")
                        .long("min-validity")
                        .help("Minimum remaining validity in seconds")
                        .default_value("30")
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help("Refresh regardless of remaining validity")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("logout").about("End the session"))
        .subcommand(
            Command::new("get")
                .about("GET a resource path with the session's bearer token")
                .arg(Arg::new("path").required(true)),
        )
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("edusession")
        .about("EduPlatform session client")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true);

    logging::with_args(subcommands(global_args(command)))
}
