use super::Context;
use crate::provider::{Credentials, Registration};
use anyhow::{bail, Context as _, Result};
use secrecy::SecretString;
use serde::Serialize;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{output}");
    Ok(())
}

/// Handle the login action
pub async fn login(context: &Context, username: String, password: SecretString) -> Result<()> {
    let credentials = Credentials { username, password };
    context
        .session
        .login(&credentials)
        .await
        .context("login failed")?;

    print_json(&context.session.snapshot())
}

/// Handle the register action
pub async fn register(context: &Context, registration: &Registration) -> Result<()> {
    context
        .auth
        .register(registration)
        .await
        .context("registration failed")?;

    println!("Account created. Log in with `edusession login`.");
    Ok(())
}

/// Handle the status action
pub fn status(context: &Context) -> Result<()> {
    print_json(&context.session.snapshot())
}

/// Handle the whoami action
pub fn whoami(context: &Context) -> Result<()> {
    let Some(profile) = context.session.profile() else {
        bail!("not logged in");
    };
    print_json(&profile)
}

/// Handle the refresh action
pub async fn refresh(context: &Context, min_validity: i64) -> Result<()> {
    context
        .session
        .renew(min_validity)
        .await
        .context("token renewal failed, session ended")?;

    print_json(&context.session.snapshot())
}

/// Handle the logout action
pub async fn logout(context: &Context) -> Result<()> {
    context.session.logout().await;
    println!("Logged out.");
    Ok(())
}
