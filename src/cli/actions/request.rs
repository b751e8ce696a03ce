use super::Context;
use crate::api::ApiError;
use anyhow::{anyhow, Result};
use tracing::warn;

/// Handle the get action
pub async fn get(context: &Context, path: &str) -> Result<()> {
    match context.api.get_text(path).await {
        Ok(body) => {
            println!("{body}");
            Ok(())
        }
        Err(err @ (ApiError::Unauthorized(_) | ApiError::Forbidden(_))) => {
            warn!("{err}");
            let redirects = context.navigator.redirects();
            if let Some(path) = redirects.last() {
                warn!(path = %path, "session ended");
            }
            Err(anyhow!("{}", err.user_message()))
        }
        Err(err) => Err(err.into()),
    }
}
