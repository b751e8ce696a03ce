use crate::config::AppConfig;
use std::path::PathBuf;
use url::Url;

/// Settings shared by every action of one run.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: AppConfig,
    pub state_file: PathBuf,
    pub location: Option<Url>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(config: AppConfig, state_file: impl Into<PathBuf>) -> Self {
        Self {
            config,
            state_file: state_file.into(),
            location: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: Url) -> Self {
        self.location = Some(location);
        self
    }
}
