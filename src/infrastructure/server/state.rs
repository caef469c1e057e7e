use crate::application::session::SessionService;
use crate::config::AppConfig;
use std::sync::Arc;

pub struct ServerState {
    config: Arc<AppConfig>,
    http: reqwest::Client,
    sessions: SessionService,
}

impl ServerState {
    pub fn new(config: Arc<AppConfig>, http: reqwest::Client, sessions: SessionService) -> Self {
        Self {
            config,
            http,
            sessions,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }
}
