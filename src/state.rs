use crate::config::Config;
use crate::session::SessionStore;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<Mutex<SessionStore>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        // One file of the largest accepted size always fits.
        let upload_budget = config.max_upload_total_bytes.max(config.max_upload_bytes);
        let sessions = SessionStore::new(config.max_sessions, upload_budget);
        Self {
            config: Arc::new(config),
            sessions: Arc::new(Mutex::new(sessions)),
        }
    }
}
