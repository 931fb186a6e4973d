pub mod handlers;
pub mod telegram;

use crate::relay::ChatRelay;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    token: String,
    relay: Arc<ChatRelay>,
}

impl Server {
    pub fn new(token: String, relay: Arc<ChatRelay>) -> Self {
        Self { token, relay }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        telegram::start_polling(&self.token, self.relay.clone()).await
    }
}
