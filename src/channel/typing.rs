use super::PresenceChannel;
use crate::types::{DEFAULT_TYPING_TIMEOUT, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

struct TypingState {
    typing: bool,
    timer: Option<JoinHandle<()>>,
}

/// Debounced typing flag for one editing context.
///
/// The first keystroke publishes typing on; every keystroke restarts the idle
/// timer, and when it fires typing off is published.
pub struct TypingIndicator {
    presence: PresenceChannel,
    context: String,
    idle: Duration,
    state: Arc<Mutex<TypingState>>,
}

impl TypingIndicator {
    pub fn new(presence: PresenceChannel, context: impl Into<String>) -> Self {
        Self {
            presence,
            context: context.into(),
            idle: Duration::from_millis(DEFAULT_TYPING_TIMEOUT),
            state: Arc::new(Mutex::new(TypingState {
                typing: false,
                timer: None,
            })),
        }
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub async fn is_typing(&self) -> bool {
        self.state.lock().await.typing
    }

    pub async fn keystroke(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        if !state.typing {
            self.presence.set_typing(Some(self.context.clone())).await?;
            state.typing = true;
        }

        let presence = self.presence.clone();
        let shared = Arc::clone(&self.state);
        let idle = self.idle;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;

            let mut state = shared.lock().await;
            if state.typing {
                if let Err(e) = presence.set_typing(None).await {
                    tracing::warn!("Failed to clear typing state: {}", e);
                }
                state.typing = false;
            }
        }));
        Ok(())
    }

    /// Clears typing immediately, e.g. when the editor loses focus
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.typing {
            state.typing = false;
            self.presence.set_typing(None).await?;
        }
        Ok(())
    }
}

impl Drop for TypingIndicator {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_lock()
            && let Some(timer) = state.timer.take()
        {
            timer.abort();
        }
    }
}
