use std::sync::Arc;
use std::time::Duration;

use funnel_core::model::ModuleId;
use funnel_core::FunnelConfig;
use storage::repository::Storage;

use crate::chat::ChatSession;
use crate::error::{AppServicesError, ChatError};
use crate::machines::ModuleMachines;
use crate::progress::{ProgressController, SharedController};
use crate::sync::Revalidator;
use crate::timers::CountdownTicker;
use crate::Clock;

const FALLBACK_POLL: Duration = Duration::from_secs(5);

/// Assembles the progress controller and the module machines over one store.
#[derive(Clone)]
pub struct FunnelServices {
    controller: SharedController,
    machines: Arc<ModuleMachines>,
    config: FunnelConfig,
}

impl FunnelServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage, content or progress setup fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: FunnelConfig,
        community_url: &str,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::with_storage(&storage, clock, config, community_url).await
    }

    /// Build services over an ephemeral in-memory store.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if content or progress setup fails.
    pub async fn in_memory(
        clock: Clock,
        config: FunnelConfig,
        community_url: &str,
    ) -> Result<Self, AppServicesError> {
        Self::with_storage(&Storage::in_memory(), clock, config, community_url).await
    }

    async fn with_storage(
        storage: &Storage,
        clock: Clock,
        config: FunnelConfig,
        community_url: &str,
    ) -> Result<Self, AppServicesError> {
        let machines = Arc::new(ModuleMachines::standard(community_url)?);
        let controller = ProgressController::load(storage.progress(), clock, config.clone())
            .await?
            .shared();
        Ok(Self {
            controller,
            machines,
            config,
        })
    }

    #[must_use]
    pub fn controller(&self) -> SharedController {
        Arc::clone(&self.controller)
    }

    #[must_use]
    pub fn machines(&self) -> Arc<ModuleMachines> {
        Arc::clone(&self.machines)
    }

    /// Open the chat screen of `module`.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::NoMachine` for modules without a chat, or a
    /// storage error.
    pub async fn open_chat(&self, module: ModuleId) -> Result<ChatSession, ChatError> {
        let machine = self
            .machines
            .get(module)
            .ok_or(ChatError::NoMachine(module))?;
        ChatSession::open(machine, self.controller()).await
    }

    /// Start background revalidation at the configured poll interval.
    pub async fn spawn_revalidator(&self) -> Revalidator {
        let poll = self
            .config
            .revalidate_every()
            .to_std()
            .ok()
            .filter(|poll| !poll.is_zero())
            .unwrap_or(FALLBACK_POLL);
        Revalidator::spawn(self.controller(), poll).await
    }

    /// Tickers for the module-2 gate and the final-tier reveal.
    pub async fn spawn_countdowns(&self) -> (CountdownTicker, CountdownTicker) {
        let (countdowns, clock) = {
            let guard = self.controller.lock().await;
            (guard.countdowns(), guard.clock())
        };
        (
            CountdownTicker::spawn(countdowns.module2_gate, clock),
            CountdownTicker::spawn(countdowns.final_reveal, clock),
        )
    }
}
