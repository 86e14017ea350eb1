//! Runs account engines as independent tasks

use super::engine::AccountEngine;
use super::state::{EngineEvent, EngineState};
use crate::config::{AccountConfig, Settings};
use crate::error::{Error, Result};
use crate::notifications::Notifier;
use crate::resolver::Resolver;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

struct AccountTask {
    shutdown: Arc<watch::Sender<bool>>,
    handle: JoinHandle<EngineState>,
}

/// Stops running accounts from outside the supervisor
#[derive(Clone, Default)]
pub struct StopHandle {
    senders: Vec<(String, Arc<watch::Sender<bool>>)>,
}

impl StopHandle {
    pub fn stop_all(&self) {
        for (account, sender) in &self.senders {
            info!(account = %account, "Stop requested");
            sender.send_replace(true);
        }
    }
}

/// Starts, stops and tracks one engine task per account
pub struct Supervisor {
    settings: Settings,
    resolver: Resolver,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<EngineEvent>,
    tasks: HashMap<String, AccountTask>,
}

impl Supervisor {
    pub fn new(settings: Settings, notifier: Arc<dyn Notifier>) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            settings,
            resolver: Resolver::new(),
            notifier,
            events,
            tasks: HashMap::new(),
        }
    }

    /// Use `resolver` for accounts started from now on
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Receive events from every account
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Spawn the loop of an account and return its id
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, account: AccountConfig) -> Result<String> {
        let account_id = account.account_id();
        if self
            .tasks
            .get(&account_id)
            .is_some_and(|task| !task.handle.is_finished())
        {
            return Err(Error::config(format!("account {account_id} is already running")));
        }

        let engine = AccountEngine::new(
            account,
            &self.settings,
            self.resolver.clone(),
            Arc::clone(&self.notifier),
            self.events.clone(),
        )?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let span = info_span!("account", account = %account_id);
        let handle = tokio::spawn(engine.run(shutdown_rx).instrument(span));

        info!(account = %account_id, "Account started");
        self.tasks.insert(
            account_id.clone(),
            AccountTask {
                shutdown: Arc::new(shutdown),
                handle,
            },
        );
        Ok(account_id)
    }

    /// Ask an account's loop to stop; false if the account is unknown
    pub fn stop(&self, account_id: &str) -> bool {
        match self.tasks.get(&account_id.to_lowercase()) {
            Some(task) => {
                info!(account = %account_id, "Stop requested");
                task.shutdown.send_replace(true);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        self.stop_handle().stop_all();
    }

    /// Handle that can stop every account started so far
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            senders: self
                .tasks
                .iter()
                .map(|(id, task)| (id.clone(), Arc::clone(&task.shutdown)))
                .collect(),
        }
    }

    /// Accounts whose loop is still running, sorted
    pub fn list(&self) -> Vec<String> {
        let mut running: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, task)| !task.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        running.sort();
        running
    }

    /// Wait for one account's loop to end
    pub async fn join(&mut self, account_id: &str) -> Option<EngineState> {
        let task = self.tasks.remove(&account_id.to_lowercase())?;
        Some(Self::await_task(account_id, task).await)
    }

    /// Wait for every loop to end
    pub async fn join_all(&mut self) -> Vec<(String, EngineState)> {
        let mut results = Vec::with_capacity(self.tasks.len());
        let mut tasks: Vec<(String, AccountTask)> = self.tasks.drain().collect();
        tasks.sort_by(|a, b| a.0.cmp(&b.0));

        for (account_id, task) in tasks {
            let state = Self::await_task(&account_id, task).await;
            results.push((account_id, state));
        }
        results
    }

    async fn await_task(account_id: &str, task: AccountTask) -> EngineState {
        match task.handle.await {
            Ok(state) => state,
            Err(e) => {
                error!(account = %account_id, error = %e, "Account task panicked");
                EngineState::Fatal
            }
        }
    }
}
