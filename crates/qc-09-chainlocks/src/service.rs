//! # ChainLocks Service
//!
//! One tokio task owns the [`ChainLockManager`]. Mutations reach it as
//! [`ChainLockCommand`]s; recovered signatures arrive on a listener channel
//! registered with the signing service; a ticker drives periodic cleanup.
//!
//! After every transition the task publishes a fresh [`EnforcementView`] and
//! only then executes the queued relay and enforcement actions, so those calls
//! never run while manager state is borrowed and may themselves query
//! [`ChainLockApi::has_chain_lock`].

use crate::config::ChainLockConfig;
use crate::domain::{ChainLockSig, EnforcementView, RecoveredSig};
use crate::error::{ChainLockError, ChainLockResult};
use crate::events::{ChainLockAction, ChainLockCommand, Reply};
use crate::manager::ChainLockManager;
use crate::metrics;
use crate::ports::inbound::{ChainLockApi, ProcessOutcome};
use crate::ports::outbound::{ChainEnforcer, ChainView, Collaborators, NetworkRelay};
use async_trait::async_trait;
use shared_types::{BlockRef, Hash, PeerId, PeerInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Service task state
pub struct ChainLockService {
    manager: ChainLockManager,
    relay: Arc<dyn NetworkRelay>,
    enforcer: Arc<dyn ChainEnforcer>,
    commands: mpsc::Receiver<ChainLockCommand>,
    recovered: mpsc::UnboundedReceiver<RecoveredSig>,
    view: watch::Sender<EnforcementView>,
    cleanup_interval: Duration,
}

impl ChainLockService {
    /// Validate `config`, start the manager and spawn the service task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: ChainLockConfig,
        collaborators: Collaborators,
    ) -> ChainLockResult<(ChainLockHandle, JoinHandle<()>)> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_channel_capacity);
        let (recovered_tx, recovered_rx) = mpsc::unbounded_channel();
        let cleanup_interval = config.cleanup_interval;

        let mut manager = ChainLockManager::new(config, &collaborators);
        manager.start(recovered_tx);
        let (view_tx, view_rx) = watch::channel(manager.enforcement_view());

        let service = Self {
            manager,
            relay: collaborators.relay.clone(),
            enforcer: collaborators.enforcer.clone(),
            commands: command_rx,
            recovered: recovered_rx,
            view: view_tx,
            cleanup_interval,
        };
        let task = tokio::spawn(service.run());

        let handle = ChainLockHandle {
            commands: command_tx,
            view: view_rx,
            chain: collaborators.chain,
        };
        Ok((handle, task))
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ChainLockCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(recovered) = self.recovered.recv() => {
                    self.on_recovered(recovered);
                    self.flush().await;
                }
                _ = ticker.tick() => {
                    self.manager.cleanup();
                    self.flush().await;
                }
            }
        }

        self.manager.stop();
        info!("ChainLocks service stopped");
    }

    async fn handle_command(&mut self, command: ChainLockCommand) {
        match command {
            ChainLockCommand::ProcessMessage {
                peer,
                payload,
                reply,
            } => {
                let result = self.manager.process_message(peer, &payload);
                self.settle(reply, result).await;
            }
            ChainLockCommand::UpdatedBlockTip {
                tip,
                initial_download,
                reply,
            } => {
                self.manager.on_updated_block_tip(tip, initial_download);
                self.settle(reply, ()).await;
            }
            ChainLockCommand::AcceptedBlockHeader { block, reply } => {
                self.manager.on_accepted_block_header(block);
                self.settle(reply, ()).await;
            }
            ChainLockCommand::TrySignChainTip { tip, reply } => {
                self.manager.try_sign_chain_tip(tip);
                self.settle(reply, ()).await;
            }
            ChainLockCommand::Cleanup { reply } => {
                self.manager.cleanup();
                self.settle(reply, ()).await;
            }
            ChainLockCommand::AlreadyHave { hash, reply } => {
                let _ = reply.send(self.manager.already_have(&hash));
            }
            ChainLockCommand::ChainLockByHash { hash, reply } => {
                let _ = reply.send(self.manager.chain_lock_by_hash(&hash));
            }
            ChainLockCommand::BestChainLock { reply } => {
                let _ = reply.send(self.manager.best_chain_lock());
            }
            ChainLockCommand::MostRecentChainLock { reply } => {
                let _ = reply.send(self.manager.most_recent_chain_lock());
            }
            ChainLockCommand::BestChainLockShares { reply } => {
                let _ = reply.send(self.manager.best_chain_lock_shares());
            }
            ChainLockCommand::Shutdown => {}
        }
    }

    /// Finish a mutating command: absorb recovered signatures it triggered,
    /// execute queued actions, then reply.
    async fn settle<T>(&mut self, reply: Reply<T>, value: T) {
        while let Ok(recovered) = self.recovered.try_recv() {
            self.on_recovered(recovered);
        }
        self.flush().await;
        let _ = reply.send(value);
    }

    fn on_recovered(&mut self, recovered: RecoveredSig) {
        match self.manager.on_recovered_sig(recovered) {
            Some(Ok(outcome)) => debug!(?outcome, "Processed own recovered signature"),
            Some(Err(e)) => warn!(error = %e, "Own recovered signature rejected"),
            None => {}
        }
    }

    async fn flush(&mut self) {
        self.view.send_replace(self.manager.enforcement_view());
        for action in self.manager.take_actions() {
            self.execute(action).await;
        }
    }

    async fn execute(&self, action: ChainLockAction) {
        match action {
            ChainLockAction::InventoryReceived { peer, inventory } => {
                self.relay.received_response(peer, inventory).await;
            }
            ChainLockAction::RelayToAll { inventory } => {
                self.relay.relay_inventory(inventory).await;
            }
            ChainLockAction::RelayToFullNodes { inventory } => {
                self.relay
                    .relay_inventory_filtered(inventory, PeerInfo::is_full_relay_peer)
                    .await;
            }
            ChainLockAction::Misbehaving {
                peer,
                score,
                reason,
            } => {
                self.relay.misbehaving(peer, score, &reason).await;
            }
            ChainLockAction::EnforceBestChainLock { block } => {
                metrics::record_enforcement();
                if let Err(e) = self.enforcer.enforce_best_chain_lock(block).await {
                    warn!(block = %block, error = %e, "Chain lock enforcement failed");
                }
            }
        }
    }
}

/// Cloneable handle to a running [`ChainLockService`].
#[derive(Clone)]
pub struct ChainLockHandle {
    commands: mpsc::Sender<ChainLockCommand>,
    view: watch::Receiver<EnforcementView>,
    chain: Arc<dyn ChainView>,
}

impl ChainLockHandle {
    async fn request<T, F>(&self, build: F) -> ChainLockResult<T>
    where
        T: Send,
        F: FnOnce(Reply<T>) -> ChainLockCommand + Send,
    {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| ChainLockError::ServiceStopped)?;
        rx.await.map_err(|_| ChainLockError::ServiceStopped)
    }

    /// Latest published enforcement snapshot.
    pub fn enforcement_view(&self) -> EnforcementView {
        *self.view.borrow()
    }

    /// Ask the service task to stop.
    pub async fn shutdown(&self) -> ChainLockResult<()> {
        self.commands
            .send(ChainLockCommand::Shutdown)
            .await
            .map_err(|_| ChainLockError::ServiceStopped)
    }
}

#[async_trait]
impl ChainLockApi for ChainLockHandle {
    async fn process_message(
        &self,
        peer: PeerId,
        payload: Vec<u8>,
    ) -> ChainLockResult<ProcessOutcome> {
        self.request(|reply| ChainLockCommand::ProcessMessage {
            peer,
            payload,
            reply,
        })
        .await?
    }

    async fn updated_block_tip(&self, tip: BlockRef, initial_download: bool) -> ChainLockResult<()> {
        self.request(|reply| ChainLockCommand::UpdatedBlockTip {
            tip,
            initial_download,
            reply,
        })
        .await
    }

    async fn accepted_block_header(&self, block: BlockRef) -> ChainLockResult<()> {
        self.request(|reply| ChainLockCommand::AcceptedBlockHeader { block, reply })
            .await
    }

    async fn try_sign_chain_tip(&self, tip: BlockRef) -> ChainLockResult<()> {
        self.request(|reply| ChainLockCommand::TrySignChainTip { tip, reply })
            .await
    }

    async fn cleanup(&self) -> ChainLockResult<()> {
        self.request(|reply| ChainLockCommand::Cleanup { reply }).await
    }

    async fn already_have(&self, hash: Hash) -> ChainLockResult<bool> {
        self.request(|reply| ChainLockCommand::AlreadyHave { hash, reply })
            .await
    }

    async fn chain_lock_by_hash(&self, hash: Hash) -> ChainLockResult<Option<ChainLockSig>> {
        self.request(|reply| ChainLockCommand::ChainLockByHash { hash, reply })
            .await
    }

    async fn best_chain_lock(&self) -> ChainLockResult<ChainLockSig> {
        self.request(|reply| ChainLockCommand::BestChainLock { reply })
            .await
    }

    async fn most_recent_chain_lock(&self) -> ChainLockResult<ChainLockSig> {
        self.request(|reply| ChainLockCommand::MostRecentChainLock { reply })
            .await
    }

    async fn best_chain_lock_shares(&self) -> ChainLockResult<Vec<ChainLockSig>> {
        self.request(|reply| ChainLockCommand::BestChainLockShares { reply })
            .await
    }

    fn has_chain_lock(&self, height: i32, hash: &Hash) -> bool {
        self.enforcement_view()
            .has_chain_lock(self.chain.as_ref(), height, hash)
    }

    fn has_conflicting_chain_lock(&self, height: i32, hash: &Hash) -> bool {
        self.enforcement_view()
            .has_conflicting_chain_lock(self.chain.as_ref(), height, hash)
    }
}
