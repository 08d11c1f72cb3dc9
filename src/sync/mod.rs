//! Synchronization pipeline: Platforms → Tokens → Dexs → Pairs.
//!
//! Each stage feeds the next, so a failed stage ends the pass. Failures of a
//! single provider, chain or pool inside a stage are logged and skipped.

pub mod pairs;
pub mod tokens;

pub use pairs::is_two_leg_pair;

use crate::chains;
use crate::config::SyncConfig;
use crate::database::Store;
use crate::error::AppError;
use crate::lock::KeyedLock;
use crate::providers::{PairSource, TokenSource, TraderSource};
use crate::reconcile::Reconciler;
use crate::types::{Blockchain, ExchangeUpsert, UpsertReport};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Upstreams used by the pipeline. The secondary catalog is optional.
#[derive(Clone)]
pub struct SyncProviders {
    pub primary: Arc<dyn TokenSource>,
    pub secondary: Option<Arc<dyn TokenSource>>,
    pub pairs: Arc<dyn PairSource>,
    pub traders: Arc<dyn TraderSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStage {
    Platforms,
    Tokens,
    Dexs,
    Pairs,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub stage: SyncStage,
    pub changes: Option<UpsertReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub pass_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageOutcome>,
}

impl SyncStatus {
    pub fn succeeded(&self) -> bool {
        self.finished_at.is_some() && self.stages.iter().all(|stage| stage.error.is_none())
    }
}

pub struct SyncService {
    store: Arc<dyn Store>,
    providers: SyncProviders,
    config: SyncConfig,
    reconciler: Reconciler,
    pair_lock: KeyedLock<UpsertReport>,
    status: RwLock<Option<SyncStatus>>,
}

impl SyncService {
    /// `pair_lock_hold` bounds how long one token's pair resync may hold its
    /// lock.
    pub fn new(
        store: Arc<dyn Store>,
        providers: SyncProviders,
        config: SyncConfig,
        pair_lock_hold: Duration,
    ) -> Self {
        Self {
            store,
            providers,
            config,
            reconciler: Reconciler::default(),
            pair_lock: KeyedLock::new("pair-sync", pair_lock_hold),
            status: RwLock::new(None),
        }
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub async fn last_status(&self) -> Option<SyncStatus> {
        self.status.read().await.clone()
    }

    /// Runs passes forever, one per configured interval.
    pub async fn start(&self) -> Result<()> {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        info!("🚀 Starting sync service, one pass every {:?}", period);

        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        if !self.config.on_start {
            interval.tick().await;
        }

        loop {
            interval.tick().await;
            let status = self.run_pass().await;
            if status.succeeded() {
                info!(pass_id = %status.pass_id, "✅ Sync pass finished");
            } else {
                error!(pass_id = %status.pass_id, "❌ Sync pass finished with errors");
            }
        }
    }

    /// One full pass. Stops at the first stage that fails.
    pub async fn run_pass(&self) -> SyncStatus {
        let pass_id = Uuid::new_v4();
        let span = info_span!("sync_pass", %pass_id);
        self.run_stages(pass_id).instrument(span).await
    }

    async fn run_stages(&self, pass_id: Uuid) -> SyncStatus {
        *self.status.write().await = Some(SyncStatus {
            pass_id,
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
        });

        for stage in [SyncStage::Platforms, SyncStage::Tokens, SyncStage::Dexs, SyncStage::Pairs] {
            info!(?stage, "🔄 Stage started");
            let result = match stage {
                SyncStage::Platforms => self.sync_platforms().await,
                SyncStage::Tokens => self.sync_tokens().await.map(|report| {
                    let mut changes = report.tokens;
                    changes += report.records;
                    changes
                }),
                SyncStage::Dexs => self.sync_dexs().await,
                SyncStage::Pairs => self.sync_pairs().await.map(|report| report.into()),
            };

            let outcome = match result {
                Ok(changes) => {
                    info!(?stage, ?changes, "✅ Stage finished");
                    StageOutcome { stage, changes: Some(changes), error: None }
                }
                Err(e) => {
                    error!(?stage, "❌ Stage failed: {:#}", e);
                    StageOutcome { stage, changes: None, error: Some(format!("{:#}", e)) }
                }
            };
            let failed = outcome.error.is_some();
            self.record_stage(outcome).await;
            if failed {
                break;
            }
        }

        let mut status = self.status.write().await;
        let finished = status.get_or_insert_with(|| SyncStatus {
            pass_id,
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
        });
        finished.finished_at = Some(Utc::now());
        finished.clone()
    }

    async fn record_stage(&self, outcome: StageOutcome) {
        if let Some(status) = self.status.write().await.as_mut() {
            status.stages.push(outcome);
        }
    }

    /// Seeds the supported chains and removes every other chain.
    pub async fn sync_platforms(&self) -> Result<UpsertReport> {
        let blockchains: Vec<Blockchain> = chains::SUPPORTED_CHAINS.iter().map(Blockchain::from).collect();
        self.store.upsert_blockchains(&blockchains).await
    }

    /// Refreshes exchanges of every stored chain. A chain whose listing fails
    /// is skipped for this pass.
    pub async fn sync_dexs(&self) -> Result<UpsertReport> {
        let stored: HashSet<String> = self
            .store
            .list_blockchains()
            .await?
            .into_iter()
            .map(|chain| chain.slug)
            .collect();

        let mut exchanges: Vec<ExchangeUpsert> = Vec::new();
        for chain in chains::SUPPORTED_CHAINS.iter() {
            if !stored.contains(chain.slug) {
                warn!(chain = chain.slug, "chain not stored, exchanges skipped");
                continue;
            }

            match self.providers.pairs.list_exchanges(chain.slug).await {
                Ok(listed) => {
                    info!(chain = chain.slug, count = listed.len(), "📥 Exchanges listed");
                    exchanges.extend(
                        listed
                            .into_iter()
                            .filter(|exchange| stored.contains(&exchange.chain))
                            .map(ExchangeUpsert::from),
                    );
                }
                Err(e) => warn!("{}", AppError::partial(format!("exchanges chain={}", chain.slug), e)),
            }
        }

        self.store.upsert_exchanges(&exchanges).await
    }
}
