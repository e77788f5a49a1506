//! Staged fleet startup
//!
//! ```text
//! PRELOAD   size the fleet, start module discovery
//! LOADING   connect shards one at a time, cooldown in between
//! LOADED    listeners attached, presence refreshed, config persisted
//! POSTLOAD  modules instantiated and notified
//! ```
//!
//! Only a failed shard connection (or an illegal phase move) aborts
//! startup. Everything else degrades: the shard count falls back to 1,
//! presence and persistence failures are logged, and a module that
//! cannot be built is left out.

use crate::config::FleetConfig;
use crate::error::FleetError;
use crate::events::EventListener;
use crate::fleet::{Fleet, LifecyclePhase, PhaseTracker};
use crate::logging::LogRelay;
use crate::metrics;
use crate::modules::{ActiveModules, ModuleDescriptor, ModuleDiscovery};
use crate::shard::{presence_text, CacheKind, Connector, ShardCountSource};

use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Drives a fleet from PRELOAD to POSTLOAD
pub struct FleetOrchestrator<C, S, D> {
    config: FleetConfig,
    connector: C,
    source: S,
    discovery: Arc<D>,
    listeners: Vec<Arc<dyn EventListener>>,
    log_relay: Option<LogRelay>,
    phases: Arc<PhaseTracker>,
}

impl<C, S, D> FleetOrchestrator<C, S, D>
where
    C: Connector,
    S: ShardCountSource,
    D: ModuleDiscovery,
{
    pub fn new(config: FleetConfig, connector: C, source: S, discovery: D) -> Self {
        Self {
            config,
            connector,
            source,
            discovery: Arc::new(discovery),
            listeners: Vec::new(),
            log_relay: None,
            phases: Arc::new(PhaseTracker::new()),
        }
    }

    /// Listeners attached to every shard once all shards are connected
    #[must_use]
    pub fn with_listeners(mut self, listeners: Vec<Arc<dyn EventListener>>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Log relay switched on when the fleet reaches LOADED
    #[must_use]
    pub fn with_log_relay(mut self, relay: LogRelay) -> Self {
        self.log_relay = Some(relay);
        self
    }

    /// Phase tracker of the fleet this orchestrator will build
    ///
    /// Subscribe before `prepare` to observe every transition.
    pub fn phases(&self) -> Arc<PhaseTracker> {
        Arc::clone(&self.phases)
    }

    /// Run every phase
    pub async fn bootstrap(self) -> Result<Bootstrapped, FleetError> {
        self.prepare().await?.launch().await
    }

    /// PRELOAD -> LOADING: size the fleet and start module discovery
    pub async fn prepare(self) -> Result<PreparedFleet<C>, FleetError> {
        let total_shards = self.shard_count().await;
        let fleet = Arc::new(Fleet::new(total_shards, Arc::clone(&self.phases)));

        self.phases.advance(LifecyclePhase::Loading)?;
        info!(total_shards = total_shards.get(), "Fleet sized");

        let discovery = Arc::clone(&self.discovery);
        let discovery = tokio::spawn(async move { discovery.discover().await });

        Ok(PreparedFleet {
            config: self.config,
            connector: self.connector,
            listeners: self.listeners,
            log_relay: self.log_relay,
            fleet,
            discovery,
        })
    }

    async fn shard_count(&self) -> NonZeroU32 {
        if let Some(configured) = self.config.total_shards {
            info!(total_shards = configured, "Using configured shard count");
            return at_least_one(configured);
        }

        let timeout = self.config.recommend_timeout();
        let recommended = match tokio::time::timeout(timeout, self.source.recommended_shards()).await {
            Ok(Ok(count)) => {
                info!(total_shards = count, "Discord recommended shard count");
                count
            }
            Ok(Err(e)) => {
                metrics::record_error(0, &e);
                warn!(error = %e, "Shard count recommendation failed, using 1 shard");
                1
            }
            Err(_) => {
                let e = FleetError::ShardCountTimeout(timeout);
                metrics::record_error(0, &e);
                warn!(error = %e, "Shard count recommendation timed out, using 1 shard");
                1
            }
        };

        at_least_one(recommended)
    }
}

fn at_least_one(count: u32) -> NonZeroU32 {
    NonZeroU32::new(count).unwrap_or_else(|| {
        warn!("Shard count of 0 is not usable, running 1 shard");
        NonZeroU32::MIN
    })
}

/// A sized fleet in LOADING whose shards are not connected yet
pub struct PreparedFleet<C> {
    config: FleetConfig,
    connector: C,
    listeners: Vec<Arc<dyn EventListener>>,
    log_relay: Option<LogRelay>,
    fleet: Arc<Fleet>,
    discovery: JoinHandle<Vec<ModuleDescriptor>>,
}

impl<C: Connector> PreparedFleet<C> {
    /// The fleet, readable (and partially empty) while shards connect
    pub fn fleet(&self) -> &Arc<Fleet> {
        &self.fleet
    }

    /// LOADING -> LOADED -> POSTLOAD
    pub async fn launch(self) -> Result<Bootstrapped, FleetError> {
        if let Err(e) = self.connect_all().await {
            self.discovery.abort();
            return Err(e);
        }

        self.attach_listeners();
        self.refresh_presence().await;

        if let Err(e) = self.config.save().await {
            metrics::record_error(0, &e);
            warn!(error = %e, "Could not persist configuration");
        }

        if let Some(relay) = &self.log_relay {
            relay.enable();
        }
        self.fleet.phases().advance(LifecyclePhase::Loaded)?;

        let descriptors = self.discovery.await.map_err(FleetError::ModuleDiscovery)?;
        let modules = instantiate(&descriptors);
        metrics::set_modules_active(modules.len());

        self.fleet.phases().advance(LifecyclePhase::PostLoad)?;
        info!(modules = ?modules.names(), "Fleet ready");

        for module in modules.iter() {
            module.on_post_load(&self.fleet);
        }

        Ok(Bootstrapped {
            fleet: self.fleet,
            modules,
        })
    }

    async fn connect_all(&self) -> Result<(), FleetError> {
        let cooldown = self.config.shard_cooldown();
        let total = self.fleet.total_shards();

        for connection in self.fleet.connections() {
            let index = connection.index();
            if index > 0 {
                tokio::time::sleep(cooldown).await;
            }

            info!(shard = index, total_shards = total, "Connecting shard");
            if let Err(e) = self.connector.connect(Arc::clone(connection)).await {
                metrics::record_error(index, &e);
                return Err(e);
            }
        }

        metrics::set_shards_connected(self.fleet.connected_count());
        info!(total_shards = total, "All shards connected");
        Ok(())
    }

    fn attach_listeners(&self) {
        for connection in self.fleet.connections() {
            connection.attach_listeners(&self.listeners);
        }
    }

    async fn refresh_presence(&self) {
        let total = self.fleet.total_shards();

        for connection in self.fleet.connections() {
            let index = connection.index();
            let guilds = connection.cache().len(CacheKind::Guilds);
            metrics::set_guilds(index, guilds);

            let status = presence_text(&self.config.status_prefix, guilds, index, total);
            if let Err(e) = self.connector.refresh(connection, &status).await {
                metrics::record_error(index, &e);
                warn!(shard = index, error = %e, "Presence refresh failed");
            }
        }
    }
}

fn instantiate(descriptors: &[ModuleDescriptor]) -> ActiveModules {
    let mut modules = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        match descriptor.instantiate() {
            Ok(module) => modules.push(module),
            Err(reason) => {
                let e = FleetError::ModuleInstantiation {
                    module: descriptor.name,
                    reason,
                };
                metrics::record_module_failure(descriptor.name);
                error!(error = %e, "Module excluded");
            }
        }
    }

    ActiveModules::new(modules)
}

/// A fleet in POSTLOAD and its active modules
#[derive(Debug)]
pub struct Bootstrapped {
    pub fleet: Arc<Fleet>,
    pub modules: ActiveModules,
}
