use super::Module;
use crate::fleet::Fleet;
use crate::metrics;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;

const REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically logs fleet totals and refreshes the per-shard gauges
#[derive(Debug, Default)]
pub struct StatsReporter;

impl StatsReporter {
    pub const NAME: &'static str = "stats-reporter";
}

impl Module for StatsReporter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn on_post_load(&self, fleet: &Arc<Fleet>) {
        let fleet = Arc::clone(fleet);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REPORT_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                report(&fleet);
            }
        });
    }
}

fn report(fleet: &Fleet) {
    let stats = fleet.stats();
    for shard in &stats.shards {
        metrics::set_guilds(shard.index, shard.guilds);
    }
    metrics::set_shards_connected(stats.connected_shards);

    info!(
        phase = %stats.phase,
        connected = stats.connected_shards,
        total_shards = stats.total_shards,
        guilds = stats.guilds,
        users = stats.users,
        responses = stats.response_total,
        "Fleet stats"
    );
}
