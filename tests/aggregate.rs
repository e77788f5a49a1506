//! Fleet-wide reads racing shard-local writes

use shard_fleet::fleet::{Fleet, PhaseTracker};
use shard_fleet::shard::{CachedGuild, CachedUser};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use twilight_model::id::Id;

const SHARDS: u32 = 4;
const ROUNDS: u64 = 2_000;

fn fleet() -> Arc<Fleet> {
    let total = NonZeroU32::new(SHARDS).unwrap();
    Arc::new(Fleet::new(total, Arc::new(PhaseTracker::new())))
}

fn user(id: u64, round: u64) -> CachedUser {
    CachedUser {
        id: Id::new(id),
        name: format!("user-{id}-{round}"),
        global_name: None,
        discriminator: 0,
        avatar: None,
        bot: false,
    }
}

#[test]
fn aggregation_tolerates_concurrent_mutation() {
    let fleet = fleet();
    let done = Arc::new(AtomicBool::new(false));

    // One writer per shard, like one event stream per connection
    let writers: Vec<_> = fleet
        .connections()
        .iter()
        .cloned()
        .map(|connection| {
            thread::spawn(move || {
                let shard = u64::from(connection.index());
                for round in 0..ROUNDS {
                    let guild_id = Id::new(((round * u64::from(SHARDS) + shard) << 22) | 1);
                    connection.cache().insert_guild(CachedGuild {
                        id: guild_id,
                        name: format!("guild-{round}"),
                        owner_id: None,
                        member_count: None,
                        unavailable: false,
                    });
                    connection.cache().insert_user(user(round % 64 + 1, round));
                    connection.record_response();

                    if round % 3 == 0 {
                        connection.cache().remove_guild(guild_id);
                    }
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let fleet = Arc::clone(&fleet);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut sweeps = 0u64;
                while !done.load(Ordering::Acquire) {
                    let guilds = fleet.all_guilds();
                    let users = fleet.all_users();
                    assert!(users.len() <= 64 * SHARDS as usize);
                    assert!(guilds.len() <= (ROUNDS * u64::from(SHARDS)) as usize);
                    let _ = fleet.stats();
                    if let Some(merged) = fleet.merged_user(Id::new(1)) {
                        assert!(merged.copies() <= SHARDS as usize);
                        let _ = merged.name();
                    }
                    sweeps += 1;
                }
                sweeps
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    // Quiescent: every count is exact
    let kept_per_shard = (0..ROUNDS).filter(|round| round % 3 != 0).count();
    assert_eq!(fleet.all_guilds().len(), kept_per_shard * SHARDS as usize);
    assert_eq!(fleet.all_users().len(), 64 * SHARDS as usize);
    assert_eq!(fleet.response_total(), ROUNDS * u64::from(SHARDS));
    assert_eq!(fleet.merged_user(Id::new(1)).unwrap().copies(), SHARDS as usize);
}

#[test]
fn lookups_on_missing_entities_are_absent() {
    let fleet = fleet();
    assert!(fleet.guild(Id::new(1 << 22)).is_none());
    assert!(fleet.user(Id::new(1)).is_none());
    assert!(fleet.merged_user(Id::new(1)).is_none());
    assert!(fleet.connection_at(SHARDS).is_none());
}
