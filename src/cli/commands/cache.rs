//! Cache management commands

use anyhow::Result;

use super::confirm;
use crate::cli::args::CacheAction;
use crate::config::EditvaultConfig;
use crate::session::Session;

/// Execute cache command
pub async fn handle_cache_command(
    action: &CacheAction,
    session: &Session,
    config: &EditvaultConfig,
) -> Result<()> {
    let cache = session.cache();

    match action {
        CacheAction::Stats => {
            let stats = cache.stats().await;
            println!("📊 Cache statistics");
            println!("   Store: {}", session.store().location());

            println!("\nEntries:");
            println!(
                "   Memory tier: {} / {}",
                stats.memory_entries, stats.memory_capacity
            );
            match stats.persistent_entries {
                Some(count) => println!("   Persistent tier: {}", count),
                None => println!("   Persistent tier: unavailable"),
            }

            // counters cover this process only
            println!("\nThis session:");
            println!("   Requests: {}", stats.counts.total_requests);
            println!(
                "   Hits: {} (memory {}, persistent {}, fuzzy {})",
                stats.counts.hits,
                stats.counts.memory_hits,
                stats.counts.persistent_hits,
                stats.counts.fuzzy_hits
            );
            println!("   Hit rate: {:.1}%", stats.hit_rate * 100.0);

            println!("\nConfiguration:");
            println!("   Enabled: {}", stats.enabled);
            println!("   Fuzzy mode: {}", cache.fuzzy_mode());
            println!("   Key version: {}", cache.key_generator().version());
            println!("   Max age: {} days", config.cache.cleanup.max_age_days);
            println!("   Max idle: {} days", config.cache.cleanup.max_idle_days);
        }

        CacheAction::Clear { yes } => {
            println!("⚠️  Warning: This will delete ALL cached responses");
            if !yes && !confirm("Continue?")? {
                println!("   Aborted");
                return Ok(());
            }
            let removed = cache.clear().await?;
            println!("✅ Removed {} entries", removed);
        }

        CacheAction::Prune {
            max_age,
            max_idle,
            max_entries,
        } => {
            let mut policy = config.cache.to_cleanup_policy();
            if let Some(age) = max_age {
                policy.max_age_days = *age;
            }
            if let Some(idle) = max_idle {
                policy.max_idle_days = *idle;
            }
            if max_entries.is_some() {
                policy.max_entries = *max_entries;
            }

            println!("🧹 Cache cleanup");
            println!("   Max age: {} days", policy.max_age_days);
            println!("   Max idle: {} days", policy.max_idle_days);
            println!("   Remove version mismatch: {}", policy.remove_version_mismatch);
            if let Some(limit) = policy.max_entries {
                println!("   Max entries: {}", limit);
            }

            let stats = cache.prune_stale(&policy).await?;
            println!("\n✅ Cleanup complete");
            println!(
                "   Removed {} of {} entries",
                stats.removed_count, stats.scanned
            );
        }
    }

    Ok(())
}
