//! Refresh Cycle Example
//!
//! Wires a toy scorer (reading prices through the shared cache), a toy
//! explainer and the in-memory store into a `RefreshSystem`, then runs one
//! manual cycle and a short periodic schedule.
//!
//! Run with: cargo run --example refresh_cycle
//! Set `RUST_LOG=signal_refresh=debug` for per-item logs.

use signal_refresh::{
    async_trait, CacheManager, EnrichmentProvider, Explanation, MemoryResultStore,
    ProviderError, RefreshSystemBuilder, Score, ScoredResult, ScoringProvider, SignalAction,
    TriggerStatus, WorkItem,
};
use std::sync::Arc;
use std::time::Duration;

/// Scores an asset from its (simulated) price change, cached per asset
struct MomentumScorer {
    cache: Arc<CacheManager>,
}

impl MomentumScorer {
    async fn price_change(&self, entity: &str) -> Result<f64, ProviderError> {
        let key = format!("ticker:demo:{entity}");
        let entity = entity.to_string();
        let change: f64 = self
            .cache
            .get_or_fetch_typed(&key, None, || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if entity == "DOGE" {
                    anyhow::bail!("symbol delisted");
                }
                let seed = entity.bytes().map(f64::from).sum::<f64>();
                Ok((seed % 21.0 - 10.0) / 10.0)
            })
            .await
            .map_err(|e| ProviderError::transient(e.to_string()))?;
        Ok(change)
    }
}

#[async_trait]
impl ScoringProvider for MomentumScorer {
    async fn score(&self, item: &WorkItem) -> Result<Score, ProviderError> {
        let change = self.price_change(&item.entity_id).await?;
        let action = if change > 0.3 {
            SignalAction::Buy
        } else if change < -0.3 {
            SignalAction::Sell
        } else {
            SignalAction::Hold
        };
        Ok(Score::new(action, change.abs(), 0.5 + change.abs() / 2.0))
    }
}

struct TemplateExplainer;

#[async_trait]
impl EnrichmentProvider for TemplateExplainer {
    async fn explain(&self, result: &ScoredResult) -> Result<Explanation, ProviderError> {
        let score = result
            .score()
            .ok_or_else(|| ProviderError::permanent("nothing to explain"))?;
        Ok(Explanation {
            model: "template".to_string(),
            text: format!(
                "{} {} with score {:.2} at {:.0}% confidence",
                result.action(),
                result.item.entity_id,
                score.composite_score,
                score.confidence * 100.0
            ),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    signal_refresh::telemetry::init_tracing("signal_refresh=info");
    println!("=== Signal Refresh: Refresh Cycle Demo ===\n");

    let items = ["BTC", "ETH", "SOL", "ADA", "DOGE", "XRP", "DOT"]
        .into_iter()
        .map(|asset| WorkItem::new("momentum", asset))
        .collect();
    let store = Arc::new(MemoryResultStore::new(items));

    let cache = Arc::new(CacheManager::new(Default::default()));
    let system = RefreshSystemBuilder::from_env()
        .with_cache(Arc::clone(&cache))
        .with_scoring(Arc::new(MomentumScorer {
            cache: Arc::clone(&cache),
        }))
        .with_enrichment(Arc::new(TemplateExplainer))
        .with_store(store.clone())
        .build()?;

    // One cycle on this task
    if let Some(report) = system.cycle().run_if_idle().await? {
        println!("Cycle {}:", report.cycle_id);
        println!("  items:      {}", report.items);
        println!("  scored:     {}", report.scored);
        println!("  failed:     {}", report.failed);
        println!("  persisted:  {}", report.persisted);
        println!("  enriched:   {}", report.enriched);
        println!("  took:       {:?}", report.elapsed);
    }

    println!("\nExplanations:");
    for record in store.enrichments() {
        match record.explanation {
            Some(explanation) => println!("  - {}", explanation.text),
            None => println!("  - {} failed: {:?}", record.task.result_id, record.task.last_error),
        }
    }

    // Background triggers
    println!("\nManual trigger: {:?}", system.trigger_cycle_now());
    match system.trigger_cycle_now() {
        TriggerStatus::InProgress => println!("Second trigger ignored while running"),
        TriggerStatus::Started => println!("Unexpected: second cycle started"),
    }

    let schedule = system.spawn_periodic(Duration::from_millis(200));
    tokio::time::sleep(Duration::from_millis(700)).await;
    schedule.abort();

    let stats = system.cache().stats();
    println!("\n=== Cache Statistics ===");
    println!("Upstream fetches: {}", stats.upstream_fetches);
    println!("Hit rate: {:.1}%", stats.hit_rate);
    println!("Stored results: {}", store.results().len());

    Ok(())
}
