use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};

use trend_core::{BarIngestion, ScopeKey, Timeframe};
use trend_engine::config::EngineConfig;
use trend_engine::demo;
use trend_engine::instrument::{InstrumentActor, SharedComponents};
use trend_engine::store::PersistenceStore;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let config = EngineConfig::from_env()?;

    if config.log_format_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting Trend-State Engine");
    tracing::info!("  Ring buffer capacity: {} bars", config.ring_buffer_capacity);
    tracing::info!("  Per-bar compute budget: {}ms", config.per_bar_budget_ms);
    tracing::info!(
        "  S3 alignment predicate: {}",
        if config.alignment_predicate_ascending {
            "ascending slow band"
        } else {
            "strict"
        }
    );
    tracing::info!("  Lesson half-life: {}h", config.lesson_half_life_hours);

    let config = Arc::new(config);

    // 2. Durable store for trade summaries, pattern statistics and lessons.
    let store = Arc::new(PersistenceStore::connect(&config.database_url).await?);
    tracing::info!("Startup check: database migrated and reachable");

    // 3. Wire the shared collaborators. The demo module stands in for real
    // ingestion/execution/regime adapters, which are out of scope here.
    let shared = Arc::new(SharedComponents {
        feature_builder: feature_builder::FeatureBuilder::new(feature_builder::FeatureBuilderConfig::default()),
        signature_engine: signature_engine::SignatureEngine::new(signature_engine::SignatureEngineConfig::with_defaults()),
        appetite_calculator: appetite_calculator::AppetiteCalculator::new(
            appetite_calculator::AppetiteCalculatorConfig::default(),
        ),
        outcome_classifier: outcome_classifier::OutcomeClassifier::new(
            outcome_classifier::OutcomeClassifierConfig::default(),
        ),
        pattern_aggregator: Arc::new(pattern_aggregator::PatternAggregator::new(
            pattern_aggregator::PatternAggregatorConfig {
                n_min: config.n_min,
                edge_min: config.edge_min,
                ..Default::default()
            },
        )),
        lesson_builder: Arc::new(lesson_builder::LessonBuilder::new(lesson_builder::LessonBuilderConfig {
            n_min: config.n_min,
            edge_min: config.edge_min,
            half_life_hours: config.lesson_half_life_hours,
            ..Default::default()
        })),
        context_provider: Arc::new(demo::StaticContextProvider),
        order_sink: Arc::new(demo::LoggingOrderIntentSink),
        learning_reader: Arc::new(demo::NeutralLearningReader),
        advisory_sink: Arc::new(demo::LoggingAdvisorySink),
        store: Arc::clone(&store),
    });
    tracing::info!("Engine components initialized");

    let ingestion: Arc<dyn BarIngestion> = Arc::new(demo::QueueBarIngestion::new(Vec::new()));

    // 4. One mpsc channel pair per instrument, one actor task per
    // instrument. An instrument is discovered the first time a bar for it
    // arrives; the dispatcher below owns that registration.
    let (override_tx, _override_rx) = watch::channel(HashMap::<ScopeKey, trend_core::Override>::new());
    let mut bar_senders: HashMap<String, mpsc::Sender<trend_core::BarEvent>> = HashMap::new();
    let mut handles = Vec::new();

    // Periodic lesson-health report: how much signal the currently
    // materialized overrides still carry.
    let health_builder = lesson_builder::HealthReportBuilder::default();
    let health_overrides = override_tx.subscribe();
    let mut health_interval = tokio::time::interval(StdDuration::from_secs(300));

    tracing::info!(
        "Engine is now running across {} timeframes. Press Ctrl+C to stop.",
        Timeframe::ALL.len()
    );

    loop {
        tokio::select! {
            next = ingestion.next_bar() => {
                match next {
                    Ok(Some(event)) => {
                        let sender = bar_senders.entry(event.instrument.clone()).or_insert_with(|| {
                            let (bar_tx, bar_rx) = mpsc::channel(256);
                            let (_fill_tx, fill_rx) = mpsc::channel(256);
                            let (_close_tx, close_rx) = mpsc::channel(256);
                            let actor = InstrumentActor::new(
                                event.instrument.clone(),
                                Arc::clone(&config),
                                Arc::clone(&shared),
                                override_tx.clone(),
                            );
                            handles.push(tokio::spawn(actor.run(bar_rx, fill_rx, close_rx)));
                            bar_tx
                        });
                        if sender.send(event).await.is_err() {
                            tracing::warn!("instrument actor channel closed unexpectedly");
                        }
                    }
                    Ok(None) => {
                        tracing::info!("bar ingestion exhausted, shutting down");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(%err, "bar ingestion error");
                    }
                }
            }
            _ = health_interval.tick() => {
                let overrides: Vec<_> = health_overrides.borrow().values().cloned().collect();
                let report = health_builder.build(&overrides);
                tracing::info!(
                    active_lessons = report.active_lessons,
                    mean_abs_deviation = report.mean_abs_deviation,
                    decayed_to_neutral = report.decayed_to_neutral_count,
                    status = ?report.status,
                    "lesson health report"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down gracefully...");
                break;
            }
        }
    }

    drop(bar_senders);
    for handle in handles {
        handle.await.ok();
    }

    tracing::info!("Trend-state engine shut down.");
    Ok(())
}
