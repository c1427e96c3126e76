//! Wires every subsystem crate together behind the process `main` (§9
//! "Deployment shape": one coordinator process, background tasks owning
//! their own lifecycle, a shared Postgres pool and event bus).

use {
    crate::{
        arguments::Arguments,
        collaborators::{DistancePricing, NoopGeography},
        health,
        shutdown::ShutdownController,
    },
    ride_database::Postgres,
    ride_events::{EventBus, InMemoryEventBus, NegotiationRooms},
    ride_negotiation::{sweeper, NegotiationService},
    ride_payments::{client::ResilientProcessorClient, consumer, PaymentsService},
    ride_spatial::{
        kv::{in_memory::InMemoryGeoKvStore, GeoKvStore},
        location::{LocationBuffer, LocationBufferConfig, SpatialIndex},
        EtaTracker, KvEtaTracker, RedisGeoStore,
    },
    ride_types::RideTypeService,
    std::sync::Arc,
};

pub async fn run(args: Arguments) -> anyhow::Result<()> {
    let db = Postgres::new(&args.db_url).await?;
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());

    let kv_store: Arc<dyn GeoKvStore> = match &args.redis_url {
        Some(url) => Arc::new(RedisGeoStore::connect(url).await?),
        None => {
            tracing::warn!("no redis_url configured, running the spatial index in-memory");
            Arc::new(InMemoryGeoKvStore::new())
        }
    };
    let eta_tracker: Arc<dyn EtaTracker> = Arc::new(KvEtaTracker::new(kv_store.clone()));
    let spatial_index = Arc::new(SpatialIndex::new(kv_store));
    let location_buffer = LocationBuffer::spawn(
        spatial_index.clone(),
        LocationBufferConfig {
            max_buffer_size: args.location_buffer_max_size,
            flush_interval: args.location_flush_interval,
        },
    );

    let negotiation_service = Arc::new(NegotiationService::new(
        db.clone(),
        bus.clone(),
        NegotiationRooms::new(),
        Arc::new(NoopGeography),
        Arc::new(DistancePricing::default()),
    ));
    sweeper::spawn(negotiation_service.clone(), args.negotiation_sweep_interval);

    let processor = Arc::new(ResilientProcessorClient::new(
        args.payment_processor_url.clone(),
        args.payment_processor_api_key.clone(),
    ));
    let payments_service = Arc::new(PaymentsService::new(db.clone(), bus.clone(), processor));
    consumer::spawn(payments_service.clone(), bus.clone());

    let ride_types_service = Arc::new(RideTypeService::new(db.clone(), Arc::new(NoopGeography)));

    // Keep the services and the location buffer alive for the process
    // lifetime; nothing else currently holds a strong reference to them
    // once the HTTP surface that would call into them is added.
    let _ = (&negotiation_service, &payments_service, &ride_types_service, &eta_tracker);

    let liveness: Arc<dyn health::LivenessChecking> = Arc::new(health::Liveness::new());
    let metrics_address = args.metrics_address;

    let shutdown = ShutdownController::new_shutdown_on_signal();
    tokio::select! {
        result = health::serve(metrics_address, liveness) => {
            if let Err(err) = result {
                tracing::error!(?err, "health/metrics server exited");
            }
        }
        _ = shutdown.wait() => {
            tracing::info!("shutdown signal received, draining background tasks");
        }
    }

    location_buffer.stop().await;
    Ok(())
}
