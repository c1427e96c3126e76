//! Background `ExpireStale` ticker (§4.2 "Expire sweep", §5 "long-running
//! background tasks ... each own a task").

use {crate::service::NegotiationService, std::sync::Arc, std::time::Duration, tracing::Instrument};

pub fn spawn(service: Arc<NegotiationService>, interval: Duration) {
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match service.expire_stale().await {
                    Ok(count) if count > 0 => {
                        tracing::info!(count, "expired stale negotiation sessions");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(?err, "negotiation expiry sweep failed");
                    }
                }
            }
        }
        .in_current_span(),
    );
}
