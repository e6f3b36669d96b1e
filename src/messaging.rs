//! Domain event publishing over NATS.
//!
//! Publishing is best effort: the database is the source of truth, so a
//! failed publish is logged and the request carries on.

use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    client: Option<async_nats::Client>,
}

impl EventPublisher {
    #[must_use]
    pub const fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    /// Publisher that drops every event (no `NATS_URL` configured).
    #[must_use]
    pub const fn disabled() -> Self {
        Self { client: None }
    }

    /// Connects when a URL is given. A failed connection disables publishing.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else { return Self::disabled() };
        match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(%url, "Connected to NATS");
                Self::new(Some(client))
            }
            Err(e) => {
                warn!(%url, error = %e, "NATS unavailable, domain events will not be published");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool { self.client.is_some() }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.client else { return };
        for event in events {
            let subject = event.subject();
            let payload = match serde_json::to_vec(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(%subject, error = %e, "Failed to encode domain event");
                    continue;
                }
            };
            match client.publish(subject.clone(), payload.into()).await {
                Ok(()) => debug!(%subject, "Published domain event"),
                Err(e) => warn!(%subject, error = %e, "Failed to publish domain event"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use crate::domain::events::OrderEvent;

    #[tokio::test]
    async fn test_disabled_publisher_drops_events() {
        let publisher = EventPublisher::connect(None).await;
        assert!(!publisher.is_enabled());
        publisher.publish_all(vec![DomainEvent::Order(OrderEvent::Delivered { order_id: Uuid::nil() })]).await;
    }
}
