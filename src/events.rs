use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the services after state changes commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartItemAdded {
        session_id: String,
        product_id: Uuid,
    },
    CartCleared {
        session_id: String,
    },

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),

    // Promo events
    PromoRedeemed {
        code: String,
        order_id: Uuid,
    },

    // Payment events
    CheckoutStarted {
        order_id: Uuid,
        session_id: String,
    },
    OrderPaid {
        order_id: Uuid,
        session_id: String,
    },
    PaymentFailed {
        order_id: Uuid,
        session_id: String,
    },

    // Inventory events
    StockAdjusted {
        product_id: Uuid,
        delta: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// State changes must not be rolled back because observers went away.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(?event, "Dropping event: {}", e);
        }
    }
}

/// Background consumer draining the event channel.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(%order_id, "event: order created");
            }
            Event::OrderPaid {
                order_id,
                session_id,
            } => {
                info!(%order_id, %session_id, "event: order paid");
            }
            Event::PaymentFailed {
                order_id,
                session_id,
            } => {
                warn!(%order_id, %session_id, "event: payment failed");
            }
            other => {
                info!(event = ?other, "event processed");
            }
        }
    }

    info!("Event channel closed; event processor stopping");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_does_not_error_on_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);
        drop(rx);

        // Must not panic or propagate the failure
        sender.send_or_log(Event::OrderCreated(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_round_trip_through_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        let order_id = Uuid::new_v4();
        sender
            .send(Event::OrderCreated(order_id))
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
