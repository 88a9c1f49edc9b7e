//! Shared-cell ping-pong on top of alternation.
//!
//! The cell's sign carries the message state:
//! - positive: P0 sent a value, P1 has not acknowledged it yet
//! - negative: P1 acknowledged, P0 has not picked it up yet
//!
//! No lock guards the cell. Only the alternation turn keeps the two sides
//! from touching it at the same time, so a wait that times out while the
//! peer still holds the turn breaks that guarantee.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::alternation::{Side, Turn, TurnAction};
use crate::scheduler::{Scheduler, SharedCell};
use crate::sink::OutputSink;

/// Observable step of the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// P0 found an acknowledged (negative) value.
    Received(i16),
    /// P0 published the next value.
    Sent(i16),
    /// P1 flipped a pending value negative.
    Acknowledged(i16),
}

impl fmt::Display for ExchangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeEvent::Received(value) => write!(f, "Received {}", value),
            ExchangeEvent::Sent(value) => write!(f, "Sending {}", value),
            ExchangeEvent::Acknowledged(value) => write!(f, "Acknowledged {}", value),
        }
    }
}

/// The two halves of the exchange over one cell.
#[derive(Debug, Clone)]
pub struct SharedCellExchange {
    cell: Arc<SharedCell>,
}

impl SharedCellExchange {
    pub fn new(cell: Arc<SharedCell>) -> Self {
        Self { cell }
    }

    pub fn value(&self) -> i16 {
        self.cell.get()
    }

    /// P0's step: pick up an acknowledged value, then send the next one.
    ///
    /// Magnitude grows by one per call; it wraps past `i16::MAX`.
    pub fn ping(&self) -> Vec<ExchangeEvent> {
        let mut events = Vec::with_capacity(2);
        let mut value = self.cell.get();
        if value < 0 {
            events.push(ExchangeEvent::Received(value));
            value = value.wrapping_neg();
            self.cell.set(value);
        }
        value = value.wrapping_add(1);
        self.cell.set(value);
        events.push(ExchangeEvent::Sent(value));
        events
    }

    /// P1's step: acknowledge a pending value by negating it.
    pub fn pong(&self) -> Option<ExchangeEvent> {
        let value = self.cell.get();
        if value > 0 {
            let acknowledged = value.wrapping_neg();
            self.cell.set(acknowledged);
            Some(ExchangeEvent::Acknowledged(acknowledged))
        } else {
            None
        }
    }
}

/// Turn action driving the exchange for one participant.
///
/// P0's events go to the sink; P1's acknowledgement is only traced.
pub struct ExchangeTurn {
    exchange: SharedCellExchange,
    sink: Arc<dyn OutputSink>,
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
}

impl ExchangeTurn {
    pub fn new(
        exchange: SharedCellExchange,
        sink: Arc<dyn OutputSink>,
        scheduler: Arc<dyn Scheduler>,
        delay: Duration,
    ) -> Self {
        Self {
            exchange,
            sink,
            scheduler,
            delay,
        }
    }
}

#[async_trait]
impl TurnAction for ExchangeTurn {
    async fn act(&self, turn: &Turn) {
        match turn.side {
            Side::P0 => {
                for event in self.exchange.ping() {
                    self.sink.write_line(&event.to_string());
                }
            }
            Side::P1 => {
                if let Some(event) = self.exchange.pong() {
                    debug!(round = turn.round, %event, "Cell acknowledged");
                }
            }
        }
        if !self.delay.is_zero() {
            self.scheduler.delay(self.delay).await;
        }
    }
}
