//! Event channel between instrument worker threads and async callers
//!
//! The scan stepper and the hot-plug watcher run on dedicated OS threads.
//! They publish [`ControllerEvent`]s without blocking; async code consumes
//! them through an [`EventReceiver`].

use async_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::{trace, warn};

/// Capacity of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications published by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// The instrument was opened
    Connected,

    /// The instrument was closed or a command write failed
    Disconnected,

    /// A matching device appeared on the bus
    InstrumentArrived { bus_number: u8, device_address: u8 },

    /// A matching device was unplugged
    InstrumentLeft { bus_number: u8, device_address: u8 },

    /// An ADC transaction completed for a commanded step
    MeasurementReady {
        /// Step the reading belongs to
        step: u32,
        /// Magnitude ADC value
        magnitude: u32,
        /// Phase ADC value
        phase: u32,
    },

    /// An ADC transaction failed or returned the wrong number of bytes
    ///
    /// The scan keeps running; no reading is published for `step`.
    AdcFault {
        /// Step whose reading was lost
        step: u32,
        /// Human readable cause
        reason: String,
    },

    /// The stepping loop stopped on its own because of a fault
    ScanHalted {
        /// Step that was being commanded
        step: u32,
        /// Human readable cause
        reason: String,
    },
}

/// Publishing end, cloned into every worker thread
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<ControllerEvent>,
}

impl EventSender {
    /// Publish an event without blocking
    ///
    /// Events are dropped when the channel is full or every receiver is gone.
    pub fn publish(&self, event: ControllerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Event channel full, dropping {:?}", event);
            }
            Err(TrySendError::Closed(event)) => {
                trace!("No event listeners, dropping {:?}", event);
            }
        }
    }
}

/// Consuming end for async (or blocking) callers
#[derive(Debug, Clone)]
pub struct EventReceiver {
    rx: Receiver<ControllerEvent>,
}

impl EventReceiver {
    /// Wait for the next event
    pub async fn recv(&self) -> crate::Result<ControllerEvent> {
        self.rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Wait for the next event from a non-async thread
    pub fn recv_blocking(&self) -> crate::Result<ControllerEvent> {
        self.rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Take an event if one is queued
    pub fn try_recv(&self) -> Option<ControllerEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain every queued event
    pub fn drain(&self) -> Vec<ControllerEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Create the event channel
///
/// Returns (EventSender for workers, EventReceiver for callers)
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
    (EventSender { tx }, EventReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_crosses_threads() {
        let (tx, rx) = create_event_channel();

        let handle = std::thread::spawn(move || {
            tx.publish(ControllerEvent::MeasurementReady {
                step: 3,
                magnitude: 10,
                phase: 20,
            });
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            ControllerEvent::MeasurementReady {
                step: 3,
                magnitude: 10,
                phase: 20
            }
        );
        handle.join().unwrap();
    }

    #[test]
    fn test_publish_without_listener_does_not_block() {
        let (tx, rx) = create_event_channel();
        drop(rx);
        tx.publish(ControllerEvent::Connected);
    }
}
