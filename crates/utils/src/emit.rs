// This file is part of Poolsync.
//
// Poolsync is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Poolsync is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Poolsync.
// If not, see https://www.gnu.org/licenses/.

//! Utilities for emitting/collecting events from runtime components

use std::fmt::Display;

use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{info, warn};

/// Capacity of the event channels.
/// Events are small (ids and short reasons), but a single pass over a large
/// mempool can emit one per transaction, so leave room for bursts.
pub const EVENT_CHANNEL_CAPACITY: usize = 10_000;

/// Receive events from a event broadcast channel and call
/// the given handler function for each event.
pub fn receive_events<T>(
    description: &'static str,
    mut rx: broadcast::Receiver<T>,
    mut handler: impl FnMut(T) + Send + 'static,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => handler(event),
                Err(RecvError::Closed) => {
                    info!("Event stream for {description} closed. Logging complete");
                    break;
                }
                Err(RecvError::Lagged(count)) => {
                    warn!("Event stream for {description} lagged. Missed {count} messages.")
                }
            }
        }
    })
}

/// An event handler that simply logs the event at an INFO level.
pub fn receive_and_log_events_with_filter<T>(
    rx: broadcast::Receiver<T>,
    filter: impl (Fn(&T) -> bool) + Send + 'static,
) -> JoinHandle<()>
where
    T: Clone + Display + Send + 'static,
{
    receive_events("logging", rx, move |event| {
        if filter(&event) {
            info!("{}", event);
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[tokio::test]
    async fn test_receive_events_until_closed() {
        let (tx, rx) = broadcast::channel::<u32>(8);
        let seen = Arc::new(Mutex::new(vec![]));
        let handle = receive_events("test", rx, {
            let seen = Arc::clone(&seen);
            move |event| seen.lock().unwrap().push(event)
        });

        tx.send(1).unwrap();
        tx.send(2).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
