//! Pull poller: the change feed over repeated longpoll requests.

use std::time::Duration;

use log::*;
use serde::Deserialize;

use super::sink::Sink;
use super::{ChangeRow, Exit, Seq};
use crate::http::{exchange, Aborted, Request, Transport};

pub(crate) const FEED_LONGPOLL: &str = "longpoll";

/// What the canceller of a longpoll exchange resolved with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Stopped,
    Watchdog,
}

#[derive(Debug, Deserialize)]
struct LongPollBatch {
    #[serde(default)]
    results: Vec<ChangeRow>,
    last_seq: Seq,
}

/// Polls until stopped or until an exchange genuinely fails.
///
/// Iterations are strictly sequential. Each one races the request against
/// `watchdog`; a request that stays silent that long is dropped and re-issued
/// with the same cursor, so a stalled connection costs time but no rows.
pub(crate) async fn poll(
    transport: &dyn Transport,
    template: &Request,
    watchdog: Duration,
    sink: &Sink,
) -> Exit {
    let mut cursor = sink.last_seq().unwrap_or_else(Seq::now);
    info!("Longpoll feed starting since {cursor}");

    loop {
        let request = template
            .clone()
            .with_query("feed", FEED_LONGPOLL)
            .with_query("since", cursor.to_query_value());

        let canceller = async {
            tokio::select! {
                biased;
                _ = sink.stopped() => Interrupt::Stopped,
                _ = tokio::time::sleep(watchdog) => Interrupt::Watchdog,
            }
        };

        match exchange(transport, &request, canceller).await {
            Ok(response) => match response.decode::<LongPollBatch>() {
                Ok(batch) => {
                    debug!(
                        "Longpoll returned {} rows, last_seq {}",
                        batch.results.len(),
                        batch.last_seq
                    );
                    sink.notify(batch.results);
                    sink.acknowledge(batch.last_seq.clone());
                    cursor = batch.last_seq;
                }
                Err(e) => return Exit::Failed(e),
            },
            Err(Aborted::Cancelled(Interrupt::Watchdog)) => {
                info!("No longpoll response within {watchdog:?}, reconnecting since {cursor}");
            }
            Err(Aborted::Cancelled(Interrupt::Stopped)) => {
                debug!("Longpoll feed stopped");
                return Exit::Stopped;
            }
            Err(Aborted::Failed(e)) => return Exit::Failed(e),
        }
    }
}
