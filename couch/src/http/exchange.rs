use std::future::Future;

use async_trait::async_trait;

use super::{Request, Response};
use crate::error::Error;

/// Performs a single request/response exchange. No retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, Error>;
}

/// Why an exchange raced against a canceller did not produce a response.
#[derive(Debug)]
pub enum Aborted<R> {
    /// The canceller resolved first; carries whatever it resolved with.
    Cancelled(R),
    Failed(Error),
}

/// Runs `request` on `transport` unless `canceller` resolves first, in which
/// case the in-flight exchange is dropped (aborting the connection) and the
/// canceller's value is returned.
pub async fn exchange<R, C>(
    transport: &dyn Transport,
    request: &Request,
    canceller: C,
) -> Result<Response, Aborted<R>>
where
    C: Future<Output = R>,
{
    tokio::select! {
        biased;
        reason = canceller => Err(Aborted::Cancelled(reason)),
        result = transport.send(request) => result.map_err(Aborted::Failed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::testing::{Reply, ScriptedTransport};
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct Reason(&'static str);

    #[tokio::test]
    async fn test_completed_exchange_wins_over_pending_canceller() {
        let transport = ScriptedTransport::new([Reply::json(200, json!({"ok": true}))]);
        let request = Request::new(Method::Get, ["api"]);

        let result = exchange(&transport, &request, std::future::pending::<Reason>()).await;
        assert_eq!(result.unwrap().data, json!({"ok": true}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceller_value_is_returned_verbatim() {
        let transport = ScriptedTransport::new([Reply::Hang]);
        let request = Request::new(Method::Get, ["api"]);

        let canceller = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Reason("stop")
        };
        match exchange(&transport, &request, canceller).await {
            Err(Aborted::Cancelled(reason)) => assert_eq!(reason, Reason("stop")),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_a_cancellation() {
        let transport = ScriptedTransport::new([Reply::Fail]);
        let request = Request::new(Method::Get, ["api"]);

        match exchange(&transport, &request, std::future::pending::<Reason>()).await {
            Err(Aborted::Failed(err)) => assert!(err.is_network()),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
