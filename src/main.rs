use couch::{ChangesQuery, Client, FeedState, Init, Seq};
use log::*;
use service::{config::Config, logging::Logger};

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    info!("Connecting to CouchApp at [{}]...", config.couch_url());

    let client = match Client::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build client: {e}");
            std::process::exit(1);
        }
    };

    let client = match client.init(config.auto_redirect).await {
        Ok(Init::Rewritten(client)) => client,
        Ok(Init::Ready(response)) if response.ok => client,
        Ok(Init::Ready(response)) => {
            error!(
                "CouchApp api not reachable: {} {}",
                response.status, response.status_text
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed to reach CouchApp: {e}");
            std::process::exit(1);
        }
    };

    let mut feed = client.changes(Seq::from(config.since.as_str()), ChangesQuery::new());
    feed.on_changes(|rows| {
        for row in rows {
            let seq = row.seq().map(|s| s.to_string()).unwrap_or_default();
            if row.is_deleted() {
                info!("[{seq}] deleted {}", row.id().unwrap_or("?"));
            } else {
                info!("[{seq}] changed {}", row.id().unwrap_or("?"));
            }
        }
    });
    feed.on_error(|e| error!("Change feed error: {e}"));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping change feed"),
        _ = feed.closed() => {}
    }
    feed.stop();
    feed.closed().await;

    match feed.last_seq() {
        Some(seq) => info!("Change feed ended in state {:?}, resume with --since {seq}", feed.state()),
        None => info!("Change feed ended in state {:?}", feed.state()),
    }
    if feed.state() == FeedState::Failed {
        std::process::exit(1);
    }
}
