// Testing Tools Library
//
// Live integration checks for the couch client, run against a real CouchApp.
// Currently includes:
// - feed-test-client: change feed, document and pagination scenarios

pub mod feed_watcher;
pub mod output;
pub mod scenarios;
