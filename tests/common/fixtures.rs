//! Fixtures: configs, registries and mock HTTP routes

use media_dumper::source::MemorySource;
use media_dumper::storage::LocalStorageProvider;
use media_dumper::{AlbumDescriptor, Config, MediaItem, ProviderRegistry};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config with a short retry schedule so failure paths finish quickly
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.pipeline.workers = 4;
    config.pipeline.shutdown_timeout = Duration::from_secs(5);
    config.retry.schedule = vec![Duration::from_millis(10); 3];
    config.metadata.enabled = false;
    config
}

/// The "Trip" album
pub fn trip_album() -> AlbumDescriptor {
    AlbumDescriptor {
        id: "1".to_string(),
        title: "Trip".to_string(),
        ..Default::default()
    }
}

/// An item of the "Trip" album with a single candidate URL
pub fn trip_item(url: &str, source_url: &str) -> MediaItem {
    MediaItem::new(vec![url.to_string()], "Trip", "", source_url)
}

/// Registry with local storage and a "mock" source serving one album
pub fn registry_with_album(config: &Config, items: Vec<MediaItem>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.add_storage(LocalStorageProvider::new(config.clone()));
    registry.register_source("mock", move |_credentials| {
        Ok(Arc::new(
            MemorySource::new().with_album(trip_album(), items.clone()),
        ))
    });
    registry
}

/// Mount a GET route returning `body` with status 200
pub async fn serve(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Mount a GET route returning `status` with an empty body
pub async fn serve_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
