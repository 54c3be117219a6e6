pub mod http_client;
pub mod url;

pub use http_client::{HttpManifestFetcher, ManifestFetcher, build_client};
pub use url::UrlUtils;
