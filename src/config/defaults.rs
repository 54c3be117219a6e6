//! Configuration default values
//!
//! All tunable heuristics live here so they can be changed in one place and
//! overridden from the config file.

// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

// Classifier weights
pub const DEFAULT_PRIMARY_URL_WEIGHT: f64 = 0.6;
pub const DEFAULT_SECONDARY_URL_WEIGHT: f64 = 0.5;
pub const DEFAULT_AD_METADATA_WEIGHT: f64 = 0.35;
pub const DEFAULT_DISCONTINUITY_WEIGHT: f64 = 0.2;
pub const DEFAULT_CLUSTER_WEIGHT: f64 = 0.3;
pub const DEFAULT_STRONG_OUTLIER_Z: f64 = 2.0;
pub const DEFAULT_STRONG_OUTLIER_WEIGHT: f64 = 0.2;
pub const DEFAULT_MILD_OUTLIER_Z: f64 = 1.5;
pub const DEFAULT_MILD_OUTLIER_WEIGHT: f64 = 0.1;
pub const DEFAULT_EPSILON: f64 = 1e-6;

// Classifier decision thresholds
pub const DEFAULT_DROP_THRESHOLD: f64 = 0.5;
pub const DEFAULT_SUSPICIOUS_THRESHOLD: f64 = 0.3;

/// (min seconds, max seconds, weight), both ends inclusive
pub const DEFAULT_DURATION_BANDS: &[(f64, f64, f64)] =
    &[(29.0, 31.0, 0.45), (14.0, 16.0, 0.35), (5.0, 7.0, 0.25)];

pub const DEFAULT_PRIMARY_URL_MARKERS: &[&str] = &[
    "stitched-ad",
    "/ads/",
    "/adv/",
    "/ad/",
    "_ad_",
    "adsegment",
    "amazon-adsystem",
];

pub const DEFAULT_SECONDARY_URL_MARKERS: &[&str] = &[
    "doubleclick",
    "googlesyndication",
    "imasdk",
    "freewheel",
    "springserve",
    "adsystem",
];

// Duration clustering
pub const DEFAULT_CLUSTER_TOLERANCE: f64 = 1.0;
pub const DEFAULT_CLUSTER_MIN_DURATION: f64 = 10.0;
pub const DEFAULT_CLUSTER_TOLERANCE_DISCONTINUITY: f64 = 0.5;
pub const DEFAULT_CLUSTER_MIN_DURATION_DISCONTINUITY: f64 = 5.0;
pub const DEFAULT_CLUSTER_STDDEV_FACTOR: f64 = 0.5;
pub const DEFAULT_CLUSTER_MIN_GROUP_SIZE: usize = 2;

// Ad markers
pub const DEFAULT_AD_CLASSES: &[&str] = &[
    "ad",
    "ads",
    "twitch-stitched-ad",
    "twitch-maf-ad",
    "com.apple.hls.interstitial",
];
pub const DEFAULT_AD_ID_PREFIXES: &[&str] = &["stitched-ad"];
pub const DEFAULT_AD_LINE_MARKERS: &[&str] = &[
    "stitched-ad",
    "SCTE35",
    "X-TV-TWITCH-AD",
    "#EXT-X-CUE-OUT",
    "#EXT-X-CUE-IN",
];

// Prober defaults
pub const DEFAULT_PROBER_ENABLED: bool = true;
pub const DEFAULT_PROBE_BATCH_SIZE: usize = 3;
pub const DEFAULT_PROBE_ATTEMPT_TIMEOUT_SECS: u64 = 4;
pub const DEFAULT_PLAYER_TYPES: &[&str] = &["embed", "frontpage", "site", "mini", "embed-legacy"];

// Token cache defaults
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 45;
pub const DEFAULT_FORCE_FALSE_KEYS: &[&str] = &[
    "adsEnabled",
    "stitched",
    "show_ads",
    "surestream",
    "csai",
    "prerollEnabled",
    "midrollEnabled",
];
pub const DEFAULT_FORCE_TRUE_KEYS: &[&str] = &["disable_ads"];

// Token endpoint defaults
pub const DEFAULT_TOKEN_ENDPOINT_URL: &str = "https://gql.twitch.tv/gql";
pub const DEFAULT_CLIENT_ID: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";
pub const DEFAULT_TOKEN_OPERATION: &str = "PlaybackAccessToken";
pub const DEFAULT_PERSISTED_QUERY_HASH: &str =
    "ed230aa1e33e07eebb8928504583da78a5173989fadfb1ac94be06a04f3cdbe9";

// Engine context
pub const DEFAULT_LOG_RING_CAPACITY: usize = 50;
