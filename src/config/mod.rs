use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub markers: MarkerConfig,
    #[serde(default)]
    pub prober: ProberConfig,
    #[serde(default)]
    pub token_cache: TokenCacheConfig,
    #[serde(default)]
    pub token_endpoint: TokenEndpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bound on fetching the upstream manifest for the playlist endpoint
    #[serde(default = "default_upstream_timeout", with = "duration_serde::duration")]
    pub upstream_timeout: Duration,
}

/// Segment classifier tuning.
///
/// The weights and thresholds are empirical; none of them is an invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_primary_url_weight")]
    pub primary_url_weight: f64,
    #[serde(default = "default_secondary_url_weight")]
    pub secondary_url_weight: f64,
    #[serde(default = "default_ad_metadata_weight")]
    pub ad_metadata_weight: f64,
    #[serde(default = "default_discontinuity_weight")]
    pub discontinuity_weight: f64,
    #[serde(default = "default_cluster_weight")]
    pub cluster_weight: f64,
    #[serde(default = "default_strong_outlier_z")]
    pub strong_outlier_z: f64,
    #[serde(default = "default_strong_outlier_weight")]
    pub strong_outlier_weight: f64,
    #[serde(default = "default_mild_outlier_z")]
    pub mild_outlier_z: f64,
    #[serde(default = "default_mild_outlier_weight")]
    pub mild_outlier_weight: f64,
    /// Added to the standard deviation so uniform manifests do not divide by zero
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Scores at or above this drop the segment
    #[serde(default = "default_drop_threshold")]
    pub drop_threshold: f64,
    /// Scores at or above this (and below `drop_threshold`) are logged as suspicious
    #[serde(default = "default_suspicious_threshold")]
    pub suspicious_threshold: f64,
    #[serde(default = "default_primary_url_markers")]
    pub primary_url_markers: Vec<String>,
    #[serde(default = "default_secondary_url_markers")]
    pub secondary_url_markers: Vec<String>,
    #[serde(default = "default_duration_bands")]
    pub duration_bands: Vec<DurationBand>,
    #[serde(default)]
    pub clustering: ClusteringConfig,
}

/// Inclusive duration range (seconds) that adds `weight` to a segment's score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationBand {
    pub min: f64,
    pub max: f64,
    pub weight: f64,
}

impl DurationBand {
    pub fn contains(&self, duration: f64) -> bool {
        duration >= self.min && duration <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    #[serde(default = "default_cluster_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_cluster_min_duration")]
    pub min_duration: f64,
    /// Ad pods after a discontinuity are shorter and more uniform
    #[serde(default = "default_cluster_tolerance_discontinuity")]
    pub tolerance_with_discontinuity: f64,
    #[serde(default = "default_cluster_min_duration_discontinuity")]
    pub min_duration_with_discontinuity: f64,
    #[serde(default = "default_cluster_stddev_factor")]
    pub stddev_factor: f64,
    #[serde(default = "default_cluster_min_group_size")]
    pub min_group_size: usize,
}

/// What counts as an ad marker inside manifest text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// `CLASS` attribute values of date-range tags that open an ad block (case-insensitive)
    #[serde(default = "default_ad_classes")]
    pub ad_classes: Vec<String>,
    /// `ID` attribute prefixes of date-range tags that open an ad block
    #[serde(default = "default_ad_id_prefixes")]
    pub ad_id_prefixes: Vec<String>,
    /// Substrings that make any directive line ad-indicating
    #[serde(default = "default_ad_line_markers")]
    pub ad_line_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProberConfig {
    #[serde(default = "default_prober_enabled")]
    pub enabled: bool,
    #[serde(default = "default_probe_batch_size")]
    pub batch_size: usize,
    /// Per-candidate bound covering both the token and the manifest fetch
    #[serde(default = "default_probe_attempt_timeout", with = "duration_serde::duration")]
    pub attempt_timeout: Duration,
    /// Static presentation-context priority list
    #[serde(default = "default_player_types")]
    pub player_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCacheConfig {
    #[serde(default = "default_token_ttl", with = "duration_serde::duration")]
    pub ttl: Duration,
    /// Keys forced to `false` anywhere in a token payload
    #[serde(default = "default_force_false_keys")]
    pub force_false_keys: Vec<String>,
    /// Keys forced to `true` anywhere in a token payload
    #[serde(default = "default_force_true_keys")]
    pub force_true_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEndpointConfig {
    #[serde(default = "default_token_endpoint_url")]
    pub url: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_token_operation")]
    pub operation_name: String,
    #[serde(default = "default_persisted_query_hash")]
    pub persisted_query_hash: String,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS)
}

// Classifier defaults
fn default_primary_url_weight() -> f64 {
    DEFAULT_PRIMARY_URL_WEIGHT
}

fn default_secondary_url_weight() -> f64 {
    DEFAULT_SECONDARY_URL_WEIGHT
}

fn default_ad_metadata_weight() -> f64 {
    DEFAULT_AD_METADATA_WEIGHT
}

fn default_discontinuity_weight() -> f64 {
    DEFAULT_DISCONTINUITY_WEIGHT
}

fn default_cluster_weight() -> f64 {
    DEFAULT_CLUSTER_WEIGHT
}

fn default_strong_outlier_z() -> f64 {
    DEFAULT_STRONG_OUTLIER_Z
}

fn default_strong_outlier_weight() -> f64 {
    DEFAULT_STRONG_OUTLIER_WEIGHT
}

fn default_mild_outlier_z() -> f64 {
    DEFAULT_MILD_OUTLIER_Z
}

fn default_mild_outlier_weight() -> f64 {
    DEFAULT_MILD_OUTLIER_WEIGHT
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_drop_threshold() -> f64 {
    DEFAULT_DROP_THRESHOLD
}

fn default_suspicious_threshold() -> f64 {
    DEFAULT_SUSPICIOUS_THRESHOLD
}

fn default_primary_url_markers() -> Vec<String> {
    strings(DEFAULT_PRIMARY_URL_MARKERS)
}

fn default_secondary_url_markers() -> Vec<String> {
    strings(DEFAULT_SECONDARY_URL_MARKERS)
}

fn default_duration_bands() -> Vec<DurationBand> {
    DEFAULT_DURATION_BANDS
        .iter()
        .map(|&(min, max, weight)| DurationBand { min, max, weight })
        .collect()
}

// Clustering defaults
fn default_cluster_tolerance() -> f64 {
    DEFAULT_CLUSTER_TOLERANCE
}

fn default_cluster_min_duration() -> f64 {
    DEFAULT_CLUSTER_MIN_DURATION
}

fn default_cluster_tolerance_discontinuity() -> f64 {
    DEFAULT_CLUSTER_TOLERANCE_DISCONTINUITY
}

fn default_cluster_min_duration_discontinuity() -> f64 {
    DEFAULT_CLUSTER_MIN_DURATION_DISCONTINUITY
}

fn default_cluster_stddev_factor() -> f64 {
    DEFAULT_CLUSTER_STDDEV_FACTOR
}

fn default_cluster_min_group_size() -> usize {
    DEFAULT_CLUSTER_MIN_GROUP_SIZE
}

// Marker defaults
fn default_ad_classes() -> Vec<String> {
    strings(DEFAULT_AD_CLASSES)
}

fn default_ad_id_prefixes() -> Vec<String> {
    strings(DEFAULT_AD_ID_PREFIXES)
}

fn default_ad_line_markers() -> Vec<String> {
    strings(DEFAULT_AD_LINE_MARKERS)
}

// Prober defaults
fn default_prober_enabled() -> bool {
    DEFAULT_PROBER_ENABLED
}

fn default_probe_batch_size() -> usize {
    DEFAULT_PROBE_BATCH_SIZE
}

fn default_probe_attempt_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PROBE_ATTEMPT_TIMEOUT_SECS)
}

fn default_player_types() -> Vec<String> {
    strings(DEFAULT_PLAYER_TYPES)
}

// Token cache defaults
fn default_token_ttl() -> Duration {
    Duration::from_secs(DEFAULT_TOKEN_TTL_SECS)
}

fn default_force_false_keys() -> Vec<String> {
    strings(DEFAULT_FORCE_FALSE_KEYS)
}

fn default_force_true_keys() -> Vec<String> {
    strings(DEFAULT_FORCE_TRUE_KEYS)
}

// Token endpoint defaults
fn default_token_endpoint_url() -> String {
    DEFAULT_TOKEN_ENDPOINT_URL.to_string()
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_token_operation() -> String {
    DEFAULT_TOKEN_OPERATION.to_string()
}

fn default_persisted_query_hash() -> String {
    DEFAULT_PERSISTED_QUERY_HASH.to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream_timeout: default_upstream_timeout(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            primary_url_weight: default_primary_url_weight(),
            secondary_url_weight: default_secondary_url_weight(),
            ad_metadata_weight: default_ad_metadata_weight(),
            discontinuity_weight: default_discontinuity_weight(),
            cluster_weight: default_cluster_weight(),
            strong_outlier_z: default_strong_outlier_z(),
            strong_outlier_weight: default_strong_outlier_weight(),
            mild_outlier_z: default_mild_outlier_z(),
            mild_outlier_weight: default_mild_outlier_weight(),
            epsilon: default_epsilon(),
            drop_threshold: default_drop_threshold(),
            suspicious_threshold: default_suspicious_threshold(),
            primary_url_markers: default_primary_url_markers(),
            secondary_url_markers: default_secondary_url_markers(),
            duration_bands: default_duration_bands(),
            clustering: ClusteringConfig::default(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            tolerance: default_cluster_tolerance(),
            min_duration: default_cluster_min_duration(),
            tolerance_with_discontinuity: default_cluster_tolerance_discontinuity(),
            min_duration_with_discontinuity: default_cluster_min_duration_discontinuity(),
            stddev_factor: default_cluster_stddev_factor(),
            min_group_size: default_cluster_min_group_size(),
        }
    }
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            ad_classes: default_ad_classes(),
            ad_id_prefixes: default_ad_id_prefixes(),
            ad_line_markers: default_ad_line_markers(),
        }
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            enabled: default_prober_enabled(),
            batch_size: default_probe_batch_size(),
            attempt_timeout: default_probe_attempt_timeout(),
            player_types: default_player_types(),
        }
    }
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_token_ttl(),
            force_false_keys: default_force_false_keys(),
            force_true_keys: default_force_true_keys(),
        }
    }
}

impl Default for TokenEndpointConfig {
    fn default() -> Self {
        Self {
            url: default_token_endpoint_url(),
            client_id: default_client_id(),
            operation_name: default_token_operation(),
            persisted_query_hash: default_persisted_query_hash(),
        }
    }
}

impl ClassifierConfig {
    /// Reject threshold combinations that would make the decision bands meaningless
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.drop_threshold) {
            return Err(format!(
                "drop_threshold must be within [0, 1], got {}",
                self.drop_threshold
            ));
        }
        if self.suspicious_threshold > self.drop_threshold {
            return Err(format!(
                "suspicious_threshold ({}) must not exceed drop_threshold ({})",
                self.suspicious_threshold, self.drop_threshold
            ));
        }
        if self.epsilon <= 0.0 {
            return Err("epsilon must be positive".to_string());
        }
        if let Some(band) = self.duration_bands.iter().find(|b| b.min > b.max) {
            return Err(format!(
                "duration band {}..{} has min greater than max",
                band.min, band.max
            ));
        }
        Ok(())
    }
}

impl ProberConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("prober batch_size must be at least 1".to_string());
        }
        if self.attempt_timeout.is_zero() {
            return Err("prober attempt_timeout must be non-zero".to_string());
        }
        Ok(())
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let config = if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            toml::from_str(&contents)?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            default_config
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.classifier
            .validate()
            .and_then(|_| self.prober.validate())
            .map_err(|message| crate::errors::AppError::configuration(message).into())
    }
}
