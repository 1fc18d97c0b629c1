use serde::{Deserialize, Serialize};

use crate::storage::{BackendLocal, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
/// Default hosted inference endpoint; any service speaking the common
/// `[{label, score}]` classification response works.
const DEFAULT_CLASSIFIER_ENDPOINT: &str = "https://api-inference.huggingface.co/models";
const DEFAULT_CLASSIFIER_MODEL: &str = "google/vit-base-patch16-224";
const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 30;

/// Configuration for the remote image classification adapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Enable or disable image analysis entirely.
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the inference endpoint.
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,

    /// Model identifier appended to the endpoint path.
    #[serde(default = "default_classifier_model")]
    pub model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: DEFAULT_CLASSIFIER_ENDPOINT.to_string(),
            model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            timeout_secs: DEFAULT_CLASSIFIER_TIMEOUT_SECS,
        }
    }
}

fn default_classifier_endpoint() -> String {
    DEFAULT_CLASSIFIER_ENDPOINT.to_string()
}

fn default_classifier_model() -> String {
    DEFAULT_CLASSIFIER_MODEL.to_string()
}

fn default_classifier_timeout_secs() -> u64 {
    DEFAULT_CLASSIFIER_TIMEOUT_SECS
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            classifier: ClassifierConfig::default(),
            base_path: String::new(),
        }
    }
}

/// Default data directory, `~/.local/share/findfuse` when a home directory
/// can be resolved.
pub fn default_data_dir() -> String {
    homedir::my_home()
        .ok()
        .flatten()
        .map(|home| home.join(".local/share/findfuse"))
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| ".findfuse".to_string())
}

impl Config {
    fn validate(&self) {
        if self.bind_addr.is_empty() {
            panic!("bind_addr must not be empty");
        }

        if self.classifier.enabled {
            if self.classifier.endpoint.is_empty() {
                panic!("classifier.endpoint must not be empty when classifier is enabled");
            }
            if self.classifier.model.is_empty() {
                panic!("classifier.model must not be empty when classifier is enabled");
            }
        }

        if self.classifier.timeout_secs == 0 {
            panic!("classifier.timeout_secs must be greater than 0");
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        let store = BackendLocal::new(base_path).expect("cannot create data directory");

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store
                .write(
                    CONFIG_FILE,
                    serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
                )
                .expect("cannot write default config");
        }

        let config_str = String::from_utf8(store.read(CONFIG_FILE).expect("cannot read config"))
            .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let store = BackendLocal::new(&self.base_path).expect("cannot create data directory");

        let config_str = serde_yml::to_string(&self).unwrap();
        store
            .write(CONFIG_FILE, config_str.as_bytes())
            .expect("cannot write config");
    }
}
