//! Image classifier boundary.
//!
//! The model is an opaque external collaborator: all the core needs is a
//! ranked label/confidence list per image. Everything derived from it
//! (descriptions, image-vs-image comparison) is computed here from that list.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    /// Model confidence in [0, 1].
    pub confidence: f64,
}

pub trait ImageClassifier: Send + Sync {
    /// Ranked label guesses for an image, best first. Errors are transient
    /// (model load or inference failure); callers degrade to zero matches.
    fn classify(&self, image: &[u8]) -> anyhow::Result<Vec<Classification>>;

    /// Human-readable description from the top 1-3 labels.
    fn describe(&self, image: &[u8]) -> anyhow::Result<String> {
        Ok(describe_classifications(&self.classify(image)?))
    }

    /// Similarity of two images in [0, 1]. Classification failures degrade
    /// to 0 rather than erroring.
    fn compare_images(&self, a: &[u8], b: &[u8]) -> f64 {
        let (class_a, class_b) = match (self.classify(a), self.classify(b)) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(err), _) | (_, Err(err)) => {
                log::warn!("image comparison skipped, classification failed: {err:?}");
                return 0.0;
            }
        };
        compare_classifications(&class_a, &class_b)
    }
}

/// Description text built from the top 1-3 labels.
pub fn describe_classifications(classifications: &[Classification]) -> String {
    let Some(primary) = classifications.first() else {
        return "Unrecognized item".to_string();
    };

    let top: Vec<&Classification> = classifications.iter().take(3).collect();
    if top.len() == 1 {
        return format!("This appears to be a {}", primary.label.to_lowercase());
    }

    let secondary = top[1..]
        .iter()
        .map(|c| {
            format!(
                "{} ({}% confidence)",
                c.label.to_lowercase(),
                (c.confidence * 100.0).round()
            )
        })
        .collect::<Vec<_>>()
        .join(" or possibly a ");

    format!(
        "This appears to be a {} ({}% confidence), or possibly a {}",
        primary.label.to_lowercase(),
        (primary.confidence * 100.0).round(),
        secondary
    )
}

/// Image similarity from two ranked classification lists.
///
/// 0 if either list is empty. Equal top labels score
/// `0.8 + 0.2 * conf_a * conf_b`; otherwise every label shared anywhere
/// across the two full lists contributes `conf_a * conf_b * 0.5`. Capped
/// at 1.0.
pub fn compare_classifications(a: &[Classification], b: &[Classification]) -> f64 {
    let (Some(top_a), Some(top_b)) = (a.first(), b.first()) else {
        return 0.0;
    };

    let mut similarity = 0.0;

    if top_a.label == top_b.label {
        similarity = 0.8 + 0.2 * top_a.confidence * top_b.confidence;
    } else {
        for ca in a {
            for cb in b {
                if ca.label == cb.label {
                    similarity += ca.confidence * cb.confidence * 0.5;
                }
            }
        }
    }

    f64::min(similarity, 1.0)
}

/// Adapter for a hosted image-classification model behind an HTTP endpoint.
///
/// Expects the common inference response shape: a JSON array of
/// `{"label": ..., "score": ...}` objects, best first.
pub struct RemoteClassifier {
    config: ClassifierConfig,
    client: OnceCell<reqwest::blocking::Client>,
}

impl RemoteClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> anyhow::Result<&reqwest::blocking::Client> {
        self.client.get_or_try_init(|| {
            reqwest::blocking::Client::builder()
                .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
                .build()
                .map_err(Into::into)
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl ImageClassifier for RemoteClassifier {
    fn classify(&self, image: &[u8]) -> anyhow::Result<Vec<Classification>> {
        let content_type = infer::get(image)
            .map(|kind| kind.mime_type())
            .unwrap_or("application/octet-stream");

        let mut req = self
            .client()?
            .post(self.endpoint())
            .header("content-type", content_type)
            .body(image.to_vec());

        if let Ok(key) = std::env::var("FINDFUSE_CLASSIFIER_API_KEY") {
            req = req.bearer_auth(key);
        } else {
            log::warn!("FINDFUSE_CLASSIFIER_API_KEY is missing; using anonymous access (rate limits may apply)");
        }

        let resp = req.send()?.error_for_status()?;
        let raw: Vec<serde_json::Value> = resp.json()?;

        let classifications = raw
            .iter()
            .map(|entry| Classification {
                label: entry
                    .get("label")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                confidence: entry.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0),
            })
            .filter(|c| !c.label.is_empty())
            .collect();

        Ok(classifications)
    }
}
