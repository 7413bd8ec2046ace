//! Fallback classification through an external text oracle.
//!
//! When the extension table has no entry for a file, the pipeline asks an
//! [`Oracle`] (an LLM behind some HTTP API) to pick a label from a closed set.
//! The free-text reply is normalized into a [`Category`] token. Errors are
//! returned to the caller untouched; deciding between falling back and
//! aborting is the pipeline's job.

use crate::file_category::{Category, ORACLE_LABELS};
use thiserror::Error;
use tracing::debug;

/// Errors raised while talking to the oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    /// No usable backend (missing API key, provider disabled).
    #[error("oracle is not configured: {reason}")]
    NotConfigured { reason: String },
    /// The request never produced an HTTP response.
    #[error("could not reach oracle at {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    /// The service answered with a non-success status.
    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The response body did not contain any text.
    #[error("malformed oracle response: {reason}")]
    MalformedResponse { reason: String },
}

/// A prompt/response text service.
///
/// Implementations block until the service answers or fails; there is no
/// cancellation once a call is issued.
pub trait Oracle {
    /// Sends `prompt` and returns the raw text reply.
    fn complete(&self, prompt: &str) -> Result<String, OracleError>;

    /// Short name used in diagnostics.
    fn name(&self) -> &str {
        "oracle"
    }
}

/// Oracle that fails every call. Used when no backend is configured so the
/// pipeline's failure policy still applies.
#[derive(Debug, Clone)]
pub struct UnavailableOracle {
    reason: String,
}

impl UnavailableOracle {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Oracle for UnavailableOracle {
    fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
        Err(OracleError::NotConfigured {
            reason: self.reason.clone(),
        })
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// Builds the instruction sent for a single file name.
///
/// # Examples
///
/// ```
/// use classifile::oracle::classification_prompt;
///
/// let prompt = classification_prompt("scene.blend");
/// assert!(prompt.contains("scene.blend"));
/// assert!(prompt.contains("images, documents, data, videos, audio, archives, code, others"));
/// ```
pub fn classification_prompt(file_name: &str) -> String {
    format!(
        "Return ONLY one single-word category for this file: {}. Options: {}. \
         Respond with ONLY the category.",
        file_name,
        ORACLE_LABELS.join(", ")
    )
}

/// Classifies file names the extension table does not know.
pub struct OracleClassifier {
    oracle: Box<dyn Oracle>,
}

impl OracleClassifier {
    pub fn new(oracle: Box<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Name of the wrapped backend.
    pub fn backend(&self) -> &str {
        self.oracle.name()
    }

    /// Asks the oracle for a label and normalizes the reply.
    ///
    /// An empty or fully-stripped reply becomes `others`. Transport and
    /// service errors are propagated.
    pub fn classify(&self, file_name: &str) -> Result<Category, OracleError> {
        let prompt = classification_prompt(file_name);
        debug!(backend = self.oracle.name(), file = file_name, "querying oracle");

        let reply = self.oracle.complete(&prompt)?;
        let category = Category::normalize(&reply);

        if !category.is_oracle_label() {
            debug!(
                file = file_name,
                reply = reply.as_str(),
                category = category.as_str(),
                "oracle answered outside the offered labels"
            );
        }
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct ScriptedOracle {
        reply: Result<String, u16>,
        prompts: Rc<RefCell<Vec<String>>>,
    }

    impl Oracle for ScriptedOracle {
        fn complete(&self, prompt: &str) -> Result<String, OracleError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(OracleError::Status {
                    status: *status,
                    body: "quota exceeded".to_string(),
                }),
            }
        }
    }

    fn classifier(reply: Result<&str, u16>) -> (OracleClassifier, Rc<RefCell<Vec<String>>>) {
        let prompts = Rc::new(RefCell::new(Vec::new()));
        let oracle = ScriptedOracle {
            reply: reply.map(str::to_string),
            prompts: Rc::clone(&prompts),
        };
        (OracleClassifier::new(Box::new(oracle)), prompts)
    }

    #[test]
    fn test_classify_normalizes_reply() {
        let (classifier, prompts) = classifier(Ok("  Images\n"));
        let category = classifier.classify("scan.heic").unwrap();
        assert_eq!(category.as_str(), "images");
        assert_eq!(prompts.borrow().len(), 1);
        assert!(prompts.borrow()[0].contains("scan.heic"));
    }

    #[test]
    fn test_classify_empty_reply_defaults_to_others() {
        let (classifier, _) = classifier(Ok("  \n"));
        assert_eq!(classifier.classify("mystery").unwrap().as_str(), "others");
    }

    #[test]
    fn test_classify_keeps_sanitized_unknown_label() {
        let (classifier, _) = classifier(Ok("3D-Models."));
        assert_eq!(classifier.classify("scene.blend").unwrap().as_str(), "3d-models");
    }

    #[test]
    fn test_classify_propagates_errors() {
        let (classifier, _) = classifier(Err(429));
        let err = classifier.classify("scene.blend").unwrap_err();
        assert!(matches!(err, OracleError::Status { status: 429, .. }));
    }

    #[test]
    fn test_unavailable_oracle_always_fails() {
        let classifier = OracleClassifier::new(Box::new(UnavailableOracle::new("no key")));
        assert_eq!(classifier.backend(), "unavailable");
        let err = classifier.classify("x.unknown").unwrap_err();
        assert!(matches!(err, OracleError::NotConfigured { .. }));
        assert!(err.to_string().contains("no key"));
    }
}
