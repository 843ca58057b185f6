//! The structured policy-configuration document.
//!
//! Stored as YAML, mutated only by shallow key-wise merge. Location lists
//! and the risk window fall back to defaults when absent; the four
//! thresholds are mandatory and their absence is a `ConfigMissingKey`,
//! never a guessed value.

use crate::lock::{CollectionLock, DEFAULT_LOCK_TIMEOUT};
use cordon_core::{CordonError, CordonResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const POLICY_FILE: &str = "policyConfiguration.yml";

/// Outcome of a policy update, reported back to the caller as a status
/// rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// Merge applied and persisted.
    Success,
    /// Document absent; nothing was written.
    Fail,
}

/// Country risk lists plus the elevated-risk time-of-day window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPolicy {
    /// Countries classified high risk.
    pub high_risk: Vec<String>,
    /// Countries classified medium risk.
    pub medium_risk: Vec<String>,
    /// Countries classified low risk.
    pub low_risk: Vec<String>,
    /// Window start, `HH:MM:SS`.
    pub period_start: String,
    /// Window end, `HH:MM:SS` (exclusive).
    pub period_end: String,
}

/// The four mandatory decision thresholds, each in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionThresholds {
    /// Minimum trust score for policy administrators.
    pub admin: f64,
    /// Minimum trust score for approvers.
    pub approver: f64,
    /// Minimum trust score for security viewers.
    pub security_viewer: f64,
    /// Minimum acceptable sign-in risk for anyone.
    pub sign_in_risk: f64,
}

/// Handle to the policy document inside a data directory.
#[derive(Debug)]
pub struct PolicyDocument {
    path: PathBuf,
    lock_timeout: Duration,
}

impl PolicyDocument {
    /// Bind the policy document inside `dir`.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(POLICY_FILE),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override the lock wait bound.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Seed the document wholesale. Used for initial provisioning and
    /// test setup; live updates go through [`PolicyDocument::update`].
    pub fn seed(&self, document: &serde_yaml::Mapping) -> CordonResult<()> {
        let _lock = CollectionLock::acquire(&self.path, "policy_configuration", self.lock_timeout)?;
        self.write_atomic(document)
    }

    /// Shallow key-wise merge of `partial` into the existing document.
    /// Unspecified keys retain their prior values. A missing document is
    /// a `Fail` status, not an error.
    pub fn update(&self, partial: &serde_yaml::Mapping) -> CordonResult<UpdateStatus> {
        let _lock = CollectionLock::acquire(&self.path, "policy_configuration", self.lock_timeout)?;
        let mut document = match self.load_unlocked()? {
            Some(document) => document,
            None => return Ok(UpdateStatus::Fail),
        };
        for (key, value) in partial {
            document.insert(key.clone(), value.clone());
        }
        self.write_atomic(&document)?;
        Ok(UpdateStatus::Success)
    }

    /// The location risk lists and window, with original defaults for
    /// absent keys.
    pub fn location_policy(&self) -> CordonResult<LocationPolicy> {
        let document = self.load_required()?;
        Ok(LocationPolicy {
            high_risk: string_list(&document, "highRiskLocations"),
            medium_risk: string_list(&document, "mediumRiskLocations"),
            low_risk: string_list(&document, "lowRiskLocations"),
            period_start: string_or(&document, "periodStartInput", "00:00:00"),
            period_end: string_or(&document, "periodEndInput", "06:00:00"),
        })
    }

    /// The four mandatory thresholds.
    pub fn thresholds(&self) -> CordonResult<DecisionThresholds> {
        let document = self.load_required()?;
        Ok(DecisionThresholds {
            admin: required_float(&document, "adminThreshold")?,
            approver: required_float(&document, "approverThreshold")?,
            security_viewer: required_float(&document, "securityViewerThreshold")?,
            sign_in_risk: required_float(&document, "signInRiskThreshold")?,
        })
    }

    fn load_required(&self) -> CordonResult<serde_yaml::Mapping> {
        let _lock = CollectionLock::acquire(&self.path, "policy_configuration", self.lock_timeout)?;
        self.load_unlocked()?
            .ok_or_else(|| CordonError::not_found("policy configuration document"))
    }

    fn load_unlocked(&self) -> CordonResult<Option<serde_yaml::Mapping>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let document = serde_yaml::from_slice(&bytes)
            .map_err(|e| CordonError::serialization(format!("policy configuration: {e}")))?;
        Ok(Some(document))
    }

    fn write_atomic(&self, document: &serde_yaml::Mapping) -> CordonResult<()> {
        let text = serde_yaml::to_string(document)
            .map_err(|e| CordonError::serialization(e.to_string()))?;
        let tmp = self.path.with_extension("yml.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn string_list(document: &serde_yaml::Mapping, key: &str) -> Vec<String> {
    document
        .get(key)
        .and_then(|v| v.as_sequence())
        .map(|seq| {
            seq.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn string_or(document: &serde_yaml::Mapping, key: &str, default: &str) -> String {
    document
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

/// Thresholds may be stored as numbers or numeric strings.
fn required_float(document: &serde_yaml::Mapping, key: &str) -> CordonResult<f64> {
    let value = document
        .get(key)
        .ok_or_else(|| CordonError::missing_key(key))?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| CordonError::missing_key(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
highRiskLocations: [KP, IR]
mediumRiskLocations: [RU]
lowRiskLocations: [GB, DE]
periodStartInput: "23:00:00"
periodEndInput: "05:00:00"
adminThreshold: 0.8
approverThreshold: 0.6
securityViewerThreshold: 0.4
signInRiskThreshold: "0.3"
"#;

    fn seeded(dir: &Path) -> PolicyDocument {
        let doc = PolicyDocument::new(dir).with_lock_timeout(Duration::from_secs(1));
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(DOC).unwrap();
        doc.seed(&mapping).unwrap();
        doc
    }

    #[test]
    fn thresholds_parse_numbers_and_numeric_strings() {
        let dir = tempfile::tempdir().unwrap();
        let thresholds = seeded(dir.path()).thresholds().unwrap();
        assert_eq!(thresholds.admin, 0.8);
        assert_eq!(thresholds.sign_in_risk, 0.3);
    }

    #[test]
    fn missing_threshold_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let doc = seeded(dir.path());
        let mut partial = serde_yaml::Mapping::new();
        partial.insert("adminThreshold".into(), serde_yaml::Value::Null);
        doc.update(&partial).unwrap();

        let err = doc.thresholds().unwrap_err();
        assert!(matches!(err, CordonError::ConfigMissingKey(key) if key == "adminThreshold"));
    }

    #[test]
    fn shallow_merge_preserves_unspecified_keys() {
        let dir = tempfile::tempdir().unwrap();
        let doc = seeded(dir.path());

        let mut partial = serde_yaml::Mapping::new();
        partial.insert("adminThreshold".into(), 0.9.into());
        assert_eq!(doc.update(&partial).unwrap(), UpdateStatus::Success);

        let thresholds = doc.thresholds().unwrap();
        assert_eq!(thresholds.admin, 0.9);
        assert_eq!(thresholds.approver, 0.6);
        let location = doc.location_policy().unwrap();
        assert_eq!(location.high_risk, vec!["KP", "IR"]);
        assert_eq!(location.period_end, "05:00:00");
    }

    #[test]
    fn update_of_missing_document_reports_fail() {
        let dir = tempfile::tempdir().unwrap();
        let doc = PolicyDocument::new(dir.path()).with_lock_timeout(Duration::from_secs(1));
        let mut partial = serde_yaml::Mapping::new();
        partial.insert("adminThreshold".into(), 0.9.into());
        assert_eq!(doc.update(&partial).unwrap(), UpdateStatus::Fail);
        assert!(!dir.path().join(POLICY_FILE).exists());
    }

    #[test]
    fn absent_window_keys_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let doc = PolicyDocument::new(dir.path()).with_lock_timeout(Duration::from_secs(1));
        let mut mapping = serde_yaml::Mapping::new();
        mapping.insert("adminThreshold".into(), 0.5.into());
        doc.seed(&mapping).unwrap();

        let location = doc.location_policy().unwrap();
        assert!(location.high_risk.is_empty());
        assert_eq!(location.period_start, "00:00:00");
        assert_eq!(location.period_end, "06:00:00");
    }
}
