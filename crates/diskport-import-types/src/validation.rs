//! Pre-flight check results

use crate::args::ImportArguments;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of one rule against the import arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub rule_id: String,
    pub rule_name: String,
    pub level: ValidationLevel,
    pub passed: bool,
    pub message: String,
    /// What the user should change, for failed checks
    pub remediation: Option<String>,
    /// Import arguments at fault
    pub arguments: Vec<String>,
}

impl ValidationResult {
    pub fn pass(rule: &dyn ImportValidationRule, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule.rule_id().to_string(),
            rule_name: rule.rule_name().to_string(),
            level: rule.level(),
            passed: true,
            message: message.into(),
            remediation: None,
            arguments: Vec::new(),
        }
    }

    pub fn fail(
        rule: &dyn ImportValidationRule,
        message: impl Into<String>,
        remediation: impl Into<String>,
        arguments: &[&str],
    ) -> Self {
        Self {
            passed: false,
            remediation: Some(remediation.into()),
            arguments: arguments.iter().map(|s| s.to_string()).collect(),
            ..Self::pass(rule, message)
        }
    }
}

/// Severity of a failed check
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Info,
    /// Reported, does not block the import
    Warning,
    /// Blocks the import
    Error,
    /// Blocks the import; the platform would reject it anyway
    Critical,
}

/// Overall verdict, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationStatus {
    Passed,
    PassedWithWarnings,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_count: usize,
    pub passed_count: usize,
    pub failed_count: usize,
    pub info_count: usize,
    pub warning_count: usize,
    pub error_count: usize,
    pub critical_count: usize,
}

impl ValidationSummary {
    fn record(&mut self, result: &ValidationResult) {
        self.total_count += 1;
        if result.passed {
            self.passed_count += 1;
        } else {
            self.failed_count += 1;
        }
        match result.level {
            ValidationLevel::Info => self.info_count += 1,
            ValidationLevel::Warning => self.warning_count += 1,
            ValidationLevel::Error => self.error_count += 1,
            ValidationLevel::Critical => self.critical_count += 1,
        }
    }
}

/// Every rule result of one pre-flight run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub results: Vec<ValidationResult>,
    pub overall_status: ValidationStatus,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            overall_status: ValidationStatus::Passed,
            summary: ValidationSummary::default(),
        }
    }

    pub fn add_result(&mut self, result: ValidationResult) {
        self.summary.record(&result);
        if !result.passed {
            let status = if result.level >= ValidationLevel::Error {
                ValidationStatus::Failed
            } else {
                ValidationStatus::PassedWithWarnings
            };
            self.overall_status = self.overall_status.max(status);
        }
        self.results.push(result);
    }

    /// No blocking check failed
    pub fn can_proceed(&self) -> bool {
        self.overall_status != ValidationStatus::Failed
    }

    /// Blocking failures with their remediation, `; `-separated
    pub fn failure_message(&self) -> String {
        self.results
            .iter()
            .filter(|r| !r.passed && r.level >= ValidationLevel::Error)
            .map(|r| match &r.remediation {
                Some(remediation) => format!("{}: {} ({})", r.rule_name, r.message, remediation),
                None => format!("{}: {}", r.rule_name, r.message),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// One pre-flight check
#[async_trait]
pub trait ImportValidationRule: Send + Sync {
    fn rule_id(&self) -> &str;

    fn rule_name(&self) -> &str;

    /// Severity when the check fails
    fn level(&self) -> ValidationLevel;

    async fn validate(&self, args: &ImportArguments) -> ValidationResult;
}
