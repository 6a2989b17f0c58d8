//! Pre-flight validation
//!
//! Checks that run before any platform resource is created. A failing check stops the
//! import before inflation starts.

use crate::os_registry;
use async_trait::async_trait;
use diskport_import_types::{
    ComputeClient, ImportArguments, ImportError, ImportResult, ImportValidationRule,
    ValidationLevel, ValidationReport, ValidationResult,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

static IMAGE_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z](?:[-a-z0-9]{0,61}[a-z0-9])?$").expect("image name pattern is a valid regex")
});

/// Precondition check run by the importer before inflation
#[async_trait]
pub trait PreValidator: Send + Sync {
    async fn validate(&self, args: &ImportArguments) -> ImportResult<()>;
}

/// [`PreValidator`] backed by a list of validation rules
pub struct RulePreValidator {
    rules: Vec<Box<dyn ImportValidationRule>>,
}

impl RulePreValidator {
    pub fn new(rules: Vec<Box<dyn ImportValidationRule>>) -> Self {
        Self { rules }
    }

    /// Validator with every import rule
    pub fn with_default_rules(compute: Arc<dyn ComputeClient>) -> Self {
        Self::new(ImportValidationRules::all_rules(compute))
    }

    pub async fn report(&self, args: &ImportArguments) -> ValidationReport {
        let mut report = ValidationReport::new();
        for rule in &self.rules {
            report.add_result(rule.validate(args).await);
        }
        report
    }
}

#[async_trait]
impl PreValidator for RulePreValidator {
    async fn validate(&self, args: &ImportArguments) -> ImportResult<()> {
        let report = self.report(args).await;
        if report.can_proceed() {
            info!(
                "✅ Pre-flight validation passed ({} checks)",
                report.summary.total_count
            );
            return Ok(());
        }

        let message = report.failure_message();
        warn!("❌ Pre-flight validation failed: {}", message);
        Err(ImportError::Validation(message))
    }
}

/// Import validation rules
pub struct ImportValidationRules;

impl ImportValidationRules {
    /// Get all import validation rules
    pub fn all_rules(compute: Arc<dyn ComputeClient>) -> Vec<Box<dyn ImportValidationRule>> {
        vec![
            Box::new(ImageNameSyntaxRule),
            Box::new(ImageNameAvailableRule { compute }),
            Box::new(DataDiskExclusivityRule),
            Box::new(OsSupportedRule),
        ]
    }
}

/// Validate the image name against the platform's resource naming rules
struct ImageNameSyntaxRule;

#[async_trait]
impl ImportValidationRule for ImageNameSyntaxRule {
    fn rule_id(&self) -> &str {
        "image.name.syntax"
    }

    fn rule_name(&self) -> &str {
        "Image Name Syntax"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Critical
    }

    async fn validate(&self, args: &ImportArguments) -> ValidationResult {
        if args.image_name.is_empty() {
            return ValidationResult::fail(
                self,
                "No image name specified",
                "Specify the name of the image to create",
                &["image_name"],
            );
        }
        if !IMAGE_NAME_PATTERN.is_match(&args.image_name) {
            return ValidationResult::fail(
                self,
                format!("Invalid image name '{}'", args.image_name),
                "Use 1-63 lowercase letters, digits or hyphens, starting with a letter and not ending with a hyphen",
                &["image_name"],
            );
        }
        ValidationResult::pass(self, format!("Image name '{}' is valid", args.image_name))
    }
}

/// Validate that no image with the requested name exists yet
struct ImageNameAvailableRule {
    compute: Arc<dyn ComputeClient>,
}

#[async_trait]
impl ImportValidationRule for ImageNameAvailableRule {
    fn rule_id(&self) -> &str {
        "image.name.available"
    }

    fn rule_name(&self) -> &str {
        "Image Name Available"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Critical
    }

    async fn validate(&self, args: &ImportArguments) -> ValidationResult {
        if args.image_name.is_empty() {
            // Reported by the syntax rule
            return ValidationResult::pass(self, "No image name to check");
        }

        match self.compute.get_image(&args.project, &args.image_name).await {
            Err(e) if e.is_not_found() => ValidationResult::pass(
                self,
                format!("Image name '{}' is available", args.image_name),
            ),
            Ok(_) => ValidationResult::fail(
                self,
                format!(
                    "The image '{}' already exists in project '{}'",
                    args.image_name, args.project
                ),
                "Choose a different image name or delete the existing image",
                &["image_name"],
            ),
            Err(e) => ValidationResult::fail(
                self,
                format!("Unable to check whether image '{}' exists: {}", args.image_name, e),
                "Check that the project exists and the account can read its images",
                &["image_name", "project"],
            ),
        }
    }
}

/// Validate that a data-disk import carries no OS settings
struct DataDiskExclusivityRule;

#[async_trait]
impl ImportValidationRule for DataDiskExclusivityRule {
    fn rule_id(&self) -> &str {
        "import.data_disk.exclusive"
    }

    fn rule_name(&self) -> &str {
        "Data Disk Exclusivity"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Critical
    }

    async fn validate(&self, args: &ImportArguments) -> ValidationResult {
        if !args.data_disk {
            return ValidationResult::pass(self, "Not a data-disk import");
        }

        let mut conflicting = Vec::new();
        if !args.os.is_empty() {
            conflicting.push("os");
        }
        if !args.custom_workflow.is_empty() {
            conflicting.push("custom_workflow");
        }
        if conflicting.is_empty() {
            return ValidationResult::pass(self, "Data-disk import has no OS settings");
        }

        ValidationResult::fail(
            self,
            format!(
                "A data-disk import cannot specify {}",
                conflicting.join(" or ")
            ),
            "Remove the data-disk flag to import a bootable disk, or drop the OS settings",
            &conflicting,
        )
    }
}

/// Validate that an explicit OS hint is known
struct OsSupportedRule;

#[async_trait]
impl ImportValidationRule for OsSupportedRule {
    fn rule_id(&self) -> &str {
        "import.os.supported"
    }

    fn rule_name(&self) -> &str {
        "Operating System Supported"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Critical
    }

    async fn validate(&self, args: &ImportArguments) -> ValidationResult {
        if args.os.is_empty() || !args.custom_workflow.is_empty() {
            return ValidationResult::pass(self, "No OS hint to check");
        }
        if os_registry::lookup(&args.os).is_some() {
            return ValidationResult::pass(self, format!("OS '{}' is supported", args.os));
        }
        ValidationResult::fail(
            self,
            format!("os `{}` is invalid", args.os),
            format!("Allowed values: {}", os_registry::allowed_values()),
            &["os"],
        )
    }
}
