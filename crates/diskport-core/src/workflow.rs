//! Declarative worker-VM workflows
//!
//! A [`Workflow`] is the JSON document handed to the external workflow engine: named
//! steps that create disks and instances, wait for serial-console signals and create
//! images, plus the dependency edges between them. This module owns the document model,
//! `${var}` substitution and graph validation. Running a workflow is delegated to a
//! [`WorkflowRunner`].

use crate::serial::SerialConsole;
use crate::types::{Disk, Image};
use crate::utils::{format_duration, parse_duration};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("Dependency cycle detected: {0}")]
    DependencyCycleDetected(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Missing required variable: {0}")]
    MissingVariable(String),

    #[error("Workflow execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Workflow was cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Executes workflows against the platform
///
/// Implementations stream every serial line they observe into `console` and must stop
/// promptly once `cancel` fires.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn run(
        &self,
        workflow: &Workflow,
        cancel: CancellationToken,
        console: Arc<SerialConsole>,
    ) -> Result<(), WorkflowError>;
}

/// Workflow variable, either a bare value or a detailed declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarSpec {
    Value(String),
    Declared {
        #[serde(rename = "Value", default)]
        value: String,
        #[serde(rename = "Required", default)]
        required: bool,
        #[serde(rename = "Description", default, skip_serializing_if = "String::is_empty")]
        description: String,
    },
}

impl VarSpec {
    pub fn value(&self) -> &str {
        match self {
            VarSpec::Value(value) => value,
            VarSpec::Declared { value, .. } => value,
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, VarSpec::Declared { required: true, .. })
    }
}

/// Disk declared by a `CreateDisks` step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDisk {
    #[serde(flatten)]
    pub disk: Disk,
    #[serde(rename = "NoCleanup", default, skip_serializing_if = "is_false")]
    pub no_cleanup: bool,
    #[serde(rename = "FallbackToPdStandard", default, skip_serializing_if = "is_false")]
    pub fallback_to_pd_standard: bool,
}

/// Disk attachment on a worker instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl AttachedDisk {
    pub fn read_write(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mode: None,
        }
    }

    pub fn read_only(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mode: Some("READ_ONLY".to_string()),
        }
    }
}

/// Worker instance declared by a `CreateInstances` step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    pub name: String,
    #[serde(default)]
    pub disks: Vec<AttachedDisk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(rename = "StartupScript", default, skip_serializing_if = "Option::is_none")]
    pub startup_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnetwork: Option<String>,
    #[serde(rename = "NoCleanup", default, skip_serializing_if = "is_false")]
    pub no_cleanup: bool,
}

/// Serial port patterns a `WaitForInstancesSignal` step watches for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SerialOutputSignal {
    pub port: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_match: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceSignal {
    pub name: String,
    pub serial_output: SerialOutputSignal,
}

/// Image declared by a `CreateImages` step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowImage {
    #[serde(flatten)]
    pub image: Image,
    #[serde(rename = "NoCleanup", default, skip_serializing_if = "is_false")]
    pub no_cleanup: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IncludeWorkflow {
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
}

/// One typed workflow step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowStep {
    CreateDisks(Vec<WorkflowDisk>),
    CreateInstances(Vec<WorkflowInstance>),
    WaitForInstancesSignal(Vec<InstanceSignal>),
    CreateImages(Vec<WorkflowImage>),
    DeleteResources(DeleteResources),
    IncludeWorkflow(IncludeWorkflow),
}

impl WorkflowStep {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowStep::CreateDisks(_) => "CreateDisks",
            WorkflowStep::CreateInstances(_) => "CreateInstances",
            WorkflowStep::WaitForInstancesSignal(_) => "WaitForInstancesSignal",
            WorkflowStep::CreateImages(_) => "CreateImages",
            WorkflowStep::DeleteResources(_) => "DeleteResources",
            WorkflowStep::IncludeWorkflow(_) => "IncludeWorkflow",
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Workflow document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Workflow {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, VarSpec>,
    #[serde(default)]
    pub steps: BTreeMap<String, WorkflowStep>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_location: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub force_cleanup_on_error: bool,
    /// File the workflow was loaded from; `IncludeWorkflow` paths resolve against it
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Workflow {
    /// Load a workflow definition from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut workflow: Workflow = serde_json::from_str(&contents)?;
        workflow.source_path = Some(path.to_path_buf());
        Ok(workflow)
    }

    /// Set a variable, keeping the declaration's flags when it was declared
    pub fn add_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        match self.vars.entry(name.into()) {
            std::collections::btree_map::Entry::Occupied(mut entry) => match entry.get_mut() {
                VarSpec::Value(existing) => *existing = value,
                VarSpec::Declared { value: existing, .. } => *existing = value,
            },
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(VarSpec::Value(value));
            }
        }
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(VarSpec::value)
    }

    /// Parsed `DefaultTimeout`
    pub fn timeout(&self) -> Option<Duration> {
        self.default_timeout.as_deref().and_then(parse_duration)
    }

    /// Resolve a path relative to the directory this workflow was loaded from
    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        match self.source_path.as_ref().and_then(|p| p.parent()) {
            Some(dir) => dir.join(relative),
            None => PathBuf::from(relative),
        }
    }

    /// Fail when an `IncludeWorkflow` step names a file that does not exist
    pub fn check_includes(&self) -> Result<(), WorkflowError> {
        for (name, step) in &self.steps {
            if let WorkflowStep::IncludeWorkflow(include) = step {
                let path = self.resolve_path(&include.path);
                if !path.is_file() {
                    return Err(WorkflowError::InvalidDefinition(format!(
                        "step '{}' includes missing workflow {}",
                        name,
                        path.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Replace `${name}` references in every step with variable values.
    ///
    /// `${NAME}`, `${PROJECT}` and `${ZONE}` resolve from the workflow itself. Unknown
    /// references are left for the engine.
    pub fn substitute(&mut self) -> Result<(), WorkflowError> {
        let mut values: HashMap<String, String> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.value().to_string()))
            .collect();
        values.insert("NAME".to_string(), self.name.clone());
        if let Some(project) = &self.project {
            values.insert("PROJECT".to_string(), project.clone());
        }
        if let Some(zone) = &self.zone {
            values.insert("ZONE".to_string(), zone.clone());
        }

        let mut steps = serde_json::to_value(&self.steps)?;
        substitute_value(&mut steps, &values);
        self.steps = serde_json::from_value(steps)?;
        Ok(())
    }

    /// Check the definition before it is handed to the engine
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::InvalidDefinition(
                "workflow name is required".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(WorkflowError::InvalidDefinition(format!(
                "workflow '{}' has no steps",
                self.name
            )));
        }
        if let Some(timeout) = &self.default_timeout {
            if parse_duration(timeout).is_none() {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "invalid DefaultTimeout '{}'",
                    timeout
                )));
            }
        }
        for (name, spec) in &self.vars {
            if spec.is_required() && spec.value().is_empty() {
                return Err(WorkflowError::MissingVariable(name.clone()));
            }
        }

        self.execution_order().map(|_| ())
    }

    /// Steps grouped into batches that may run concurrently, in dependency order
    pub fn execution_order(&self) -> Result<Vec<Vec<String>>, WorkflowError> {
        let graph = self.dependency_graph()?;

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        for step in self.steps.keys() {
            if !visited.contains(step.as_str())
                && has_cycle(step, &graph, &mut visited, &mut rec_stack)
            {
                return Err(WorkflowError::DependencyCycleDetected(format!(
                    "Dependency cycle detected involving step '{}'",
                    step
                )));
            }
        }

        let mut in_degree: HashMap<&str, usize> = graph
            .iter()
            .map(|(step, deps)| (*step, deps.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (step, deps) in &graph {
            for dep in deps {
                dependents.entry(*dep).or_default().push(*step);
            }
        }

        let mut queue: VecDeque<&str> = self
            .steps
            .keys()
            .map(String::as_str)
            .filter(|step| in_degree[step] == 0)
            .collect();
        let mut order = Vec::new();

        while !queue.is_empty() {
            let mut batch: Vec<&str> = queue.drain(..).collect();
            batch.sort_unstable();

            for step in &batch {
                for dependent in dependents.get(step).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
            order.push(batch.into_iter().map(str::to_string).collect::<Vec<_>>());
        }

        let processed: usize = order.iter().map(Vec::len).sum();
        if processed != self.steps.len() {
            return Err(WorkflowError::DependencyCycleDetected(
                "Unable to resolve all dependencies - cycle detected".to_string(),
            ));
        }

        Ok(order)
    }

    fn dependency_graph(&self) -> Result<HashMap<&str, Vec<&str>>, WorkflowError> {
        let mut graph: HashMap<&str, Vec<&str>> = self
            .steps
            .keys()
            .map(|step| (step.as_str(), Vec::new()))
            .collect();

        for (step, deps) in &self.dependencies {
            let Some(entry) = graph.get_mut(step.as_str()) else {
                return Err(WorkflowError::StepNotFound(format!(
                    "Dependencies declared for unknown step '{}'",
                    step
                )));
            };
            for dep in deps {
                if !self.steps.contains_key(dep) {
                    return Err(WorkflowError::StepNotFound(format!(
                        "Step '{}' depends on '{}' which doesn't exist",
                        step, dep
                    )));
                }
                entry.push(dep.as_str());
            }
        }

        Ok(graph)
    }
}

fn has_cycle<'a>(
    step: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
) -> bool {
    visited.insert(step);
    rec_stack.insert(step);

    if let Some(deps) = graph.get(step) {
        for &dep in deps {
            if !visited.contains(dep) {
                if has_cycle(dep, graph, visited, rec_stack) {
                    return true;
                }
            } else if rec_stack.contains(dep) {
                return true;
            }
        }
    }

    rec_stack.remove(step);
    false
}

fn substitute_value(value: &mut serde_json::Value, vars: &HashMap<String, String>) {
    match value {
        serde_json::Value::String(s) => {
            if s.contains("${") {
                *s = substitute_str(s, vars);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                substitute_value(item, vars);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values_mut() {
                substitute_value(item, vars);
            }
        }
        _ => {}
    }
}

fn substitute_str(input: &str, vars: &HashMap<String, String>) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match vars.get(name) {
                    Some(value) => output.push_str(value),
                    None => {
                        output.push_str("${");
                        output.push_str(name);
                        output.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}

/// Builder for programmatically assembled workflows
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            workflow: Workflow {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.workflow.project = Some(project.into());
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.workflow.zone = Some(zone.into());
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.workflow.default_timeout = Some(format_duration(timeout));
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.workflow.add_var(name, value);
        self
    }

    pub fn with_step(mut self, name: impl Into<String>, step: WorkflowStep) -> Self {
        self.workflow.steps.insert(name.into(), step);
        self
    }

    /// Declare that `step` runs after every step in `after`
    pub fn with_dependency(mut self, step: impl Into<String>, after: &[&str]) -> Self {
        self.workflow
            .dependencies
            .entry(step.into())
            .or_default()
            .extend(after.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.workflow.labels.extend(labels);
        self
    }

    pub fn force_cleanup_on_error(mut self, force: bool) -> Self {
        self.workflow.force_cleanup_on_error = force;
        self
    }

    /// Substitute variables and validate the assembled workflow
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let mut workflow = self.workflow;
        workflow.substitute()?;
        workflow.validate()?;
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn delete_step() -> WorkflowStep {
        WorkflowStep::DeleteResources(DeleteResources {
            disks: vec!["d".to_string()],
            ..Default::default()
        })
    }

    #[test]
    fn test_builder_orders_steps_by_dependencies() {
        let workflow = WorkflowBuilder::new("inflate")
            .with_step("setup-disks", delete_step())
            .with_step("inflate-instance", delete_step())
            .with_step("wait", delete_step())
            .with_step("cleanup", delete_step())
            .with_dependency("inflate-instance", &["setup-disks"])
            .with_dependency("wait", &["inflate-instance"])
            .with_dependency("cleanup", &["wait"])
            .build()
            .unwrap();

        let order = workflow.execution_order().unwrap();
        assert_eq!(
            order,
            vec![
                vec!["setup-disks".to_string()],
                vec!["inflate-instance".to_string()],
                vec!["wait".to_string()],
                vec!["cleanup".to_string()],
            ]
        );
    }

    #[test]
    fn test_independent_steps_share_a_batch() {
        let workflow = WorkflowBuilder::new("parallel")
            .with_step("b", delete_step())
            .with_step("a", delete_step())
            .with_step("c", delete_step())
            .with_dependency("c", &["a", "b"])
            .build()
            .unwrap();

        let order = workflow.execution_order().unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(order[1], vec!["c".to_string()]);
    }

    #[test]
    fn test_dependency_cycle_detection() {
        let result = WorkflowBuilder::new("cyclic")
            .with_step("a", delete_step())
            .with_step("b", delete_step())
            .with_dependency("a", &["b"])
            .with_dependency("b", &["a"])
            .build();

        assert!(matches!(
            result,
            Err(WorkflowError::DependencyCycleDetected(_))
        ));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let result = WorkflowBuilder::new("broken")
            .with_step("a", delete_step())
            .with_dependency("a", &["missing"])
            .build();

        match result {
            Err(WorkflowError::StepNotFound(msg)) => assert!(msg.contains("missing")),
            other => panic!("expected StepNotFound, got {:?}", other.map(|w| w.name)),
        }
    }

    #[test]
    fn test_empty_workflow_is_invalid() {
        let result = WorkflowBuilder::new("empty").build();
        assert!(matches!(result, Err(WorkflowError::InvalidDefinition(_))));
    }

    #[test]
    fn test_substitution_in_steps() {
        let workflow = WorkflowBuilder::new("subst")
            .with_zone("us-east1-b")
            .with_var("disk_name", "disk-123")
            .with_step(
                "create",
                WorkflowStep::CreateDisks(vec![WorkflowDisk {
                    disk: Disk {
                        name: "${disk_name}".to_string(),
                        source_image: Some("${source_image}".to_string()),
                        disk_type: Some("zones/${ZONE}/diskTypes/pd-ssd".to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                }]),
            )
            .build()
            .unwrap();

        let WorkflowStep::CreateDisks(disks) = &workflow.steps["create"] else {
            panic!("expected CreateDisks");
        };
        assert_eq!(disks[0].disk.name, "disk-123");
        // Unknown references stay for the engine
        assert_eq!(disks[0].disk.source_image.as_deref(), Some("${source_image}"));
        assert_eq!(
            disks[0].disk.disk_type.as_deref(),
            Some("zones/us-east1-b/diskTypes/pd-ssd")
        );
    }

    #[test]
    fn test_required_variable_must_be_set() {
        let json = r#"{
            "Name": "translate",
            "Vars": {
                "source_disk": {"Required": true, "Description": "disk to translate"},
                "install_gce_packages": "true"
            },
            "Steps": {"cleanup": {"DeleteResources": {"Disks": ["${source_disk}"]}}}
        }"#;
        let mut workflow: Workflow = serde_json::from_str(json).unwrap();
        assert!(matches!(
            workflow.validate(),
            Err(WorkflowError::MissingVariable(name)) if name == "source_disk"
        ));

        workflow.add_var("source_disk", "zones/z/disks/d");
        workflow.validate().unwrap();
        assert!(workflow.vars["source_disk"].is_required());
        assert_eq!(workflow.var("install_gce_packages"), Some("true"));
    }

    #[test]
    fn test_from_path_and_resolve_include() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("translate.wf.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "Name": "translate",
                "DefaultTimeout": "90m",
                "Steps": {{
                    "translate": {{"IncludeWorkflow": {{"Path": "./inner.wf.json"}}}},
                    "wait": {{"WaitForInstancesSignal": [{{
                        "Name": "inst",
                        "SerialOutput": {{"Port": 1, "SuccessMatch": "done", "FailureMatch": "failed"}}
                    }}]}}
                }},
                "Dependencies": {{"wait": ["translate"]}}
            }}"#
        )
        .unwrap();

        let workflow = Workflow::from_path(&path).unwrap();
        assert_eq!(workflow.name, "translate");
        assert_eq!(workflow.timeout(), Some(Duration::from_secs(90 * 60)));
        assert_eq!(workflow.steps["translate"].kind(), "IncludeWorkflow");
        assert_eq!(
            workflow.resolve_path("./inner.wf.json"),
            dir.path().join("./inner.wf.json")
        );
        workflow.validate().unwrap();

        let err = workflow.check_includes().unwrap_err();
        assert!(err.to_string().contains("includes missing workflow"), "{}", err);
        std::fs::write(dir.path().join("inner.wf.json"), "{}").unwrap();
        workflow.check_includes().unwrap();
    }

    #[test]
    fn test_step_serialization_shape() {
        let step = WorkflowStep::CreateInstances(vec![WorkflowInstance {
            name: "inst".to_string(),
            disks: vec![AttachedDisk::read_only("disk-1")],
            startup_script: Some("run.sh".to_string()),
            ..Default::default()
        }]);
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["CreateInstances"][0]["name"], "inst");
        assert_eq!(json["CreateInstances"][0]["disks"][0]["mode"], "READ_ONLY");
        assert_eq!(json["CreateInstances"][0]["StartupScript"], "run.sh");
        assert!(json["CreateInstances"][0].get("NoCleanup").is_none());
    }
}
