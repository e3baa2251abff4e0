//! YAML robot description: controller settings, joint topology and servo list.

use crate::config::{ActuatorOptions, BridgeOptions, ControllerOptions};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    Revolute,
    Prismatic,
    Continuous,
    Fixed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    /// rad/s
    #[serde(default)]
    pub velocity: Option<f64>,
    #[serde(default)]
    pub effort: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: JointKind,
    #[serde(default)]
    pub limits: Option<JointLimits>,
}

/// Lookup of joint configuration by name.
pub trait JointSource: Send + Sync {
    fn joint(&self, name: &str) -> Option<JointSpec>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotDescription {
    #[serde(default)]
    pub controller: ControllerOptions,
    #[serde(default)]
    pub bridge: BridgeOptions,
    #[serde(default)]
    pub joints: Vec<JointSpec>,
    #[serde(default)]
    pub servos: Vec<ActuatorOptions>,
}

impl RobotDescription {
    /// Reject duplicate joint names and servos sharing an id.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for j in &self.joints {
            if !names.insert(j.name.as_str()) {
                anyhow::bail!("duplicate joint: {}", j.name);
            }
        }
        let mut ids = HashSet::new();
        for s in &self.servos {
            if !ids.insert(s.device_id) {
                anyhow::bail!("servo id {} used more than once", s.device_id);
            }
        }
        Ok(())
    }
}

impl JointSource for RobotDescription {
    fn joint(&self, name: &str) -> Option<JointSpec> {
        self.joints.iter().find(|j| j.name == name).cloned()
    }
}

pub fn parse_description(raw: &str) -> anyhow::Result<RobotDescription> {
    let desc: RobotDescription = serde_yaml::from_str(raw).context("decoding robot description")?;
    desc.validate()?;
    Ok(desc)
}

pub fn load_description_file(path: impl AsRef<Path>) -> anyhow::Result<RobotDescription> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading robot description: {}", path.display()))?;
    parse_description(&raw).with_context(|| format!("loading {}", path.display()))
}
