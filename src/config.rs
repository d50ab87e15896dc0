// src/config.rs - YAML alarm-set configuration
//
// Declarative alternative to calling the builders directly: a YAML file
// describes a set of alarms over an existing address space, is validated
// up front, and instantiated in one pass.

use crate::builder::{AlarmOptions, AlarmVariant};
use crate::error::{ConditionError, Result};
use crate::limit::Limits;
use crate::node_id::NodeId;
use crate::registry::ConditionRegistry;
use crate::shelving::{MAX_SHELVE_MS, MIN_SHELVE_MS};
use crate::Alarm;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

fn default_namespace() -> u16 {
    1
}

/// Which alarm type a configured entry instantiates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKindConfig {
    /// Exclusive limit alarm
    ExclusiveLimit,
    /// Non-exclusive limit alarm
    NonExclusiveLimit,
    /// Exclusive deviation alarm (requires `setpoint`)
    ExclusiveDeviation,
    /// Non-exclusive deviation alarm (requires `setpoint`)
    NonExclusiveDeviation,
    /// Off-normal alarm (requires `normal_state`)
    OffNormal,
    /// Discrete alarm (requires `normal_state`)
    Discrete,
}

/// One configured alarm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Condition instance name, unique within the set
    pub name: String,
    /// Node the alarm is a condition of (must be an event source)
    pub source: NodeId,
    /// Monitored input variable
    pub input: NodeId,
    /// Alarm type
    pub kind: AlarmKindConfig,
    /// Namespace index for created nodes
    #[serde(default = "default_namespace")]
    pub namespace: u16,
    /// HighHigh threshold
    #[serde(default)]
    pub high_high_limit: Option<f64>,
    /// High threshold
    #[serde(default)]
    pub high_limit: Option<f64>,
    /// Low threshold
    #[serde(default)]
    pub low_limit: Option<f64>,
    /// LowLow threshold
    #[serde(default)]
    pub low_low_limit: Option<f64>,
    /// Monitored setpoint variable (deviation alarms)
    #[serde(default)]
    pub setpoint: Option<NodeId>,
    /// Normal-state reference variable (off-normal / discrete alarms)
    #[serde(default)]
    pub normal_state: Option<NodeId>,
    /// Upper bound for shelving requests, milliseconds
    #[serde(default)]
    pub max_time_shelved_ms: Option<u64>,
    /// Materialize ConfirmedState and the Confirm method
    #[serde(default)]
    pub confirmed_state: bool,
    /// Materialize SuppressedState
    #[serde(default)]
    pub suppressed_state: bool,
    /// Materialize the ShelvingState variables
    #[serde(default)]
    pub shelving_state: bool,
}

impl AlarmConfig {
    fn limits(&self) -> Limits {
        Limits {
            high_high: self.high_high_limit,
            high: self.high_limit,
            low: self.low_limit,
            low_low: self.low_low_limit,
        }
    }

    fn variant(&self) -> Result<AlarmVariant> {
        let needs_setpoint = || {
            self.setpoint.clone().ok_or_else(|| {
                ConditionError::Config(format!("alarm {}: deviation requires a setpoint", self.name))
            })
        };
        let needs_normal = || {
            self.normal_state.clone().ok_or_else(|| {
                ConditionError::Config(format!(
                    "alarm {}: off-normal requires a normal_state",
                    self.name
                ))
            })
        };
        Ok(match self.kind {
            AlarmKindConfig::ExclusiveLimit => AlarmVariant::ExclusiveLimit(self.limits()),
            AlarmKindConfig::NonExclusiveLimit => AlarmVariant::NonExclusiveLimit(self.limits()),
            AlarmKindConfig::ExclusiveDeviation => AlarmVariant::ExclusiveDeviation {
                limits: self.limits(),
                setpoint_node: needs_setpoint()?,
            },
            AlarmKindConfig::NonExclusiveDeviation => AlarmVariant::NonExclusiveDeviation {
                limits: self.limits(),
                setpoint_node: needs_setpoint()?,
            },
            AlarmKindConfig::OffNormal => AlarmVariant::OffNormal {
                normal_state: needs_normal()?,
            },
            AlarmKindConfig::Discrete => AlarmVariant::Discrete {
                normal_state: needs_normal()?,
            },
        })
    }

    fn options(&self) -> Result<AlarmOptions> {
        let mut options = AlarmOptions::new(
            self.name.clone(),
            self.source.clone(),
            self.input.clone(),
            self.variant()?,
        )
        .namespace(self.namespace);
        if self.confirmed_state {
            options = options.with_confirmed_state();
        }
        if self.suppressed_state {
            options = options.with_suppressed_state();
        }
        if self.shelving_state {
            options = options.with_shelving_state();
        }
        if let Some(max) = self.max_time_shelved_ms {
            options = options.max_time_shelved(max);
        }
        Ok(options)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConditionError::Config("alarm name must not be empty".into()));
        }
        let is_limit_kind = matches!(
            self.kind,
            AlarmKindConfig::ExclusiveLimit
                | AlarmKindConfig::NonExclusiveLimit
                | AlarmKindConfig::ExclusiveDeviation
                | AlarmKindConfig::NonExclusiveDeviation
        );
        if is_limit_kind && self.limits().is_empty() {
            return Err(ConditionError::Config(format!(
                "alarm {}: at least one limit must be configured",
                self.name
            )));
        }
        if let Some(max) = self.max_time_shelved_ms {
            if !(MIN_SHELVE_MS..=MAX_SHELVE_MS).contains(&max) {
                return Err(ConditionError::Config(format!(
                    "alarm {}: max_time_shelved_ms {} is outside [{}, {}]",
                    self.name, max, MIN_SHELVE_MS, MAX_SHELVE_MS
                )));
            }
        }
        // Deviation/off-normal reference requirements are checked by
        // variant() too; validate() surfaces them before instantiation.
        self.variant().map(|_| ())
    }
}

/// A declarative set of alarms
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionSetConfig {
    /// Alarms to instantiate
    #[serde(default)]
    pub alarms: Vec<AlarmConfig>,
}

impl ConditionSetConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Check the set for internal consistency (does not touch the address
    /// space; node existence is checked at instantiation)
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for alarm in &self.alarms {
            alarm.validate()?;
            if !names.insert(alarm.name.as_str()) {
                return Err(ConditionError::Config(format!(
                    "duplicate alarm name: {}",
                    alarm.name
                )));
            }
        }
        Ok(())
    }

    /// Instantiate every configured alarm
    pub fn instantiate_all(&self, registry: &ConditionRegistry) -> Result<Vec<Alarm>> {
        let mut alarms = Vec::with_capacity(self.alarms.len());
        for config in &self.alarms {
            alarms.push(config.options()?.instantiate(registry)?);
        }
        info!("instantiated {} configured alarms", alarms.len());
        Ok(alarms)
    }
}
