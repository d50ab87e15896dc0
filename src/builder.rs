// src/builder.rs - Instantiation factories for conditions and alarms
//
// A condition is built in one shot: the options value fixes the variable
// schema, the address-space nodes and method bindings are created, initial
// branch-0 values are written through the live mirror, and the finished
// handle is registered for ConditionRefresh. There is no after-the-fact
// reclassification of an instance.

use crate::address_space::{AddressSpace, ReferenceKind};
use crate::alarm::{Alarm, AlarmInner, AlarmKind, LimitKind, OffNormalKind};
use crate::condition::{Condition, ConditionCore, ConditionInfo, ConditionInner};
use crate::error::{ConditionError, Result};
use crate::events::EventHub;
use crate::fields::{ConditionField, TwoState};
use crate::limit::{LimitFlags, Limits};
use crate::node_id::{well_known, NodeId};
use crate::registry::ConditionRegistry;
use crate::shelving::{Shelving, MAX_SHELVE_MS, MIN_SHELVE_MS};
use crate::snapshot::{ConditionSnapshot, Mirror, StateVarIds};
use crate::status::StatusCode;
use crate::variant::{LocalizedText, Variant, VariantKind};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::info;

/// Optional capabilities materialized at instantiation
#[derive(Debug, Clone, Copy, Default)]
pub struct Optionals {
    /// ConfirmedState and the Confirm method
    pub confirmed_state: bool,
    /// SuppressedState
    pub suppressed_state: bool,
    /// ShelvingState variables (always materialized when MaxTimeShelved
    /// is configured)
    pub shelving_state: bool,
}

/// Which evaluation drives an alarm
pub enum AlarmVariant {
    /// Mutually exclusive limit state, HighHigh > High and LowLow > Low
    ExclusiveLimit(Limits),
    /// Independent per-threshold booleans
    NonExclusiveLimit(Limits),
    /// Exclusive limits over input minus a monitored setpoint
    ExclusiveDeviation {
        /// Thresholds applied to the deviation
        limits: Limits,
        /// The monitored setpoint variable
        setpoint_node: NodeId,
    },
    /// Non-exclusive limits over input minus a monitored setpoint
    NonExclusiveDeviation {
        /// Thresholds applied to the deviation
        limits: Limits,
        /// The monitored setpoint variable
        setpoint_node: NodeId,
    },
    /// Active while the input differs from the normal-state variable
    OffNormal {
        /// The variable holding the "normal" value
        normal_state: NodeId,
    },
    /// Same evaluation as off-normal, typed as DiscreteAlarmType
    Discrete {
        /// The variable holding the "normal" value
        normal_state: NodeId,
    },
}

impl AlarmVariant {
    fn event_type(&self) -> NodeId {
        match self {
            AlarmVariant::ExclusiveLimit(_) => well_known::exclusive_limit_alarm_type(),
            AlarmVariant::NonExclusiveLimit(_) => well_known::non_exclusive_limit_alarm_type(),
            AlarmVariant::ExclusiveDeviation { .. } => well_known::exclusive_deviation_alarm_type(),
            AlarmVariant::NonExclusiveDeviation { .. } => {
                well_known::non_exclusive_deviation_alarm_type()
            }
            AlarmVariant::OffNormal { .. } => well_known::off_normal_alarm_type(),
            AlarmVariant::Discrete { .. } => well_known::discrete_alarm_type(),
        }
    }

    fn limits(&self) -> Option<&Limits> {
        match self {
            AlarmVariant::ExclusiveLimit(limits)
            | AlarmVariant::NonExclusiveLimit(limits)
            | AlarmVariant::ExclusiveDeviation { limits, .. }
            | AlarmVariant::NonExclusiveDeviation { limits, .. } => Some(limits),
            _ => None,
        }
    }

    fn is_exclusive(&self) -> bool {
        matches!(
            self,
            AlarmVariant::ExclusiveLimit(_) | AlarmVariant::ExclusiveDeviation { .. }
        )
    }

    fn setpoint_node(&self) -> Option<&NodeId> {
        match self {
            AlarmVariant::ExclusiveDeviation { setpoint_node, .. }
            | AlarmVariant::NonExclusiveDeviation { setpoint_node, .. } => Some(setpoint_node),
            _ => None,
        }
    }

    fn normal_state_node(&self) -> Option<&NodeId> {
        match self {
            AlarmVariant::OffNormal { normal_state } | AlarmVariant::Discrete { normal_state } => {
                Some(normal_state)
            }
            _ => None,
        }
    }
}

/// Options for a plain (acknowledgeable) condition
pub struct ConditionOptions {
    namespace: u16,
    name: String,
    condition_of: NodeId,
    acknowledgeable: bool,
    optionals: Optionals,
}

impl ConditionOptions {
    /// Condition named `name`, attached to the `condition_of` source node
    pub fn new(name: impl Into<String>, condition_of: NodeId) -> Self {
        Self {
            namespace: 1,
            name: name.into(),
            condition_of,
            acknowledgeable: true,
            optionals: Optionals::default(),
        }
    }

    /// Namespace index for the created nodes (default 1)
    pub fn namespace(mut self, namespace: u16) -> Self {
        self.namespace = namespace;
        self
    }

    /// Build a bare ConditionType instance without AckedState
    pub fn not_acknowledgeable(mut self) -> Self {
        self.acknowledgeable = false;
        self
    }

    /// Materialize ConfirmedState and the Confirm method
    pub fn with_confirmed_state(mut self) -> Self {
        self.optionals.confirmed_state = true;
        self
    }

    /// Create the condition in the registry's address space
    pub fn instantiate(self, registry: &ConditionRegistry) -> Result<Condition> {
        let space = registry.space().clone();
        validate_source(&space, &self.condition_of)?;

        let mut states = vec![TwoState::Enabled];
        if self.acknowledgeable {
            states.push(TwoState::Acked);
            if self.optionals.confirmed_state {
                states.push(TwoState::Confirmed);
            }
        }
        let event_type = if self.acknowledgeable {
            well_known::acknowledgeable_condition_type()
        } else {
            well_known::condition_type()
        };

        let scaffold = Scaffold::build(
            &space,
            self.namespace,
            &self.name,
            &self.condition_of,
            base_fields(),
            states,
        )?;
        let mut core = scaffold.into_core(&space, &self.name, event_type, &self.condition_of)?;
        if self.acknowledgeable {
            core.current.set_state(TwoState::Acked, true);
            if self.optionals.confirmed_state {
                core.current.set_state(TwoState::Confirmed, true);
            }
        }

        let node_id = core.node_id().clone();
        let inner = Arc::new(Mutex::new(ConditionInner {
            core,
            acknowledgeable: self.acknowledgeable,
        }));
        let condition = Condition {
            inner: inner.clone(),
        };
        bind_condition_methods(
            &space,
            self.namespace,
            &self.name,
            &node_id,
            &inner,
            self.acknowledgeable,
            self.optionals.confirmed_state,
        )?;
        registry.register_condition(condition.clone());
        info!("instantiated condition {} ({})", self.name, node_id);
        Ok(condition)
    }
}

/// Options for an alarm condition
pub struct AlarmOptions {
    namespace: u16,
    name: String,
    condition_of: NodeId,
    input_node: NodeId,
    variant: AlarmVariant,
    optionals: Optionals,
    max_time_shelved: Option<u64>,
}

impl AlarmOptions {
    /// Alarm named `name` on the `condition_of` source, evaluating
    /// `input_node` according to `variant`
    pub fn new(
        name: impl Into<String>,
        condition_of: NodeId,
        input_node: NodeId,
        variant: AlarmVariant,
    ) -> Self {
        Self {
            namespace: 1,
            name: name.into(),
            condition_of,
            input_node,
            variant,
            optionals: Optionals::default(),
            max_time_shelved: None,
        }
    }

    /// Namespace index for the created nodes (default 1)
    pub fn namespace(mut self, namespace: u16) -> Self {
        self.namespace = namespace;
        self
    }

    /// Materialize ConfirmedState and the Confirm method
    pub fn with_confirmed_state(mut self) -> Self {
        self.optionals.confirmed_state = true;
        self
    }

    /// Materialize SuppressedState
    pub fn with_suppressed_state(mut self) -> Self {
        self.optionals.suppressed_state = true;
        self
    }

    /// Materialize the ShelvingState variables
    pub fn with_shelving_state(mut self) -> Self {
        self.optionals.shelving_state = true;
        self
    }

    /// Upper bound for shelving requests, milliseconds. Implies the
    /// ShelvingState variables.
    pub fn max_time_shelved(mut self, milliseconds: u64) -> Self {
        self.max_time_shelved = Some(milliseconds);
        self.optionals.shelving_state = true;
        self
    }

    /// Create the alarm in the registry's address space and start
    /// monitoring its input
    pub fn instantiate(self, registry: &ConditionRegistry) -> Result<Alarm> {
        let space = registry.space().clone();
        validate_source(&space, &self.condition_of)?;
        self.validate_input(&space)?;

        let (fields, states) = self.schema();
        let scaffold = Scaffold::build(
            &space,
            self.namespace,
            &self.name,
            &self.condition_of,
            fields,
            states,
        )?;
        let mut core = scaffold.into_core(
            &space,
            &self.name,
            self.variant.event_type(),
            &self.condition_of,
        )?;
        core.current.set_state(TwoState::Acked, true);
        if self.optionals.confirmed_state {
            core.current.set_state(TwoState::Confirmed, true);
        }
        self.write_initial_values(&space, &mut core)?;

        let kind = self.build_kind(&space)?;
        let node_id = core.node_id().clone();
        let inner = Arc::new(Mutex::new(AlarmInner {
            base: core,
            kind,
            input_node: self.input_node.clone(),
            subscriptions: Vec::new(),
            shelving: Shelving::default(),
            max_time_shelved: self.max_time_shelved,
            last_info: ConditionInfo::default(),
            disposed: false,
        }));
        let alarm = Alarm {
            inner: inner.clone(),
        };

        self.subscribe_inputs(&space, &inner);
        bind_alarm_methods(
            &space,
            self.namespace,
            &self.name,
            &node_id,
            &inner,
            self.optionals.confirmed_state,
        )?;

        // Pick up an input that is already out of range.
        inner.lock().evaluate_from_space();

        registry.register_alarm(alarm.clone());
        info!("instantiated alarm {} ({})", self.name, node_id);
        Ok(alarm)
    }

    fn validate_input(&self, space: &AddressSpace) -> Result<()> {
        if !space.contains(&self.input_node) {
            return Err(ConditionError::NodeNotFound(self.input_node.to_string()));
        }
        // MaxTimeShelved is held to the same bounds as every shelving
        // request it will cap.
        if let Some(max) = self.max_time_shelved {
            if !(MIN_SHELVE_MS..=MAX_SHELVE_MS).contains(&max) {
                return Err(ConditionError::Config(format!(
                    "alarm {}: MaxTimeShelved {} ms is outside [{}, {}]",
                    self.name, max, MIN_SHELVE_MS, MAX_SHELVE_MS
                )));
            }
        }
        if let Some(limits) = self.variant.limits() {
            if limits.is_empty() {
                return Err(ConditionError::Config(format!(
                    "alarm {}: at least one limit must be configured",
                    self.name
                )));
            }
            let data_type = space
                .data_type(&self.input_node)
                .unwrap_or(VariantKind::Any);
            if data_type != VariantKind::Any && !data_type.is_numeric() {
                return Err(ConditionError::Config(format!(
                    "alarm {}: input variable {} is not numeric",
                    self.name, self.input_node
                )));
            }
        }
        if let Some(setpoint) = self.variant.setpoint_node() {
            if !space.contains(setpoint) {
                return Err(ConditionError::NodeNotFound(setpoint.to_string()));
            }
        }
        if let Some(normal) = self.variant.normal_state_node() {
            if !space.contains(normal) {
                return Err(ConditionError::NodeNotFound(normal.to_string()));
            }
        }
        Ok(())
    }

    fn schema(&self) -> (Vec<ConditionField>, Vec<TwoState>) {
        let mut fields = base_fields();
        fields.push(ConditionField::SuppressedOrShelved);
        fields.push(ConditionField::InputNode);

        let mut states = vec![TwoState::Enabled, TwoState::Acked, TwoState::Active];
        if self.optionals.confirmed_state {
            states.push(TwoState::Confirmed);
        }
        if self.optionals.suppressed_state {
            states.push(TwoState::Suppressed);
        }
        if self.optionals.shelving_state {
            fields.push(ConditionField::ShelvingStateCurrent);
            fields.push(ConditionField::UnshelveTime);
        }
        if self.max_time_shelved.is_some() {
            fields.push(ConditionField::MaxTimeShelved);
        }

        if let Some(limits) = self.variant.limits() {
            for (field, configured) in [
                (ConditionField::HighHighLimit, limits.high_high),
                (ConditionField::HighLimit, limits.high),
                (ConditionField::LowLimit, limits.low),
                (ConditionField::LowLowLimit, limits.low_low),
            ] {
                if configured.is_some() {
                    fields.push(field);
                }
            }
            if self.variant.is_exclusive() {
                fields.push(ConditionField::LimitStateCurrent);
            } else {
                for (state, configured) in [
                    (TwoState::HighHigh, limits.high_high),
                    (TwoState::High, limits.high),
                    (TwoState::Low, limits.low),
                    (TwoState::LowLow, limits.low_low),
                ] {
                    if configured.is_some() {
                        states.push(state);
                    }
                }
            }
        }
        if self.variant.setpoint_node().is_some() {
            fields.push(ConditionField::SetpointNode);
        }
        if self.variant.normal_state_node().is_some() {
            fields.push(ConditionField::NormalState);
        }
        (fields, states)
    }

    fn write_initial_values(&self, _space: &AddressSpace, core: &mut ConditionCore) -> Result<()> {
        core.current.set_value(
            ConditionField::InputNode,
            Variant::NodeId(self.input_node.clone()),
        );
        core.current
            .set_value(ConditionField::SuppressedOrShelved, Variant::Bool(false));
        if self.optionals.shelving_state {
            core.current.set_value(
                ConditionField::ShelvingStateCurrent,
                Variant::LocalizedText(LocalizedText::english("Unshelved")),
            );
        }
        if let Some(max) = self.max_time_shelved {
            core.current
                .set_value(ConditionField::MaxTimeShelved, Variant::Float(max as f64));
        }
        if let Some(limits) = self.variant.limits() {
            for (field, configured) in [
                (ConditionField::HighHighLimit, limits.high_high),
                (ConditionField::HighLimit, limits.high),
                (ConditionField::LowLimit, limits.low),
                (ConditionField::LowLowLimit, limits.low_low),
            ] {
                if let Some(limit) = configured {
                    core.current.set_value(field, Variant::Float(limit));
                }
            }
            if self.variant.is_exclusive() {
                core.current.set_value(
                    ConditionField::LimitStateCurrent,
                    Variant::LocalizedText(LocalizedText::english("")),
                );
            }
        }
        if let Some(setpoint) = self.variant.setpoint_node() {
            core.current.set_value(
                ConditionField::SetpointNode,
                Variant::NodeId(setpoint.clone()),
            );
        }
        if let Some(normal) = self.variant.normal_state_node() {
            core.current
                .set_value(ConditionField::NormalState, Variant::NodeId(normal.clone()));
        }
        Ok(())
    }

    fn build_kind(&self, space: &AddressSpace) -> Result<AlarmKind> {
        Ok(match &self.variant {
            AlarmVariant::ExclusiveLimit(limits) | AlarmVariant::NonExclusiveLimit(limits) => {
                AlarmKind::Limit(LimitKind {
                    exclusive: self.variant.is_exclusive(),
                    limits: *limits,
                    flags: LimitFlags::default(),
                    exclusive_state: None,
                    setpoint_node: None,
                    setpoint: None,
                })
            }
            AlarmVariant::ExclusiveDeviation {
                limits,
                setpoint_node,
            }
            | AlarmVariant::NonExclusiveDeviation {
                limits,
                setpoint_node,
            } => {
                let setpoint = space
                    .read_value(setpoint_node)?
                    .value
                    .as_f64();
                AlarmKind::Limit(LimitKind {
                    exclusive: self.variant.is_exclusive(),
                    limits: *limits,
                    flags: LimitFlags::default(),
                    exclusive_state: None,
                    setpoint_node: Some(setpoint_node.clone()),
                    setpoint,
                })
            }
            AlarmVariant::OffNormal { normal_state } | AlarmVariant::Discrete { normal_state } => {
                let normal_value = space.read_value(normal_state)?.value;
                AlarmKind::OffNormal(OffNormalKind {
                    normal_state_node: Some(normal_state.clone()),
                    normal_value,
                })
            }
        })
    }

    /// Wire the value-change subscriptions. All callbacks hold weak
    /// references; a disposed or dropped alarm stops reacting.
    fn subscribe_inputs(&self, space: &AddressSpace, inner: &Arc<Mutex<AlarmInner>>) {
        let weak = Arc::downgrade(inner);
        let token = space.subscribe_value(&self.input_node, move |value| {
            if let Some(inner) = weak.upgrade() {
                inner.lock().handle_input_change(value);
            }
        });
        inner
            .lock()
            .subscriptions
            .push((self.input_node.clone(), token));

        let reference = self
            .variant
            .setpoint_node()
            .or_else(|| self.variant.normal_state_node());
        if let Some(reference) = reference {
            let weak = Arc::downgrade(inner);
            let token = space.subscribe_value(reference, move |value| {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().handle_reference_change(value);
                }
            });
            inner.lock().subscriptions.push((reference.clone(), token));
        }
    }
}

/// Fields every condition materializes
fn base_fields() -> Vec<ConditionField> {
    vec![
        ConditionField::EventId,
        ConditionField::EventType,
        ConditionField::BranchId,
        ConditionField::SourceNode,
        ConditionField::SourceName,
        ConditionField::ConditionName,
        ConditionField::ConditionClassId,
        ConditionField::ConditionClassName,
        ConditionField::Time,
        ConditionField::ReceiveTime,
        ConditionField::LocalTime,
        ConditionField::Message,
        ConditionField::Severity,
        ConditionField::LastSeverity,
        ConditionField::Quality,
        ConditionField::Comment,
        ConditionField::ClientUserId,
        ConditionField::Retain,
    ]
}

fn field_kind(field: ConditionField) -> VariantKind {
    match field {
        ConditionField::EventId => VariantKind::ByteString,
        ConditionField::EventType
        | ConditionField::BranchId
        | ConditionField::SourceNode
        | ConditionField::ConditionClassId
        | ConditionField::InputNode
        | ConditionField::SetpointNode
        | ConditionField::NormalState => VariantKind::NodeId,
        ConditionField::SourceName
        | ConditionField::ConditionName
        | ConditionField::ClientUserId => VariantKind::String,
        ConditionField::ConditionClassName
        | ConditionField::Message
        | ConditionField::Comment
        | ConditionField::ShelvingStateCurrent
        | ConditionField::LimitStateCurrent => VariantKind::LocalizedText,
        ConditionField::Time | ConditionField::ReceiveTime => VariantKind::DateTime,
        ConditionField::LocalTime => VariantKind::Any,
        ConditionField::Severity | ConditionField::LastSeverity => VariantKind::Int,
        ConditionField::Quality => VariantKind::StatusCode,
        ConditionField::Retain | ConditionField::SuppressedOrShelved => VariantKind::Bool,
        ConditionField::MaxTimeShelved
        | ConditionField::UnshelveTime
        | ConditionField::HighHighLimit
        | ConditionField::HighLimit
        | ConditionField::LowLimit
        | ConditionField::LowLowLimit => VariantKind::Float,
    }
}

fn validate_source(space: &AddressSpace, condition_of: &NodeId) -> Result<()> {
    if !space.contains(condition_of) {
        return Err(ConditionError::NodeNotFound(condition_of.to_string()));
    }
    if !space.is_event_source(condition_of) {
        return Err(ConditionError::Config(format!(
            "source node {} is not registered as an event source",
            condition_of
        )));
    }
    Ok(())
}

/// The address-space scaffolding of one condition instance
struct Scaffold {
    node_id: NodeId,
    vars: HashMap<ConditionField, NodeId>,
    state_vars: HashMap<TwoState, StateVarIds>,
}

impl Scaffold {
    /// Create the condition object node, one variable per schema field,
    /// and the two-node pair per two-state variable.
    fn build(
        space: &AddressSpace,
        namespace: u16,
        name: &str,
        condition_of: &NodeId,
        fields: Vec<ConditionField>,
        states: Vec<TwoState>,
    ) -> Result<Self> {
        let node_id = NodeId::string(namespace, name);
        space.add_object(node_id.clone(), name)?;
        space.add_reference(condition_of, ReferenceKind::HasCondition, &node_id)?;

        let mut vars = HashMap::new();
        for field in fields {
            let var_id = NodeId::string(namespace, format!("{}.{}", name, field.browse_path()));
            space.add_variable(
                var_id.clone(),
                field.browse_path(),
                field_kind(field),
                Variant::Null,
            )?;
            space.add_reference(&node_id, ReferenceKind::HasProperty, &var_id)?;
            vars.insert(field, var_id);
        }

        let mut state_vars = HashMap::new();
        for state in states {
            let state_id = NodeId::string(namespace, format!("{}.{}", name, state.browse_name()));
            let id_id = NodeId::string(namespace, format!("{}.{}", name, state.id_path()));
            space.add_variable(
                state_id.clone(),
                state.browse_name(),
                VariantKind::LocalizedText,
                Variant::LocalizedText(LocalizedText::english(state.false_text())),
            )?;
            space.add_variable(id_id.clone(), "Id", VariantKind::Bool, Variant::Bool(false))?;
            space.add_reference(&node_id, ReferenceKind::HasComponent, &state_id)?;
            space.add_reference(&state_id, ReferenceKind::HasProperty, &id_id)?;
            state_vars.insert(
                state,
                StateVarIds {
                    state: state_id,
                    id: id_id,
                },
            );
        }
        Ok(Self {
            node_id,
            vars,
            state_vars,
        })
    }

    /// Build the ConditionCore and write the initial branch-0 values:
    /// retain false, quality Good, severity 0, empty message, minimum
    /// event time, enabled.
    fn into_core(
        self,
        space: &Arc<AddressSpace>,
        name: &str,
        event_type: NodeId,
        condition_of: &NodeId,
    ) -> Result<ConditionCore> {
        let mirror = Mirror {
            space: space.clone(),
            vars: Arc::new(self.vars),
            state_vars: Arc::new(self.state_vars),
        };
        let mut current = ConditionSnapshot::new_current(mirror);
        current.set_value(ConditionField::EventType, Variant::NodeId(event_type));
        current.set_value(ConditionField::BranchId, Variant::NodeId(NodeId::null()));
        current.set_value(
            ConditionField::SourceNode,
            Variant::NodeId(condition_of.clone()),
        );
        let source_name = space
            .browse_name(condition_of)
            .unwrap_or_else(|| condition_of.to_string());
        current.set_value(ConditionField::SourceName, Variant::String(source_name));
        current.set_value(
            ConditionField::ConditionName,
            Variant::String(name.to_string()),
        );
        current.set_value(
            ConditionField::ConditionClassId,
            Variant::NodeId(well_known::base_condition_class_type()),
        );
        current.set_value(
            ConditionField::ConditionClassName,
            Variant::LocalizedText(LocalizedText::english("BaseConditionClass")),
        );
        current.set_value(
            ConditionField::Time,
            Variant::DateTime(DateTime::<Utc>::MIN_UTC),
        );
        current.set_value(
            ConditionField::ReceiveTime,
            Variant::DateTime(DateTime::<Utc>::MIN_UTC),
        );
        current.set_value(
            ConditionField::Message,
            Variant::LocalizedText(LocalizedText::english("")),
        );
        current.set_severity(0);
        current.set_quality(StatusCode::Good);
        current.set_retain(false);
        current.renew_event_id();
        current.set_state(TwoState::Enabled, true);

        Ok(ConditionCore {
            space: space.clone(),
            node_id: self.node_id,
            condition_name: name.to_string(),
            current,
            branches: HashMap::new(),
            pre_disable_retain: None,
            hub: EventHub::new(),
        })
    }
}

// ----------------------------------------------------------------------
// Method binding
// ----------------------------------------------------------------------

fn event_id_arg(args: &[Variant]) -> Option<Vec<u8>> {
    args.first()?.as_bytes().map(|b| b.to_vec())
}

fn comment_arg(args: &[Variant]) -> String {
    match args.get(1) {
        Some(Variant::LocalizedText(text)) => text.text.clone(),
        Some(Variant::String(text)) => text.clone(),
        _ => String::new(),
    }
}

fn add_method(
    space: &AddressSpace,
    namespace: u16,
    condition_name: &str,
    condition_node: &NodeId,
    method_name: &str,
    handler: impl Fn(&[Variant]) -> StatusCode + Send + Sync + 'static,
) -> Result<()> {
    let method_id = NodeId::string(namespace, format!("{}.{}", condition_name, method_name));
    space.add_method_node(method_id.clone(), method_name)?;
    space.add_reference(condition_node, ReferenceKind::HasComponent, &method_id)?;
    space.bind_method(&method_id, handler)
}

fn bind_condition_methods(
    space: &AddressSpace,
    namespace: u16,
    name: &str,
    node_id: &NodeId,
    inner: &Arc<Mutex<ConditionInner>>,
    acknowledgeable: bool,
    confirmable: bool,
) -> Result<()> {
    let handle = |weak: &Weak<Mutex<ConditionInner>>| -> Option<Condition> {
        weak.upgrade().map(|inner| Condition { inner })
    };

    let weak = Arc::downgrade(inner);
    add_method(space, namespace, name, node_id, "Enable", move |_| {
        match handle(&weak) {
            Some(condition) => condition.enable(),
            None => StatusCode::BadNodeIdUnknown,
        }
    })?;
    let weak = Arc::downgrade(inner);
    add_method(space, namespace, name, node_id, "Disable", move |_| {
        match handle(&weak) {
            Some(condition) => condition.disable(),
            None => StatusCode::BadNodeIdUnknown,
        }
    })?;
    let weak = Arc::downgrade(inner);
    add_method(space, namespace, name, node_id, "AddComment", move |args| {
        let Some(condition) = handle(&weak) else {
            return StatusCode::BadNodeIdUnknown;
        };
        let Some(event_id) = event_id_arg(args) else {
            return StatusCode::BadTypeMismatch;
        };
        condition.add_comment(&event_id, &comment_arg(args), "")
    })?;
    if acknowledgeable {
        let weak = Arc::downgrade(inner);
        add_method(space, namespace, name, node_id, "Acknowledge", move |args| {
            let Some(condition) = handle(&weak) else {
                return StatusCode::BadNodeIdUnknown;
            };
            let Some(event_id) = event_id_arg(args) else {
                return StatusCode::BadTypeMismatch;
            };
            condition.acknowledge(&event_id, &comment_arg(args), "")
        })?;
    }
    if confirmable {
        let weak = Arc::downgrade(inner);
        add_method(space, namespace, name, node_id, "Confirm", move |args| {
            let Some(condition) = handle(&weak) else {
                return StatusCode::BadNodeIdUnknown;
            };
            let Some(event_id) = event_id_arg(args) else {
                return StatusCode::BadTypeMismatch;
            };
            condition.confirm(&event_id, &comment_arg(args), "")
        })?;
    }
    Ok(())
}

fn bind_alarm_methods(
    space: &AddressSpace,
    namespace: u16,
    name: &str,
    node_id: &NodeId,
    inner: &Arc<Mutex<AlarmInner>>,
    confirmable: bool,
) -> Result<()> {
    let handle =
        |weak: &Weak<Mutex<AlarmInner>>| -> Option<Alarm> { weak.upgrade().map(|inner| Alarm { inner }) };

    let weak = Arc::downgrade(inner);
    add_method(space, namespace, name, node_id, "Enable", move |_| {
        match handle(&weak) {
            Some(alarm) => alarm.enable(),
            None => StatusCode::BadNodeIdUnknown,
        }
    })?;
    let weak = Arc::downgrade(inner);
    add_method(space, namespace, name, node_id, "Disable", move |_| {
        match handle(&weak) {
            Some(alarm) => alarm.disable(),
            None => StatusCode::BadNodeIdUnknown,
        }
    })?;
    let weak = Arc::downgrade(inner);
    add_method(space, namespace, name, node_id, "AddComment", move |args| {
        let Some(alarm) = handle(&weak) else {
            return StatusCode::BadNodeIdUnknown;
        };
        let Some(event_id) = event_id_arg(args) else {
            return StatusCode::BadTypeMismatch;
        };
        alarm.add_comment(&event_id, &comment_arg(args), "")
    })?;
    let weak = Arc::downgrade(inner);
    add_method(space, namespace, name, node_id, "Acknowledge", move |args| {
        let Some(alarm) = handle(&weak) else {
            return StatusCode::BadNodeIdUnknown;
        };
        let Some(event_id) = event_id_arg(args) else {
            return StatusCode::BadTypeMismatch;
        };
        alarm.acknowledge(&event_id, &comment_arg(args), "")
    })?;
    if confirmable {
        let weak = Arc::downgrade(inner);
        add_method(space, namespace, name, node_id, "Confirm", move |args| {
            let Some(alarm) = handle(&weak) else {
                return StatusCode::BadNodeIdUnknown;
            };
            let Some(event_id) = event_id_arg(args) else {
                return StatusCode::BadTypeMismatch;
            };
            alarm.confirm(&event_id, &comment_arg(args), "")
        })?;
    }
    let weak = Arc::downgrade(inner);
    add_method(space, namespace, name, node_id, "TimedShelve", move |args| {
        let Some(alarm) = handle(&weak) else {
            return StatusCode::BadNodeIdUnknown;
        };
        let Some(duration) = args.first().and_then(Variant::as_f64) else {
            return StatusCode::BadTypeMismatch;
        };
        alarm.timed_shelve(duration)
    })?;
    let weak = Arc::downgrade(inner);
    add_method(space, namespace, name, node_id, "OneShotShelve", move |_| {
        match handle(&weak) {
            Some(alarm) => alarm.one_shot_shelve(),
            None => StatusCode::BadNodeIdUnknown,
        }
    })?;
    let weak = Arc::downgrade(inner);
    add_method(space, namespace, name, node_id, "Unshelve", move |_| {
        match handle(&weak) {
            Some(alarm) => alarm.unshelve(),
            None => StatusCode::BadNodeIdUnknown,
        }
    })?;
    Ok(())
}
