//! The control-point tree: typed slots, field nodes, block nodes, and the
//! build/resolve/apply machinery that keeps them synchronized with the
//! device.
//!
//! The tree is built exactly once per connection and never restructured
//! afterwards — only slot values (and a time slot's engineering-unit
//! metadata) mutate. Same-slot updates serialize through the slot's lock;
//! distinct slots update independently.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::RwLock;

use tracing::{debug, info};

use crate::addr::Address;
use crate::error::{MirrorError, Result};
use crate::fields::{self, FieldKind};
use crate::schema::IntrospectionResult;
use crate::value::{coerce, validate, Access, Value, ValueKind};

// Auxiliary slot labels, as indexed into a field node's collection.
pub const UNITS_SLOT: &str = "units";
pub const DELAY_SLOT: &str = "delay";
pub const SCALE_SLOT: &str = "scale";
pub const OFFSET_SLOT: &str = "offset";
pub const SCALED_SLOT: &str = "scaled";
pub const CAPTURE_SLOT: &str = "capture";
pub const DATASET_SLOT: &str = "dataset";

/// One typed value cell. The declared kind (with bounds/labels) and access
/// direction are fixed at build; the value and the engineering-unit metadata
/// are the only mutable state.
#[derive(Debug)]
pub struct Slot {
    address: Address,
    kind: ValueKind,
    access: Access,
    description: Option<String>,
    units: RwLock<Option<String>>,
    value: RwLock<Option<Value>>,
}

impl Slot {
    pub fn new(address: Address, kind: ValueKind, access: Access) -> Self {
        Self {
            address,
            kind,
            access,
            description: None,
            units: RwLock::new(None),
            value: RwLock::new(None),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_units(self, units: Option<String>) -> Self {
        *write_lock(&self.units) = units;
        self
    }

    /// Build-time seeding; bypasses the access direction.
    pub fn with_initial(self, value: Value) -> Self {
        *write_lock(&self.value) = Some(value);
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn units(&self) -> Option<String> {
        read_lock(&self.units).clone()
    }

    pub fn set_units(&self, units: &str) {
        *write_lock(&self.units) = Some(units.to_string());
    }

    pub fn get(&self) -> Option<Value> {
        read_lock(&self.value).clone()
    }

    /// Validate against the declared kind and store. Write-only slots keep
    /// no readable state; for them the value is validated and dropped.
    pub fn store(&self, value: Value) -> Result<()> {
        validate(&self.kind, &value)?;
        if self.access.readable() {
            *write_lock(&self.value) = Some(value);
        }
        Ok(())
    }

    /// Coerce one raw device string and store it.
    pub fn apply_raw(&self, raw: &str) -> Result<()> {
        let value = coerce(&self.kind, raw)?;
        self.store(value)
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// A synthesized child of a bit-group field: one read-only boolean plus a
/// fixed name slot seeded at build. Children are not device-addressed.
#[derive(Debug)]
pub struct BitChild {
    pub address: Address,
    pub value: Slot,
    pub name: Slot,
}

/// One compiled control point: the field's address, its classified kind,
/// an optional primary slot, named auxiliary slots, and bit-group children.
#[derive(Debug)]
pub struct FieldNode {
    pub address: Address,
    pub kind: FieldKind,
    pub primary: Option<Slot>,
    pub aux: BTreeMap<String, Slot>,
    pub children: BTreeMap<String, BitChild>,
}

impl FieldNode {
    pub fn new(address: Address, kind: FieldKind) -> Self {
        Self {
            address,
            kind,
            primary: None,
            aux: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    /// The slot an address resolves to within this node: the primary slot
    /// when no sub-field is present, otherwise the auxiliary slot with the
    /// sub-field's label.
    pub fn slot_for(&self, addr: &Address) -> Result<&Slot> {
        match &addr.sub_field {
            None => self
                .primary
                .as_ref()
                .ok_or_else(|| MirrorError::ResolutionMiss(addr.to_string())),
            Some(sub_field) => {
                let label = Address::sub_field(sub_field.clone()).attribute_label();
                self.aux
                    .get(&label)
                    .ok_or_else(|| MirrorError::ResolutionMiss(addr.to_string()))
            }
        }
    }

    /// Apply one polled device value to the slot `addr` resolves to.
    pub fn apply(&self, addr: &Address, raw: &str) -> Result<()> {
        let slot = self.slot_for(addr)?;
        slot.apply_raw(raw)?;
        self.after_update(slot_label(addr).as_deref(), raw);
        Ok(())
    }

    /// Store an already-typed value locally (the write path's local half;
    /// forwarding to the device is the caller's job).
    pub fn store_local(&self, addr: &Address, value: Value) -> Result<()> {
        let slot = self.slot_for(addr)?;
        let rendered = value.render();
        slot.store(value)?;
        self.after_update(slot_label(addr).as_deref(), &rendered);
        Ok(())
    }

    fn after_update(&self, label: Option<&str>, rendered: &str) {
        // Unit changes carry their label through to the primary's metadata;
        // the units slot itself keeps no value.
        if label == Some(UNITS_SLOT) {
            if let Some(primary) = &self.primary {
                primary.set_units(rendered);
            }
        }
        if matches!(self.kind, FieldKind::PosOut)
            && matches!(label, None | Some(SCALE_SLOT) | Some(OFFSET_SLOT))
        {
            self.recompute_scaled();
        }
    }

    /// `scaled = scale * primary + offset`, recomputed synchronously from
    /// the slots on this node. Narrow reactive dependency — a direct call,
    /// not an observer graph.
    pub fn recompute_scaled(&self) {
        let (Some(primary), Some(scale), Some(offset), Some(scaled)) = (
            self.primary.as_ref(),
            self.aux.get(SCALE_SLOT),
            self.aux.get(OFFSET_SLOT),
            self.aux.get(SCALED_SLOT),
        ) else {
            return;
        };
        let (Some(Value::Float(p)), Some(Value::Float(s)), Some(Value::Float(o))) =
            (primary.get(), scale.get(), offset.get())
        else {
            return;
        };
        // Kind and access are fixed at build; this store cannot fail.
        let _ = scaled.store(Value::Float(s * p + o));
    }
}

fn slot_label(addr: &Address) -> Option<String> {
    addr.sub_field
        .as_ref()
        .map(|s| Address::sub_field(s.clone()).attribute_label())
}

/// A block instance: the fixed collection of its field nodes under one
/// address prefix, plus an optional read-only label slot.
#[derive(Debug)]
pub struct BlockNode {
    pub address: Address,
    pub label: Option<Slot>,
    pub fields: BTreeMap<String, FieldNode>,
}

impl BlockNode {
    fn new(address: Address, label: Option<String>) -> Self {
        let label = label.map(|text| {
            Slot::new(address.clone(), ValueKind::Str, Access::Read)
                .with_initial(Value::Str(text))
        });
        Self {
            address,
            label,
            fields: BTreeMap::new(),
        }
    }
}

/// The whole compiled tree, keyed by block address in ascending order.
#[derive(Debug, Default)]
pub struct DeviceTree {
    blocks: BTreeMap<Address, BlockNode>,
}

impl DeviceTree {
    /// Compile one introspection result into the control-point tree.
    ///
    /// Blocks and fields are realized in ascending address order; duplicate
    /// names are not deduplicated beyond last-write-wins in that order. A
    /// block with repeat count 1 (or unspecified) yields one un-indexed
    /// instance; count N yields instances 1..=N sharing the field schema.
    pub fn build(introspection: &IntrospectionResult) -> Result<Self> {
        let mut blocks = BTreeMap::new();
        for (block_name, block_descriptor) in &introspection.blocks {
            let field_schema = introspection.fields.get(block_name).ok_or_else(|| {
                MirrorError::Build(format!("no field schema for block `{block_name}`"))
            })?;

            let count = block_descriptor.number.unwrap_or(1);
            let addresses: Vec<Address> = if count <= 1 {
                vec![Address::block(block_name.clone())]
            } else {
                (1..=count)
                    .filter_map(NonZeroU32::new)
                    .map(|index| Address::numbered_block(block_name.clone(), index))
                    .collect()
            };

            for block_addr in addresses {
                let block_values: BTreeMap<Address, String> = introspection
                    .initial_values
                    .iter()
                    .filter(|(key, _)| block_addr.contains(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                let label = block_descriptor
                    .description
                    .clone()
                    .or_else(|| introspection.labels.get(&block_addr).cloned());

                let mut block_node = BlockNode::new(block_addr.clone(), label);
                for (field_name, descriptor) in field_schema {
                    let field_addr = block_addr.compose(&Address::field(field_name.clone()))?;
                    let field_pattern = Address::field(field_name.clone());
                    let field_values: BTreeMap<Address, String> = block_values
                        .iter()
                        .filter(|(key, _)| field_pattern.contains(key))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect();
                    let field_node =
                        fields::build_field_node(&field_addr, descriptor, &field_values)?;
                    block_node
                        .fields
                        .insert(field_addr.attribute_label(), field_node);
                }
                debug!(block = %block_addr, fields = block_node.fields.len(), "realized block");
                blocks.insert(block_addr, block_node);
            }
        }
        info!(blocks = blocks.len(), "control-point tree built");
        Ok(Self { blocks })
    }

    pub fn block(&self, addr: &Address) -> Option<&BlockNode> {
        self.blocks.get(&addr.up_to_block())
    }

    pub fn blocks(&self) -> impl Iterator<Item = (&Address, &BlockNode)> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Walk containment block → field: the owning field node for an address.
    pub fn resolve(&self, addr: &Address) -> Result<&FieldNode> {
        let block = self
            .blocks
            .get(&addr.up_to_block())
            .ok_or_else(|| MirrorError::ResolutionMiss(addr.to_string()))?;
        if addr.field.is_none() {
            return Err(MirrorError::ResolutionMiss(addr.to_string()));
        }
        let field_label = addr.up_to_field().attribute_label();
        block
            .fields
            .get(&field_label)
            .ok_or_else(|| MirrorError::ResolutionMiss(addr.to_string()))
    }

    /// Resolve and apply one polled (address, value) entry.
    pub fn apply(&self, addr: &Address, raw: &str) -> Result<()> {
        self.resolve(addr)?.apply(addr, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BlockDescriptor, FieldDescriptor};

    fn introspection_with(
        block: &str,
        number: Option<u32>,
        field: &str,
        descriptor: FieldDescriptor,
        initial: &[(&str, &str)],
    ) -> IntrospectionResult {
        let mut result = IntrospectionResult::default();
        result.blocks.insert(
            block.to_string(),
            BlockDescriptor {
                number,
                description: None,
            },
        );
        result.fields.insert(
            block.to_string(),
            BTreeMap::from([(field.to_string(), descriptor)]),
        );
        for (name, value) in initial {
            result
                .initial_values
                .insert(Address::parse(name).unwrap(), value.to_string());
        }
        result
    }

    fn enum_param(labels: &[&str]) -> FieldDescriptor {
        FieldDescriptor {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            ..FieldDescriptor::new("param", Some("enum"))
        }
    }

    #[test]
    fn repeat_count_expands_into_indexed_blocks() {
        let introspection = introspection_with(
            "PULSE",
            Some(3),
            "VAL",
            enum_param(&["A", "B"]),
            &[("PULSE1.VAL", "A"), ("PULSE2.VAL", "B"), ("PULSE3.VAL", "A")],
        );
        let tree = DeviceTree::build(&introspection).unwrap();
        assert_eq!(tree.len(), 3);
        for index in 1..=3u32 {
            let addr = Address::parse(&format!("PULSE{index}")).unwrap();
            let block = tree.block(&addr).expect("indexed block exists");
            assert_eq!(block.fields.len(), 1);
            assert!(block.fields.contains_key("val"));
        }
        assert!(tree.block(&Address::block("PULSE")).is_none());
    }

    #[test]
    fn unit_repeat_count_yields_unindexed_block() {
        let introspection = introspection_with(
            "LUT",
            None,
            "VAL",
            enum_param(&["AND", "OR"]),
            &[("LUT.VAL", "OR")],
        );
        let tree = DeviceTree::build(&introspection).unwrap();
        assert_eq!(tree.len(), 1);
        let node = tree.resolve(&Address::parse("LUT.VAL").unwrap()).unwrap();
        assert_eq!(
            node.primary.as_ref().unwrap().get(),
            Some(Value::Enum("OR".into()))
        );
    }

    #[test]
    fn missing_required_initial_value_fails_build() {
        let introspection =
            introspection_with("LUT", None, "VAL", enum_param(&["AND", "OR"]), &[]);
        let err = DeviceTree::build(&introspection).unwrap_err();
        assert!(matches!(err, MirrorError::Build(_)), "got {err:?}");
    }

    #[test]
    fn resolution_walks_block_field_sub_field() {
        let descriptor = FieldDescriptor {
            max_delay: Some(31),
            sources: vec!["ZERO".into(), "ONE".into(), "INPA".into()],
            ..FieldDescriptor::new("bit_mux", None)
        };
        let introspection = introspection_with(
            "SRGATE",
            None,
            "ENABLE",
            descriptor,
            &[("SRGATE.ENABLE", "INPA"), ("SRGATE.ENABLE.DELAY", "3")],
        );
        let tree = DeviceTree::build(&introspection).unwrap();

        let field_addr = Address::parse("SRGATE.ENABLE").unwrap();
        let delay_addr = Address::parse("SRGATE.ENABLE.DELAY").unwrap();
        let node = tree.resolve(&delay_addr).unwrap();
        assert_eq!(node.address, field_addr);
        assert_eq!(node.slot_for(&delay_addr).unwrap().get(), Some(Value::Int(3)));

        assert!(matches!(
            tree.resolve(&Address::parse("SRGATE.MISSING").unwrap()),
            Err(MirrorError::ResolutionMiss(_))
        ));
        assert!(matches!(
            tree.resolve(&Address::parse("NOWHERE.ENABLE").unwrap()),
            Err(MirrorError::ResolutionMiss(_))
        ));
    }

    #[test]
    fn apply_updates_the_addressed_slot_only() {
        let introspection = introspection_with(
            "LUT",
            None,
            "VAL",
            enum_param(&["AND", "OR"]),
            &[("LUT.VAL", "OR")],
        );
        let tree = DeviceTree::build(&introspection).unwrap();
        let addr = Address::parse("LUT.VAL").unwrap();

        tree.apply(&addr, "AND").unwrap();
        let node = tree.resolve(&addr).unwrap();
        assert_eq!(
            node.primary.as_ref().unwrap().get(),
            Some(Value::Enum("AND".into()))
        );

        // Out-of-set polled values fail coercion and leave the slot alone.
        assert!(matches!(
            tree.apply(&addr, "XOR"),
            Err(MirrorError::Coercion(_))
        ));
        assert_eq!(
            tree.resolve(&addr).unwrap().primary.as_ref().unwrap().get(),
            Some(Value::Enum("AND".into()))
        );
    }

    #[test]
    fn block_label_prefers_description_then_label_map() {
        let mut introspection = introspection_with(
            "LUT",
            None,
            "VAL",
            enum_param(&["AND", "OR"]),
            &[("LUT.VAL", "OR")],
        );
        introspection
            .labels
            .insert(Address::block("LUT"), "Lookup table".into());
        let tree = DeviceTree::build(&introspection).unwrap();
        let block = tree.block(&Address::block("LUT")).unwrap();
        assert_eq!(
            block.label.as_ref().unwrap().get(),
            Some(Value::Str("Lookup table".into()))
        );
    }
}
