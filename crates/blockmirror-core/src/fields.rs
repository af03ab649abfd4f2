//! Field-type dispatch: classify a field descriptor's raw `(type, subtype)`
//! tag into the closed kind vocabulary, then construct the matching control
//! point shape — primary slot, type-specific auxiliary slots, bit-group
//! children — seeded from the field's initial-value partition.
//!
//! Classification is the only place the tag strings are interpreted, and the
//! construction match is exhaustive over the vocabulary. There is no default
//! shape: a pair outside the vocabulary fails the build with
//! `UnknownFieldKind`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::EnumIter;

use crate::addr::Address;
use crate::error::{MirrorError, Result};
use crate::schema::{FieldDescriptor, TableColumn};
use crate::tree::{
    BitChild, FieldNode, Slot, CAPTURE_SLOT, DATASET_SLOT, DELAY_SLOT, OFFSET_SLOT, SCALED_SLOT,
    SCALE_SLOT, UNITS_SLOT,
};
use crate::value::{
    coerce, Access, ColumnKind, TableColumnKind, Value, ValueKind,
};

/// Direction axis of the typed field kinds. `param` is a read-write
/// configuration value; `read` and `write` are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Param,
    Read,
    Write,
}

impl Direction {
    fn access(self) -> Access {
        match self {
            Self::Param => Access::ReadWrite,
            Self::Read => Access::Read,
            Self::Write => Access::Write,
        }
    }
}

/// Value axis of the typed field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueClass {
    Uint,
    Int,
    Scalar,
    Bit,
    Action,
    Lut,
    Enum,
    Time,
}

/// Subtype axis of externally-captured output fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtOutKind {
    Timestamp,
    Samples,
    Bits,
}

/// The closed field-kind vocabulary. Everything a device can report maps to
/// exactly one of these; everything else is `UnknownFieldKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Table,
    Time,
    BitOut,
    PosOut,
    ExtOut(ExtOutKind),
    BitMux,
    PosMux,
    Typed(Direction, ValueClass),
}

impl FieldKind {
    /// Interpret a descriptor's raw tag pair. The sole string-to-kind
    /// mapping in the crate.
    pub fn classify(descriptor: &FieldDescriptor) -> Result<Self> {
        let subtype = descriptor.subtype.as_deref();
        let kind = match (descriptor.field_type.as_str(), subtype) {
            ("table", None) => Self::Table,
            ("time", None) => Self::Time,
            ("time", Some(sub)) => Self::Typed(parse_direction(sub)?, ValueClass::Time),
            ("bit_out", None) => Self::BitOut,
            ("pos_out", None) => Self::PosOut,
            ("ext_out", Some("timestamp")) => Self::ExtOut(ExtOutKind::Timestamp),
            ("ext_out", Some("samples")) => Self::ExtOut(ExtOutKind::Samples),
            ("ext_out", Some("bits")) => Self::ExtOut(ExtOutKind::Bits),
            ("bit_mux", None) => Self::BitMux,
            ("pos_mux", None) => Self::PosMux,
            ("param" | "read" | "write", Some(sub)) => {
                let direction = match descriptor.field_type.as_str() {
                    "param" => Direction::Param,
                    "read" => Direction::Read,
                    _ => Direction::Write,
                };
                let class = parse_value_class(sub)
                    .map_err(|_| MirrorError::UnknownFieldKind(descriptor.tag()))?;
                Self::Typed(direction, class)
            }
            _ => return Err(MirrorError::UnknownFieldKind(descriptor.tag())),
        };
        Ok(kind)
    }
}

fn parse_direction(raw: &str) -> Result<Direction> {
    match raw {
        "param" => Ok(Direction::Param),
        "read" => Ok(Direction::Read),
        "write" => Ok(Direction::Write),
        _ => Err(MirrorError::UnknownFieldKind(format!("time/{raw}"))),
    }
}

fn parse_value_class(raw: &str) -> Result<ValueClass> {
    match raw {
        "uint" => Ok(ValueClass::Uint),
        "int" => Ok(ValueClass::Int),
        "scalar" => Ok(ValueClass::Scalar),
        "bit" => Ok(ValueClass::Bit),
        "action" => Ok(ValueClass::Action),
        "lut" => Ok(ValueClass::Lut),
        "enum" => Ok(ValueClass::Enum),
        "time" => Ok(ValueClass::Time),
        _ => Err(MirrorError::UnknownFieldKind(raw.to_string())),
    }
}

type InitialValues = BTreeMap<Address, String>;

/// Realize one field: classify, construct its shape, seed initial values.
/// The partition passed in holds only this field's entries (field-level and
/// sub-field-level), selected by the caller via address containment.
pub fn build_field_node(
    addr: &Address,
    descriptor: &FieldDescriptor,
    initial: &InitialValues,
) -> Result<FieldNode> {
    let kind = FieldKind::classify(descriptor)?;
    let mut node = FieldNode::new(addr.clone(), kind);
    match kind {
        FieldKind::Table => build_table(&mut node, addr, descriptor)?,
        FieldKind::Time => build_time(&mut node, addr, descriptor, Access::ReadWrite, initial)?,
        FieldKind::Typed(direction, ValueClass::Time) => {
            build_time(&mut node, addr, descriptor, direction.access(), initial)?
        }
        FieldKind::BitOut => build_bit_out(&mut node, addr, descriptor, initial)?,
        FieldKind::PosOut => build_pos_out(&mut node, addr, descriptor, initial)?,
        FieldKind::ExtOut(ext_kind) => build_ext_out(&mut node, addr, descriptor, ext_kind, initial)?,
        FieldKind::BitMux => build_bit_mux(&mut node, addr, descriptor, initial)?,
        FieldKind::PosMux => build_pos_mux(&mut node, addr, descriptor, initial)?,
        FieldKind::Typed(direction, class) => {
            build_typed(&mut node, addr, descriptor, direction, class, initial)?
        }
    }
    Ok(node)
}

// ── Per-kind construction ─────────────────────────────────────

fn build_table(node: &mut FieldNode, addr: &Address, descriptor: &FieldDescriptor) -> Result<()> {
    let columns = descriptor
        .columns
        .iter()
        .map(|column| classify_column(addr, column))
        .collect::<Result<Vec<_>>>()?;
    // Table content arrives over a separate bulk path, not the changeset;
    // the slot starts empty.
    node.primary = Some(
        Slot::new(addr.clone(), ValueKind::Table { columns }, Access::ReadWrite)
            .with_description(descriptor.description.clone())
            .with_initial(Value::Table(Vec::new())),
    );
    Ok(())
}

fn classify_column(addr: &Address, column: &TableColumn) -> Result<TableColumnKind> {
    let kind = match column.subtype.as_str() {
        "int" => ColumnKind::Int,
        "uint" => ColumnKind::Uint,
        "enum" => ColumnKind::Enum(column.labels.clone()),
        other => {
            return Err(MirrorError::UnknownFieldKind(format!(
                "table column `{}` of `{addr}`: `{other}`",
                column.name
            )))
        }
    };
    Ok(TableColumnKind {
        name: column.name.clone(),
        kind,
    })
}

fn build_time(
    node: &mut FieldNode,
    addr: &Address,
    descriptor: &FieldDescriptor,
    access: Access,
    initial: &InitialValues,
) -> Result<()> {
    let units_addr = addr.compose(&Address::sub_field("UNITS"))?;
    let initial_units = initial
        .get(&units_addr)
        .cloned()
        .unwrap_or_else(|| "s".to_string());

    let mut primary = Slot::new(addr.clone(), ValueKind::Float, access)
        .with_description(descriptor.description.clone())
        .with_units(Some(initial_units));
    if access.readable() {
        primary = seed(primary, &require_initial(initial, addr)?)?;
    }
    node.primary = Some(primary);

    // Writing the units slot swaps the primary's engineering units, never
    // its stored value.
    node.aux.insert(
        UNITS_SLOT.to_string(),
        Slot::new(
            units_addr,
            ValueKind::Enum {
                labels: descriptor.units_labels.clone(),
            },
            Access::Write,
        ),
    );
    Ok(())
}

fn build_bit_out(
    node: &mut FieldNode,
    addr: &Address,
    descriptor: &FieldDescriptor,
    initial: &InitialValues,
) -> Result<()> {
    node.primary = Some(seed(
        Slot::new(addr.clone(), ValueKind::Bool, Access::Read)
            .with_description(descriptor.description.clone()),
        &require_initial(initial, addr)?,
    )?);

    let capture_addr = addr.compose(&Address::sub_field("CAPTURE"))?;
    let capture = Slot::new(capture_addr.clone(), ValueKind::Bool, Access::ReadWrite);
    let capture = match initial.get(&capture_addr) {
        Some(raw) => seed(capture, raw)?,
        None => capture.with_initial(Value::Bool(false)),
    };
    node.aux.insert(CAPTURE_SLOT.to_string(), capture);
    Ok(())
}

fn build_pos_out(
    node: &mut FieldNode,
    addr: &Address,
    descriptor: &FieldDescriptor,
    initial: &InitialValues,
) -> Result<()> {
    node.primary = Some(seed(
        Slot::new(addr.clone(), ValueKind::Float, Access::Read)
            .with_description(descriptor.description.clone()),
        &require_initial(initial, addr)?,
    )?);

    for label in [SCALE_SLOT, OFFSET_SLOT] {
        let sub_addr = addr.compose(&Address::sub_field(label.to_ascii_uppercase()))?;
        let raw = require_initial(initial, &sub_addr)?;
        node.aux.insert(
            label.to_string(),
            seed(
                Slot::new(sub_addr, ValueKind::Float, Access::ReadWrite),
                &raw,
            )?,
        );
    }

    let scaled_addr = addr.compose(&Address::sub_field("SCALED"))?;
    node.aux.insert(
        SCALED_SLOT.to_string(),
        Slot::new(scaled_addr, ValueKind::Float, Access::Read)
            .with_description(Some("Value with scaling applied.".to_string())),
    );

    attach_capture_and_dataset(node, addr, descriptor, initial)?;
    node.recompute_scaled();
    Ok(())
}

fn build_ext_out(
    node: &mut FieldNode,
    addr: &Address,
    descriptor: &FieldDescriptor,
    ext_kind: ExtOutKind,
    initial: &InitialValues,
) -> Result<()> {
    node.primary = Some(seed(
        Slot::new(addr.clone(), ValueKind::Float, Access::Read)
            .with_description(descriptor.description.clone()),
        &require_initial(initial, addr)?,
    )?);
    attach_capture_and_dataset(node, addr, descriptor, initial)?;

    if ext_kind == ExtOutKind::Bits {
        // One synthesized child per non-empty bit label; empty labels are
        // gaps in the group and produce nothing.
        for label in descriptor.bits.iter().filter(|label| !label.is_empty()) {
            let child_addr = addr.compose(&Address::sub_field(label.clone()))?;
            let key = Address::sub_field(label.clone()).attribute_label();
            node.children.insert(
                key,
                BitChild {
                    address: child_addr.clone(),
                    value: Slot::new(child_addr.clone(), ValueKind::Bool, Access::Read)
                        .with_initial(Value::Bool(false)),
                    name: Slot::new(child_addr, ValueKind::Str, Access::Read)
                        .with_initial(Value::Str(label.clone())),
                },
            );
        }
    }
    Ok(())
}

fn attach_capture_and_dataset(
    node: &mut FieldNode,
    addr: &Address,
    descriptor: &FieldDescriptor,
    initial: &InitialValues,
) -> Result<()> {
    let capture_addr = addr.compose(&Address::sub_field("CAPTURE"))?;
    let raw = require_initial(initial, &capture_addr)?;
    node.aux.insert(
        CAPTURE_SLOT.to_string(),
        seed(
            Slot::new(
                capture_addr,
                ValueKind::Enum {
                    labels: descriptor.capture_labels.clone(),
                },
                Access::ReadWrite,
            ),
            &raw,
        )?,
    );

    let dataset_addr = addr.compose(&Address::sub_field("DATASET"))?;
    node.aux.insert(
        DATASET_SLOT.to_string(),
        Slot::new(dataset_addr, ValueKind::Str, Access::ReadWrite)
            .with_description(Some(
                "Used to adjust the dataset name to one more scientifically relevant".to_string(),
            ))
            .with_initial(Value::Str(String::new())),
    );
    Ok(())
}

fn build_bit_mux(
    node: &mut FieldNode,
    addr: &Address,
    descriptor: &FieldDescriptor,
    initial: &InitialValues,
) -> Result<()> {
    // Restricted to the known source names when the device declares them.
    let primary_kind = if descriptor.sources.is_empty() {
        ValueKind::Str
    } else {
        ValueKind::Enum {
            labels: descriptor.sources.clone(),
        }
    };
    node.primary = Some(seed(
        Slot::new(addr.clone(), primary_kind, Access::ReadWrite)
            .with_description(descriptor.description.clone()),
        &require_initial(initial, addr)?,
    )?);

    let max_delay = descriptor.max_delay.ok_or_else(|| {
        MirrorError::Build(format!("bit_mux `{addr}` declares no maximum delay"))
    })?;
    let delay_addr = addr.compose(&Address::sub_field("DELAY"))?;
    let raw = require_initial(initial, &delay_addr)?;
    node.aux.insert(
        DELAY_SLOT.to_string(),
        seed(
            Slot::new(
                delay_addr,
                ValueKind::bounded_int(0, i64::from(max_delay)),
                Access::ReadWrite,
            )
            .with_description(Some("Clock delay on input.".to_string())),
            &raw,
        )?,
    );
    Ok(())
}

fn build_pos_mux(
    node: &mut FieldNode,
    addr: &Address,
    descriptor: &FieldDescriptor,
    initial: &InitialValues,
) -> Result<()> {
    node.primary = Some(seed(
        Slot::new(
            addr.clone(),
            ValueKind::Enum {
                labels: descriptor.labels.clone(),
            },
            Access::ReadWrite,
        )
        .with_description(descriptor.description.clone()),
        &require_initial(initial, addr)?,
    )?);
    Ok(())
}

fn build_typed(
    node: &mut FieldNode,
    addr: &Address,
    descriptor: &FieldDescriptor,
    direction: Direction,
    class: ValueClass,
    initial: &InitialValues,
) -> Result<()> {
    // Actions are fire-only: write-only boolean, no readable state, no
    // initial value, whatever the direction axis says.
    if class == ValueClass::Action {
        node.primary = Some(
            Slot::new(addr.clone(), ValueKind::Bool, Access::Write)
                .with_description(descriptor.description.clone()),
        );
        return Ok(());
    }

    let kind = match class {
        ValueClass::Uint => ValueKind::Uint {
            max: descriptor.max_value,
        },
        ValueClass::Int => ValueKind::plain_int(),
        ValueClass::Scalar => ValueKind::Float,
        ValueClass::Bit => ValueKind::Bool,
        ValueClass::Lut => ValueKind::Str,
        ValueClass::Enum => ValueKind::Enum {
            labels: descriptor.labels.clone(),
        },
        // Handled above / in build_time.
        ValueClass::Action | ValueClass::Time => unreachable!("dispatched separately"),
    };

    let access = direction.access();
    let mut slot = Slot::new(addr.clone(), kind, access)
        .with_description(descriptor.description.clone());
    if class == ValueClass::Scalar {
        slot = slot.with_units(descriptor.units.clone());
    }
    if access.readable() {
        slot = seed(slot, &require_initial(initial, addr)?)?;
    }
    node.primary = Some(slot);
    Ok(())
}

// ── Initial-value helpers ─────────────────────────────────────

fn require_initial(initial: &InitialValues, addr: &Address) -> Result<String> {
    initial.get(addr).cloned().ok_or_else(|| {
        MirrorError::Build(format!("missing required initial value for `{addr}`"))
    })
}

fn seed(slot: Slot, raw: &str) -> Result<Slot> {
    let value = coerce(slot.kind(), raw).map_err(|source| {
        MirrorError::Build(format!("initial value for `{}`: {source}", slot.address()))
    })?;
    Ok(slot.with_initial(value))
}
