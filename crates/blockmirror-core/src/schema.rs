//! Typed image of one device introspection: block descriptors, field
//! descriptors, block labels, and the initial changeset. These are pure
//! value types — the protocol client produces them, the tree build consumes
//! them, nothing here touches I/O.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::addr::Address;

/// One block as reported by the device: its repeat count and an optional
/// description used as the block label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// Repeat count. `None` or `Some(1)` means a single un-indexed block;
    /// `Some(n)` with n > 1 expands to indexed blocks 1..=n.
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One column of a table field's row schema. `subtype` is interpreted in
/// dispatch: `int`, `uint`, or `enum` (with `labels` as the closed value
/// set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub subtype: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// One field as reported by the device, tagged by its raw `(type, subtype)`
/// pair. The tag pair is opaque here; classification into the closed kind
/// vocabulary happens in [`crate::fields::FieldKind::classify`], the only
/// place the strings are interpreted. All metadata beyond the tag is
/// type-specific and optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub field_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub description: Option<String>,

    /// Upper bound for `uint` fields.
    #[serde(default)]
    pub max_value: Option<u64>,
    /// Engineering units for `scalar` fields.
    #[serde(default)]
    pub units: Option<String>,
    /// Unit labels for time fields.
    #[serde(default)]
    pub units_labels: Vec<String>,
    /// Value labels for `enum` and `pos_mux` fields.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Capture mode labels for `pos_out` and `ext_out` fields.
    #[serde(default)]
    pub capture_labels: Vec<String>,
    /// Per-bit labels for `ext_out`/`bits` fields; empty labels are gaps.
    #[serde(default)]
    pub bits: Vec<String>,
    /// Maximum input delay for `bit_mux` fields.
    #[serde(default)]
    pub max_delay: Option<u32>,
    /// Known source names a `bit_mux` may select between.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Row schema for `table` fields.
    #[serde(default)]
    pub columns: Vec<TableColumn>,
}

impl FieldDescriptor {
    pub fn new(field_type: impl Into<String>, subtype: Option<&str>) -> Self {
        Self {
            field_type: field_type.into(),
            subtype: subtype.map(str::to_string),
            ..Self::default()
        }
    }

    /// The raw tag pair, for error messages.
    pub fn tag(&self) -> String {
        match &self.subtype {
            Some(subtype) => format!("{}/{}", self.field_type, subtype),
            None => self.field_type.clone(),
        }
    }
}

/// Everything one introspection round returns. Map keys are the device's
/// names; `BTreeMap` fixes the realization order (ascending name/address
/// order) relied upon by the build algorithm.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntrospectionResult {
    pub blocks: BTreeMap<String, BlockDescriptor>,
    /// Field schema per block name. Shared by every numbered instance of a
    /// repeated block.
    pub fields: BTreeMap<String, BTreeMap<String, FieldDescriptor>>,
    /// Block labels keyed by (numbered) block address, sourced from the
    /// device's metadata keys.
    pub labels: BTreeMap<Address, String>,
    /// The initial full changeset, keyed by device-native address.
    pub initial_values: BTreeMap<Address, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_serde_defaults() {
        let minimal: FieldDescriptor =
            serde_json::from_str(r#"{"field_type":"param","subtype":"enum"}"#).unwrap();
        assert_eq!(minimal.tag(), "param/enum");
        assert!(minimal.labels.is_empty());
        assert!(minimal.max_value.is_none());

        let bare: FieldDescriptor = serde_json::from_str(r#"{"field_type":"bit_out"}"#).unwrap();
        assert_eq!(bare.tag(), "bit_out");
    }
}
