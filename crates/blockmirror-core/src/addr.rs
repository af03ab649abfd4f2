//! Hierarchical control-point addresses.
//!
//! One address space, two renderings: the device-native form is
//! dot-delimited with the block index fused onto the block segment
//! (`PULSE2.DELAY.UNITS`), the scoped form is colon-delimited and carries an
//! external namespace prefix (`MIRROR:PULSE2:DELAY:UNITS`). Converting
//! between them relabels the same component values; nothing is reparsed.

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, Result};

pub const DEVICE_SEPARATOR: char = '.';
pub const SCOPED_SEPARATOR: char = ':';

/// Partial or full address of a control point: block, optional block index,
/// field, sub-field. All components are optional so that partial addresses
/// compose (`PULSE1` + `.DELAY` + `..UNITS`), and absent components act as
/// wildcards in `contains`.
///
/// The derived `Ord` (block, index, field, sub_field) is the fixed iteration
/// order used by every tree map in this crate.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Address {
    pub block: Option<String>,
    pub block_index: Option<NonZeroU32>,
    pub field: Option<String>,
    pub sub_field: Option<String>,
}

impl Address {
    pub fn block(name: impl Into<String>) -> Self {
        Self {
            block: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn numbered_block(name: impl Into<String>, index: NonZeroU32) -> Self {
        Self {
            block: Some(name.into()),
            block_index: Some(index),
            ..Self::default()
        }
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self {
            field: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn sub_field(name: impl Into<String>) -> Self {
        Self {
            sub_field: Some(name.into()),
            ..Self::default()
        }
    }

    /// Parse a device-native address: 1–3 dot-delimited segments, block index
    /// as a trailing decimal suffix on the first segment (`SEQ2.TABLE`).
    pub fn parse(input: &str) -> Result<Self> {
        let segments: Vec<&str> = input.split(DEVICE_SEPARATOR).collect();
        if segments.len() > 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(MirrorError::MalformedAddress(format!(
                "`{input}` is not of the form BLOCK[.FIELD[.SUB_FIELD]]"
            )));
        }
        let (block, block_index) = split_block_index(segments[0])?;
        Ok(Self {
            block: Some(block),
            block_index,
            field: segments.get(1).map(|s| s.to_string()),
            sub_field: segments.get(2).map(|s| s.to_string()),
        })
    }

    /// Per-component merge: whichever side supplies a component wins; both
    /// sides supplying *different* values is an ambiguous merge and fails.
    pub fn compose(&self, other: &Address) -> Result<Address> {
        Ok(Address {
            block: merge_component("block", &self.block, &other.block)?,
            block_index: merge_component("block_index", &self.block_index, &other.block_index)?,
            field: merge_component("field", &self.field, &other.field)?,
            sub_field: merge_component("sub_field", &self.sub_field, &other.sub_field)?,
        })
    }

    /// Wildcard component matching: every component present in `other` must
    /// be absent or equal in `self`. This is not path-prefix matching — an
    /// address carrying only a field component matches any full address with
    /// that field, whatever its block.
    pub fn contains(&self, other: &Address) -> bool {
        component_matches(&self.block, &other.block)
            && component_matches(&self.block_index, &other.block_index)
            && component_matches(&self.field, &other.field)
            && component_matches(&self.sub_field, &other.sub_field)
    }

    /// The block portion of this address (index included).
    pub fn up_to_block(&self) -> Address {
        Address {
            block: self.block.clone(),
            block_index: self.block_index,
            ..Self::default()
        }
    }

    /// The block and field portion of this address.
    pub fn up_to_field(&self) -> Address {
        Address {
            sub_field: None,
            ..self.clone()
        }
    }

    /// Label under which a node is indexed into its parent's collection:
    /// the most specific present component, lower-cased, `-` normalized to
    /// `_`. A block label keeps its fused index (`pulse2`).
    pub fn attribute_label(&self) -> String {
        if let Some(sub_field) = &self.sub_field {
            return normalize_label(sub_field);
        }
        if let Some(field) = &self.field {
            return normalize_label(field);
        }
        if let Some(block) = &self.block {
            let mut label = normalize_label(block);
            if let Some(index) = self.block_index {
                label.push_str(&index.to_string());
            }
            return label;
        }
        String::new()
    }

    /// Relabel into the scoped (external) form. Component values are reused
    /// as-is; only the rendering changes.
    pub fn to_scoped(&self, prefix: Option<String>) -> ScopedAddress {
        ScopedAddress {
            prefix,
            address: self.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut put = |segment: &str| -> fmt::Result {
            if !first {
                write!(f, "{DEVICE_SEPARATOR}")?;
            }
            first = false;
            write!(f, "{segment}")
        };
        if let Some(block) = &self.block {
            match self.block_index {
                Some(index) => put(&format!("{block}{index}"))?,
                None => put(block)?,
            }
        }
        if let Some(field) = &self.field {
            put(field)?;
        }
        if let Some(sub_field) = &self.sub_field {
            put(sub_field)?;
        }
        Ok(())
    }
}

/// An address in the scoped (external control-system) form, with its optional
/// namespace prefix. Same component values as [`Address`], colon rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopedAddress {
    pub prefix: Option<String>,
    pub address: Address,
}

impl ScopedAddress {
    /// Parse a scoped address string. The string form always carries a
    /// prefix: `PREFIX:BLOCK:FIELD` or `PREFIX:BLOCK:FIELD:SUB_FIELD`.
    pub fn parse(input: &str) -> Result<Self> {
        let segments: Vec<&str> = input.split(SCOPED_SEPARATOR).collect();
        if !(3..=4).contains(&segments.len()) || segments.iter().any(|s| s.is_empty()) {
            return Err(MirrorError::MalformedAddress(format!(
                "`{input}` is not of the form PREFIX:BLOCK:FIELD[:SUB_FIELD]"
            )));
        }
        let (block, block_index) = split_block_index(segments[1])?;
        Ok(Self {
            prefix: Some(segments[0].to_string()),
            address: Address {
                block: Some(block),
                block_index,
                field: Some(segments[2].to_string()),
                sub_field: segments.get(3).map(|s| s.to_string()),
            },
        })
    }

    /// Relabel back into the device-native form, dropping the prefix.
    pub fn to_device(&self) -> Address {
        self.address.clone()
    }
}

impl fmt::Display for ScopedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut put = |segment: &str| -> fmt::Result {
            if !first {
                write!(f, "{SCOPED_SEPARATOR}")?;
            }
            first = false;
            write!(f, "{segment}")
        };
        if let Some(prefix) = &self.prefix {
            put(prefix)?;
        }
        if let Some(block) = &self.address.block {
            match self.address.block_index {
                Some(index) => put(&format!("{block}{index}"))?,
                None => put(block)?,
            }
        }
        if let Some(field) = &self.address.field {
            put(field)?;
        }
        if let Some(sub_field) = &self.address.sub_field {
            put(sub_field)?;
        }
        Ok(())
    }
}

/// Split a trailing decimal index off a block segment. The split only happens
/// when the digit run reaches the end of the segment and the prefix is
/// digit-free; `SEQ2` splits, `V2X` and `123` do not. An explicit index of
/// zero is rejected — indices start at 1.
fn split_block_index(segment: &str) -> Result<(String, Option<NonZeroU32>)> {
    let digit_start = segment
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i);
    match digit_start {
        Some(at) if at > 0 && segment[at..].chars().all(|c| c.is_ascii_digit()) => {
            let index: u32 = segment[at..].parse().map_err(|_| {
                MirrorError::MalformedAddress(format!("block index out of range in `{segment}`"))
            })?;
            let index = NonZeroU32::new(index).ok_or_else(|| {
                MirrorError::MalformedAddress(format!(
                    "block index must be positive in `{segment}`"
                ))
            })?;
            Ok((segment[..at].to_string(), Some(index)))
        }
        _ => Ok((segment.to_string(), None)),
    }
}

fn merge_component<T: PartialEq + Clone + fmt::Display>(
    name: &str,
    ours: &Option<T>,
    theirs: &Option<T>,
) -> Result<Option<T>> {
    match (ours, theirs) {
        (Some(a), Some(b)) if a != b => Err(MirrorError::AmbiguousMerge(format!(
            "{name}: `{a}` vs `{b}`"
        ))),
        (_, Some(b)) => Ok(Some(b.clone())),
        (a, None) => Ok(a.clone()),
    }
}

fn component_matches<T: PartialEq>(ours: &Option<T>, theirs: &Option<T>) -> bool {
    match (ours, theirs) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn normalize_label(name: &str) -> String {
    name.replace('-', "_").to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn parse_extracts_block_index() {
        let name = Address::parse("PULSE2.DELAY.UNITS").unwrap();
        assert_eq!(name.block.as_deref(), Some("PULSE"));
        assert_eq!(name.block_index, Some(nz(2)));
        assert_eq!(name.field.as_deref(), Some("DELAY"));
        assert_eq!(name.sub_field.as_deref(), Some("UNITS"));

        let bare = Address::parse("PULSE").unwrap();
        assert_eq!(bare, Address::block("PULSE"));
    }

    #[test]
    fn parse_leaves_awkward_segments_unsplit() {
        // Interior digits and all-digit segments are names, not indices.
        assert_eq!(
            Address::parse("V2X.F").unwrap().block.as_deref(),
            Some("V2X")
        );
        assert_eq!(Address::parse("123").unwrap().block.as_deref(), Some("123"));
    }

    #[test]
    fn parse_rejects_malformed_strings() {
        assert!(matches!(
            Address::parse("A.B.C.D"),
            Err(MirrorError::MalformedAddress(_))
        ));
        assert!(matches!(
            Address::parse("A..C"),
            Err(MirrorError::MalformedAddress(_))
        ));
        assert!(matches!(
            Address::parse("PULSE0.DELAY"),
            Err(MirrorError::MalformedAddress(_))
        ));
        assert!(matches!(
            Address::parse(""),
            Err(MirrorError::MalformedAddress(_))
        ));
    }

    #[test]
    fn render_round_trips() {
        for raw in ["LUT.VAL", "PULSE2.DELAY.UNITS", "PCAP", "SEQ1.TABLE"] {
            let parsed = Address::parse(raw).unwrap();
            assert_eq!(parsed.to_string(), raw);
            assert_eq!(Address::parse(&parsed.to_string()).unwrap(), parsed);
        }
    }

    #[test]
    fn compose_takes_whichever_side_supplies() {
        let block = Address::parse("PULSE1").unwrap();
        let field = Address::field("DELAY");
        let sub = Address::sub_field("UNITS");

        let full = block.compose(&field).unwrap().compose(&sub).unwrap();
        assert_eq!(full.to_string(), "PULSE1.DELAY.UNITS");
    }

    #[test]
    fn compose_identity() {
        let a = Address::parse("SEQ2.TABLE").unwrap();
        assert_eq!(a.compose(&Address::default()).unwrap(), a);
        assert_eq!(Address::default().compose(&a).unwrap(), a);
    }

    #[test]
    fn compose_conflict_is_ambiguous() {
        let x = Address::block("X");
        let y = Address::block("Y");
        assert!(matches!(
            x.compose(&y),
            Err(MirrorError::AmbiguousMerge(_))
        ));
        // Equal components are not a conflict.
        assert_eq!(x.compose(&Address::block("X")).unwrap(), x);
    }

    #[test]
    fn contains_is_reflexive() {
        for raw in ["PULSE1", "PULSE1.DELAY", "PULSE1.DELAY.UNITS"] {
            let a = Address::parse(raw).unwrap();
            assert!(a.contains(&a));
        }
    }

    #[test]
    fn contains_is_wildcard_matching_not_prefixing() {
        let entry = Address::parse("PULSE1.DELAY.UNITS").unwrap();

        // A block pattern matches everything under that block.
        assert!(Address::parse("PULSE1").unwrap().contains(&entry));
        assert!(!Address::parse("PULSE2").unwrap().contains(&entry));
        assert!(!Address::parse("SEQ1").unwrap().contains(&entry));

        // A field-only pattern matches any block — wildcard, not a prefix.
        assert!(Address::field("DELAY").contains(&entry));
        assert!(!Address::field("WIDTH").contains(&entry));
        assert!(Address::sub_field("UNITS").contains(&entry));
    }

    #[test]
    fn attribute_label_picks_most_specific_component() {
        assert_eq!(
            Address::parse("PULSE2.DELAY.UNITS").unwrap().attribute_label(),
            "units"
        );
        assert_eq!(Address::parse("PULSE2.DELAY").unwrap().attribute_label(), "delay");
        assert_eq!(Address::parse("PULSE2").unwrap().attribute_label(), "pulse2");
        assert_eq!(Address::field("OUT-A").attribute_label(), "out_a");
        assert_eq!(Address::default().attribute_label(), "");
    }

    #[test]
    fn scoped_relabeling_round_trips() {
        let device = Address::parse("PULSE2.DELAY.UNITS").unwrap();
        let scoped = device.to_scoped(Some("MIRROR".into()));
        assert_eq!(scoped.to_string(), "MIRROR:PULSE2:DELAY:UNITS");
        assert_eq!(scoped.to_device(), device);

        let reparsed = ScopedAddress::parse(&scoped.to_string()).unwrap();
        assert_eq!(reparsed, scoped);
    }

    #[test]
    fn scoped_parse_requires_prefix_and_field() {
        assert!(ScopedAddress::parse("MIRROR:PULSE2").is_err());
        assert!(ScopedAddress::parse("A:B:C:D:E").is_err());
        let ok = ScopedAddress::parse("MIRROR:LUT:VAL").unwrap();
        assert_eq!(ok.prefix.as_deref(), Some("MIRROR"));
        assert_eq!(ok.address, Address::parse("LUT.VAL").unwrap());
    }

    #[test]
    fn ordering_is_component_wise() {
        let mut addrs = vec![
            Address::parse("SEQ1.TABLE").unwrap(),
            Address::parse("PULSE2.DELAY").unwrap(),
            Address::parse("PULSE1.DELAY").unwrap(),
        ];
        addrs.sort();
        assert_eq!(addrs[0].to_string(), "PULSE1.DELAY");
        assert_eq!(addrs[1].to_string(), "PULSE2.DELAY");
        assert_eq!(addrs[2].to_string(), "SEQ1.TABLE");
    }
}
