//! blockmirror-core: the model/mapping layer of a block-structured-device
//! to control-system adapter.
//!
//! This crate contains the pure domain logic with NO I/O dependencies:
//! - Hierarchical address algebra (device-native and scoped renderings)
//! - Typed introspection schema (blocks, fields, tables)
//! - Slot value model with coercion and rendering at the device boundary
//! - Closed field-kind vocabulary and exhaustive control-point dispatch
//! - The control-point tree: build, resolve, apply
//! - The `DeviceClient` port trait implemented by protocol clients
//!
//! The runtime half (connection lifecycle, change poller, write-back
//! forwarding) lives in `blockmirror-adapter`.

pub mod addr;
pub mod error;
pub mod fields;
pub mod ports;
pub mod schema;
pub mod tree;
pub mod value;

pub use addr::{Address, ScopedAddress};
pub use error::{MirrorError, Result};
pub use fields::{Direction, ExtOutKind, FieldKind, ValueClass};
pub use ports::DeviceClient;
pub use schema::{BlockDescriptor, FieldDescriptor, IntrospectionResult, TableColumn};
pub use tree::{BitChild, BlockNode, DeviceTree, FieldNode, Slot};
pub use value::{coerce, validate, Access, Cell, ColumnKind, TableColumnKind, Value, ValueKind};
