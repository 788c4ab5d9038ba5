//! Column descriptors and the file schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::PhysicalType;
use crate::{Result, StrataError};

/// Repetition of a column. Nesting deeper than one optional/repeated level is
/// not modeled; max definition/repetition levels follow directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Repetition {
    Required = 0,
    Optional = 1,
    Repeated = 2,
}

impl Repetition {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Repetition::Required),
            1 => Some(Repetition::Optional),
            2 => Some(Repetition::Repeated),
            _ => None,
        }
    }
}

/// Descriptor for one column: name, physical type, repetition, and the value
/// width for FIXED_LEN_BYTE_ARRAY columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub physical_type: PhysicalType,
    pub repetition: Repetition,
    /// Byte width for FIXED_LEN_BYTE_ARRAY columns, 0 otherwise.
    pub type_length: i32,
}

impl ColumnDescriptor {
    pub fn new(name: &str, physical_type: PhysicalType, repetition: Repetition) -> Self {
        Self {
            name: name.to_string(),
            physical_type,
            repetition,
            type_length: 0,
        }
    }

    pub fn new_fixed(name: &str, repetition: Repetition, type_length: i32) -> Self {
        Self {
            name: name.to_string(),
            physical_type: PhysicalType::FixedLenByteArray,
            repetition,
            type_length,
        }
    }

    pub fn max_def_level(&self) -> i16 {
        match self.repetition {
            Repetition::Required => 0,
            Repetition::Optional | Repetition::Repeated => 1,
        }
    }

    pub fn max_rep_level(&self) -> i16 {
        match self.repetition {
            Repetition::Repeated => 1,
            _ => 0,
        }
    }
}

/// Ordered set of column descriptors.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    columns: Vec<ColumnDescriptor>,
    name_to_idx: HashMap<String, usize>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Result<Self> {
        let mut schema = Schema::default();
        for col in columns {
            schema.push_column(col)?;
        }
        Ok(schema)
    }

    pub fn push_column(&mut self, col: ColumnDescriptor) -> Result<usize> {
        if self.name_to_idx.contains_key(&col.name) {
            return Err(StrataError::Schema(format!(
                "duplicate column name: {}",
                col.name
            )));
        }
        if col.physical_type == PhysicalType::FixedLenByteArray && col.type_length <= 0 {
            return Err(StrataError::Schema(format!(
                "column {} is FIXED_LEN_BYTE_ARRAY but has type_length {}",
                col.name, col.type_length
            )));
        }
        let idx = self.columns.len();
        self.name_to_idx.insert(col.name.clone(), idx);
        self.columns.push(col);
        Ok(idx)
    }

    pub fn column(&self, i: usize) -> Result<&ColumnDescriptor> {
        self.columns.get(i).ok_or_else(|| {
            StrataError::Schema(format!(
                "column index {} out of range ({} columns)",
                i,
                self.columns.len()
            ))
        })
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn get_index(&self, name: &str) -> Option<usize> {
        self.name_to_idx.get(name).copied()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }
}
