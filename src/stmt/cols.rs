//! Column metadata of result sets

use crate::types::ColumnType;
use std::{collections::HashMap, sync::Arc};

/// Describes a column of a result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    size: usize,
    precision: i16,
    scale: i8,
}

impl ColumnInfo {
    /// Creates a nullable column description with the default size of its type.
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        let size = match column_type {
            ColumnType::Varchar | ColumnType::Raw => 4000,
            ColumnType::Char => 1,
            ColumnType::Number => 22,
            ColumnType::BinaryFloat => 4,
            ColumnType::BinaryDouble | ColumnType::Date => 8,
            ColumnType::Timestamp => 11,
            ColumnType::TimestampTz => 13,
            ColumnType::IntervalDs => 11,
            ColumnType::RowId => 18,
            _ => 0,
        };
        Self { name: name.to_uppercase(), column_type, nullable: true, size, precision: 0, scale: 0 }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_precision(mut self, precision: i16, scale: i8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Returns the column name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> &ColumnType {
        &self.column_type
    }

    /// Returns the database-native type name, like `VARCHAR2`
    pub fn type_name(&self) -> &str {
        self.column_type.type_name()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns the declared length of the column in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn precision(&self) -> i16 {
        self.precision
    }

    pub fn scale(&self) -> i8 {
        self.scale
    }
}

/// Column metadata shared by a result set and its rows
#[derive(Debug)]
pub(crate) struct Columns {
    infos: Arc<Vec<ColumnInfo>>,
    idxs: HashMap<String, usize>,
}

impl Columns {
    pub(crate) fn new(infos: Arc<Vec<ColumnInfo>>) -> Self {
        let idxs = infos.iter().enumerate().map(|(ix, col)| (col.name.clone(), ix)).collect();
        Self { infos, idxs }
    }

    pub(crate) fn infos(&self) -> &[ColumnInfo] {
        &self.infos
    }

    pub(crate) fn col_index(&self, name: &str) -> Option<usize> {
        self.idxs.get(name).copied().or_else(|| self.idxs.get(name.to_uppercase().as_str()).copied())
    }
}

/// A trait for types that can be used to address a column: zero-based index or column name
pub trait Position {
    fn index(&self) -> Option<usize>;
    fn name(&self) -> Option<&str>;
}

impl Position for usize {
    fn index(&self) -> Option<usize> { Some(*self) }
    fn name(&self) -> Option<&str>   { None }
}

impl Position for &str {
    fn index(&self) -> Option<usize> { None }
    fn name(&self) -> Option<&str>   { Some(*self) }
}
