//! In-memory representation of MATLAB arrays

use std::fmt;

/// The MATLAB array class, as stored in the array flags of a matrix element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayClass {
    Cell = 1,
    Struct = 2,
    Object = 3,
    Char = 4,
    Sparse = 5,
    Double = 6,
    Single = 7,
    Int8 = 8,
    UInt8 = 9,
    Int16 = 10,
    UInt16 = 11,
    Int32 = 12,
    UInt32 = 13,
    Int64 = 14,
    UInt64 = 15,
    Function = 16,
    Opaque = 17,
}

impl ArrayClass {
    /// The MATLAB name of the class
    pub fn name(self) -> &'static str {
        match self {
            ArrayClass::Cell => "cell",
            ArrayClass::Struct => "struct",
            ArrayClass::Object => "object",
            ArrayClass::Char => "char",
            ArrayClass::Sparse => "sparse",
            ArrayClass::Double => "double",
            ArrayClass::Single => "single",
            ArrayClass::Int8 => "int8",
            ArrayClass::UInt8 => "uint8",
            ArrayClass::Int16 => "int16",
            ArrayClass::UInt16 => "uint16",
            ArrayClass::Int32 => "int32",
            ArrayClass::UInt32 => "uint32",
            ArrayClass::Int64 => "int64",
            ArrayClass::UInt64 => "uint64",
            ArrayClass::Function => "function_handle",
            ArrayClass::Opaque => "opaque",
        }
    }
}

impl TryFrom<u8> for ArrayClass {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => ArrayClass::Cell,
            2 => ArrayClass::Struct,
            3 => ArrayClass::Object,
            4 => ArrayClass::Char,
            5 => ArrayClass::Sparse,
            6 => ArrayClass::Double,
            7 => ArrayClass::Single,
            8 => ArrayClass::Int8,
            9 => ArrayClass::UInt8,
            10 => ArrayClass::Int16,
            11 => ArrayClass::UInt16,
            12 => ArrayClass::Int32,
            13 => ArrayClass::UInt32,
            14 => ArrayClass::Int64,
            15 => ArrayClass::UInt64,
            16 => ArrayClass::Function,
            17 => ArrayClass::Opaque,
            other => return Err(other),
        })
    }
}

impl fmt::Display for ArrayClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single MATLAB value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Numeric(NumericArray),
    Char(CharArray),
    Struct(StructArray),
    Cell(CellArray),

    /// A value of a class this crate recognises but does not decode
    Unsupported(Unsupported),
}

impl Value {
    /// The dimensions of the value, as stored in the file (at least two)
    pub fn dims(&self) -> &[usize] {
        match self {
            Value::Numeric(array) => &array.dims,
            Value::Char(array) => &array.dims,
            Value::Struct(array) => &array.dims,
            Value::Cell(array) => &array.dims,
            Value::Unsupported(unsupported) => &unsupported.dims,
        }
    }

    /// A short description of the class, e.g. `double` or `logical`
    pub fn class_name(&self) -> &'static str {
        match self {
            Value::Numeric(array) => array.data.class_name(),
            Value::Char(_) => ArrayClass::Char.name(),
            Value::Struct(_) => ArrayClass::Struct.name(),
            Value::Cell(_) => ArrayClass::Cell.name(),
            Value::Unsupported(unsupported) => unsupported.description,
        }
    }

    /// An empty `0x0` double matrix, which is what empty matrix elements decode to
    pub fn empty() -> Self {
        Value::Numeric(NumericArray {
            dims: vec![0, 0],
            data: NumericData::Double(Vec::new()),
        })
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Numeric(NumericArray::new(vec![1, 1], NumericData::Double(vec![value])))
    }
}

impl From<Vec<f64>> for Value {
    /// A `1xN` row vector
    fn from(values: Vec<f64>) -> Self {
        let dims = vec![1, values.len()];
        Value::Numeric(NumericArray::new(dims, NumericData::Double(values)))
    }
}

impl From<&str> for Value {
    /// A `1xN` char row
    fn from(text: &str) -> Self {
        Value::Char(CharArray::row(text))
    }
}

impl From<NumericArray> for Value {
    fn from(array: NumericArray) -> Self {
        Value::Numeric(array)
    }
}

impl From<StructArray> for Value {
    fn from(array: StructArray) -> Self {
        Value::Struct(array)
    }
}

impl From<CellArray> for Value {
    fn from(array: CellArray) -> Self {
        Value::Cell(array)
    }
}

/// A numeric or logical array, with its elements in column-major order
#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    pub dims: Vec<usize>,
    pub data: NumericData,
}

impl NumericArray {
    pub fn new(dims: Vec<usize>, data: NumericData) -> Self {
        Self { dims, data }
    }
}

/// The elements of a [`NumericArray`], typed by their MATLAB class
#[derive(Debug, Clone, PartialEq)]
pub enum NumericData {
    Double(Vec<f64>),
    Single(Vec<f32>),
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Logical(Vec<bool>),
}

/// Convert any [`NumericData`] into a vector of another primitive with `as` semantics
macro_rules! cast_vec {
    ($data:expr, $t:ty) => {
        match $data {
            NumericData::Double(v) => v.into_iter().map(|x| x as $t).collect::<Vec<$t>>(),
            NumericData::Single(v) => v.into_iter().map(|x| x as $t).collect(),
            NumericData::Int8(v) => v.into_iter().map(|x| x as $t).collect(),
            NumericData::UInt8(v) => v.into_iter().map(|x| x as $t).collect(),
            NumericData::Int16(v) => v.into_iter().map(|x| x as $t).collect(),
            NumericData::UInt16(v) => v.into_iter().map(|x| x as $t).collect(),
            NumericData::Int32(v) => v.into_iter().map(|x| x as $t).collect(),
            NumericData::UInt32(v) => v.into_iter().map(|x| x as $t).collect(),
            NumericData::Int64(v) => v.into_iter().map(|x| x as $t).collect(),
            NumericData::UInt64(v) => v.into_iter().map(|x| x as $t).collect(),
            NumericData::Logical(v) => v.into_iter().map(|x| x as u8 as $t).collect(),
        }
    };
}

impl NumericData {
    /// The number of elements
    pub fn len(&self) -> usize {
        match self {
            NumericData::Double(v) => v.len(),
            NumericData::Single(v) => v.len(),
            NumericData::Int8(v) => v.len(),
            NumericData::UInt8(v) => v.len(),
            NumericData::Int16(v) => v.len(),
            NumericData::UInt16(v) => v.len(),
            NumericData::Int32(v) => v.len(),
            NumericData::UInt32(v) => v.len(),
            NumericData::Int64(v) => v.len(),
            NumericData::UInt64(v) => v.len(),
            NumericData::Logical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The MATLAB class name of the elements
    pub fn class_name(&self) -> &'static str {
        match self {
            NumericData::Logical(_) => "logical",
            other => other.class().name(),
        }
    }

    /// The MATLAB class matching the element type (`uint8` for logicals)
    pub fn class(&self) -> ArrayClass {
        match self {
            NumericData::Double(_) => ArrayClass::Double,
            NumericData::Single(_) => ArrayClass::Single,
            NumericData::Int8(_) => ArrayClass::Int8,
            NumericData::UInt8(_) | NumericData::Logical(_) => ArrayClass::UInt8,
            NumericData::Int16(_) => ArrayClass::Int16,
            NumericData::UInt16(_) => ArrayClass::UInt16,
            NumericData::Int32(_) => ArrayClass::Int32,
            NumericData::UInt32(_) => ArrayClass::UInt32,
            NumericData::Int64(_) => ArrayClass::Int64,
            NumericData::UInt64(_) => ArrayClass::UInt64,
        }
    }

    /// The NumPy name of the element type, e.g. `float64`
    pub fn dtype(&self) -> &'static str {
        match self {
            NumericData::Double(_) => "float64",
            NumericData::Single(_) => "float32",
            NumericData::Int8(_) => "int8",
            NumericData::UInt8(_) => "uint8",
            NumericData::Int16(_) => "int16",
            NumericData::UInt16(_) => "uint16",
            NumericData::Int32(_) => "int32",
            NumericData::UInt32(_) => "uint32",
            NumericData::Int64(_) => "int64",
            NumericData::UInt64(_) => "uint64",
            NumericData::Logical(_) => "bool",
        }
    }

    /// Convert the elements to the type belonging to a numeric class
    ///
    /// MATLAB stores data in the smallest type that holds every value without loss, so a
    /// `double` array of small integers might be stored as `uint8` on disk. Returns [`None`]
    /// for non-numeric classes.
    pub fn cast(self, class: ArrayClass, logical: bool) -> Option<Self> {
        if logical {
            let bytes = cast_vec!(self, u8);
            return Some(NumericData::Logical(
                bytes.into_iter().map(|byte| byte != 0).collect(),
            ));
        }

        Some(match class {
            ArrayClass::Double => NumericData::Double(cast_vec!(self, f64)),
            ArrayClass::Single => NumericData::Single(cast_vec!(self, f32)),
            ArrayClass::Int8 => NumericData::Int8(cast_vec!(self, i8)),
            ArrayClass::UInt8 => NumericData::UInt8(cast_vec!(self, u8)),
            ArrayClass::Int16 => NumericData::Int16(cast_vec!(self, i16)),
            ArrayClass::UInt16 => NumericData::UInt16(cast_vec!(self, u16)),
            ArrayClass::Int32 => NumericData::Int32(cast_vec!(self, i32)),
            ArrayClass::UInt32 => NumericData::UInt32(cast_vec!(self, u32)),
            ArrayClass::Int64 => NumericData::Int64(cast_vec!(self, i64)),
            ArrayClass::UInt64 => NumericData::UInt64(cast_vec!(self, u64)),
            _ => return None,
        })
    }
}

/// A char matrix, decoded into one string per row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharArray {
    pub dims: Vec<usize>,
    pub rows: Vec<String>,
}

impl CharArray {
    /// A single `1xN` row of characters
    pub fn row(text: &str) -> Self {
        Self {
            dims: vec![1, text.chars().count()],
            rows: vec![text.to_owned()],
        }
    }
}

/// A struct array: every element holds one value per field
#[derive(Debug, Clone, PartialEq)]
pub struct StructArray {
    pub dims: Vec<usize>,
    pub fields: Vec<String>,

    /// One entry per element (column-major), each holding the values in `fields` order
    pub elements: Vec<Vec<Value>>,
}

impl StructArray {
    /// A `1x1` struct
    pub fn scalar<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let (fields, values) = fields
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .unzip();

        Self {
            dims: vec![1, 1],
            fields,
            elements: vec![values],
        }
    }

    /// Look up a field of the element at `index`
    pub fn get(&self, index: usize, field: &str) -> Option<&Value> {
        let position = self.fields.iter().position(|name| name == field)?;
        self.elements.get(index)?.get(position)
    }
}

/// A cell array, with its cells in column-major order
#[derive(Debug, Clone, PartialEq)]
pub struct CellArray {
    pub dims: Vec<usize>,
    pub cells: Vec<Value>,
}

impl CellArray {
    /// A `1xN` cell row
    pub fn row(cells: Vec<Value>) -> Self {
        Self {
            dims: vec![1, cells.len()],
            cells,
        }
    }
}

/// A value that was skipped while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsupported {
    pub dims: Vec<usize>,
    pub description: &'static str,
}
