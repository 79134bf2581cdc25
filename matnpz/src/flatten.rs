//! Flattening of nested MATLAB values into named arrays
//!
//! NumPy archives are flat: a mapping from name to array. Struct fields are joined onto their
//! parent's name with `_`, elements of struct arrays and cells get their (zero-based) index
//! appended the same way, and every array has its singleton dimensions squeezed out. A single
//! element cell or struct array collapses onto its parent name.

use crate::mat::{MatFile, NumericData, Value};
use thiserror::Error;

/// A named array, ready to be written to an archive
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    /// The archive name (before canonical renaming)
    pub name: String,

    /// Where the array came from, in MATLAB syntax (e.g. `meas.Voltage` or `runs{2}`)
    pub source: String,

    /// Squeezed dimensions, empty for scalars
    pub shape: Vec<usize>,

    pub data: ArrayData,
}

/// The elements of an [`Array`]
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// Numbers in column-major order
    Numeric(NumericData),

    /// One string per element
    Text(Vec<String>),
}

impl ArrayData {
    /// The NumPy dtype string, e.g. `float64` or `<U9`
    pub fn dtype(&self) -> String {
        match self {
            ArrayData::Numeric(data) => data.dtype().to_owned(),
            ArrayData::Text(values) => format!("<U{}", text_width(values)),
        }
    }
}

/// The number of characters per element of a NumPy unicode array holding `values`
pub fn text_width(values: &[String]) -> usize {
    values
        .iter()
        .map(|value| value.chars().count())
        .max()
        .unwrap_or(0)
        .max(1)
}

/// A value that had to be left out of the flattened output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub source: String,
    pub class: &'static str,
}

/// The outcome of [`flatten()`]
#[derive(Debug, Default)]
pub struct Flattened {
    pub arrays: Vec<Array>,
    pub skipped: Vec<Skipped>,
}

/// Flatten every variable in a MAT-file into named arrays
///
/// Variables starting with `__` are ignored. When the file holds nothing but a single scalar
/// struct, that struct's fields are treated as the top-level variables.
pub fn flatten(file: &MatFile) -> Result<Flattened, FlattenError> {
    let variables: Vec<_> = file
        .variables
        .iter()
        .filter(|variable| !variable.name.starts_with("__"))
        .collect();

    let mut flattened = Flattened::default();

    match variables.as_slice() {
        [only] => match &only.value {
            Value::Struct(array) if array.elements.len() == 1 => {
                for (field, value) in array.fields.iter().zip(&array.elements[0]) {
                    let source = format!("{}.{field}", only.name);
                    flattened.push_value(field.clone(), source, value)?;
                }
            }
            value => flattened.push_value(only.name.clone(), only.name.clone(), value)?,
        },
        variables => {
            for variable in variables {
                flattened.push_value(variable.name.clone(), variable.name.clone(), &variable.value)?;
            }
        }
    }

    Ok(flattened)
}

impl Flattened {
    fn push_value(&mut self, name: String, source: String, value: &Value) -> Result<(), FlattenError> {
        match value {
            Value::Numeric(array) => self.push(Array {
                name,
                source,
                shape: squeeze(&array.dims),
                data: ArrayData::Numeric(array.data.clone()),
            })?,
            Value::Char(array) => {
                let (shape, values) = match array.rows.len() {
                    0 => (vec![], vec![String::new()]),
                    1 => (vec![], array.rows.clone()),
                    rows => (vec![rows], array.rows.clone()),
                };

                self.push(Array {
                    name,
                    source,
                    shape,
                    data: ArrayData::Text(values),
                })?
            }
            Value::Struct(array) => {
                let single = array.elements.len() == 1;
                for (index, element) in array.elements.iter().enumerate() {
                    for (field, value) in array.fields.iter().zip(element) {
                        let (name, source) = if single {
                            (join(&name, field), format!("{source}.{field}"))
                        } else {
                            (
                                join(&join(&name, &index.to_string()), field),
                                format!("{source}({}).{field}", index + 1),
                            )
                        };
                        self.push_value(name, source, value)?;
                    }
                }
            }
            Value::Cell(array) => match array.cells.as_slice() {
                [only] => self.push_value(name, format!("{source}{{1}}"), only)?,
                cells => {
                    for (index, cell) in cells.iter().enumerate() {
                        let source = format!("{source}{{{}}}", index + 1);
                        self.push_value(join(&name, &index.to_string()), source, cell)?;
                    }
                }
            },
            Value::Unsupported(unsupported) => {
                log::warn!(
                    "Skipping {source}: values of class {} are not supported",
                    unsupported.description
                );
                self.skipped.push(Skipped {
                    source,
                    class: unsupported.description,
                });
            }
        }

        Ok(())
    }

    fn push(&mut self, array: Array) -> Result<(), FlattenError> {
        if self.arrays.iter().any(|existing| existing.name == array.name) {
            return Err(FlattenError::DuplicateName(array.name));
        }

        self.arrays.push(array);
        Ok(())
    }
}

fn join(prefix: &str, part: &str) -> String {
    if prefix.is_empty() {
        part.to_owned()
    } else {
        format!("{prefix}_{part}")
    }
}

/// Remove every dimension of length one
pub fn squeeze(dims: &[usize]) -> Vec<usize> {
    dims.iter().copied().filter(|dim| *dim != 1).collect()
}

/// Errors that might be returned from [`flatten()`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlattenError {
    /// Two values flattened onto the same name
    #[error("Duplicate key '{0}' encountered while flattening data")]
    DuplicateName(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mat::{CellArray, NumericArray, StructArray, Unsupported, Variable};

    fn names(flattened: &Flattened) -> Vec<&str> {
        flattened.arrays.iter().map(|array| array.name.as_str()).collect()
    }

    #[test]
    fn squeezes_dimensions() {
        assert_eq!(squeeze(&[1, 1]), Vec::<usize>::new());
        assert_eq!(squeeze(&[1, 4096]), vec![4096]);
        assert_eq!(squeeze(&[4096, 1, 2]), vec![4096, 2]);
        assert_eq!(squeeze(&[0, 0]), vec![0, 0]);
    }

    #[test]
    fn nested_structs_and_cells() {
        let inner = StructArray::scalar([("Sensitivity", Value::from(0.52))]);
        let meas = StructArray::scalar([
            ("Voltage", Value::from(vec![1.0, 2.0])),
            ("Laser", inner.into()),
        ]);
        let runs = CellArray::row(vec![Value::from(1.0), Value::from("second")]);

        let file = MatFile::new(vec![Variable::new("meas", meas), Variable::new("runs", runs)]);
        let flattened = flatten(&file).unwrap();

        assert_eq!(
            names(&flattened),
            vec!["meas_Voltage", "meas_Laser_Sensitivity", "runs_0", "runs_1"]
        );
        assert_eq!(flattened.arrays[1].source, "meas.Laser.Sensitivity");
        assert_eq!(flattened.arrays[3].source, "runs{2}");
        assert_eq!(
            flattened.arrays[3].data,
            ArrayData::Text(vec!["second".to_owned()])
        );
    }

    #[test]
    fn single_struct_is_unwrapped() {
        let meas = StructArray::scalar([
            ("Voltage", Value::from(vec![1.0, 2.0])),
            ("Fs", Value::from(1000.0)),
        ]);
        let file = MatFile::new(vec![Variable::new("meas", meas)]);

        let flattened = flatten(&file).unwrap();
        assert_eq!(names(&flattened), vec!["Voltage", "Fs"]);
        assert_eq!(flattened.arrays[0].shape, vec![2]);
        assert_eq!(flattened.arrays[1].shape, Vec::<usize>::new());
        assert_eq!(flattened.arrays[1].source, "meas.Fs");
    }

    #[test]
    fn struct_arrays_are_indexed() {
        let mut runs = StructArray::scalar([("Level", Value::from(1.0))]);
        runs.dims = vec![1, 2];
        runs.elements.push(vec![Value::from(2.0)]);

        let file = MatFile::new(vec![Variable::new("runs", runs), Variable::new("Fs", 48000.0)]);
        let flattened = flatten(&file).unwrap();

        assert_eq!(names(&flattened), vec!["runs_0_Level", "runs_1_Level", "Fs"]);
        assert_eq!(flattened.arrays[1].source, "runs(2).Level");
    }

    #[test]
    fn duplicate_names() {
        let meas = StructArray::scalar([("x", Value::from(1.0))]);
        let file = MatFile::new(vec![
            Variable::new("meas", meas),
            Variable::new("meas_x", 2.0),
        ]);

        assert_eq!(
            flatten(&file).unwrap_err(),
            FlattenError::DuplicateName("meas_x".to_owned())
        );
    }

    #[test]
    fn unsupported_values_are_skipped() {
        let sparse = Value::Unsupported(Unsupported {
            dims: vec![3, 3],
            description: "sparse",
        });
        let file = MatFile::new(vec![
            Variable::new("A", sparse),
            Variable::new("b", NumericArray::new(vec![3, 1], NumericData::Int32(vec![1, 2, 3]))),
        ]);

        let flattened = flatten(&file).unwrap();
        assert_eq!(names(&flattened), vec!["b"]);
        assert_eq!(flattened.skipped[0].class, "sparse");
    }

    #[test]
    fn char_matrix_becomes_string_vector() {
        let mut labels = crate::mat::CharArray::row("ab");
        labels.dims = vec![2, 2];
        labels.rows.push("cd".to_owned());

        let file = MatFile::new(vec![Variable::new("labels", Value::Char(labels)), Variable::new("x", 1.0)]);
        let flattened = flatten(&file).unwrap();

        assert_eq!(flattened.arrays[0].shape, vec![2]);
        assert_eq!(flattened.arrays[0].data.dtype(), "<U2");
    }
}
