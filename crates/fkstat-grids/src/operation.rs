//! Operations combining the FK tables of a compound dataset.

use crate::error::{GridError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of leading operands summed in the numerator of [`Operation::Com`]
const COM_SPLIT: usize = 10;

/// How the predictions of the operands of a dataset are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Option<String>", into = "String")]
pub enum Operation {
    /// Single operand, used as is
    #[default]
    Null,
    /// `a + b`
    Add,
    /// `a / b`
    Ratio,
    /// `(a - b) / (a + b)`
    Asy,
    /// `(a + b) / (c + d)`
    Smn,
    /// Sum of the first ten operands over the sum of the last ten
    Com,
    /// Sum of all operands
    Smt,
}

impl Operation {
    /// Upper-case metadata tag
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Add => "ADD",
            Self::Ratio => "RATIO",
            Self::Asy => "ASY",
            Self::Smn => "SMN",
            Self::Com => "COM",
            Self::Smt => "SMT",
        }
    }

    /// Number of operands the operation needs, `None` for any number
    pub const fn arity(self) -> Option<usize> {
        match self {
            Self::Null => Some(1),
            Self::Add | Self::Ratio | Self::Asy => Some(2),
            Self::Smn => Some(4),
            Self::Com => Some(2 * COM_SPLIT),
            Self::Smt => None,
        }
    }

    /// Combine operand predictions
    ///
    /// # Errors
    /// * [`GridError::Shape`] if the number of operands or their lengths disagree;
    ///   single-point operands are broadcast
    ///
    /// # Example
    /// ```
    /// use fkstat_grids::Operation;
    /// use ndarray::array;
    ///
    /// let out = Operation::Asy.apply(&[array![3.0], array![1.0]]).unwrap();
    /// assert_eq!(out, array![0.5]);
    /// ```
    pub fn apply(self, operands: &[Array1<f64>]) -> Result<Array1<f64>> {
        match self.arity() {
            Some(n) if operands.len() != n => {
                return Err(GridError::Shape(format!(
                    "{} expects {n} operands, got {}",
                    self.tag(),
                    operands.len()
                )));
            }
            None if operands.is_empty() => {
                return Err(GridError::Shape(format!(
                    "{} needs at least one operand",
                    self.tag()
                )));
            }
            _ => {}
        }
        // Single-point operands (repetition flag) broadcast over the others
        let len = operands.iter().map(Array1::len).max().unwrap_or_default();
        if let Some(bad) = operands.iter().find(|o| o.len() != len && o.len() != 1) {
            return Err(GridError::Shape(format!(
                "operands of {} have lengths {len} and {}",
                self.tag(),
                bad.len()
            )));
        }
        let operands: Vec<Array1<f64>> = operands
            .iter()
            .map(|o| {
                if o.len() == len {
                    o.clone()
                } else {
                    Array1::from_elem(len, o[0])
                }
            })
            .collect();

        let sum = |ops: &[Array1<f64>]| {
            ops.iter()
                .fold(Array1::<f64>::zeros(len), |acc, o| acc + o)
        };

        Ok(match self {
            Self::Null => operands[0].clone(),
            Self::Add => &operands[0] + &operands[1],
            Self::Ratio => &operands[0] / &operands[1],
            Self::Asy => {
                (&operands[0] - &operands[1]) / (&operands[0] + &operands[1])
            }
            Self::Smn => sum(&operands[..2]) / sum(&operands[2..]),
            Self::Com => sum(&operands[..COM_SPLIT]) / sum(&operands[COM_SPLIT..]),
            Self::Smt => sum(&operands),
        })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Operation {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "NULL" => Ok(Self::Null),
            "ADD" => Ok(Self::Add),
            "RATIO" => Ok(Self::Ratio),
            "ASY" => Ok(Self::Asy),
            "SMN" => Ok(Self::Smn),
            "COM" => Ok(Self::Com),
            "SMT" => Ok(Self::Smt),
            _ => Err(GridError::UnknownOperation(s.to_string())),
        }
    }
}

impl TryFrom<Option<String>> for Operation {
    type Error = GridError;

    fn try_from(tag: Option<String>) -> Result<Self> {
        tag.map_or(Ok(Self::Null), |t| t.parse())
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.tag().to_string()
    }
}
