//! Purpose: Validated particle geometry owned behind a structure handle.
//! Exports: `Structure`.
//! Role: The main payload object exposed across the ABI boundary.
//! Invariants: A constructed structure always holds finite coordinates and
//! Invariants: one position triple per species number; invalid input never
//! Invariants: produces a partially initialized value.
use crate::core::error::{Error, ErrorKind};
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct Structure {
    numbers: Vec<i32>,
    positions: Vec<[f64; 3]>,
}

impl Structure {
    pub fn new(numbers: Vec<i32>, positions: Vec<[f64; 3]>) -> Result<Self, Error> {
        if numbers.is_empty() {
            return Err(Error::new(ErrorKind::Validation)
                .with_message("structure must contain at least one particle")
                .with_operation("structure_new"));
        }
        if positions.len() != numbers.len() {
            return Err(Error::new(ErrorKind::Validation)
                .with_message(format!(
                    "expected {} position triples, got {}",
                    numbers.len(),
                    positions.len()
                ))
                .with_operation("structure_new"));
        }
        if let Some(number) = numbers.iter().find(|number| **number <= 0) {
            return Err(Error::new(ErrorKind::Validation)
                .with_message(format!("species number must be positive, got {number}"))
                .with_operation("structure_new"));
        }
        check_finite(&positions, "structure_new")?;
        Ok(Self { numbers, positions })
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn numbers(&self) -> &[i32] {
        &self.numbers
    }

    pub fn positions(&self) -> &[[f64; 3]] {
        &self.positions
    }

    /// Replaces all coordinates. The particle count is fixed at construction;
    /// a mismatched update leaves the structure untouched.
    pub fn update_positions(&mut self, positions: Vec<[f64; 3]>) -> Result<(), Error> {
        if positions.len() != self.numbers.len() {
            return Err(Error::new(ErrorKind::Validation)
                .with_message(format!(
                    "expected {} position triples, got {}",
                    self.numbers.len(),
                    positions.len()
                ))
                .with_operation("structure_update_positions"));
        }
        check_finite(&positions, "structure_update_positions")?;
        self.positions = positions;
        Ok(())
    }

    pub fn to_json(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to serialize structure")
                .with_operation("structure_to_json")
                .with_source(err)
        })
    }
}

fn check_finite(positions: &[[f64; 3]], operation: &'static str) -> Result<(), Error> {
    for (index, triple) in positions.iter().enumerate() {
        if triple.iter().any(|component| !component.is_finite()) {
            return Err(Error::new(ErrorKind::Validation)
                .with_message(format!("position {index} has a non-finite component"))
                .with_operation(operation));
        }
    }
    Ok(())
}
