//! Purpose: Cutoff-radius pair-geometry evaluation over a structure.
//! Exports: `Calculator`, `PairSummary`.
//! Role: Gives the ABI facade a real fallible, logging, serializing operation.
//! Invariants: One diagnostic message per run, emitted through the context.
//! Invariants: Evaluation never mutates the structure or the calculator.
use crate::core::context::Context;
use crate::core::error::{Error, ErrorKind};
use crate::core::structure::Structure;
use serde::Serialize;

#[derive(Debug)]
pub struct Calculator {
    cutoff: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PairSummary {
    pub particles: usize,
    pub pairs: usize,
    pub pairs_within_cutoff: usize,
    pub min_distance: Option<f64>,
    pub mean_distance_within_cutoff: Option<f64>,
    pub cutoff: f64,
}

impl Calculator {
    pub fn new(cutoff: f64) -> Result<Self, Error> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(Error::new(ErrorKind::Validation)
                .with_message(format!("cutoff must be finite and positive, got {cutoff}"))
                .with_operation("calculator_new"));
        }
        Ok(Self { cutoff })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Evaluates all unique pairs and emits one summary line through the
    /// context's sink. Quadratic in the particle count.
    pub fn run(&self, ctx: &Context, structure: &Structure) -> Result<PairSummary, Error> {
        let positions = structure.positions();
        let particles = positions.len();

        let mut pairs = 0usize;
        let mut within = 0usize;
        let mut min_distance: Option<f64> = None;
        let mut within_total = 0.0f64;

        for i in 0..particles {
            for j in (i + 1)..particles {
                let distance = distance(positions[i], positions[j]);
                pairs += 1;
                min_distance = Some(match min_distance {
                    Some(current) => current.min(distance),
                    None => distance,
                });
                if distance <= self.cutoff {
                    within += 1;
                    within_total += distance;
                }
            }
        }

        let summary = PairSummary {
            particles,
            pairs,
            pairs_within_cutoff: within,
            min_distance,
            mean_distance_within_cutoff: if within > 0 {
                Some(within_total / within as f64)
            } else {
                None
            },
            cutoff: self.cutoff,
        };

        tracing::debug!(
            target: "siderite::calc",
            particles,
            pairs,
            within,
            "pair evaluation finished"
        );
        ctx.emit(&format!("evaluated {pairs} pairs, {within} within cutoff"));
        Ok(summary)
    }
}

impl PairSummary {
    pub fn to_json(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to serialize pair summary")
                .with_operation("calculator_run")
                .with_source(err)
        })
    }
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::Calculator;
    use crate::core::context::Context;
    use crate::core::error::ErrorKind;
    use crate::core::structure::Structure;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn chain_of_three() -> Structure {
        // Three particles on a line, spacings 1.0 and 1.0 (outer pair at 2.0).
        Structure::new(
            vec![6, 6, 6],
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
        )
        .expect("valid chain")
    }

    #[test]
    fn rejects_nonpositive_or_nonfinite_cutoff() {
        assert_eq!(
            Calculator::new(0.0).unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Calculator::new(f64::NAN).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn summarizes_known_geometry() {
        let calc = Calculator::new(1.5).expect("calculator");
        let summary = calc
            .run(&Context::new(), &chain_of_three())
            .expect("summary");

        assert_eq!(summary.particles, 3);
        assert_eq!(summary.pairs, 3);
        assert_eq!(summary.pairs_within_cutoff, 2);
        assert_eq!(summary.min_distance, Some(1.0));
        assert_eq!(summary.mean_distance_within_cutoff, Some(1.0));
    }

    #[test]
    fn single_particle_has_no_pairs() {
        let calc = Calculator::new(1.0).expect("calculator");
        let structure = Structure::new(vec![2], vec![[0.0; 3]]).expect("lone atom");
        let summary = calc.run(&Context::new(), &structure).expect("summary");

        assert_eq!(summary.pairs, 0);
        assert_eq!(summary.min_distance, None);
        assert_eq!(summary.mean_distance_within_cutoff, None);
    }

    #[test]
    fn run_emits_exactly_one_message() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink_calls = Arc::clone(&calls);

        let mut ctx = Context::new();
        ctx.set_sink(Some(Box::new(move |_bytes| {
            sink_calls.fetch_add(1, Ordering::SeqCst);
        })));

        let calc = Calculator::new(1.5).expect("calculator");
        calc.run(&ctx, &chain_of_three()).expect("summary");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn summary_json_has_documented_fields() {
        let calc = Calculator::new(1.5).expect("calculator");
        let summary = calc
            .run(&Context::new(), &chain_of_three())
            .expect("summary");
        let bytes = summary.to_json().expect("json");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("parse");

        assert_eq!(value["particles"], 3);
        assert_eq!(value["pairs_within_cutoff"], 2);
        assert_eq!(value["cutoff"], 1.5);
    }
}
