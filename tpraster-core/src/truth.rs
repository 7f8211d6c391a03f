//! Simulation truth carried alongside trigger primitives.
//!
//! Clustering never looks at these values. They are bookkept so the dataset
//! builder can attach labels and kinematics to each image.

use crate::primitive::Primitive;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Generator label of the particle that produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GeneratorLabel {
    /// Radiological or noise background.
    Background,
    /// Supernova-neutrino interaction (MARLEY).
    Marley,
    /// Any other generator code.
    Other(i32),
}

impl GeneratorLabel {
    /// Decodes the integer generator code used in TP tables.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Background,
            1 => Self::Marley,
            other => Self::Other(other),
        }
    }

    /// Integer code for output.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Background => 0,
            Self::Marley => 1,
            Self::Other(code) => code,
        }
    }

    /// Returns true for the signal generator.
    #[inline]
    #[must_use]
    pub fn is_signal(self) -> bool {
        matches!(self, Self::Marley)
    }
}

/// Truth attached to a single trigger primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TpTruth {
    pub label: GeneratorLabel,
    pub is_main_track: bool,
    /// True interaction vertex (cm).
    pub position: Option<[f64; 3]>,
    /// True direction or momentum of the primary.
    pub direction: Option<[f64; 3]>,
    /// True neutrino energy (MeV).
    pub neutrino_energy: Option<f64>,
    /// True primary-particle energy (MeV).
    pub particle_energy: Option<f64>,
    /// Interaction-type flag (e.g. CC=0, ES=1).
    pub interaction_type: Option<i32>,
}

impl TpTruth {
    /// Truth for a pure background hit.
    #[must_use]
    pub fn background() -> Self {
        Self {
            label: GeneratorLabel::Background,
            is_main_track: false,
            position: None,
            direction: None,
            neutrino_energy: None,
            particle_energy: None,
            interaction_type: None,
        }
    }
}

/// Truth summary for a whole cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterTruth {
    /// Majority generator label among tagged members.
    pub true_label: GeneratorLabel,
    /// Fraction of tagged members produced by the signal generator.
    pub marley_fraction: f64,
    /// True if any member belongs to the main track.
    pub is_main_track: bool,
    /// Kinematics of the first signal member, or the first member otherwise.
    pub kinematics: TpTruth,
}

impl ClusterTruth {
    /// Summarises member truth. Returns `None` when no member carries truth.
    ///
    /// Label ties resolve to the smallest label, so the result does not
    /// depend on member order.
    #[must_use]
    pub fn from_members<P: Primitive>(members: &[P]) -> Option<Self> {
        let tagged: Vec<&TpTruth> = members.iter().filter_map(Primitive::truth).collect();
        let first = *tagged.first()?;

        let mut counts: Vec<(GeneratorLabel, usize)> = Vec::new();
        for truth in &tagged {
            match counts.iter_mut().find(|(label, _)| *label == truth.label) {
                Some((_, n)) => *n += 1,
                None => counts.push((truth.label, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let true_label = counts[0].0;

        let n_signal = tagged.iter().filter(|t| t.label.is_signal()).count();
        #[allow(clippy::cast_precision_loss)]
        let marley_fraction = n_signal as f64 / tagged.len() as f64;

        let kinematics = tagged
            .iter()
            .find(|t| t.label.is_signal())
            .copied()
            .copied()
            .unwrap_or(*first);

        Some(Self {
            true_label,
            marley_fraction,
            is_main_track: tagged.iter().any(|t| t.is_main_track),
            kinematics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{TaggedPrimitive, TriggerPrimitive};
    use approx::assert_relative_eq;

    fn tagged(label: GeneratorLabel, energy: Option<f64>) -> TaggedPrimitive {
        let tp = TriggerPrimitive::new(0, 10, 4, 1, 500.0, 100.0, 0).unwrap();
        let truth = TpTruth {
            label,
            neutrino_energy: energy,
            ..TpTruth::background()
        };
        TaggedPrimitive::new(tp, Some(truth))
    }

    #[test]
    fn test_generator_codes() {
        assert_eq!(GeneratorLabel::from_code(1), GeneratorLabel::Marley);
        assert_eq!(GeneratorLabel::from_code(7).code(), 7);
        assert!(!GeneratorLabel::Background.is_signal());
    }

    #[test]
    fn test_cluster_truth_majority_and_fraction() {
        let members = vec![
            tagged(GeneratorLabel::Background, None),
            tagged(GeneratorLabel::Marley, Some(12.5)),
            tagged(GeneratorLabel::Marley, Some(30.0)),
        ];
        let truth = ClusterTruth::from_members(&members).unwrap();
        assert_eq!(truth.true_label, GeneratorLabel::Marley);
        assert_relative_eq!(truth.marley_fraction, 2.0 / 3.0);
        assert_eq!(truth.kinematics.neutrino_energy, Some(12.5));
    }

    #[test]
    fn test_cluster_truth_tie_breaks_to_smallest_label() {
        let members = vec![
            tagged(GeneratorLabel::Marley, None),
            tagged(GeneratorLabel::Background, None),
        ];
        let truth = ClusterTruth::from_members(&members).unwrap();
        assert_eq!(truth.true_label, GeneratorLabel::Background);
    }

    #[test]
    fn test_cluster_truth_absent_without_tags() {
        let tp = TriggerPrimitive::new(0, 10, 4, 1, 500.0, 100.0, 0).unwrap();
        assert!(ClusterTruth::from_members(&[tp]).is_none());
    }
}
