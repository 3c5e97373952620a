//! Layer naming and probe placement over a feature extractor.

use core::fmt;

use crate::LayerKind;

/// Symbolic name of an extractor layer, e.g. `conv_1` or `relu_3`.
///
/// The block index counts the convolutions seen so far: it starts at 0, increments at every
/// convolution, and is inherited by the activation, pooling and normalization layers that
/// follow until the next convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerName {
    /// Kind of the named layer.
    pub kind: LayerKind,
    /// Block index at the layer.
    pub block: usize,
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.prefix(), self.block)
    }
}

/// Assign a name to every layer, in order.
pub fn name_layers<I>(kinds: I) -> Vec<LayerName>
where
    I: IntoIterator<Item = LayerKind>,
{
    let mut block = 0;

    kinds
        .into_iter()
        .map(|kind| {
            if kind == LayerKind::Convolution {
                block += 1;
            }
            LayerName { kind, block }
        })
        .collect()
}

/// A layer retained by a [tap plan](TapPlan).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLayer {
    /// Position of the layer in the extractor.
    pub index: usize,
    /// Name assigned to the layer.
    pub name: LayerName,
    /// Whether a style probe is inserted right after the layer.
    pub tapped: bool,
}

/// Where probes go, and how much of the extractor is kept to feed them.
///
/// The plan ends at the last tapped layer: everything deeper is never evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TapPlan {
    layers: Vec<PlannedLayer>,
}

impl TapPlan {
    /// Plans probes after every layer whose name is in `requested`.
    ///
    /// Requested names that no layer carries are skipped without error, so the plan may hold
    /// fewer probes than requested. With no probe at all the plan is empty.
    pub fn new<S: AsRef<str>>(kinds: &[LayerKind], requested: &[S]) -> Self {
        let mut layers = name_layers(kinds.iter().copied())
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let label = name.to_string();
                let tapped = requested.iter().any(|r| r.as_ref() == label);
                if tapped {
                    log::debug!("Tapping {label} at layer {index}");
                }
                PlannedLayer {
                    index,
                    name,
                    tapped,
                }
            })
            .collect::<Vec<_>>();

        let retained = layers
            .iter()
            .rposition(|layer| layer.tapped)
            .map_or(0, |last| last + 1);
        layers.truncate(retained);

        Self { layers }
    }

    /// The retained layers, in extractor order.
    pub fn layers(&self) -> &[PlannedLayer] {
        &self.layers
    }

    /// Number of probes in the plan.
    pub fn num_probes(&self) -> usize {
        self.layers.iter().filter(|layer| layer.tapped).count()
    }

    /// Names of the tapped layers, in extractor order.
    pub fn tapped_names(&self) -> Vec<LayerName> {
        self.layers
            .iter()
            .filter(|layer| layer.tapped)
            .map(|layer| layer.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LayerKind::*;

    fn labels(names: &[LayerName]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn block_index_only_moves_at_convolutions() {
        let names = name_layers([Convolution, Activation, Convolution, Activation, Pooling, Convolution]);

        assert_eq!(
            labels(&names),
            ["conv_1", "relu_1", "conv_2", "relu_2", "pool_2", "conv_3"]
        );
    }

    #[test]
    fn layers_before_first_convolution_are_block_zero() {
        let names = name_layers([Normalization, Pooling, Convolution, Normalization]);

        assert_eq!(labels(&names), ["bn_0", "pool_0", "conv_1", "bn_1"]);
    }

    #[test]
    fn plan_truncates_after_last_probe() {
        let kinds = [Convolution, Activation, Convolution, Activation, Pooling, Convolution];

        let plan = TapPlan::new(&kinds, &["conv_1", "relu_2"]);

        assert_eq!(plan.num_probes(), 2);
        assert_eq!(plan.layers().len(), 4);
        assert_eq!(labels(&plan.tapped_names()), ["conv_1", "relu_2"]);
        assert!(plan.layers().last().unwrap().tapped);
    }

    #[test]
    fn plan_follows_extractor_order() {
        let kinds = [Convolution, Activation, Convolution, Activation];

        let plan = TapPlan::new(&kinds, &["conv_2", "conv_1"]);

        assert_eq!(labels(&plan.tapped_names()), ["conv_1", "conv_2"]);
    }

    #[test]
    fn unknown_names_are_skipped_silently() {
        let kinds = [Convolution, Activation, Convolution];

        let plan = TapPlan::new(&kinds, &["conv_1", "conv_99"]);

        assert_eq!(plan.num_probes(), 1);
        assert_eq!(plan.layers().len(), 1);
    }

    #[test]
    fn no_match_gives_empty_plan() {
        let kinds = [Convolution, Activation];

        let plan = TapPlan::new(&kinds, &["conv_99"]);

        assert_eq!(plan.num_probes(), 0);
        assert!(plan.layers().is_empty());
    }
}
