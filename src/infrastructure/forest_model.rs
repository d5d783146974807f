// Random forest loaded from a JSON export of per-tree node arrays
use serde::Deserialize;

use crate::application::decision_model::DecisionModel;

/// Marker for "no child" in `children_left` / `children_right`.
const TREE_LEAF: i64 = -1;

#[derive(Debug, Deserialize)]
struct ForestFile {
    n_features: usize,
    n_classes: usize,
    estimators: Vec<EstimatorFile>,
}

#[derive(Debug, Deserialize)]
struct EstimatorFile {
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    value: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Class distribution normalised to sum to 1.
    Leaf(Vec<f64>),
}

#[derive(Debug, Clone)]
pub struct RandomForestModel {
    trees: Vec<Vec<Node>>,
    num_features: usize,
    num_classes: usize,
}

impl RandomForestModel {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: ForestFile = serde_json::from_str(json)?;
        Self::from_file(file).map_err(serde::de::Error::custom)
    }

    fn from_file(file: ForestFile) -> Result<Self, String> {
        if file.estimators.is_empty() {
            return Err("forest has no estimators".to_string());
        }
        if file.n_classes < 2 {
            return Err(format!("forest has {} classes", file.n_classes));
        }

        let trees = file
            .estimators
            .iter()
            .enumerate()
            .map(|(i, estimator)| convert_estimator(i, estimator, file.n_features, file.n_classes))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            trees,
            num_features: file.n_features,
            num_classes: file.n_classes,
        })
    }
}

fn convert_estimator(
    index: usize,
    estimator: &EstimatorFile,
    num_features: usize,
    num_classes: usize,
) -> Result<Vec<Node>, String> {
    let n = estimator.children_left.len();
    if n == 0
        || estimator.children_right.len() != n
        || estimator.feature.len() != n
        || estimator.threshold.len() != n
        || estimator.value.len() != n
    {
        return Err(format!("estimator {index} has empty or mismatched node arrays"));
    }

    let child = |node: usize, raw: i64| {
        usize::try_from(raw)
            .ok()
            .filter(|&c| c > node && c < n)
            .ok_or_else(|| format!("estimator {index} node {node} has bad child {raw}"))
    };

    (0..n)
        .map(|i| {
            if estimator.children_left[i] == TREE_LEAF {
                let counts = &estimator.value[i];
                if counts.len() != num_classes {
                    return Err(format!(
                        "estimator {index} leaf {i} has {} class values, expected {num_classes}",
                        counts.len()
                    ));
                }
                let total: f64 = counts.iter().sum();
                let distribution = if total > 0.0 {
                    counts.iter().map(|c| c / total).collect()
                } else {
                    vec![0.0; num_classes]
                };
                return Ok(Node::Leaf(distribution));
            }

            let feature = usize::try_from(estimator.feature[i])
                .ok()
                .filter(|&f| f < num_features)
                .ok_or_else(|| {
                    format!("estimator {index} node {i} splits on feature {}", estimator.feature[i])
                })?;

            Ok(Node::Split {
                feature,
                threshold: estimator.threshold[i],
                left: child(i, estimator.children_left[i])?,
                right: child(i, estimator.children_right[i])?,
            })
        })
        .collect()
}

fn leaf<'a>(nodes: &'a [Node], features: &[f64]) -> &'a [f64] {
    let mut idx = 0;
    loop {
        match &nodes[idx] {
            Node::Leaf(distribution) => return distribution,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                idx = if features[*feature] <= *threshold { *left } else { *right };
            }
        }
    }
}

impl DecisionModel for RandomForestModel {
    fn num_features(&self) -> usize {
        self.num_features
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Argmax of the mean leaf distribution across trees; ties go to the lower class.
    fn predict_class(&self, features: &[f64]) -> usize {
        let mut totals = vec![0.0; self.num_classes];
        for tree in &self.trees {
            for (total, p) in totals.iter_mut().zip(leaf(tree, features)) {
                *total += p;
            }
        }

        totals
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (class, &p)| {
                if p > best.1 { (class, p) } else { best }
            })
            .0
    }
}
