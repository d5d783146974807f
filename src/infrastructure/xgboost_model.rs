// Gradient-boosted tree ensemble loaded from an XGBoost JSON model export
use serde::Deserialize;

use crate::application::decision_model::DecisionModel;
use crate::domain::errors::ModelLoadError;

#[derive(Debug, Deserialize)]
struct ModelFile {
    learner: Learner,
}

#[derive(Debug, Deserialize)]
struct Learner {
    gradient_booster: GradientBooster,
    learner_model_param: LearnerModelParam,
    #[serde(default)]
    objective: Option<Objective>,
}

#[derive(Debug, Deserialize)]
struct GradientBooster {
    model: BoosterModel,
}

#[derive(Debug, Deserialize)]
struct BoosterModel {
    trees: Vec<TreeFile>,
    tree_info: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    base_score: String,
    num_class: String,
    num_feature: String,
}

#[derive(Debug, Deserialize)]
struct Objective {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TreeFile {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f64>,
    default_left: Vec<Flag>,
}

/// Older exports write `default_left` as booleans, newer ones as 0/1.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(u8),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(i) => *i != 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        default_left: bool,
    },
    Leaf(f64),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn leaf_value(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        // children always have larger indices, so this walk terminates
        loop {
            match self.nodes[idx] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = features[feature];
                    idx = if x.is_nan() {
                        if default_left { left } else { right }
                    } else if x < threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct XgboostModel {
    trees: Vec<Tree>,
    tree_groups: Vec<usize>,
    num_features: usize,
    /// 1 for binary logistic output, otherwise the class count.
    num_groups: usize,
    base_margin: f64,
}

fn parse_param<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ModelLoadError> {
    raw.trim_matches(|c| c == '[' || c == ']')
        .parse()
        .map_err(|_| ModelLoadError::Invalid(format!("unreadable {name}: {raw:?}")))
}

impl XgboostModel {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<ModelFile>(json).map(|file| file.learner).and_then(|learner| {
            Self::from_learner(learner).map_err(serde::de::Error::custom)
        })
    }

    fn from_learner(learner: Learner) -> Result<Self, ModelLoadError> {
        let params = &learner.learner_model_param;
        let num_features: usize = parse_param("num_feature", &params.num_feature)?;
        let num_class: usize = parse_param("num_class", &params.num_class)?;
        let base_score: f64 = parse_param("base_score", &params.base_score)?;
        let num_groups = num_class.max(1);

        let logistic = learner
            .objective
            .as_ref()
            .is_some_and(|o| o.name.contains("logistic"));
        let base_margin = if num_groups == 1 && logistic {
            if base_score <= 0.0 || base_score >= 1.0 {
                return Err(ModelLoadError::Invalid(format!(
                    "logistic base_score {base_score} outside (0, 1)"
                )));
            }
            (base_score / (1.0 - base_score)).ln()
        } else {
            base_score
        };

        let model = learner.gradient_booster.model;
        if model.tree_info.len() != model.trees.len() {
            return Err(ModelLoadError::Invalid(format!(
                "{} trees but {} tree_info entries",
                model.trees.len(),
                model.tree_info.len()
            )));
        }
        if let Some(group) = model.tree_info.iter().find(|&&g| g >= num_groups) {
            return Err(ModelLoadError::Invalid(format!(
                "tree assigned to class {group}, model has {num_groups} output groups"
            )));
        }

        let trees = model
            .trees
            .iter()
            .enumerate()
            .map(|(i, tree)| convert_tree(i, tree, num_features))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            trees,
            tree_groups: model.tree_info,
            num_features,
            num_groups,
            base_margin,
        })
    }

    fn margins(&self, features: &[f64]) -> Vec<f64> {
        let mut margins = vec![self.base_margin; self.num_groups];
        for (tree, &group) in self.trees.iter().zip(&self.tree_groups) {
            margins[group] += tree.leaf_value(features);
        }
        margins
    }
}

fn convert_tree(index: usize, tree: &TreeFile, num_features: usize) -> Result<Tree, ModelLoadError> {
    let n = tree.left_children.len();
    if n == 0
        || tree.right_children.len() != n
        || tree.split_indices.len() != n
        || tree.split_conditions.len() != n
        || tree.default_left.len() != n
    {
        return Err(ModelLoadError::Invalid(format!(
            "tree {index} has empty or mismatched node arrays"
        )));
    }

    let child = |node: usize, raw: i64| -> Result<usize, ModelLoadError> {
        usize::try_from(raw)
            .ok()
            .filter(|&c| c > node && c < n)
            .ok_or_else(|| {
                ModelLoadError::Invalid(format!("tree {index} node {node} has bad child {raw}"))
            })
    };

    let mut nodes = Vec::with_capacity(n);
    for i in 0..n {
        if tree.left_children[i] == -1 {
            nodes.push(Node::Leaf(tree.split_conditions[i]));
            continue;
        }

        let feature = usize::try_from(tree.split_indices[i])
            .ok()
            .filter(|&f| f < num_features)
            .ok_or_else(|| {
                ModelLoadError::Invalid(format!(
                    "tree {index} node {i} splits on feature {}",
                    tree.split_indices[i]
                ))
            })?;

        nodes.push(Node::Split {
            feature,
            threshold: tree.split_conditions[i],
            left: child(i, tree.left_children[i])?,
            right: child(i, tree.right_children[i])?,
            default_left: tree.default_left[i].is_set(),
        });
    }

    Ok(Tree { nodes })
}

impl DecisionModel for XgboostModel {
    fn num_features(&self) -> usize {
        self.num_features
    }

    fn num_classes(&self) -> usize {
        if self.num_groups == 1 { 2 } else { self.num_groups }
    }

    fn predict_class(&self, features: &[f64]) -> usize {
        let margins = self.margins(features);
        if self.num_groups == 1 {
            return usize::from(margins[0] > 0.0);
        }

        margins
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (class, &m)| {
                if m > best.1 { (class, m) } else { best }
            })
            .0
    }
}
