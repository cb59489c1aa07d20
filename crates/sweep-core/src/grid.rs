//! Deterministic enumeration of the condition × alpha × seed grid.
//!
//! Task indices are the only way tasks are addressed (they end up in log
//! filenames and cluster array bounds), so the enumeration order below is a
//! public contract: seed outer, alpha middle, directional condition inner,
//! followed by one block of alpha-independent conditions per seed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SweepError};
use crate::{canonical_json_digest, valid_range};

/// Alpha value carried by conditions that ignore the distance weight.
pub const IGNORED_ALPHA: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    TopK,
    BottomK,
    All,
    Random,
}

impl Condition {
    pub fn as_str(self) -> &'static str {
        match self {
            Condition::TopK => "topk",
            Condition::BottomK => "bottomk",
            Condition::All => "all",
            Condition::Random => "random",
        }
    }

    /// Whether alpha ranks the source areas for this condition.
    pub fn is_directional(self) -> bool {
        matches!(self, Condition::TopK | Condition::BottomK)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "topk" => Ok(Condition::TopK),
            "bottomk" => Ok(Condition::BottomK),
            "all" => Ok(Condition::All),
            "random" => Ok(Condition::Random),
            other => Err(SweepError::invalid_grid(format!(
                "unknown condition '{}' (expected topk, bottomk, all or random)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterTuple {
    pub condition: Condition,
    pub alpha: u32,
    pub seed: u32,
}

impl ParameterTuple {
    pub fn new(condition: Condition, alpha: u32, seed: u32) -> Self {
        let alpha = if condition.is_directional() {
            alpha
        } else {
            IGNORED_ALPHA
        };
        Self {
            condition,
            alpha,
            seed,
        }
    }

    /// Alpha as seen by consumers: `None` when the condition ignores it.
    pub fn effective_alpha(&self) -> Option<u32> {
        self.condition.is_directional().then_some(self.alpha)
    }
}

impl fmt::Display for ParameterTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "condition={} alpha={} seed={}",
            self.condition, self.alpha, self.seed
        )
    }
}

/// Axes the grid is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub seeds: Vec<u32>,
    #[serde(default)]
    pub alphas: Vec<u32>,
    #[serde(default)]
    pub directional: Vec<Condition>,
    #[serde(default)]
    pub undirected: Vec<Condition>,
}

impl GridSpec {
    /// Full sweep used by the DGM and RF runners: 80 entries.
    pub fn unified() -> Self {
        Self {
            seeds: (0..=9).collect(),
            alphas: vec![0, 50, 100],
            directional: vec![Condition::TopK, Condition::BottomK],
            undirected: vec![Condition::All, Condition::Random],
        }
    }

    /// `all`-only sweep: one entry per seed.
    pub fn classic() -> Self {
        Self {
            seeds: (0..=9).collect(),
            alphas: vec![0, 50, 100],
            directional: Vec::new(),
            undirected: vec![Condition::All],
        }
    }

    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "unified" => Ok(Self::unified()),
            "classic" => Ok(Self::classic()),
            other => Err(SweepError::invalid_grid(format!(
                "unknown grid preset '{}' (expected unified or classic)",
                other
            ))),
        }
    }

    pub fn with_seeds(mut self, seeds: Vec<u32>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn len(&self) -> usize {
        let per_seed = self.alphas.len() * self.directional.len() + self.undirected.len();
        self.seeds.len() * per_seed
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if let Some(c) = self.directional.iter().find(|c| !c.is_directional()) {
            problems.push(format!("'{}' cannot be used as a directional condition", c));
        }
        if let Some(c) = self.undirected.iter().find(|c| c.is_directional()) {
            problems.push(format!("'{}' requires an alpha and cannot be undirected", c));
        }
        for (axis, dup) in [
            ("seeds", first_duplicate(&self.seeds).map(|s| s.to_string())),
            ("alphas", first_duplicate(&self.alphas).map(|a| a.to_string())),
            (
                "directional",
                first_duplicate(&self.directional).map(|c| c.to_string()),
            ),
            (
                "undirected",
                first_duplicate(&self.undirected).map(|c| c.to_string()),
            ),
        ] {
            if let Some(value) = dup {
                problems.push(format!("duplicate value {} in {}", value, axis));
            }
        }
        if !self.directional.is_empty() && self.alphas.is_empty() {
            problems.push("directional conditions need at least one alpha".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SweepError::invalid_grid(problems.join("; ")))
        }
    }
}

impl Default for GridSpec {
    fn default() -> Self {
        Self::unified()
    }
}

fn first_duplicate<T: PartialEq>(values: &[T]) -> Option<&T> {
    values
        .iter()
        .enumerate()
        .find(|&(i, v)| values[..i].contains(v))
        .map(|(_, v)| v)
}

/// Ordered, read-only task list. `Grid[i]` is the task with index `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grid {
    entries: Vec<ParameterTuple>,
}

impl Grid {
    pub fn build(spec: &GridSpec) -> Result<Self> {
        spec.validate()?;
        let mut entries = Vec::with_capacity(spec.len());
        for &seed in &spec.seeds {
            for &alpha in &spec.alphas {
                for &condition in &spec.directional {
                    entries.push(ParameterTuple::new(condition, alpha, seed));
                }
            }
        }
        for &seed in &spec.seeds {
            for &condition in &spec.undirected {
                entries.push(ParameterTuple::new(condition, IGNORED_ALPHA, seed));
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ParameterTuple] {
        &self.entries
    }

    pub fn get(&self, index: i64) -> Option<&ParameterTuple> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.entries.get(i))
    }

    pub fn check_index(&self, index: i64) -> Result<usize> {
        match usize::try_from(index) {
            Ok(i) if i < self.entries.len() => Ok(i),
            _ => Err(SweepError::OutOfRangeIndex {
                index,
                len: self.entries.len(),
            }),
        }
    }

    /// Inclusive bounds for a scheduler array submission, e.g. `0-79`.
    pub fn array_range(&self) -> Option<String> {
        if self.entries.is_empty() {
            None
        } else {
            Some(format!("0-{}", self.entries.len() - 1))
        }
    }

    pub fn valid_range(&self) -> String {
        valid_range(&self.entries.len())
    }

    pub fn to_json(&self) -> Value {
        let entries: Vec<Value> = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, p)| {
                json!({
                    "index": index,
                    "condition": p.condition.as_str(),
                    "alpha": p.alpha,
                    "seed": p.seed,
                })
            })
            .collect();
        Value::Array(entries)
    }

    /// Digest over the ordered entries; changes whenever any index moves.
    pub fn fingerprint(&self) -> String {
        canonical_json_digest(&self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unified() -> Grid {
        Grid::build(&GridSpec::unified()).expect("unified grid")
    }

    #[test]
    fn unified_grid_has_eighty_entries() {
        let grid = unified();
        assert_eq!(grid.len(), 80);
        assert_eq!(GridSpec::unified().len(), 80);
        assert_eq!(grid.array_range().as_deref(), Some("0-79"));
    }

    #[test]
    fn classic_grid_has_ten_entries() {
        let grid = Grid::build(&GridSpec::classic()).expect("classic grid");
        assert_eq!(grid.len(), 10);
        for (i, p) in grid.entries().iter().enumerate() {
            assert_eq!(*p, ParameterTuple::new(Condition::All, 0, i as u32));
        }
    }

    #[test]
    fn single_seed_variant_has_eight_entries() {
        let spec = GridSpec::unified().with_seeds(vec![3]);
        let grid = Grid::build(&spec).expect("grid");
        assert_eq!(grid.len(), 8);
        assert!(grid.entries().iter().all(|p| p.seed == 3));
        assert_eq!(grid.entries()[6].condition, Condition::All);
        assert_eq!(grid.entries()[7].condition, Condition::Random);
    }

    #[test]
    fn build_is_deterministic() {
        let a = unified();
        let b = unified();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.fingerprint().starts_with("sha256:"));
    }

    #[test]
    fn directional_block_orders_seed_alpha_condition() {
        let grid = unified();
        assert_eq!(grid.get(0), Some(&ParameterTuple::new(Condition::TopK, 0, 0)));
        assert_eq!(grid.get(1), Some(&ParameterTuple::new(Condition::BottomK, 0, 0)));
        assert_eq!(grid.get(2), Some(&ParameterTuple::new(Condition::TopK, 50, 0)));
        assert_eq!(grid.get(5), Some(&ParameterTuple::new(Condition::BottomK, 100, 0)));
        assert_eq!(grid.get(6), Some(&ParameterTuple::new(Condition::TopK, 0, 1)));
        assert_eq!(grid.get(59), Some(&ParameterTuple::new(Condition::BottomK, 100, 9)));

        let alphas = [0, 50, 100];
        let conditions = [Condition::TopK, Condition::BottomK];
        for i in 0..60usize {
            let p = grid.get(i as i64).expect("in range");
            assert_eq!(p.seed as usize, i / 6);
            assert_eq!(p.alpha, alphas[(i % 6) / 2]);
            assert_eq!(p.condition, conditions[i % 2]);
        }
    }

    #[test]
    fn undirected_block_follows_directional_block() {
        let grid = unified();
        assert_eq!(grid.get(60), Some(&ParameterTuple::new(Condition::All, 0, 0)));
        assert_eq!(grid.get(61), Some(&ParameterTuple::new(Condition::Random, 0, 0)));
        assert_eq!(grid.get(79), Some(&ParameterTuple::new(Condition::Random, 0, 9)));
        for i in 60..80usize {
            let p = grid.get(i as i64).expect("in range");
            assert_eq!(p.alpha, IGNORED_ALPHA);
            assert_eq!(p.effective_alpha(), None);
            assert_eq!(p.seed as usize, (i - 60) / 2);
        }
    }

    #[test]
    fn out_of_range_lookups_are_rejected() {
        let grid = unified();
        assert!(grid.get(-1).is_none());
        assert!(grid.get(80).is_none());
        assert_eq!(grid.check_index(79).expect("last index"), 79);
        match grid.check_index(80) {
            Err(SweepError::OutOfRangeIndex { index, len }) => {
                assert_eq!(index, 80);
                assert_eq!(len, 80);
            }
            other => panic!("expected OutOfRangeIndex, got {:?}", other),
        }
        assert!(grid.check_index(-1).is_err());
    }

    #[test]
    fn undirected_conditions_pin_alpha_to_sentinel() {
        let p = ParameterTuple::new(Condition::Random, 50, 2);
        assert_eq!(p.alpha, IGNORED_ALPHA);
        let p = ParameterTuple::new(Condition::TopK, 50, 2);
        assert_eq!(p.effective_alpha(), Some(50));
    }

    #[test]
    fn fingerprint_tracks_order() {
        let mut spec = GridSpec::unified();
        spec.directional = vec![Condition::BottomK, Condition::TopK];
        let swapped = Grid::build(&spec).expect("grid");
        assert_eq!(swapped.len(), 80);
        assert_ne!(swapped.fingerprint(), unified().fingerprint());
    }

    #[test]
    fn validate_rejects_misplaced_and_duplicate_conditions() {
        let mut spec = GridSpec::unified();
        spec.directional = vec![Condition::All];
        spec.undirected = vec![Condition::TopK];
        spec.seeds = vec![1, 1];
        let msg = Grid::build(&spec).expect_err("invalid").to_string();
        assert!(msg.contains("'all' cannot be used as a directional"), "{}", msg);
        assert!(msg.contains("'topk' requires an alpha"), "{}", msg);
        assert!(msg.contains("duplicate value 1 in seeds"), "{}", msg);
    }

    #[test]
    fn condition_parses_case_insensitively() {
        assert_eq!("TopK".parse::<Condition>().expect("topk"), Condition::TopK);
        assert_eq!(" random ".parse::<Condition>().expect("random"), Condition::Random);
        assert!("nearest".parse::<Condition>().is_err());
    }

    #[test]
    fn preset_names_resolve() {
        assert_eq!(GridSpec::preset("unified").expect("unified"), GridSpec::unified());
        assert_eq!(GridSpec::preset("classic").expect("classic").len(), 10);
        assert!(GridSpec::preset("nightly").is_err());
    }
}
