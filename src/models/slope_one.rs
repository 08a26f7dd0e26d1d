//! Weighted Slope One.
//!
//! The model is a table of mean rating differences between pairs of items:
//! ```text
//! dev(a, b) = sum_{u in S(a, b)} (r_ua - r_ub) / |S(a, b)|
//! ```
//! where `S(a, b)` is the set of users who rated both `a` and `b`. A user's
//! rating of an unrated item `c` is then predicted from every item `a` they
//! did rate, weighted by the number of co-raters:
//! ```text
//! p_uc = sum_a |S(a, c)| * (r_ua - dev(a, c)) / sum_a |S(a, c)|
//! ```
//! Items without any co-raters cannot be predicted and are never recommended.
use std::mem;
use std::time::Instant;

use itertools::Itertools;
use rayon::prelude::*;

use crate::data::RatingIndex;
use crate::{FittingError, ItemId, PredictionError, RatingModel, Score, UserId};

/// Mean difference between a row item and `item_id`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    item_id: ItemId,
    mean: Score,
    support: usize,
}

impl Deviation {
    /// The column item.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// Mean of `row score - column score` over the co-raters.
    pub fn mean(&self) -> Score {
        self.mean
    }

    /// Number of co-raters.
    pub fn support(&self) -> usize {
        self.support
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Accumulator {
    sum: Score,
    count: usize,
}

/// Mean pairwise rating differences between all items of a [`RatingIndex`].
///
/// Only pairs with at least one co-rater are stored. All other pairs of
/// distinct items have a difference of `0.0` and a support of zero.
#[derive(Clone, Debug, PartialEq)]
pub struct DifferenceMatrix {
    rows: Vec<Vec<Deviation>>,
}

impl DifferenceMatrix {
    /// Compute the matrix for `index`.
    ///
    /// Rows are independent and are computed in parallel on the current
    /// rayon thread pool.
    pub fn build(index: &RatingIndex) -> Self {
        let start = Instant::now();
        let num_items = index.num_items();

        let rows: Vec<Vec<Deviation>> = (0..num_items)
            .into_par_iter()
            .map_init(
                || vec![Accumulator::default(); num_items],
                |accumulators, item_id| build_row(index, item_id, accumulators),
            )
            .collect();

        let matrix = DifferenceMatrix { rows };

        info!(
            num_items,
            num_entries = matrix.num_entries(),
            elapsed = ?start.elapsed(),
            "Built difference matrix"
        );

        matrix
    }

    /// Number of items (rows).
    pub fn num_items(&self) -> usize {
        self.rows.len()
    }

    /// Number of stored (co-rated) pairs.
    pub fn num_entries(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Co-rated pairs of `item_id`, ordered by column item.
    pub fn row(&self, item_id: ItemId) -> &[Deviation] {
        &self.rows[item_id]
    }

    /// The stored cell for `item_a` and `item_b`, if they have co-raters.
    pub fn deviation(&self, item_a: ItemId, item_b: ItemId) -> Option<&Deviation> {
        let row = self.rows.get(item_a)?;

        row.binary_search_by_key(&item_b, |deviation| deviation.item_id)
            .ok()
            .map(|idx| &row[idx])
    }

    /// Mean difference between `item_a` and `item_b`.
    ///
    /// Returns `None` for identical or unknown items and `Some(0.0)` for
    /// items nobody rated together.
    pub fn difference(&self, item_a: ItemId, item_b: ItemId) -> Option<Score> {
        if item_a == item_b || item_a >= self.num_items() || item_b >= self.num_items() {
            return None;
        }

        Some(
            self.deviation(item_a, item_b)
                .map(|deviation| deviation.mean)
                .unwrap_or(0.0),
        )
    }

    /// Number of users who rated both items.
    pub fn support(&self, item_a: ItemId, item_b: ItemId) -> usize {
        self.deviation(item_a, item_b)
            .map(|deviation| deviation.support)
            .unwrap_or(0)
    }
}

fn build_row(
    index: &RatingIndex,
    item_a: ItemId,
    accumulators: &mut [Accumulator],
) -> Vec<Deviation> {
    let mut columns = Vec::new();

    for &user_id in index.raters(item_a) {
        let scores = index.user_scores(user_id);
        let score_a = scores[&item_a];

        for (&item_b, &score_b) in scores {
            if item_b == item_a {
                continue;
            }

            let accumulator = &mut accumulators[item_b];

            if accumulator.count == 0 {
                columns.push(item_b);
            }

            accumulator.sum += score_a - score_b;
            accumulator.count += 1;
        }
    }

    columns.sort_unstable();
    columns
        .into_iter()
        .map(|item_b| {
            let accumulator = mem::take(&mut accumulators[item_b]);

            Deviation {
                item_id: item_b,
                mean: accumulator.sum / accumulator.count as Score,
                support: accumulator.count,
            }
        })
        .collect()
}

/// A recommended item and its predicted score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Item name.
    pub item_id: String,
    /// Predicted rating.
    pub score: Score,
}

#[derive(Clone, Copy, Debug, Default)]
struct Prediction {
    weighted_sum: Score,
    total_weight: usize,
}

impl Prediction {
    fn add(&mut self, user_score: Score, deviation: &Deviation) {
        self.weighted_sum += deviation.support as Score * (user_score - deviation.mean);
        self.total_weight += deviation.support;
    }

    fn value(&self) -> Option<Score> {
        if self.total_weight == 0 {
            None
        } else {
            Some(self.weighted_sum / self.total_weight as Score)
        }
    }
}

/// Predicted scores for every item `user_id` has not rated.
///
/// The result is indexed by `ItemId`; rated and unpredictable items are `None`.
fn predict_unrated(
    index: &RatingIndex,
    matrix: &DifferenceMatrix,
    user_id: UserId,
) -> Vec<Option<Score>> {
    let scores = index.user_scores(user_id);
    let mut predictions = vec![Prediction::default(); index.num_items()];

    for &item_a in index.rated_items(user_id) {
        let user_score = scores[&item_a];

        for deviation in matrix.row(item_a) {
            if !scores.contains_key(&deviation.item_id) {
                predictions[deviation.item_id].add(user_score, deviation);
            }
        }
    }

    predictions.iter().map(Prediction::value).collect()
}

/// Recommend up to `num` unrated items for `user_id`, best first.
///
/// Items with equal scores are ordered by name. Items that cannot be
/// predicted are left out, so fewer than `num` items may be returned.
pub fn recommend(
    index: &RatingIndex,
    matrix: &DifferenceMatrix,
    user_id: &str,
    num: usize,
) -> Result<Vec<Recommendation>, PredictionError> {
    let start = Instant::now();
    let user = index
        .user_id(user_id)
        .ok_or_else(|| PredictionError::UnknownUser(user_id.to_owned()))?;

    if num == 0 {
        return Ok(Vec::new());
    }

    // Item ids follow name order, so comparing ids breaks ties by name.
    let recommendations: Vec<Recommendation> = predict_unrated(index, matrix, user)
        .into_iter()
        .enumerate()
        .filter_map(|(item_id, prediction)| prediction.map(|score| (item_id, score)))
        .k_smallest_by(num, |(item_a, score_a), (item_b, score_b)| {
            score_b.total_cmp(score_a).then_with(|| item_a.cmp(item_b))
        })
        .map(|(item_id, score)| Recommendation {
            item_id: index.item_name(item_id).to_owned(),
            score,
        })
        .collect();

    info!(
        user_id,
        num,
        num_recommendations = recommendations.len(),
        elapsed = ?start.elapsed(),
        "Computed recommendations"
    );

    Ok(recommendations)
}

/// Hyperparameters describing the Slope One model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hyperparameters {
    num_threads: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters::new()
    }
}

impl Hyperparameters {
    /// Build new hyperparameters.
    pub fn new() -> Self {
        Hyperparameters {
            num_threads: rayon::current_num_threads(),
        }
    }

    /// Set number of threads used to build the difference matrix.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Build the difference matrix for `index`.
    pub fn fit(&self, index: RatingIndex) -> Result<SlopeOneModel, FittingError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(|error| FittingError::ThreadPool(error.to_string()))?;

        debug!(num_threads = self.num_threads, "Fitting Slope One model");

        let matrix = pool.install(|| DifferenceMatrix::build(&index));

        Ok(SlopeOneModel { index, matrix })
    }
}

/// A fitted Slope One model.
#[derive(Clone, Debug)]
pub struct SlopeOneModel {
    index: RatingIndex,
    matrix: DifferenceMatrix,
}

impl SlopeOneModel {
    /// The ratings the model was fitted on.
    pub fn index(&self) -> &RatingIndex {
        &self.index
    }

    /// The item difference matrix.
    pub fn matrix(&self) -> &DifferenceMatrix {
        &self.matrix
    }

    /// See [`recommend`].
    pub fn recommend(
        &self,
        user_id: &str,
        num: usize,
    ) -> Result<Vec<Recommendation>, PredictionError> {
        recommend(&self.index, &self.matrix, user_id, num)
    }
}

impl RatingModel for SlopeOneModel {
    /// Predict from every item the user rated other than `item_id` itself.
    fn predict(&self, user_id: &str, item_id: &str) -> Result<Option<Score>, PredictionError> {
        let user = self
            .index
            .user_id(user_id)
            .ok_or_else(|| PredictionError::UnknownUser(user_id.to_owned()))?;
        let item = match self.index.item_id(item_id) {
            Some(item) => item,
            None => return Ok(None),
        };

        let scores = self.index.user_scores(user);
        let mut prediction = Prediction::default();

        for &item_a in self.index.rated_items(user) {
            if let Some(deviation) = self.matrix.deviation(item_a, item) {
                prediction.add(scores[&item_a], deviation);
            }
        }

        Ok(prediction.value())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::data::RatingRecord;

    const EPSILON: Score = 1e-9;

    fn minimal_index() -> RatingIndex {
        RatingIndex::build(vec![
            RatingRecord::new("U1", "IA", "5"),
            RatingRecord::new("U1", "IB", "3"),
            RatingRecord::new("U2", "IA", "4"),
            RatingRecord::new("U2", "IB", "2"),
            RatingRecord::new("U2", "IC", "5"),
            RatingRecord::new("U3", "IB", "4"),
            RatingRecord::new("U3", "IC", "3"),
        ])
        .unwrap()
    }

    fn random_index(seed: u64, num_users: usize, num_items: usize, density: f64) -> RatingIndex {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut records = Vec::new();

        for user in 0..num_users {
            for item in 0..num_items {
                if rng.gen_bool(density) {
                    let score = rng.gen_range(1..=10) as f64 / 2.0;
                    records.push(RatingRecord::new(
                        format!("user_{}", user),
                        format!("item_{:03}", item),
                        score,
                    ));
                }
            }
        }

        RatingIndex::build(records).unwrap()
    }

    fn difference(
        index: &RatingIndex,
        matrix: &DifferenceMatrix,
        a: &str,
        b: &str,
    ) -> Option<Score> {
        matrix.difference(index.item_id(a).unwrap(), index.item_id(b).unwrap())
    }

    #[test]
    fn minimal_differences() {
        let index = minimal_index();
        let matrix = DifferenceMatrix::build(&index);

        assert_eq!(difference(&index, &matrix, "IA", "IB"), Some(2.0));
        assert_eq!(difference(&index, &matrix, "IB", "IC"), Some(-1.0));
        assert_eq!(difference(&index, &matrix, "IA", "IC"), Some(-1.0));
        assert_eq!(difference(&index, &matrix, "IC", "IA"), Some(1.0));

        let (ia, ib, ic) = (
            index.item_id("IA").unwrap(),
            index.item_id("IB").unwrap(),
            index.item_id("IC").unwrap(),
        );

        assert_eq!(matrix.support(ia, ib), 2);
        assert_eq!(matrix.support(ib, ic), 2);
        assert_eq!(matrix.support(ia, ic), 1);
    }

    #[test]
    fn no_self_differences() {
        let index = random_index(1, 30, 20, 0.3);
        let matrix = DifferenceMatrix::build(&index);

        for item_id in 0..matrix.num_items() {
            assert_eq!(matrix.difference(item_id, item_id), None);
            assert!(matrix.row(item_id).iter().all(|d| d.item_id() != item_id));
        }
    }

    #[test]
    fn matrix_is_antisymmetric() {
        let index = random_index(2, 50, 30, 0.2);
        let matrix = DifferenceMatrix::build(&index);

        for a in 0..matrix.num_items() {
            for b in 0..matrix.num_items() {
                if a == b {
                    continue;
                }

                let forward = matrix.difference(a, b).unwrap();
                let backward = matrix.difference(b, a).unwrap();

                assert!((forward + backward).abs() < EPSILON);
                assert_eq!(matrix.support(a, b), matrix.support(b, a));
            }
        }
    }

    #[test]
    fn matches_co_rater_definition() {
        let index = random_index(3, 40, 25, 0.25);
        let matrix = DifferenceMatrix::build(&index);

        for a in 0..index.num_items() {
            for b in 0..index.num_items() {
                if a == b {
                    continue;
                }

                let co_raters = index.co_raters(a, b);
                let expected = if co_raters.is_empty() {
                    0.0
                } else {
                    co_raters
                        .iter()
                        .map(|&u| index.score(u, a).unwrap() - index.score(u, b).unwrap())
                        .sum::<Score>()
                        / co_raters.len() as Score
                };

                assert_eq!(matrix.support(a, b), co_raters.len());
                assert!((matrix.difference(a, b).unwrap() - expected).abs() < EPSILON);
            }
        }
    }

    #[test]
    fn zero_for_disjoint_items() {
        let index = RatingIndex::build(vec![
            RatingRecord::new("U1", "IA", "5"),
            RatingRecord::new("U2", "IB", "1"),
        ])
        .unwrap();
        let matrix = DifferenceMatrix::build(&index);

        assert_eq!(difference(&index, &matrix, "IA", "IB"), Some(0.0));
        assert_eq!(difference(&index, &matrix, "IB", "IA"), Some(0.0));
        assert_eq!(matrix.num_entries(), 0);
    }

    #[test]
    fn duplicate_rows_do_not_inflate_support() {
        let index = RatingIndex::build(vec![
            RatingRecord::new("U1", "IA", "1"),
            RatingRecord::new("U1", "IB", "2"),
            RatingRecord::new("U1", "IA", "5"),
            RatingRecord::new("U2", "IA", "3"),
            RatingRecord::new("U2", "IB", "3"),
        ])
        .unwrap();
        let matrix = DifferenceMatrix::build(&index);

        let (ia, ib) = (index.item_id("IA").unwrap(), index.item_id("IB").unwrap());

        assert_eq!(matrix.support(ia, ib), 2);
        assert_eq!(matrix.difference(ia, ib), Some(1.5));
    }

    #[test]
    fn rebuild_is_identical() {
        let index = random_index(4, 60, 40, 0.2);

        let first = DifferenceMatrix::build(&index);
        let second = DifferenceMatrix::build(&index);

        assert_eq!(first, second);
    }

    #[test]
    fn thread_count_does_not_change_result() {
        let index = random_index(5, 60, 40, 0.2);

        let single = Hyperparameters::new().num_threads(1).fit(index.clone()).unwrap();
        let multi = Hyperparameters::new().num_threads(4).fit(index).unwrap();

        assert_eq!(single.matrix(), multi.matrix());
    }

    #[test]
    fn recommend_minimal() {
        let index = minimal_index();
        let matrix = DifferenceMatrix::build(&index);

        let recommendations = recommend(&index, &matrix, "U3", 2).unwrap();

        // 2 * (4 - (-2)) + 1 * (3 - 1) over 3 co-raters.
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].item_id, "IA");
        assert!((recommendations[0].score - 14.0 / 3.0).abs() < EPSILON);
    }

    #[test]
    fn recommend_unknown_user() {
        let index = minimal_index();
        let matrix = DifferenceMatrix::build(&index);

        assert_eq!(
            recommend(&index, &matrix, "U999", 5),
            Err(PredictionError::UnknownUser("U999".to_owned()))
        );
    }

    #[test]
    fn recommend_fully_rated_user() {
        let index = minimal_index();
        let matrix = DifferenceMatrix::build(&index);

        assert_eq!(recommend(&index, &matrix, "U2", 5), Ok(Vec::new()));
    }

    #[test]
    fn recommend_zero() {
        let index = minimal_index();
        let matrix = DifferenceMatrix::build(&index);

        assert_eq!(recommend(&index, &matrix, "U3", 0), Ok(Vec::new()));
    }

    #[test]
    fn unpredictable_items_are_excluded() {
        let index = RatingIndex::build(vec![
            RatingRecord::new("U1", "IA", "5"),
            RatingRecord::new("U1", "IB", "3"),
            RatingRecord::new("U2", "IC", "4"),
        ])
        .unwrap();
        let matrix = DifferenceMatrix::build(&index);

        assert_eq!(recommend(&index, &matrix, "U1", 5), Ok(Vec::new()));
        assert_eq!(recommend(&index, &matrix, "U2", 5), Ok(Vec::new()));
    }

    #[test]
    fn zero_prediction_is_kept() {
        let index = RatingIndex::build(vec![
            RatingRecord::new("U1", "IA", "2"),
            RatingRecord::new("U1", "IB", "4"),
            RatingRecord::new("U2", "IA", "-2"),
        ])
        .unwrap();
        let matrix = DifferenceMatrix::build(&index);

        let recommendations = recommend(&index, &matrix, "U2", 5).unwrap();

        assert_eq!(
            recommendations,
            vec![Recommendation {
                item_id: "IB".to_owned(),
                score: 0.0,
            }]
        );
    }

    #[test]
    fn ties_are_ordered_by_name() {
        let index = RatingIndex::build(vec![
            RatingRecord::new("U1", "IA", "4"),
            RatingRecord::new("U1", "IC", "3"),
            RatingRecord::new("U1", "IB", "3"),
            RatingRecord::new("U1", "ID", "1"),
            RatingRecord::new("T", "IA", "5"),
        ])
        .unwrap();
        let matrix = DifferenceMatrix::build(&index);

        let all = recommend(&index, &matrix, "T", 10).unwrap();
        let names: Vec<&str> = all.iter().map(|r| r.item_id.as_str()).collect();

        assert_eq!(names, vec!["IB", "IC", "ID"]);
        assert_eq!(all[0].score, 4.0);
        assert_eq!(all[2].score, 2.0);

        let top = recommend(&index, &matrix, "T", 2).unwrap();

        assert_eq!(top, all[..2].to_vec());
    }

    #[test]
    fn recommendations_are_bounded_and_unrated() {
        let index = random_index(6, 30, 20, 0.3);
        let matrix = DifferenceMatrix::build(&index);

        for user_id in 0..index.num_users() {
            let name = index.user_name(user_id).to_owned();
            let predictable = recommend(&index, &matrix, &name, index.num_items())
                .unwrap()
                .len();

            for num in 0..6 {
                let recommendations = recommend(&index, &matrix, &name, num).unwrap();

                assert!(recommendations.len() <= num);
                assert!(recommendations.len() <= predictable);

                for recommendation in &recommendations {
                    let item_id = index.item_id(&recommendation.item_id).unwrap();
                    assert!(!index.items_rated_by(user_id).contains(&item_id));
                }

                for pair in recommendations.windows(2) {
                    assert!(pair[0].score >= pair[1].score);
                }
            }
        }
    }

    #[test]
    fn predict_single_item() {
        let model = Hyperparameters::new().num_threads(2).fit(minimal_index()).unwrap();

        let prediction = model.predict("U3", "IA").unwrap().unwrap();

        assert!((prediction - 14.0 / 3.0).abs() < EPSILON);
        assert_eq!(model.predict("U3", "IZ"), Ok(None));
        assert_eq!(
            model.predict("U999", "IA"),
            Err(PredictionError::UnknownUser("U999".to_owned()))
        );
        assert_eq!(
            model.recommend("U3", 2).unwrap()[0].score,
            model.predict("U3", "IA").unwrap().unwrap()
        );
    }
}
