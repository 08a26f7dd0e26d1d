//! Offline accuracy of rating predictions.
use rayon::prelude::*;

use crate::data::Ratings;
use crate::{PredictionError, RatingModel, Score};

/// Prediction error over a held-out set of ratings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    /// Mean absolute error.
    pub mae: Score,
    /// Root mean squared error.
    pub rmse: Score,
    /// Number of test ratings the model could predict.
    pub predicted: usize,
    /// Number of test ratings skipped: unknown user or no prediction.
    pub skipped: usize,
}

/// Compute MAE and RMSE of `model` on `test`.
///
/// Test ratings of users the model has never seen, or of items it cannot
/// predict, are counted in `skipped` rather than treated as errors. Any
/// other prediction error aborts the evaluation.
pub fn accuracy_score<T: RatingModel + Sync>(
    model: &T,
    test: &Ratings,
) -> Result<Accuracy, PredictionError> {
    let errors = test
        .data()
        .par_iter()
        .filter_map(|rating| match model.predict(rating.user_id(), rating.item_id()) {
            Ok(Some(prediction)) => Some(Ok(prediction - rating.score())),
            Ok(None) | Err(PredictionError::UnknownUser(_)) => None,
            Err(error @ PredictionError::NoPredictions) => Some(Err(error)),
        })
        .collect::<Result<Vec<Score>, _>>()?;

    if errors.is_empty() {
        return Err(PredictionError::NoPredictions);
    }

    let predicted = errors.len();
    let mae = errors.iter().map(|error| error.abs()).sum::<Score>() / predicted as Score;
    let mse = errors.iter().map(|error| error * error).sum::<Score>() / predicted as Score;

    Ok(Accuracy {
        mae,
        rmse: mse.sqrt(),
        predicted,
        skipped: test.len() - predicted,
    })
}
