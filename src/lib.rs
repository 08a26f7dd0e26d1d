#![deny(missing_docs)]
//! # slope-one
//!
//! `slope_one` implements the Slope One family of collaborative filtering
//! recommenders: given a sparse set of explicit user-item ratings, it
//! computes the mean rating difference between every pair of items and
//! uses it to predict how a user would rate the items they have not rated yet.
//!
//! ## Example
//! ```rust
//! # extern crate slope_one;
//! use slope_one::data::{RatingIndex, RatingRecord};
//! use slope_one::models::slope_one::{recommend, DifferenceMatrix};
//!
//! let records = vec![
//!     RatingRecord::new("U1", "IA", "5"),
//!     RatingRecord::new("U1", "IB", "3"),
//!     RatingRecord::new("U2", "IA", "4"),
//!     RatingRecord::new("U2", "IB", "2"),
//!     RatingRecord::new("U2", "IC", "5"),
//!     RatingRecord::new("U3", "IB", "4"),
//!     RatingRecord::new("U3", "IC", "3"),
//! ];
//!
//! let index = RatingIndex::build(records).unwrap();
//! let matrix = DifferenceMatrix::build(&index);
//!
//! let recommendations = recommend(&index, &matrix, "U3", 2).unwrap();
//!
//! assert_eq!(recommendations.len(), 1);
//! assert_eq!(recommendations[0].item_id, "IA");
//! ```
//!
//! For larger datasets, [`models::slope_one::Hyperparameters`] controls the
//! number of threads used to build the difference matrix.
#[macro_use]
extern crate serde_derive;

#[cfg(feature = "datasets")]
extern crate csv;
extern crate failure;
extern crate itertools;
extern crate rand;
extern crate rayon;
extern crate serde;
#[macro_use]
extern crate tracing;

use failure::Fail;

pub mod data;
#[cfg(feature = "datasets")]
pub mod datasets;
pub mod evaluation;
pub mod models;

/// Alias for user indices.
pub type UserId = usize;
/// Alias for item indices.
pub type ItemId = usize;
/// Alias for rating values.
pub type Score = f64;

/// Errors raised while building a rating index.
#[derive(Debug, Fail, PartialEq)]
pub enum IndexError {
    /// A rating's score is not a finite number.
    #[fail(
        display = "Invalid score {:?} for user {} and item {}.",
        score, user_id, item_id
    )]
    InvalidScore {
        /// User of the offending record.
        user_id: String,
        /// Item of the offending record.
        item_id: String,
        /// The score as it was received.
        score: String,
    },
}

/// Errors raised while fitting a model.
#[derive(Debug, Fail)]
pub enum FittingError {
    /// The worker thread pool could not be created.
    #[fail(display = "Unable to build thread pool: {}", _0)]
    ThreadPool(String),
}

/// Prediction error types.
#[derive(Debug, Fail, PartialEq)]
pub enum PredictionError {
    /// The user is not present in the rating index.
    #[fail(display = "Unknown user: {}.", _0)]
    UnknownUser(String),
    /// None of the requested ratings could be predicted.
    #[fail(display = "No predictions could be made.")]
    NoPredictions,
}

/// Trait describing models that predict explicit ratings.
pub trait RatingModel {
    /// Predict the rating `user_id` would give to `item_id`.
    ///
    /// Returns `Ok(None)` when the model has no information to base a
    /// prediction on, and an error when the user is unknown.
    fn predict(&self, user_id: &str, item_id: &str) -> Result<Option<Score>, PredictionError>;
}
