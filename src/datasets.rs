//! Readers for common rating datasets.
use std::path::Path;

use crate::data::RatingRecord;

#[derive(Debug, Deserialize)]
struct MovielensRating {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "movieId")]
    movie_id: String,
    rating: String,
}

/// Read a MovieLens `ratings.csv` file.
///
/// The file must have a header row with at least the `userId`, `movieId`
/// and `rating` columns, as in the `ml-latest` family of datasets. Scores
/// are left unparsed; they are validated when the records are indexed.
pub fn load_movielens<P: AsRef<Path>>(path: P) -> Result<Vec<RatingRecord>, failure::Error> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let records = reader
        .deserialize::<MovielensRating>()
        .map(|row| row.map(|row| RatingRecord::new(row.user_id, row.movie_id, row.rating)))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        path = %path.as_ref().display(),
        num_records = records.len(),
        "Loaded MovieLens ratings"
    );

    Ok(records)
}
