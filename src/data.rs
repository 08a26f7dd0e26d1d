//! Rating records and the in-memory rating index built from them.
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::time::Instant;

use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::{IndexError, ItemId, Score, UserId};

/// A score as received from a rating source, before parsing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RawScore {
    /// Decimal text, e.g. `"3.5"`.
    Text(String),
    /// An already numeric score.
    Number(f64),
}

impl RawScore {
    fn parse(&self) -> Option<Score> {
        let value = match self {
            RawScore::Text(text) => text.trim().parse::<Score>().ok()?,
            RawScore::Number(value) => *value,
        };

        if value.is_finite() {
            Some(value)
        } else {
            None
        }
    }
}

impl fmt::Display for RawScore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RawScore::Text(text) => write!(f, "{}", text),
            RawScore::Number(value) => write!(f, "{}", value),
        }
    }
}

impl<'a> From<&'a str> for RawScore {
    fn from(text: &'a str) -> Self {
        RawScore::Text(text.to_owned())
    }
}

impl From<String> for RawScore {
    fn from(text: String) -> Self {
        RawScore::Text(text)
    }
}

impl From<f64> for RawScore {
    fn from(value: f64) -> Self {
        RawScore::Number(value)
    }
}

/// An unparsed rating record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    user_id: String,
    item_id: String,
    score: RawScore,
}

impl RatingRecord {
    /// Create a record from a user name, an item name and a raw score.
    pub fn new<U, I, S>(user_id: U, item_id: I, score: S) -> Self
    where
        U: Into<String>,
        I: Into<String>,
        S: Into<RawScore>,
    {
        RatingRecord {
            user_id: user_id.into(),
            item_id: item_id.into(),
            score: score.into(),
        }
    }

    /// Parse the record's score.
    pub fn parse(self) -> Result<Rating, IndexError> {
        match self.score.parse() {
            Some(score) => Ok(Rating {
                user_id: self.user_id,
                item_id: self.item_id,
                score,
            }),
            None => Err(IndexError::InvalidScore {
                score: self.score.to_string(),
                user_id: self.user_id,
                item_id: self.item_id,
            }),
        }
    }
}

/// A rating with a parsed, finite score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    user_id: String,
    item_id: String,
    score: Score,
}

impl Rating {
    /// Create a rating.
    pub fn new<U: Into<String>, I: Into<String>>(user_id: U, item_id: I, score: Score) -> Self {
        Rating {
            user_id: user_id.into(),
            item_id: item_id.into(),
            score,
        }
    }

    /// Name of the rating user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Name of the rated item.
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// The rating value.
    pub fn score(&self) -> Score {
        self.score
    }
}

/// Randomly hold out `test_fraction` of the ratings.
///
/// Fractions outside `0.0..=1.0` are clamped. Returns `(train, test)`.
pub fn train_test_split<R: Rng>(
    ratings: &mut Ratings,
    rng: &mut R,
    test_fraction: f32,
) -> (Ratings, Ratings) {
    ratings.shuffle(rng);

    let test_size = (test_fraction.max(0.0) * ratings.len() as f32) as usize;
    let (test, train) = ratings.split_at(test_size.min(ratings.len()));

    (train, test)
}

/// An ordered collection of parsed ratings.
#[derive(Clone, Debug, Default)]
pub struct Ratings {
    ratings: Vec<Rating>,
}

impl Ratings {
    /// Parse all records. Fails on the first record with an invalid score.
    pub fn from_records<I>(records: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = RatingRecord>,
    {
        let ratings = records
            .into_iter()
            .map(RatingRecord::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Ratings { ratings })
    }

    /// The ratings, in their current order.
    pub fn data(&self) -> &[Rating] {
        &self.ratings
    }

    /// Number of ratings.
    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    /// Whether there are no ratings.
    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// Shuffle the ratings in place.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.ratings.shuffle(rng);
    }

    /// Split into the first `idx` ratings and the rest.
    ///
    /// `idx` past the end puts every rating in the head.
    pub fn split_at(&self, idx: usize) -> (Self, Self) {
        let idx = idx.min(self.ratings.len());
        let head = Ratings {
            ratings: self.ratings[..idx].to_owned(),
        };
        let tail = Ratings {
            ratings: self.ratings[idx..].to_owned(),
        };

        (head, tail)
    }

    /// Build a [`RatingIndex`] over these ratings.
    pub fn to_index(&self) -> RatingIndex {
        RatingIndex::from(self)
    }
}

impl From<Vec<Rating>> for Ratings {
    fn from(ratings: Vec<Rating>) -> Ratings {
        Ratings { ratings }
    }
}

/// Lookup structures over a complete set of ratings.
///
/// User and item names are interned into dense indices. Item indices follow
/// the lexicographic order of item names, user indices the order in which
/// users first appear in the input. The index is immutable once built.
#[derive(Clone, Debug)]
pub struct RatingIndex {
    user_names: Vec<String>,
    user_ids: HashMap<String, UserId>,
    item_names: Vec<String>,
    item_ids: HashMap<String, ItemId>,
    scores: Vec<HashMap<ItemId, Score>>,
    items_rated_by: Vec<Vec<ItemId>>,
    users_who_rated: Vec<Vec<UserId>>,
    rated_items: Vec<Vec<ItemId>>,
    raters: Vec<Vec<UserId>>,
    rater_sets: Vec<HashSet<UserId>>,
    num_ratings: usize,
}

impl RatingIndex {
    /// Parse `records` and index them.
    ///
    /// Construction is all or nothing: a single unparseable score fails the
    /// whole build.
    pub fn build<I>(records: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = RatingRecord>,
    {
        Ratings::from_records(records).map(|ratings| ratings.to_index())
    }

    /// Number of distinct users.
    pub fn num_users(&self) -> usize {
        self.user_names.len()
    }

    /// Number of distinct items.
    pub fn num_items(&self) -> usize {
        self.item_names.len()
    }

    /// Number of input rows, duplicates included.
    pub fn num_ratings(&self) -> usize {
        self.num_ratings
    }

    /// Index of the user called `name`.
    pub fn user_id(&self, name: &str) -> Option<UserId> {
        self.user_ids.get(name).cloned()
    }

    /// Index of the item called `name`.
    pub fn item_id(&self, name: &str) -> Option<ItemId> {
        self.item_ids.get(name).cloned()
    }

    /// Name of the user at `user_id`.
    pub fn user_name(&self, user_id: UserId) -> &str {
        &self.user_names[user_id]
    }

    /// Name of the item at `item_id`.
    pub fn item_name(&self, item_id: ItemId) -> &str {
        &self.item_names[item_id]
    }

    /// All item names in lexicographic order. Position equals `ItemId`.
    pub fn all_items(&self) -> &[String] {
        &self.item_names
    }

    /// The user's score for the item. Later duplicates overwrite earlier ones.
    pub fn score(&self, user_id: UserId, item_id: ItemId) -> Option<Score> {
        self.scores[user_id].get(&item_id).cloned()
    }

    /// All distinct scores of the user, keyed by item.
    pub fn user_scores(&self, user_id: UserId) -> &HashMap<ItemId, Score> {
        &self.scores[user_id]
    }

    /// Items rated by the user, in input order and including duplicates.
    pub fn items_rated_by(&self, user_id: UserId) -> &[ItemId] {
        &self.items_rated_by[user_id]
    }

    /// Users who rated the item, in input order and including duplicates.
    pub fn users_who_rated(&self, item_id: ItemId) -> &[UserId] {
        &self.users_who_rated[item_id]
    }

    /// Distinct items rated by the user, sorted.
    pub fn rated_items(&self, user_id: UserId) -> &[ItemId] {
        &self.rated_items[user_id]
    }

    /// Distinct users who rated the item, sorted.
    pub fn raters(&self, item_id: ItemId) -> &[UserId] {
        &self.raters[item_id]
    }

    /// Users who rated both items, sorted.
    pub fn co_raters(&self, item_a: ItemId, item_b: ItemId) -> Vec<UserId> {
        let (smaller, larger) = if self.raters[item_a].len() <= self.raters[item_b].len() {
            (item_a, item_b)
        } else {
            (item_b, item_a)
        };
        let larger = &self.rater_sets[larger];

        self.raters[smaller]
            .iter()
            .filter(|user_id| larger.contains(user_id))
            .cloned()
            .collect()
    }
}

impl<'a> From<&'a Ratings> for RatingIndex {
    fn from(ratings: &Ratings) -> RatingIndex {
        let start = Instant::now();

        let item_names: Vec<String> = ratings
            .data()
            .iter()
            .map(|rating| rating.item_id())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_owned)
            .collect();
        let item_ids: HashMap<String, ItemId> = item_names
            .iter()
            .enumerate()
            .map(|(item_id, name)| (name.clone(), item_id))
            .collect();

        let mut user_names = Vec::new();
        let mut user_ids = HashMap::new();
        let mut scores: Vec<HashMap<ItemId, Score>> = Vec::new();
        let mut items_rated_by: Vec<Vec<ItemId>> = Vec::new();
        let mut users_who_rated: Vec<Vec<UserId>> = vec![Vec::new(); item_names.len()];

        for rating in ratings.data() {
            let user_id = match user_ids.get(rating.user_id()) {
                Some(&user_id) => user_id,
                None => {
                    let user_id = user_names.len();
                    user_names.push(rating.user_id.clone());
                    user_ids.insert(rating.user_id.clone(), user_id);
                    scores.push(HashMap::new());
                    items_rated_by.push(Vec::new());
                    user_id
                }
            };
            let item_id = item_ids[rating.item_id()];

            scores[user_id].insert(item_id, rating.score());
            items_rated_by[user_id].push(item_id);
            users_who_rated[item_id].push(user_id);
        }

        let rated_items: Vec<Vec<ItemId>> = scores
            .iter()
            .map(|user_scores| user_scores.keys().cloned().sorted_unstable().collect())
            .collect();
        let raters: Vec<Vec<UserId>> = users_who_rated
            .iter()
            .map(|user_ids| user_ids.iter().cloned().sorted_unstable().dedup().collect())
            .collect();
        let rater_sets = raters
            .iter()
            .map(|user_ids| user_ids.iter().cloned().collect())
            .collect();

        let index = RatingIndex {
            user_names,
            user_ids,
            item_names,
            item_ids,
            scores,
            items_rated_by,
            users_who_rated,
            rated_items,
            raters,
            rater_sets,
            num_ratings: ratings.len(),
        };

        info!(
            num_users = index.num_users(),
            num_items = index.num_items(),
            num_ratings = index.num_ratings(),
            elapsed = ?start.elapsed(),
            "Built rating index"
        );

        index
    }
}
