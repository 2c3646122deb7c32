//! Typed feature containers.
//!
//! A [`FeatureCollection`] maps feature names (`"amplitude"`, `"centroid"`,
//! `"timbre"`, `"chroma"`) to [`Feature`] values. A feature is either a plain
//! time series or a nested group of features: timbre is indexed by
//! coefficient number, chroma is keyed by pitch class.
//!
//! ```rust
//! use amen::{Audio, AudioOptions};
//! use amen::utils::generation::sine_wave;
//! use std::time::Duration;
//!
//! let tone = sine_wave(440.0, Duration::from_secs(1), 22050.0, 0.5)?;
//! let audio = Audio::from_raw_samples(tone.into_samples(), Some(22050.0))?;
//! let features = audio.features()?;
//!
//! let amplitude = features.get("amplitude")?.data().unwrap_or_default();
//! let first_mfcc = features.get("timbre")?.at_index(0)?;
//! let c_sharp = &features["chroma"]["c#"];
//! assert_eq!(c_sharp, &features["chroma"]["db"]);
//! assert_eq!(amplitude.len(), first_mfcc.data().map_or(0, <[f64]>::len));
//! # Ok::<(), amen::AmenError>(())
//! ```

use std::collections::BTreeMap;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::{AmenError, AmenResult};

/// A window of time, in seconds, over which features are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSlice {
    /// Start of the slice in seconds.
    pub start: f64,
    /// Length of the slice in seconds.
    pub duration: f64,
}

impl TimeSlice {
    /// Creates a slice.
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] if either value is negative or not finite.
    pub fn new(start: f64, duration: f64) -> AmenResult<Self> {
        if !start.is_finite() || start < 0.0 {
            return Err(AmenError::invalid_input(
                "start",
                format!("must be a finite non-negative time, got {start}"),
            ));
        }
        if !duration.is_finite() || duration < 0.0 {
            return Err(AmenError::invalid_input(
                "duration",
                format!("must be a finite non-negative time, got {duration}"),
            ));
        }
        Ok(Self { start, duration })
    }

    /// End of the slice in seconds (exclusive).
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Returns true if `time` falls in `[start, start + duration)`.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end()
    }

    /// Consecutive slices between successive boundaries, e.g. beat times.
    ///
    /// ```rust
    /// use amen::TimeSlice;
    ///
    /// let slices = TimeSlice::between(&[0.0, 0.5, 1.25]);
    /// assert_eq!(slices.len(), 2);
    /// assert_eq!(slices[1].start, 0.5);
    /// assert_eq!(slices[1].duration, 0.75);
    /// ```
    pub fn between(boundaries: &[f64]) -> Vec<TimeSlice> {
        boundaries
            .windows(2)
            .map(|pair| TimeSlice {
                start: pair[0],
                duration: (pair[1] - pair[0]).max(0.0),
            })
            .collect()
    }
}

/// How the frames inside a [`TimeSlice`] are reduced to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Aggregation {
    /// Arithmetic mean.
    #[default]
    Mean,
    /// Median (mean of the two middle values for an even count).
    Median,
    /// Largest value.
    Max,
    /// Smallest value.
    Min,
}

impl Aggregation {
    /// Reduces `values`; an empty slice yields NaN.
    pub fn apply(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        match self {
            Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

/// One value per analysis frame, with the time (seconds) each value refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSeries {
    data: Vec<f64>,
    times: Vec<f64>,
}

impl FeatureSeries {
    /// Creates a series whose value `i` belongs to frame `i` of a grid with
    /// the given hop: time `i * hop_length / sample_rate`.
    pub fn from_frames(data: Vec<f64>, sample_rate: f64, hop_length: usize) -> Self {
        let times = (0..data.len())
            .map(|i| crate::utils::audio_math::frames_to_time(i, sample_rate, hop_length))
            .collect();
        Self { data, times }
    }

    /// Creates a series with explicit times.
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] if `data` and `times` differ in length.
    pub fn new(data: Vec<f64>, times: Vec<f64>) -> AmenResult<Self> {
        if data.len() != times.len() {
            return Err(AmenError::invalid_input(
                "times",
                format!("{} values but {} times", data.len(), times.len()),
            ));
        }
        Ok(Self { data, times })
    }

    /// The values.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// The time in seconds of each value.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the series holds no values.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterates over `(time, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.data.iter().copied())
    }

    /// Mean of the values whose time falls in each slice.
    ///
    /// The result has one value per slice, timed at the slice start. A slice
    /// that contains no frame yields NaN.
    pub fn at(&self, slices: &[TimeSlice]) -> FeatureSeries {
        self.at_with(slices, Aggregation::Mean)
    }

    /// Like [`FeatureSeries::at`] with an explicit [`Aggregation`].
    pub fn at_with(&self, slices: &[TimeSlice], aggregation: Aggregation) -> FeatureSeries {
        let mut scratch = Vec::new();
        let data = slices
            .iter()
            .map(|slice| {
                scratch.clear();
                scratch.extend(
                    self.iter()
                        .filter(|&(t, _)| slice.contains(t))
                        .map(|(_, v)| v),
                );
                aggregation.apply(&scratch)
            })
            .collect();
        FeatureSeries {
            data,
            times: slices.iter().map(|s| s.start).collect(),
        }
    }
}

/// Named children with alias resolution and positional access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedFeatures {
    names: Vec<String>,
    values: Vec<Feature>,
    aliases: BTreeMap<String, usize>,
}

impl NamedFeatures {
    /// Creates a group from `(name, feature)` pairs; names must be unique.
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] on a duplicate name.
    pub fn new(entries: Vec<(String, Feature)>) -> AmenResult<Self> {
        let mut names = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        for (name, value) in entries {
            if names.contains(&name) {
                return Err(AmenError::invalid_input(
                    "name",
                    format!("duplicate feature name '{name}'"),
                ));
            }
            names.push(name);
            values.push(value);
        }
        Ok(Self {
            names,
            values,
            aliases: BTreeMap::new(),
        })
    }

    /// Adds `alias` as another name for the existing entry `target`.
    ///
    /// # Errors
    /// Returns [`AmenError::UnknownFeature`] if `target` does not exist, and
    /// [`AmenError::InvalidInput`] if `alias` is already taken.
    pub fn with_alias(mut self, alias: &str, target: &str) -> AmenResult<Self> {
        let index = self.position(target)?;
        if self.position(alias).is_ok() {
            return Err(AmenError::invalid_input(
                "alias",
                format!("'{alias}' is already a feature name"),
            ));
        }
        self.aliases.insert(alias.to_string(), index);
        Ok(self)
    }

    fn position(&self, key: &str) -> AmenResult<usize> {
        self.names
            .iter()
            .position(|n| n == key)
            .or_else(|| self.aliases.get(key).copied())
            .ok_or_else(|| AmenError::unknown_feature(key))
    }

    /// Looks a child up by name or alias (ASCII case-insensitive).
    ///
    /// # Errors
    /// Returns [`AmenError::UnknownFeature`] for an unknown key.
    pub fn get(&self, key: &str) -> AmenResult<&Feature> {
        let index = self
            .position(key)
            .or_else(|_| self.position(&key.to_ascii_lowercase()))?;
        Ok(&self.values[index])
    }

    /// Returns the child at `index` in insertion order.
    ///
    /// # Errors
    /// Returns [`AmenError::UnknownFeature`] if `index` is out of range.
    pub fn at_index(&self, index: usize) -> AmenResult<&Feature> {
        self.values
            .get(index)
            .ok_or_else(|| AmenError::unknown_feature(index.to_string()))
    }

    /// Canonical names in insertion order (aliases excluded).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Iterates over `(name, feature)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Feature)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Number of children (aliases excluded).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no children.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn map_values(&self, f: impl Fn(&Feature) -> Feature) -> NamedFeatures {
        NamedFeatures {
            names: self.names.clone(),
            values: self.values.iter().map(f).collect(),
            aliases: self.aliases.clone(),
        }
    }
}

/// A single feature: a series, or a nested group of features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Feature {
    /// One value per frame.
    Series(FeatureSeries),
    /// Children addressed by position (e.g. MFCC coefficient number).
    Indexed(Vec<Feature>),
    /// Children addressed by name (e.g. pitch class).
    Named(NamedFeatures),
}

impl Feature {
    /// Looks up a named child.
    ///
    /// Indexed features also accept a decimal position (`"0"`).
    ///
    /// # Errors
    /// Returns [`AmenError::UnknownFeature`] if there is no such child or the
    /// feature is a plain series.
    pub fn get(&self, key: &str) -> AmenResult<&Feature> {
        match self {
            Feature::Named(named) => named.get(key),
            Feature::Indexed(children) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| children.get(i))
                .ok_or_else(|| AmenError::unknown_feature(key)),
            Feature::Series(_) => Err(AmenError::unknown_feature(key)),
        }
    }

    /// Looks up a child by position.
    ///
    /// # Errors
    /// Returns [`AmenError::UnknownFeature`] if `index` is out of range or the
    /// feature is a plain series.
    pub fn at_index(&self, index: usize) -> AmenResult<&Feature> {
        match self {
            Feature::Named(named) => named.at_index(index),
            Feature::Indexed(children) => children
                .get(index)
                .ok_or_else(|| AmenError::unknown_feature(index.to_string())),
            Feature::Series(_) => Err(AmenError::unknown_feature(index.to_string())),
        }
    }

    /// The series, if this feature is a leaf.
    pub fn series(&self) -> Option<&FeatureSeries> {
        match self {
            Feature::Series(series) => Some(series),
            _ => None,
        }
    }

    /// The values, if this feature is a leaf.
    pub fn data(&self) -> Option<&[f64]> {
        self.series().map(FeatureSeries::data)
    }

    /// Number of direct children, or the number of values for a leaf.
    pub fn len(&self) -> usize {
        match self {
            Feature::Series(series) => series.len(),
            Feature::Indexed(children) => children.len(),
            Feature::Named(named) => named.len(),
        }
    }

    /// Returns true if [`Feature::len`] is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregates every leaf over `slices` with the mean, keeping the nesting.
    pub fn at(&self, slices: &[TimeSlice]) -> Feature {
        self.at_with(slices, Aggregation::Mean)
    }

    /// Aggregates every leaf over `slices`, keeping the nesting.
    pub fn at_with(&self, slices: &[TimeSlice], aggregation: Aggregation) -> Feature {
        match self {
            Feature::Series(series) => Feature::Series(series.at_with(slices, aggregation)),
            Feature::Indexed(children) => Feature::Indexed(
                children
                    .iter()
                    .map(|child| child.at_with(slices, aggregation))
                    .collect(),
            ),
            Feature::Named(named) => {
                Feature::Named(named.map_values(|child| child.at_with(slices, aggregation)))
            }
        }
    }
}

impl Index<&str> for Feature {
    type Output = Feature;

    /// # Panics
    /// Panics if there is no child named `key`.
    fn index(&self, key: &str) -> &Feature {
        match self.get(key) {
            Ok(feature) => feature,
            Err(err) => panic!("{err}"),
        }
    }
}

impl Index<usize> for Feature {
    type Output = Feature;

    /// # Panics
    /// Panics if there is no child at `index`.
    fn index(&self, index: usize) -> &Feature {
        match self.at_index(index) {
            Ok(feature) => feature,
            Err(err) => panic!("{err}"),
        }
    }
}

/// The features computed for one piece of audio, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    features: BTreeMap<String, Feature>,
}

impl FeatureCollection {
    /// Creates a collection from already computed features.
    pub fn new(features: BTreeMap<String, Feature>) -> Self {
        Self { features }
    }

    /// Looks up a feature by name.
    ///
    /// # Errors
    /// Returns [`AmenError::UnknownFeature`] if `key` is not in the collection.
    pub fn get(&self, key: &str) -> AmenResult<&Feature> {
        self.features
            .get(key)
            .ok_or_else(|| AmenError::unknown_feature(key))
    }

    /// Returns true if `key` is in the collection.
    pub fn contains_key(&self, key: &str) -> bool {
        self.features.contains_key(key)
    }

    /// Feature names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    /// Iterates over `(name, feature)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Feature)> {
        self.features.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if the collection holds no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Aggregates every feature over `slices` with the mean.
    pub fn at(&self, slices: &[TimeSlice]) -> FeatureCollection {
        self.at_with(slices, Aggregation::Mean)
    }

    /// Aggregates every feature over `slices`.
    pub fn at_with(&self, slices: &[TimeSlice], aggregation: Aggregation) -> FeatureCollection {
        FeatureCollection {
            features: self
                .features
                .iter()
                .map(|(name, feature)| (name.clone(), feature.at_with(slices, aggregation)))
                .collect(),
        }
    }
}

impl Index<&str> for FeatureCollection {
    type Output = Feature;

    /// # Panics
    /// Panics if `key` is not in the collection.
    fn index(&self, key: &str) -> &Feature {
        match self.get(key) {
            Ok(feature) => feature,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<'a> IntoIterator for &'a FeatureCollection {
    type Item = (&'a String, &'a Feature);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}
