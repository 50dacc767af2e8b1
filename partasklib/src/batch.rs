use crate::error::BatchError;
use std::collections::BTreeMap;

/// Named columns of equal length. Row `i` of a batch is the `i`th value of every column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<V> {
    columns: BTreeMap<String, Vec<V>>,
    rows: usize,
}

impl<V> Default for Batch<V> {
    fn default() -> Self {
        Self {
            columns: BTreeMap::new(),
            rows: 0,
        }
    }
}

impl<V> Batch<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(key: &str, values: Vec<V>) -> Self {
        let rows = values.len();
        Self {
            columns: BTreeMap::from([(key.to_owned(), values)]),
            rows,
        }
    }

    pub fn from_columns<K: Into<String>, I: IntoIterator<Item = (K, Vec<V>)>>(
        columns: I,
    ) -> Result<Self, BatchError> {
        let mut batch = Self::new();
        for (key, values) in columns {
            batch.insert_column(key, values)?;
        }
        Ok(batch)
    }

    /// Adds (or replaces) a column. The first column decides the row count.
    pub fn insert_column<K: Into<String>>(
        &mut self,
        key: K,
        values: Vec<V>,
    ) -> Result<(), BatchError> {
        let key = key.into();
        let is_only_column = self.columns.is_empty()
            || (self.columns.len() == 1 && self.columns.contains_key(&key));
        if !is_only_column && values.len() != self.rows {
            return Err(BatchError::RaggedBatch {
                key,
                expected: self.rows,
                found: values.len(),
            });
        }
        self.rows = values.len();
        self.columns.insert(key, values);
        Ok(())
    }

    pub fn with_column<K: Into<String>>(
        mut self,
        key: K,
        values: Vec<V>,
    ) -> Result<Self, BatchError> {
        self.insert_column(key, values)?;
        Ok(self)
    }

    /// A batch with the same columns as `other` but no rows.
    pub fn empty_like<U>(other: &Batch<U>) -> Self {
        Self {
            columns: other
                .columns
                .keys()
                .map(|key| (key.clone(), Vec::new()))
                .collect(),
            rows: 0,
        }
    }

    pub(crate) fn from_parts(columns: BTreeMap<String, Vec<V>>, rows: usize) -> Self {
        debug_assert!(columns.values().all(|column| column.len() == rows));
        Self { columns, rows }
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, key: &str) -> Option<&[V]> {
        self.columns.get(key).map(Vec::as_slice)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[V])> {
        self.columns
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn row(&self, index: usize) -> Option<Row<'_, V>> {
        (index < self.rows).then_some(Row { batch: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_, V>> {
        (0..self.rows).map(move |index| Row { batch: self, index })
    }

    /// Appends `other`'s rows to the end of this batch, column by column.
    ///
    /// A batch without columns adopts `other`'s columns.
    pub fn extend(&mut self, other: Batch<V>) -> Result<(), BatchError> {
        if self.columns.is_empty() {
            *self = other;
            return Ok(());
        }
        if !self.columns.keys().eq(other.columns.keys()) {
            return Err(BatchError::MismatchedColumns {
                expected: self.columns.keys().cloned().collect(),
                found: other.columns.keys().cloned().collect(),
            });
        }
        self.rows += other.rows;
        for (column, values) in self.columns.values_mut().zip(other.columns.into_values()) {
            column.extend(values);
        }
        Ok(())
    }
}

impl<V> std::ops::Index<&str> for Batch<V> {
    type Output = [V];

    fn index(&self, key: &str) -> &[V] {
        match self.column(key) {
            Some(column) => column,
            None => panic!("No column named {key:?} in batch"),
        }
    }
}

/// A borrowed view of one row of a batch: one value per column.
#[derive(Debug)]
pub struct Row<'a, V> {
    batch: &'a Batch<V>,
    index: usize,
}

impl<V> Clone for Row<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Row<'_, V> {}

impl<'a, V> Row<'a, V> {
    /// The index of this row in the batch it was taken from.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, key: &str) -> Option<&'a V> {
        self.batch.columns.get(key).map(|column| &column[self.index])
    }

    pub fn len(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a V)> + 'a {
        let index = self.index;
        self.batch
            .columns
            .iter()
            .map(move |(key, column)| (key.as_str(), &column[index]))
    }

    pub fn to_owned_values(&self) -> BTreeMap<String, V>
    where
        V: Clone,
    {
        self.iter()
            .map(|(key, value)| (key.to_owned(), value.clone()))
            .collect()
    }
}

impl<V> std::ops::Index<&str> for Row<'_, V> {
    type Output = V;

    fn index(&self, key: &str) -> &V {
        match self.get(key) {
            Some(value) => value,
            None => panic!("No column named {key:?} in row {}", self.index),
        }
    }
}

/// The merged output of every successful partition: the inputs that were run, and a parallel
/// sequence of results (`results[i]` was computed from `inputs.row(i)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResults<V, R> {
    pub inputs: Batch<V>,
    pub results: Vec<R>,
}

impl<V, R> Default for RunResults<V, R> {
    fn default() -> Self {
        Self {
            inputs: Batch::default(),
            results: Vec::new(),
        }
    }
}

impl<V, R> RunResults<V, R> {
    pub fn empty_like<U>(batch: &Batch<U>) -> Self {
        Self {
            inputs: Batch::empty_like(batch),
            results: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn extend(&mut self, inputs: Batch<V>, results: Vec<R>) -> Result<(), BatchError> {
        debug_assert_eq!(inputs.len(), results.len());
        self.inputs.extend(inputs)?;
        self.results.extend(results);
        Ok(())
    }

    /// Each input row alongside the result computed from it.
    pub fn pairs(&self) -> impl Iterator<Item = (Row<'_, V>, &R)> {
        self.inputs.rows().zip(self.results.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ragged_columns_are_rejected() {
        let err = batch! { "a" => 1..=3, "b" => 1..=2 }.expect_err("Columns differ in length");
        assert_eq!(
            err,
            BatchError::RaggedBatch {
                key: "b".to_string(),
                expected: 3,
                found: 2,
            }
        );
    }

    #[test]
    fn replacing_the_only_column_may_change_the_length() -> Result<(), BatchError> {
        let mut batch = Batch::single("a", vec![1, 2, 3]);
        batch.insert_column("a", vec![7])?;
        assert_eq!(batch.len(), 1);
        Ok(())
    }

    #[test]
    fn rows_see_every_column() -> Result<(), BatchError> {
        let batch = batch! { "x" => 1..=3, "name" => vec![10, 20, 30] }?;
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.keys().collect::<Vec<_>>(), vec!["name", "x"]);

        let row = batch.row(1).expect("Row 1 exists");
        assert_eq!(row.index(), 1);
        assert_eq!(row["x"], 2);
        assert_eq!(row.get("name"), Some(&20));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.iter().collect::<Vec<_>>(), vec![("name", &20), ("x", &2)]);
        assert!(batch.row(3).is_none());
        assert_eq!(batch.rows().count(), 3);
        Ok(())
    }

    #[test]
    fn extend_concatenates_columns() -> Result<(), BatchError> {
        let mut merged = Batch::new();
        merged.extend(batch! { "a" => [1, 2], "b" => [3, 4] }?)?;
        merged.extend(batch! { "a" => [5], "b" => [6] }?)?;
        assert_eq!(&merged["a"], &[1, 2, 5]);
        assert_eq!(&merged["b"], &[3, 4, 6]);
        assert_eq!(merged.len(), 3);

        let err = merged
            .extend(batch! { "c" => [0] }?)
            .expect_err("Columns do not match");
        assert!(matches!(err, BatchError::MismatchedColumns { .. }));
        Ok(())
    }

    #[test]
    fn empty_like_keeps_the_columns() -> Result<(), BatchError> {
        let batch = batch! { "a" => 1..=4, "b" => 5..=8 }?;
        let empty: Batch<String> = Batch::empty_like(&batch);
        assert!(empty.is_empty());
        assert_eq!(empty.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(&empty["a"], &[] as &[String]);
        Ok(())
    }

    #[test]
    fn results_pair_up_with_their_inputs() -> Result<(), BatchError> {
        let mut results = RunResults::default();
        results.extend(batch! { "x" => [3, 1] }?, vec![6, 2])?;
        results.extend(batch! { "x" => [2] }?, vec![4])?;
        let pairs: Vec<(i32, i32)> = results.pairs().map(|(row, out)| (row["x"], *out)).collect();
        assert_eq!(pairs, vec![(3, 6), (1, 2), (2, 4)]);
        assert_eq!(results.len(), 3);
        Ok(())
    }
}
