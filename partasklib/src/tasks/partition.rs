use crate::batch::Batch;
use std::collections::BTreeMap;

/// One worker's share of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition<V> {
    pub index: usize,
    /// `indices[local]` is the row of the original batch that became `inputs.row(local)`.
    pub indices: Vec<usize>,
    pub inputs: Batch<V>,
}

impl<V> Partition<V> {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Deals `seq` out to `num_partitions` sub-sequences like cards: item `i` lands in partition
/// `i % num_partitions` at position `i / num_partitions`.
///
/// Always returns exactly `num_partitions` sequences (at least one), trailing ones possibly empty.
pub fn split_sequence<T, I: IntoIterator<Item = T>>(seq: I, num_partitions: usize) -> Vec<Vec<T>> {
    let num_partitions = num_partitions.max(1);
    let mut partitions: Vec<Vec<T>> = (0..num_partitions).map(|_| Vec::new()).collect();
    for (i, item) in seq.into_iter().enumerate() {
        partitions[i % num_partitions].push(item);
    }
    partitions
}

/// The original row indices each partition receives.
pub fn partition_indices(num_rows: usize, num_partitions: usize) -> Vec<Vec<usize>> {
    split_sequence(0..num_rows, num_partitions)
}

/// Splits every column of `batch` with the same round-robin pattern, so row `i` keeps all of its
/// values together in partition `i % num_partitions`.
pub fn split_batch<V: Clone>(batch: &Batch<V>, num_partitions: usize) -> Vec<Partition<V>> {
    let indices = partition_indices(batch.len(), num_partitions);
    let mut columns: Vec<BTreeMap<String, Vec<V>>> =
        indices.iter().map(|_| BTreeMap::new()).collect();
    for (key, values) in batch.columns() {
        let split = split_sequence(values.iter().cloned(), num_partitions);
        for (partition, values) in columns.iter_mut().zip(split) {
            partition.insert(key.to_owned(), values);
        }
    }
    indices
        .into_iter()
        .zip(columns)
        .enumerate()
        .map(|(index, (indices, columns))| Partition {
            index,
            inputs: Batch::from_parts(columns, indices.len()),
            indices,
        })
        .collect()
}
