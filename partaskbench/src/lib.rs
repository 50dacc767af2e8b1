use partasklib::{Batch, BatchError, Row};

/// A two column batch of `rows` rows, the shape the benchmarks run over.
pub fn workload(rows: u64) -> Result<Batch<u64>, BatchError> {
    partasklib::batch! {
        "seed" => 0..rows,
        "rounds" => (0..rows).map(|i| 1 + i % 64),
    }
}

/// A deliberately uneven task: later rows ask for more rounds.
pub fn mix(row: &Row<'_, u64>) -> Result<u64, String> {
    let mut value = row["seed"];
    for _ in 0..row["rounds"] * 100 {
        value = value.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    }
    Ok(value)
}
