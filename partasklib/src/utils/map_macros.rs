/// Builds a [`Batch`](crate::batch::Batch) from `name => values` pairs, where `values` is anything
/// iterable. Evaluates to a `Result` because the columns may disagree on their length.
///
/// ```
/// let batch = partasklib::batch! { "x" => 1..=3, "y" => vec![4, 5, 6] }.unwrap();
/// assert_eq!(batch.len(), 3);
/// ```
#[macro_export]
macro_rules! batch(
    {} => {::std::result::Result::<_, $crate::error::BatchError>::Ok($crate::batch::Batch::new())};
    { $($key:expr => $values:expr),* $(,)? } => {
        $crate::batch::Batch::from_columns(::std::vec![
            $(
                (
                    $key.to_string(),
                    ::std::iter::IntoIterator::into_iter($values).collect::<::std::vec::Vec<_>>(),
                ),
            )*
        ])
    };
);

