mod record;

use proc_macro::TokenStream;

/// Derive macro for the `Record` trait.
///
/// # Usage
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, Record)]
/// #[record(kind = "TrainingTemplate")]
/// struct TrainingTemplate {
///     #[record(id)]
///     pub id: i64,
///     pub day_number: u8,
/// }
/// ```
///
/// - `#[record(kind = "...")]` sets the record kind used for cache tags.
///   If omitted, defaults to the struct name.
/// - `#[record(id)]` marks the integer field used as the identifier.
///   If omitted, defaults to a field named `id`.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    record::derive_record(input)
}
