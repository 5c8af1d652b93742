//! Concrete execution steps.

pub mod aggregate_count;
pub mod check_class_type;
pub mod convert_to_projection;
pub mod count_from_class;
pub mod count_from_index;
pub mod count_from_index_with_key;
pub mod delete;
pub mod distinct;
pub mod expand;
pub mod fetch_from_class;
pub mod fetch_from_indexed_function;
pub mod filter;
pub mod guarantee_empty_count;
pub mod insert;
pub mod subquery;

#[cfg(test)]
pub mod test_support;

pub use aggregate_count::AggregateCountStep;
pub use check_class_type::CheckClassTypeStep;
pub use convert_to_projection::ConvertToProjectionStep;
pub use count_from_class::CountFromClassStep;
pub use count_from_index::CountFromIndexStep;
pub use count_from_index_with_key::CountFromIndexWithKeyStep;
pub use delete::DeleteStep;
pub use distinct::DistinctStep;
pub use expand::ExpandStep;
pub use fetch_from_class::FetchFromClassStep;
pub use fetch_from_indexed_function::FetchFromIndexedFunctionStep;
pub use filter::FilterStep;
pub use guarantee_empty_count::GuaranteeEmptyCountStep;
pub use insert::InsertStep;
pub use subquery::SubQueryStep;
