// Decode -> compile -> materialize
mod compile;
mod materialize;
mod options;
mod types;

pub use compile::compile;
pub use materialize::{execute, execute_native};
pub use options::{decode_options, decode_options_json};
pub use types::{
    CompiledQuery, DeleteReport, InsertReport, NativeFind, QueryOptions, ResultSet, SortDirection,
    SortKey, UpdateReport,
};
