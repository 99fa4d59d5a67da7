//! Columnar document archives: writing, opening, printing and string queries.
//!
//! ```no_run
//! use carbon_archive::{write_json_file, Archive, ArchiveOptions, Contains};
//!
//! let opts = ArchiveOptions::new().with_baked_index(true);
//! write_json_file("users.carbon", r#"{"name": "ada", "tags": ["x", "y"]}"#, &opts)?;
//!
//! let archive = Archive::open("users.carbon")?;
//! let ids = archive.query().find_ids(&Contains("ad".into()), -1)?;
//! assert_eq!(archive.query().fetch_string_by_id(ids[0])?, "ada");
//! # Ok::<(), carbon_core::Error>(())
//! ```

pub mod archive;
pub mod cache;
pub mod index;
pub mod json;
pub mod model;
pub mod oid;
pub mod query;
pub mod record;
pub mod string_table;
pub mod writer;

pub use archive::{bake_string_id_index, Archive, ArchiveInfo, IoContext, RecordTable};
pub use cache::{CacheStats, StringCache};
pub use index::StringIdIndex;
pub use json::import;
pub use model::{
    ColumnDoc, ColumnEntry, ColumnGroupModel, ColumnModel, ObjectModel, PropGroup,
    StringDictionary, StringId,
};
pub use oid::ObjectIdGenerator;
pub use query::{
    from_fn, Contains, Equals, FnPredicate, Limited, Query, QueryOptions, StartsWith,
    StringIdInfo, StringIdIter, StringPredicate, StringPredicateExt,
};
pub use record::{print_archive, ObjectView, RecordView};
pub use string_table::StringTable;
pub use writer::{write_archive, write_archive_file, write_json, write_json_file, ArchiveOptions};
