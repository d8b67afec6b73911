pub mod allocator;
pub mod controller;
pub mod error;
pub mod manager;
pub mod page;
pub mod row;
pub mod schema;
pub mod session;

pub use allocator::{AllocatedIdentifier, IdentifierAllocator};
pub use controller::{
    FetchOutcome, FetchTask, Mutation, MutationOrigin, MutationOutcome, MutationTask, PendingOp,
    Phase, Snapshot, TableController,
};
pub use error::TableError;
pub use manager::{Notice, NoticeKind, TableEvent, TableManager};
pub use page::{PageQuery, PageState, SortDirection, SortSpec};
pub use row::{Draft, FieldKind, FieldSpec, Fields, Patch, Row, Scalar};
pub use schema::TableSchema;
pub use session::{EditDialog, EditMode, EditSession};
