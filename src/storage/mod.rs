mod headlines;
mod publications;
mod schema;
mod sync_runs;
mod types;

pub use schema::Database;
pub use types::{
    DatabaseError, Headline, NewHeadline, Publication, RunStatus, RunSummary, StoreError, SyncRun,
    TriggerType,
};
