//! dwh-etl: loads the event and song datasets into the warehouse.
//!
//! Runs after `dwhctl create` has published the cluster endpoint and role
//! ARN. Three steps, each a fixed list of statements executed in order:
//!
//! ```text
//! reset   drop all seven tables, create them again
//! load    COPY staging_events / staging_songs from S3 using the role ARN
//! insert  fill songplays, users, songs, artists, times from staging
//! ```

pub mod error;
pub mod executor;
pub mod pipeline;
pub mod queries;

pub use error::{EtlError, EtlResult};
pub use executor::{PgExecutor, SqlExecutor};
pub use pipeline::{EtlStep, EtlTarget, insert_tables, load_staging_tables, reset_tables, run};
pub use queries::{CopySource, Statement};
