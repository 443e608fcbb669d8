//! HTTP handlers.

pub mod datasets;
pub mod health;
pub mod lookup;
pub mod session;

pub use datasets::{
    change_cumulative_state, create_dataset, delete_dataset, get_dataset, list_datasets,
    publish_dataset, refresh_directory_content, update_dataset,
};
pub use health::health_check;
pub use lookup::lookup_dataset;
pub use session::{delete_session, get_session};
