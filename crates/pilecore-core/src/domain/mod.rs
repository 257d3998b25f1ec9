//! Domain types shared by every stage of the post-processing pipeline.

pub mod bearing;
pub mod cluster;
pub mod cpt;
pub mod error;
pub mod level;

pub use bearing::{BearingColumn, BearingRow, CptBearingResults};
pub use cluster::{Cluster, ClusterId};
pub use cpt::{natural_cmp, Cpt, CptId};
pub use error::{CoreError, Result, ValidationError};
pub use level::PileTipLevel;
